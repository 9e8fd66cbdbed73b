//! Unified-diff rendering, shared by `git diff`/`git status -v` and the
//! coreutils `diff` builtin. Both want the same textual hunk format, so it
//! lives once here rather than duplicated — the teacher's own `response.rs`
//! kept a single formatter behind every output path that needed it instead
//! of letting each call site grow its own.

use similar::{ChangeTag, TextDiff};

/// Render a unified diff between `old` and `new`. `old_label`/`new_label`
/// are used verbatim in the `---`/`+++` header lines (callers pass paths
/// like `a/src/main.rs` / `b/src/main.rs` for `git diff`, or the two
/// filenames as given for coreutils `diff`).
pub fn unified(old_label: &str, new_label: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let diff = TextDiff::from_lines(old, new);
    let mut out = String::new();
    out.push_str(&format!("--- {old_label}\n"));
    out.push_str(&format!("+++ {new_label}\n"));
    for group in diff.grouped_ops(3) {
        let (old_range, new_range) = group_ranges(&group);
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_range.0 + 1,
            old_range.1,
            new_range.0 + 1,
            new_range.1
        ));
        for op in &group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                };
                out.push(sign);
                out.push_str(change.value());
                if !change.value().ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
    out
}

fn group_ranges(group: &[similar::DiffOp]) -> ((usize, usize), (usize, usize)) {
    let mut old_start = usize::MAX;
    let mut old_len = 0;
    let mut new_start = usize::MAX;
    let mut new_len = 0;
    for op in group {
        let (o, ol, n, nl) = match *op {
            similar::DiffOp::Equal { old_index, len, new_index } => (old_index, len, new_index, len),
            similar::DiffOp::Delete { old_index, old_len, new_index } => (old_index, old_len, new_index, 0),
            similar::DiffOp::Insert { old_index, new_index, new_len } => (old_index, 0, new_index, new_len),
            similar::DiffOp::Replace { old_index, old_len, new_index, new_len } => (old_index, old_len, new_index, new_len),
        };
        old_start = old_start.min(o);
        new_start = new_start.min(n);
        old_len += ol;
        new_len += nl;
    }
    if old_start == usize::MAX {
        old_start = 0;
    }
    if new_start == usize::MAX {
        new_start = 0;
    }
    ((old_start, old_len), (new_start, new_len))
}

/// `true` when `old`/`new` have no line-level differences — used by
/// `git status` to skip files the index and working tree still agree on.
pub fn unchanged(old: &str, new: &str) -> bool {
    old == new
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_produces_empty_diff() {
        assert_eq!(unified("a", "b", "same\n", "same\n"), "");
    }

    #[test]
    fn single_line_change_produces_hunk() {
        let out = unified("a/file.txt", "b/file.txt", "one\ntwo\nthree\n", "one\nTWO\nthree\n");
        assert!(out.contains("-two"));
        assert!(out.contains("+TWO"));
        assert!(out.starts_with("--- a/file.txt\n+++ b/file.txt\n"));
    }
}
