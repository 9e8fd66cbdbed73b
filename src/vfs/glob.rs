//! Glob matching for `Vfs::glob` (spec.md §4.3), built on `globset` rather
//! than hand-rolled wildcard matching — precedented across the example
//! pack (`stencila-stencila`'s schema/lsp/document crates) for exactly this
//! kind of path-pattern matching.

use globset::GlobBuilder;

use crate::path::PathResolver;

/// Match `pattern` (interpreted relative to `root`) against every absolute
/// path in `candidates`, returning the matches in sorted order.
pub fn match_paths(root: &str, pattern: &str, candidates: &[String]) -> Vec<String> {
    let full_pattern = if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        PathResolver::join(root, pattern)
    };

    let glob = match GlobBuilder::new(&full_pattern)
        .literal_separator(true)
        .build()
    {
        Ok(g) => g.compile_matcher(),
        Err(_) => return Vec::new(),
    };

    let mut matches: Vec<String> = candidates
        .iter()
        .filter(|path| glob.is_match(path.as_str()))
        .cloned()
        .collect();
    matches.sort();
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_single_segment() {
        let candidates = vec![
            "/proj/a.txt".to_string(),
            "/proj/b.rs".to_string(),
            "/proj/sub/c.txt".to_string(),
        ];
        let matched = match_paths("/proj", "*.txt", &candidates);
        assert_eq!(matched, vec!["/proj/a.txt".to_string()]);
    }

    #[test]
    fn double_star_crosses_segments() {
        let candidates = vec![
            "/proj/a.txt".to_string(),
            "/proj/sub/c.txt".to_string(),
            "/proj/sub/d.rs".to_string(),
        ];
        let matched = match_paths("/proj", "**/*.txt", &candidates);
        assert_eq!(
            matched,
            vec!["/proj/a.txt".to_string(), "/proj/sub/c.txt".to_string()]
        );
    }
}
