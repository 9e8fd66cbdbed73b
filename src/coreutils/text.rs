//! Text-processing builtins operating on stdin/argv bytes, independent of
//! the VFS (beyond `cat`-style file arguments, which live in `fs_utils`).

use std::collections::HashMap;

use crate::registry::{CommandContext, CommandOutput, Handler};

pub fn register(handlers: &mut HashMap<&'static str, Handler>) {
    handlers.insert("echo", echo);
    handlers.insert("printf", printf);
    handlers.insert("grep", |ctx| Box::pin(grep(ctx)));
    handlers.insert("sed", |ctx| Box::pin(sed(ctx)));
    handlers.insert("wc", |ctx| Box::pin(wc(ctx)));
    handlers.insert("head", |ctx| Box::pin(head(ctx)));
    handlers.insert("tail", |ctx| Box::pin(tail(ctx)));
    handlers.insert("cut", cut);
    handlers.insert("tr", tr);
    handlers.insert("sort", sort);
    handlers.insert("uniq", uniq);
    handlers.insert("tee", |ctx| Box::pin(tee(ctx)));
}

fn input_lines(ctx: &CommandContext) -> Vec<String> {
    ctx.stdin.lines().map(|s| s.to_string()).collect()
}

fn echo(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let no_newline = ctx.args.first().map(|a| a == "-n").unwrap_or(false);
        let words: Vec<&String> = if no_newline { ctx.args.iter().skip(1).collect() } else { ctx.args.iter().collect() };
        let mut out = words.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ");
        if !no_newline {
            out.push('\n');
        }
        CommandOutput::ok(out)
    })
}

fn printf(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let Some(format) = ctx.args.first() else {
            return CommandOutput::err("printf: missing format\n".to_string(), 1);
        };
        let rest = &ctx.args[1..];
        let mut out = String::new();
        let mut arg_idx = 0;
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else if c == '%' {
                match chars.next() {
                    Some('s') => {
                        out.push_str(rest.get(arg_idx).map(|s| s.as_str()).unwrap_or(""));
                        arg_idx += 1;
                    }
                    Some('d') => {
                        let val: i64 = rest.get(arg_idx).and_then(|s| s.parse().ok()).unwrap_or(0);
                        out.push_str(&val.to_string());
                        arg_idx += 1;
                    }
                    Some('%') => out.push('%'),
                    Some(other) => {
                        out.push('%');
                        out.push(other);
                    }
                    None => out.push('%'),
                }
            } else {
                out.push(c);
            }
        }
        CommandOutput::ok(out)
    })
}

async fn grep(ctx: CommandContext<'_>) -> CommandOutput {
    let invert = ctx.args.iter().any(|a| a == "-v");
    let ignore_case = ctx.args.iter().any(|a| a == "-i");
    let line_numbers = ctx.args.iter().any(|a| a == "-n");
    let Some(pattern) = ctx.args.iter().find(|a| !a.starts_with('-')) else {
        return CommandOutput::err("grep: missing pattern\n".to_string(), 1);
    };
    let pattern_owned = if ignore_case { pattern.to_lowercase() } else { pattern.clone() };
    let mut out = String::new();
    let mut found = false;
    for (idx, line) in input_lines(&ctx).iter().enumerate() {
        let haystack = if ignore_case { line.to_lowercase() } else { line.clone() };
        let matched = haystack.contains(&pattern_owned);
        if matched != invert {
            found = true;
            if line_numbers {
                out.push_str(&format!("{}:{}\n", idx + 1, line));
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    CommandOutput { stdout: out, stderr: String::new(), exit_code: if found { 0 } else { 1 } }
}

/// A minimal `sed -e 's/from/to/[g]'` — the common case real scripts lean
/// on; full regex/address-range support is out of scope per the coreutils
/// body Non-goal.
async fn sed(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(script) = ctx.args.first() else {
        return CommandOutput::err("sed: missing script\n".to_string(), 1);
    };
    let Some(rest) = script.strip_prefix("s/") else {
        return CommandOutput::err("sed: only `s/from/to/[g]` is supported\n".to_string(), 1);
    };
    let parts: Vec<&str> = rest.splitn(3, '/').collect();
    if parts.len() < 2 {
        return CommandOutput::err("sed: malformed script\n".to_string(), 1);
    }
    let (from, to) = (parts[0], parts[1]);
    let global = parts.get(2).map(|f| f.contains('g')).unwrap_or(false);
    let mut out = String::new();
    for line in ctx.stdin.lines() {
        if global {
            out.push_str(&line.replace(from, to));
        } else {
            out.push_str(&line.replacen(from, to, 1));
        }
        out.push('\n');
    }
    CommandOutput::ok(out)
}

async fn wc(ctx: CommandContext<'_>) -> CommandOutput {
    let lines = ctx.stdin.lines().count();
    let words = ctx.stdin.split_whitespace().count();
    let bytes = ctx.stdin.len();
    if ctx.args.iter().any(|a| a == "-l") {
        return CommandOutput::ok(format!("{lines}\n"));
    }
    if ctx.args.iter().any(|a| a == "-w") {
        return CommandOutput::ok(format!("{words}\n"));
    }
    if ctx.args.iter().any(|a| a == "-c") {
        return CommandOutput::ok(format!("{bytes}\n"));
    }
    CommandOutput::ok(format!("{lines} {words} {bytes}\n"))
}

async fn head(ctx: CommandContext<'_>) -> CommandOutput {
    let n = parse_count(&ctx.args).unwrap_or(10);
    let out: String = input_lines(&ctx).into_iter().take(n).map(|l| l + "\n").collect();
    CommandOutput::ok(out)
}

async fn tail(ctx: CommandContext<'_>) -> CommandOutput {
    let n = parse_count(&ctx.args).unwrap_or(10);
    let lines = input_lines(&ctx);
    let skip = lines.len().saturating_sub(n);
    let out: String = lines.into_iter().skip(skip).map(|l| l + "\n").collect();
    CommandOutput::ok(out)
}

fn parse_count(args: &[String]) -> Option<usize> {
    args.iter()
        .position(|a| a == "-n")
        .and_then(|idx| args.get(idx + 1))
        .and_then(|v| v.parse().ok())
}

fn cut(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let delim = ctx
            .args
            .iter()
            .position(|a| a == "-d")
            .and_then(|idx| ctx.args.get(idx + 1))
            .map(|s| s.as_str())
            .unwrap_or("\t");
        let fields: Vec<usize> = ctx
            .args
            .iter()
            .position(|a| a == "-f")
            .and_then(|idx| ctx.args.get(idx + 1))
            .map(|spec| spec.split(',').filter_map(|n| n.parse::<usize>().ok()).collect())
            .unwrap_or_default();
        let mut out = String::new();
        for line in ctx.stdin.lines() {
            let cols: Vec<&str> = line.split(delim).collect();
            let selected: Vec<&str> = fields
                .iter()
                .filter_map(|&f| cols.get(f.saturating_sub(1)).copied())
                .collect();
            out.push_str(&selected.join(delim));
            out.push('\n');
        }
        CommandOutput::ok(out)
    })
}

fn tr(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return CommandOutput::err("tr: missing operand\n".to_string(), 1);
        }
        let from: Vec<char> = ctx.args[0].chars().collect();
        let to: Vec<char> = ctx.args[1].chars().collect();
        let out: String = ctx
            .stdin
            .chars()
            .map(|c| match from.iter().position(|&f| f == c) {
                Some(idx) => *to.get(idx).or_else(|| to.last()).unwrap_or(&c),
                None => c,
            })
            .collect();
        CommandOutput::ok(out)
    })
}

fn sort(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let reverse = ctx.args.iter().any(|a| a == "-r");
        let unique = ctx.args.iter().any(|a| a == "-u");
        let mut lines: Vec<String> = input_lines(&ctx);
        lines.sort();
        if reverse {
            lines.reverse();
        }
        if unique {
            lines.dedup();
        }
        CommandOutput::ok(lines.into_iter().map(|l| l + "\n").collect())
    })
}

fn uniq(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let mut out = String::new();
        let mut prev: Option<String> = None;
        for line in ctx.stdin.lines() {
            if prev.as_deref() != Some(line) {
                out.push_str(line);
                out.push('\n');
            }
            prev = Some(line.to_string());
        }
        CommandOutput::ok(out)
    })
}

async fn tee(ctx: CommandContext<'_>) -> CommandOutput {
    let cwd = ctx.env.pwd();
    for arg in &ctx.args {
        let path = ctx.vfs.resolve(&cwd, arg).await;
        let _ = ctx.vfs.write_file(&path, ctx.stdin.as_bytes().to_vec()).await;
    }
    CommandOutput::ok(ctx.stdin.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FoamConfig;
    use crate::env::Environment;
    use crate::store::memory::MemoryBackend;
    use crate::vfs::Vfs;
    use std::sync::Arc;

    async fn ctx_with_stdin(args: Vec<&str>, stdin: &str) -> (Environment, Vfs, FoamConfig) {
        let vfs = Vfs::new(Arc::new(MemoryBackend::new()), "foam", "/home/foam").await;
        let env = Environment::new("foam", "/home/foam");
        let _ = args;
        (env, vfs, FoamConfig::default())
    }

    #[tokio::test]
    async fn grep_filters_matching_lines() {
        let (mut env, vfs, config) = ctx_with_stdin(vec![], "foo\nbar\nfoobar\n").await;
        let ctx = CommandContext {
            args: vec!["foo".to_string()],
            vfs: &vfs,
            env: &mut env,
            stdin: "foo\nbar\nfoobar\n".to_string(),
            config: &config,
        };
        let result = grep(ctx).await;
        assert_eq!(result.stdout, "foo\nfoobar\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn grep_no_match_exits_nonzero() {
        let (mut env, vfs, config) = ctx_with_stdin(vec![], "bar\n").await;
        let ctx = CommandContext {
            args: vec!["zzz".to_string()],
            vfs: &vfs,
            env: &mut env,
            stdin: "bar\n".to_string(),
            config: &config,
        };
        let result = grep(ctx).await;
        assert_eq!(result.exit_code, 1);
    }
}
