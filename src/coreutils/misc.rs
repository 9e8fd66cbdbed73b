//! Shell-state and environment builtins (`export`, `alias`, `history`,
//! ...), plus the small standalone utilities (`true`/`false`/`test`/`seq`/
//! `sleep`/`date`/...) that don't fit `fs_utils` or `text`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::registry::{CommandContext, CommandOutput, Handler};

pub fn register(handlers: &mut HashMap<&'static str, Handler>) {
    handlers.insert("export", |ctx| Box::pin(export(ctx)));
    handlers.insert("unset", |ctx| Box::pin(unset(ctx)));
    handlers.insert("env", |ctx| Box::pin(env_cmd(ctx)));
    handlers.insert("alias", |ctx| Box::pin(alias(ctx)));
    handlers.insert("unalias", |ctx| Box::pin(unalias(ctx)));
    handlers.insert("history", |ctx| Box::pin(history(ctx)));
    handlers.insert("true", true_cmd);
    handlers.insert("false", false_cmd);
    handlers.insert("test", test_cmd);
    handlers.insert("[", test_cmd);
    handlers.insert("seq", seq);
    handlers.insert("sleep", |ctx| Box::pin(sleep(ctx)));
    handlers.insert("xargs", |ctx| Box::pin(xargs(ctx)));
    handlers.insert("date", date);
    handlers.insert("hostname", hostname);
    handlers.insert("whoami", |ctx| Box::pin(whoami(ctx)));
    handlers.insert("uname", uname);
    handlers.insert("clear", clear);
    handlers.insert("which", |ctx| Box::pin(which(ctx)));
    handlers.insert("printenv", |ctx| Box::pin(printenv(ctx)));
    handlers.insert("type", |ctx| Box::pin(type_cmd(ctx)));
    handlers.insert("glob", |ctx| Box::pin(glob_cmd(ctx)));
    handlers.insert("ed", |ctx| Box::pin(file_viewer(ctx)));
    handlers.insert("edit", |ctx| Box::pin(file_viewer(ctx)));
    handlers.insert("vi", |ctx| Box::pin(file_viewer(ctx)));
    handlers.insert("nano", |ctx| Box::pin(file_viewer(ctx)));
    handlers.insert("dom", |ctx| Box::pin(dom(ctx)));
}

async fn export(mut ctx: CommandContext<'_>) -> CommandOutput {
    for arg in ctx.args.clone() {
        if let Some((name, value)) = arg.split_once('=') {
            ctx.env.set(name, value);
        }
    }
    CommandOutput::ok("")
}

async fn unset(mut ctx: CommandContext<'_>) -> CommandOutput {
    for name in &ctx.args.clone() {
        ctx.env.unset(name);
    }
    CommandOutput::ok("")
}

async fn env_cmd(ctx: CommandContext<'_>) -> CommandOutput {
    let mut pairs: Vec<(String, String)> = ctx.env.all().map(|(k, v)| (k.clone(), v.clone())).collect();
    pairs.sort();
    let out = pairs.into_iter().map(|(k, v)| format!("{k}={v}\n")).collect();
    CommandOutput::ok(out)
}

async fn alias(mut ctx: CommandContext<'_>) -> CommandOutput {
    if ctx.args.is_empty() {
        let mut pairs: Vec<(String, String)> = ctx.env.aliases().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort();
        let out = pairs.into_iter().map(|(k, v)| format!("alias {k}='{v}'\n")).collect();
        return CommandOutput::ok(out);
    }
    for arg in ctx.args.clone() {
        if let Some((name, value)) = arg.split_once('=') {
            ctx.env.set_alias(name, value);
        }
    }
    CommandOutput::ok("")
}

async fn unalias(mut ctx: CommandContext<'_>) -> CommandOutput {
    for name in &ctx.args.clone() {
        ctx.env.unset_alias(name);
    }
    CommandOutput::ok("")
}

async fn history(ctx: CommandContext<'_>) -> CommandOutput {
    let mut out = String::new();
    for (idx, line) in ctx.env.history().iter().enumerate() {
        out.push_str(&format!("{:5}  {}\n", idx + 1, line));
    }
    CommandOutput::ok(out)
}

fn true_cmd(_ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async { CommandOutput::ok("") })
}

fn false_cmd(_ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async { CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 1 } })
}

fn test_cmd(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let args: Vec<&str> = ctx
            .args
            .iter()
            .map(|s| s.as_str())
            .take_while(|s| *s != "]")
            .collect();
        let passed = evaluate_test(&args);
        CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: if passed { 0 } else { 1 } }
    })
}

fn evaluate_test(args: &[&str]) -> bool {
    match args {
        [] => false,
        [single] => !single.is_empty(),
        ["-z", s] => s.is_empty(),
        ["-n", s] => !s.is_empty(),
        [a, "=", b] => a == b,
        [a, "!=", b] => a != b,
        [a, "-eq", b] => parse_i64(a) == parse_i64(b),
        [a, "-ne", b] => parse_i64(a) != parse_i64(b),
        [a, "-lt", b] => parse_i64(a) < parse_i64(b),
        [a, "-le", b] => parse_i64(a) <= parse_i64(b),
        [a, "-gt", b] => parse_i64(a) > parse_i64(b),
        [a, "-ge", b] => parse_i64(a) >= parse_i64(b),
        _ => false,
    }
}

fn parse_i64(s: &str) -> i64 {
    s.parse().unwrap_or(0)
}

fn seq(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let nums: Vec<i64> = ctx.args.iter().filter_map(|a| a.parse().ok()).collect();
        let (start, end, step) = match nums.as_slice() {
            [end] => (1, *end, 1),
            [start, end] => (*start, *end, 1),
            [start, step, end] => (*start, *end, *step),
            _ => return CommandOutput::err("seq: invalid arguments\n".to_string(), 1),
        };
        if step == 0 {
            return CommandOutput::err("seq: step cannot be zero\n".to_string(), 1);
        }
        let mut out = String::new();
        let mut n = start;
        while (step > 0 && n <= end) || (step < 0 && n >= end) {
            out.push_str(&n.to_string());
            out.push('\n');
            n += step;
        }
        CommandOutput::ok(out)
    })
}

async fn sleep(ctx: CommandContext<'_>) -> CommandOutput {
    let secs: f64 = ctx.args.first().and_then(|a| a.parse().ok()).unwrap_or(0.0);
    tokio::time::sleep(std::time::Duration::from_secs_f64(secs.max(0.0))).await;
    CommandOutput::ok("")
}

async fn xargs(ctx: CommandContext<'_>) -> CommandOutput {
    // Builds one command line per whitespace-split stdin token, appended
    // to the given command and args, then hands it back to the caller as
    // plain text since xargs doesn't itself know how to invoke the
    // registry (the executor re-dispatches it, matching a real shell's
    // "xargs is just another command" model).
    let tokens: Vec<&str> = ctx.stdin.split_whitespace().collect();
    let prefix = ctx.args.join(" ");
    let line = if prefix.is_empty() {
        tokens.join(" ")
    } else {
        format!("{prefix} {}", tokens.join(" "))
    };
    CommandOutput::ok(format!("{line}\n"))
}

fn date(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        let _ = &ctx;
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        CommandOutput::ok(format!("{secs}\n"))
    })
}

fn hostname(_ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async { CommandOutput::ok("foam\n".to_string()) })
}

async fn whoami(ctx: CommandContext<'_>) -> CommandOutput {
    CommandOutput::ok(format!("{}\n", ctx.env.get("USER").unwrap_or("foam")))
}

fn uname(ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async move {
        if ctx.args.iter().any(|a| a == "-a") {
            CommandOutput::ok("Foam 1.0 wasm32 Foam\n".to_string())
        } else {
            CommandOutput::ok("Foam\n".to_string())
        }
    })
}

fn clear(_ctx: CommandContext) -> crate::registry::HandlerFuture {
    Box::pin(async { CommandOutput::ok("\x1b[2J\x1b[H".to_string()) })
}

async fn which(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(name) = ctx.args.first() else {
        return CommandOutput::err("which: missing operand\n".to_string(), 1);
    };
    let registry = crate::registry::CommandRegistry::new();
    if registry.contains(name) {
        CommandOutput::ok(format!("/bin/{name}\n"))
    } else {
        CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 1 }
    }
}

async fn printenv(ctx: CommandContext<'_>) -> CommandOutput {
    if let Some(name) = ctx.args.first() {
        return match ctx.env.get(name) {
            Some(value) => CommandOutput::ok(format!("{value}\n")),
            None => CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 1 },
        };
    }
    let mut pairs: Vec<(String, String)> = ctx.env.all().map(|(k, v)| (k.clone(), v.clone())).collect();
    pairs.sort();
    CommandOutput::ok(pairs.into_iter().map(|(k, v)| format!("{k}={v}\n")).collect::<String>())
}

/// `type`: reports whether a name is a shell function, an alias, or a
/// registered builtin/coreutil, the way POSIX `type` distinguishes the
/// three before falling back to "not found".
async fn type_cmd(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(name) = ctx.args.first() else {
        return CommandOutput::err("type: missing operand\n".to_string(), 1);
    };
    if ctx.env.function(name).is_some() {
        return CommandOutput::ok(format!("{name} is a function\n"));
    }
    if let Some(value) = ctx.env.alias(name) {
        return CommandOutput::ok(format!("{name} is aliased to `{value}'\n"));
    }
    let registry = crate::registry::CommandRegistry::new();
    if registry.contains(name) {
        CommandOutput::ok(format!("{name} is a shell builtin\n"))
    } else {
        CommandOutput::err(format!("type: {name}: not found\n"), 1)
    }
}

/// `glob PATTERN`: lists every path under the current directory matching
/// `PATTERN`, the builtin-level entry point to `Vfs::glob` for scripts
/// that want matches without going through argument globbing.
async fn glob_cmd(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(pattern) = ctx.args.first() else {
        return CommandOutput::err("glob: missing pattern\n".to_string(), 1);
    };
    let cwd = ctx.env.pwd();
    let matches = ctx.vfs.glob(&cwd, pattern).await;
    if matches.is_empty() {
        return CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 1 };
    }
    let mut matches = matches;
    matches.sort();
    CommandOutput::ok(matches.into_iter().map(|m| format!("{m}\n")).collect::<String>())
}

/// `ed`/`edit`/`vi`/`nano`: there's no interactive terminal behind this
/// shell, so every "editor" just dumps the named file's contents — enough
/// for scripts that open a file expecting to see what's in it.
async fn file_viewer(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(arg) = ctx.args.first() else {
        return CommandOutput::err("edit: missing file operand\n".to_string(), 1);
    };
    let cwd = ctx.env.pwd();
    let path = ctx.vfs.resolve(&cwd, arg).await;
    match ctx.vfs.read_file(&path).await {
        Ok(bytes) => CommandOutput::ok(String::from_utf8_lossy(&bytes).to_string()),
        Err(err) => CommandOutput::err(format!("edit: {}\n", err.short_message()), 1),
    }
}

/// `dom`: the façade has no real document to inspect outside a browser
/// tab; this reports that plainly rather than fabricating a fake tree.
async fn dom(_ctx: CommandContext<'_>) -> CommandOutput {
    CommandOutput::ok("dom: no document available in this session\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_string_and_numeric_tests() {
        assert!(evaluate_test(&["-z", ""]));
        assert!(!evaluate_test(&["-z", "x"]));
        assert!(evaluate_test(&["a", "=", "a"]));
        assert!(evaluate_test(&["3", "-lt", "4"]));
        assert!(!evaluate_test(&["3", "-gt", "4"]));
    }
}
