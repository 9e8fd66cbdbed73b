//! Filesystem-facing builtins: directory/navigation/file-management
//! commands that talk to the `Vfs` directly.

use std::collections::HashMap;

use crate::path::PathResolver;
use crate::registry::{CommandContext, CommandOutput, Handler, HandlerFuture};

pub fn register(handlers: &mut HashMap<&'static str, Handler>) {
    handlers.insert("pwd", pwd);
    handlers.insert("cd", |ctx| Box::pin(cd(ctx)));
    handlers.insert("ls", |ctx| Box::pin(ls(ctx)));
    handlers.insert("mkdir", |ctx| Box::pin(mkdir(ctx)));
    handlers.insert("rmdir", |ctx| Box::pin(rmdir(ctx)));
    handlers.insert("touch", |ctx| Box::pin(touch(ctx)));
    handlers.insert("rm", |ctx| Box::pin(rm(ctx)));
    handlers.insert("cp", |ctx| Box::pin(cp(ctx)));
    handlers.insert("mv", |ctx| Box::pin(mv(ctx)));
    handlers.insert("cat", |ctx| Box::pin(cat(ctx)));
    handlers.insert("ln", |ctx| Box::pin(ln(ctx)));
    handlers.insert("readlink", |ctx| Box::pin(readlink(ctx)));
    handlers.insert("basename", basename);
    handlers.insert("dirname", dirname);
    handlers.insert("find", |ctx| Box::pin(find(ctx)));
    handlers.insert("chmod", |ctx| Box::pin(chmod(ctx)));
    handlers.insert("diff", |ctx| Box::pin(diff(ctx)));
}

fn resolve(ctx: &CommandContext, arg: &str) -> impl std::future::Future<Output = String> + '_ {
    let cwd = ctx.env.pwd();
    let arg = arg.to_string();
    async move { ctx.vfs.resolve(&cwd, &arg).await }
}

fn pwd(ctx: CommandContext) -> HandlerFuture {
    Box::pin(async move { CommandOutput::ok(format!("{}\n", ctx.env.pwd())) })
}

async fn cd(mut ctx: CommandContext<'_>) -> CommandOutput {
    let target = match ctx.args.first() {
        None => ctx.env.home(),
        Some(arg) if arg == "-" => ctx.env.get("OLDPWD").unwrap_or("/").to_string(),
        Some(arg) => resolve(&ctx, arg).await,
    };
    match ctx.vfs.stat(&target).await {
        Ok(stat) if stat.is_directory() => {
            ctx.env.set_pwd(target);
            CommandOutput::ok("")
        }
        Ok(_) => CommandOutput::err(format!("cd: {target}: Not a directory\n"), 1),
        Err(err) => CommandOutput::err(format!("cd: {}\n", err.short_message()), 1),
    }
}

async fn ls(ctx: CommandContext<'_>) -> CommandOutput {
    let target_arg = ctx.args.iter().find(|a| !a.starts_with('-'));
    let path = match target_arg {
        Some(arg) => resolve(&ctx, arg).await,
        None => ctx.env.pwd(),
    };
    let long = ctx.args.iter().any(|a| a == "-l");
    match ctx.vfs.readdir(&path).await {
        Ok(mut names) => {
            names.sort();
            if long {
                let mut lines = String::new();
                for name in &names {
                    let full = PathResolver::join(&path, name);
                    if let Ok(stat) = ctx.vfs.stat(&full).await {
                        let kind = if stat.is_directory() { "d" } else { "-" };
                        lines.push_str(&format!("{kind}{:o} {:>8} {}\n", stat.mode, stat.size, name));
                    }
                }
                CommandOutput::ok(lines)
            } else {
                CommandOutput::ok(format!("{}\n", names.join("  ")))
            }
        }
        Err(err) => CommandOutput::err(format!("ls: {}\n", err.short_message()), 1),
    }
}

async fn mkdir(ctx: CommandContext<'_>) -> CommandOutput {
    let recursive = ctx.args.iter().any(|a| a == "-p");
    let targets: Vec<&String> = ctx.args.iter().filter(|a| !a.starts_with('-')).collect();
    if targets.is_empty() {
        return CommandOutput::err("mkdir: missing operand\n".to_string(), 1);
    }
    let mut stderr = String::new();
    let mut code = 0;
    for arg in targets {
        let path = resolve(&ctx, arg).await;
        if let Err(err) = ctx.vfs.mkdir(&path, recursive).await {
            stderr.push_str(&format!("mkdir: {}\n", err.short_message()));
            code = 1;
        }
    }
    CommandOutput { stdout: String::new(), stderr, exit_code: code }
}

async fn rmdir(ctx: CommandContext<'_>) -> CommandOutput {
    let mut stderr = String::new();
    let mut code = 0;
    for arg in &ctx.args {
        let path = resolve(&ctx, arg).await;
        if let Err(err) = ctx.vfs.rmdir(&path).await {
            stderr.push_str(&format!("rmdir: {}\n", err.short_message()));
            code = 1;
        }
    }
    CommandOutput { stdout: String::new(), stderr, exit_code: code }
}

async fn touch(ctx: CommandContext<'_>) -> CommandOutput {
    let mut stderr = String::new();
    let mut code = 0;
    for arg in &ctx.args {
        let path = resolve(&ctx, arg).await;
        if ctx.vfs.exists(&path).await {
            let _ = ctx.vfs.append_file(&path, b"").await;
        } else if let Err(err) = ctx.vfs.write_file(&path, Vec::new()).await {
            stderr.push_str(&format!("touch: {}\n", err.short_message()));
            code = 1;
        }
    }
    CommandOutput { stdout: String::new(), stderr, exit_code: code }
}

async fn rm(ctx: CommandContext<'_>) -> CommandOutput {
    let recursive = ctx.args.iter().any(|a| a == "-r" || a == "-rf" || a == "-fr");
    let force = ctx.args.iter().any(|a| a.starts_with('-') && a.contains('f'));
    let targets: Vec<&String> = ctx.args.iter().filter(|a| !a.starts_with('-')).collect();
    let mut stderr = String::new();
    let mut code = 0;
    for arg in targets {
        let path = resolve(&ctx, arg).await;
        let result = remove_path(&ctx, &path, recursive).await;
        if let Err(err) = result {
            if !force {
                stderr.push_str(&format!("rm: {}\n", err.short_message()));
                code = 1;
            }
        }
    }
    CommandOutput { stdout: String::new(), stderr, exit_code: code }
}

async fn remove_path(ctx: &CommandContext<'_>, path: &str, recursive: bool) -> Result<(), crate::vfs::FsError> {
    let stat = ctx.vfs.stat(path).await?;
    if stat.is_directory() {
        if recursive {
            for name in ctx.vfs.readdir(path).await? {
                let child = PathResolver::join(path, &name);
                Box::pin(remove_path(ctx, &child, true)).await?;
            }
        }
        ctx.vfs.rmdir(path).await
    } else {
        ctx.vfs.unlink(path).await
    }
}

async fn cp(ctx: CommandContext<'_>) -> CommandOutput {
    let recursive = ctx.args.iter().any(|a| a == "-r" || a == "-R");
    let paths: Vec<&String> = ctx.args.iter().filter(|a| !a.starts_with('-')).collect();
    if paths.len() < 2 {
        return CommandOutput::err("cp: missing file operand\n".to_string(), 1);
    }
    let dest = resolve(&ctx, paths[paths.len() - 1]).await;
    let mut stderr = String::new();
    let mut code = 0;
    let dest_is_dir = ctx.vfs.stat(&dest).await.map(|s| s.is_directory()).unwrap_or(false);
    for src_arg in &paths[..paths.len() - 1] {
        let src = resolve(&ctx, src_arg).await;
        let target = if paths.len() > 2 || dest_is_dir {
            PathResolver::join(&dest, &PathResolver::basename(&src))
        } else {
            dest.clone()
        };
        let result = copy_path(&ctx, &src, &target, recursive).await;
        if let Err(err) = result {
            stderr.push_str(&format!("cp: {}\n", err));
            code = 1;
        }
    }
    CommandOutput { stdout: String::new(), stderr, exit_code: code }
}

async fn copy_path(ctx: &CommandContext<'_>, src: &str, dest: &str, recursive: bool) -> Result<(), String> {
    let stat = ctx.vfs.stat(src).await.map_err(|e| e.short_message())?;
    if stat.is_directory() {
        if !recursive {
            return Err(format!("{src}: is a directory (not copied)"));
        }
        ctx.vfs.mkdir(dest, true).await.ok();
        for name in ctx.vfs.readdir(src).await.map_err(|e| e.short_message())? {
            let child_src = PathResolver::join(src, &name);
            let child_dest = PathResolver::join(dest, &name);
            Box::pin(copy_path(ctx, &child_src, &child_dest, true)).await?;
        }
        Ok(())
    } else {
        ctx.vfs.copy_file(src, dest).await.map_err(|e| e.short_message())
    }
}

async fn mv(ctx: CommandContext<'_>) -> CommandOutput {
    let paths = &ctx.args;
    if paths.len() < 2 {
        return CommandOutput::err("mv: missing file operand\n".to_string(), 1);
    }
    let dest = resolve(&ctx, &paths[paths.len() - 1]).await;
    let mut stderr = String::new();
    let mut code = 0;
    for src_arg in &paths[..paths.len() - 1] {
        let src = resolve(&ctx, src_arg).await;
        let target = if ctx.vfs.stat(&dest).await.map(|s| s.is_directory()).unwrap_or(false) {
            PathResolver::join(&dest, &PathResolver::basename(&src))
        } else {
            dest.clone()
        };
        if let Err(err) = ctx.vfs.rename(&src, &target).await {
            stderr.push_str(&format!("mv: {}\n", err.short_message()));
            code = 1;
        }
    }
    CommandOutput { stdout: String::new(), stderr, exit_code: code }
}

async fn cat(ctx: CommandContext<'_>) -> CommandOutput {
    if ctx.args.is_empty() {
        return CommandOutput::ok(ctx.stdin.clone());
    }
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut code = 0;
    for arg in &ctx.args {
        let path = resolve(&ctx, arg).await;
        match ctx.vfs.read_file(&path).await {
            Ok(bytes) => stdout.push_str(&String::from_utf8_lossy(&bytes)),
            Err(err) => {
                stderr.push_str(&format!("cat: {}\n", err.short_message()));
                code = 1;
            }
        }
    }
    CommandOutput { stdout, stderr, exit_code: code }
}

async fn diff(ctx: CommandContext<'_>) -> CommandOutput {
    let paths: Vec<&String> = ctx.args.iter().filter(|a| !a.starts_with('-')).collect();
    let (Some(left_arg), Some(right_arg)) = (paths.first(), paths.get(1)) else {
        return CommandOutput::err("usage: diff FILE1 FILE2\n".to_string(), 2);
    };
    let left_path = resolve(&ctx, left_arg).await;
    let right_path = resolve(&ctx, right_arg).await;
    let left = match ctx.vfs.read_file(&left_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => return CommandOutput::err(format!("diff: {}\n", err.short_message()), 2),
    };
    let right = match ctx.vfs.read_file(&right_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => return CommandOutput::err(format!("diff: {}\n", err.short_message()), 2),
    };
    if crate::facades::git::diff::unchanged(&left, &right) {
        return CommandOutput::ok("");
    }
    let hunks = crate::facades::git::diff::unified(left_arg, right_arg, &left, &right);
    CommandOutput { stdout: hunks, stderr: String::new(), exit_code: 1 }
}

async fn ln(ctx: CommandContext<'_>) -> CommandOutput {
    let symbolic = ctx.args.iter().any(|a| a == "-s");
    let paths: Vec<&String> = ctx.args.iter().filter(|a| !a.starts_with('-')).collect();
    if paths.len() != 2 || !symbolic {
        return CommandOutput::err("ln: only `ln -s target linkname` is supported\n".to_string(), 1);
    }
    let target = resolve(&ctx, paths[0]).await;
    let link = resolve(&ctx, paths[1]).await;
    match ctx.vfs.symlink(&target, &link).await {
        Ok(()) => CommandOutput::ok(""),
        Err(err) => CommandOutput::err(format!("ln: {}\n", err.short_message()), 1),
    }
}

async fn readlink(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(arg) = ctx.args.first() else {
        return CommandOutput::err("readlink: missing operand\n".to_string(), 1);
    };
    let path = resolve(&ctx, arg).await;
    match ctx.vfs.readlink(&path).await {
        Ok(target) => CommandOutput::ok(format!("{target}\n")),
        Err(err) => CommandOutput::err(format!("readlink: {}\n", err.short_message()), 1),
    }
}

fn basename(ctx: CommandContext) -> HandlerFuture {
    Box::pin(async move {
        match ctx.args.first() {
            Some(p) => CommandOutput::ok(format!("{}\n", PathResolver::basename(p))),
            None => CommandOutput::err("basename: missing operand\n".to_string(), 1),
        }
    })
}

fn dirname(ctx: CommandContext) -> HandlerFuture {
    Box::pin(async move {
        match ctx.args.first() {
            Some(p) => CommandOutput::ok(format!("{}\n", PathResolver::dirname(p))),
            None => CommandOutput::err("dirname: missing operand\n".to_string(), 1),
        }
    })
}

async fn find(ctx: CommandContext<'_>) -> CommandOutput {
    let root_arg = ctx.args.first().cloned().unwrap_or_else(|| ".".to_string());
    let root = resolve(&ctx, &root_arg).await;
    let name_filter = ctx
        .args
        .windows(2)
        .find(|w| w[0] == "-name")
        .map(|w| w[1].clone());
    let pattern = name_filter.unwrap_or_else(|| "*".to_string());
    let matches = ctx.vfs.glob(&root, &format!("**/{pattern}")).await;
    let mut out = String::new();
    if ctx.vfs.exists(&root).await {
        out.push_str(&root);
        out.push('\n');
    }
    for m in matches {
        out.push_str(&m);
        out.push('\n');
    }
    CommandOutput::ok(out)
}

async fn chmod(ctx: CommandContext<'_>) -> CommandOutput {
    if ctx.args.len() < 2 {
        return CommandOutput::err("chmod: missing operand\n".to_string(), 1);
    }
    let mode = u32::from_str_radix(&ctx.args[0], 8).unwrap_or(0o644);
    let path = resolve(&ctx, &ctx.args[1]).await;
    match ctx.vfs.chmod(&path, mode).await {
        Ok(()) => CommandOutput::ok(""),
        Err(err) => CommandOutput::err(format!("chmod: {}\n", err.short_message()), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FoamConfig;
    use crate::env::Environment;
    use crate::store::memory::MemoryBackend;
    use crate::vfs::Vfs;
    use std::sync::Arc;

    async fn ctx_parts() -> (Environment, Vfs, FoamConfig) {
        let vfs = Vfs::new(Arc::new(MemoryBackend::new()), "foam", "/home/foam").await;
        let env = Environment::new("foam", "/home/foam");
        (env, vfs, FoamConfig::default())
    }

    #[tokio::test]
    async fn cp_two_args_into_an_existing_directory_lands_inside_it() {
        let (mut env, vfs, config) = ctx_parts().await;
        vfs.write_file("/home/foam/notes.txt", b"hi".to_vec()).await.unwrap();
        vfs.mkdir("/home/foam/backup", false).await.unwrap();
        let ctx = CommandContext {
            args: vec!["notes.txt".to_string(), "backup".to_string()],
            vfs: &vfs,
            env: &mut env,
            stdin: String::new(),
            config: &config,
        };
        let result = cp(ctx).await;
        assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
        let copied = vfs.read_file("/home/foam/backup/notes.txt").await.unwrap();
        assert_eq!(copied, b"hi");
    }

    #[tokio::test]
    async fn cp_two_args_to_a_nonexistent_name_copies_as_a_file() {
        let (mut env, vfs, config) = ctx_parts().await;
        vfs.write_file("/home/foam/notes.txt", b"hi".to_vec()).await.unwrap();
        let ctx = CommandContext {
            args: vec!["notes.txt".to_string(), "renamed.txt".to_string()],
            vfs: &vfs,
            env: &mut env,
            stdin: String::new(),
            config: &config,
        };
        let result = cp(ctx).await;
        assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
        let copied = vfs.read_file("/home/foam/renamed.txt").await.unwrap();
        assert_eq!(copied, b"hi");
    }
}
