//! The `git` façade: a CLI surface over `repo::Repository`, the same way
//! `coreutils` is a CLI surface over `vfs::Vfs`. One `register` function
//! feeds the command table, one dispatcher matches on `argv[0]`'s
//! subcommand the way the teacher's `dispatch` module matched on a request
//! shape before handing off to a backend-specific handler.

pub mod diff;
mod http;
mod objects;
mod pack;
pub mod repo;

use std::collections::HashMap;

use tracing::{info, warn};

use crate::registry::{CommandContext, CommandOutput, Handler};

use objects::ObjectKind;
use repo::{GitError, Repository};

pub fn register(handlers: &mut HashMap<&'static str, Handler>) {
    handlers.insert("git", |ctx| Box::pin(run(ctx)));
}

async fn run(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(sub) = ctx.args.first().cloned() else {
        return CommandOutput::err("usage: git <command> [<args>]\n".to_string(), 1);
    };
    let rest = ctx.args[1..].to_vec();
    match sub.as_str() {
        "init" => cmd_init(&ctx).await,
        "add" => cmd_add(&ctx, &rest).await,
        "commit" => cmd_commit(&ctx, &rest).await,
        "status" => cmd_status(&ctx).await,
        "log" => cmd_log(&ctx, &rest).await,
        "diff" => cmd_diff(&ctx).await,
        "branch" => cmd_branch(&ctx, &rest).await,
        "checkout" => cmd_checkout(&ctx, &rest).await,
        "clone" => cmd_clone(&ctx, &rest).await,
        "remote" => cmd_remote(&ctx, &rest).await,
        "config" => cmd_config(&ctx, &rest).await,
        other => CommandOutput::err(format!("git: '{other}' is not a git command\n"), 1),
    }
}

fn err_output(err: GitError) -> CommandOutput {
    CommandOutput::err(format!("git: {err}\n"), 1)
}

fn author_line(ctx: &CommandContext<'_>) -> String {
    let name = ctx.env.get("GIT_AUTHOR_NAME").unwrap_or("Foam User").to_string();
    let email = ctx.env.get("GIT_AUTHOR_EMAIL").unwrap_or("foam@example.com").to_string();
    format!("{name} <{email}>")
}

async fn discover_or_init_message(ctx: &CommandContext<'_>) -> Result<Repository, GitError> {
    Repository::discover(ctx.vfs.clone(), &ctx.env.pwd()).await
}

async fn cmd_init(ctx: &CommandContext<'_>) -> CommandOutput {
    match Repository::init(ctx.vfs.clone(), &ctx.env.pwd()).await {
        Ok(repo) => CommandOutput::ok(format!(
            "Initialized empty Git repository in {}/\n",
            repo.git_dir
        )),
        Err(err) => err_output(err),
    }
}

async fn cmd_add(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    if args.is_empty() {
        return CommandOutput::err("git: nothing specified, nothing added.\n".to_string(), 1);
    }
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    let mut total = 0usize;
    for pathspec in args {
        match repo.add(pathspec).await {
            Ok(n) => total += n,
            Err(err) => return err_output(err),
        }
    }
    let _ = total;
    CommandOutput::ok(String::new())
}

async fn cmd_commit(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let message = extract_flag_value(args, "-m").or_else(|| extract_flag_value(args, "--message"));
    let Some(message) = message else {
        return CommandOutput::err("git: commit message required (use -m)\n".to_string(), 1);
    };
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    let author = author_line(ctx);
    match repo.commit(&message, &author).await {
        Ok(oid) => {
            let branch = repo.current_branch().await;
            CommandOutput::ok(format!("[{branch} {}] {message}\n", &oid[..7.min(oid.len())]))
        }
        Err(err) => err_output(err),
    }
}

async fn cmd_status(ctx: &CommandContext<'_>) -> CommandOutput {
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    let branch = repo.current_branch().await;
    let index = repo.read_index().await;
    let mut out = format!("On branch {branch}\n");
    if index.is_empty() {
        out.push_str("\nnothing tracked yet (use \"git add\" to track files)\n");
    } else {
        out.push_str("\nTracked files:\n");
        for entry in &index {
            out.push_str(&format!("\t{}\n", entry.path));
        }
    }
    CommandOutput::ok(out)
}

async fn cmd_log(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    let limit: usize = extract_flag_value(args, "-n")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX);
    let mut oid = repo.current_commit_oid().await;
    let mut out = String::new();
    let mut shown = 0usize;
    while let Some(current) = oid {
        if shown >= limit {
            break;
        }
        let (kind, content) = match objects::read_object(&repo.vfs, &repo.git_dir, &current).await {
            Ok(v) => v,
            Err(_) => break,
        };
        if kind != ObjectKind::Commit {
            break;
        }
        let commit = objects::decode_commit(&content);
        out.push_str(&format!("commit {current}\n"));
        out.push_str(&format!("Author: {}\n", commit.author));
        out.push_str(&format!("Date:   {}\n\n", commit.timestamp));
        for line in commit.message.lines() {
            out.push_str(&format!("    {line}\n"));
        }
        out.push('\n');
        shown += 1;
        oid = commit.parents.first().cloned();
    }
    if out.is_empty() {
        return CommandOutput::err("git: your current branch does not have any commits yet\n".to_string(), 1);
    }
    CommandOutput::ok(out)
}

async fn cmd_diff(ctx: &CommandContext<'_>) -> CommandOutput {
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    let index = repo.read_index().await;
    let mut out = String::new();
    for entry in &index {
        let path = format!("{}/{}", repo.work_dir, entry.path);
        let working = repo.vfs.read_file(&path).await.unwrap_or_default();
        let working_text = String::from_utf8_lossy(&working).to_string();
        let (_, stored) = match objects::read_object(&repo.vfs, &repo.git_dir, &entry.oid).await {
            Ok(v) => v,
            Err(_) => continue,
        };
        let stored_text = String::from_utf8_lossy(&stored).to_string();
        let hunk = diff::unified(&format!("a/{}", entry.path), &format!("b/{}", entry.path), &stored_text, &working_text);
        out.push_str(&hunk);
    }
    CommandOutput::ok(out)
}

async fn cmd_branch(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    if let Some(name) = args.first() {
        return match repo.create_branch(name).await {
            Ok(()) => CommandOutput::ok(String::new()),
            Err(err) => err_output(err),
        };
    }
    let current = repo.current_branch().await;
    let branches = repo.list_branches().await;
    let mut out = String::new();
    for branch in branches {
        if branch == current {
            out.push_str(&format!("* {branch}\n"));
        } else {
            out.push_str(&format!("  {branch}\n"));
        }
    }
    CommandOutput::ok(out)
}

async fn cmd_checkout(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    let create_new = args.first().map(|s| s == "-b").unwrap_or(false);
    let name_idx = if create_new { 1 } else { 0 };
    let Some(name) = args.get(name_idx) else {
        return CommandOutput::err("git: checkout requires a branch name\n".to_string(), 1);
    };
    if create_new {
        if let Err(err) = repo.create_branch(name).await {
            return err_output(err);
        }
    }
    match repo.checkout_branch(name).await {
        Ok(()) => CommandOutput::ok(format!("Switched to branch '{name}'\n")),
        Err(err) => err_output(err),
    }
}

async fn cmd_remote(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    match args.first().map(|s| s.as_str()) {
        Some("add") => {
            let (Some(name), Some(url)) = (args.get(1), args.get(2)) else {
                return CommandOutput::err("git: usage: git remote add <name> <url>\n".to_string(), 1);
            };
            match repo.set_remote(name, url).await {
                Ok(()) => CommandOutput::ok(String::new()),
                Err(err) => err_output(err),
            }
        }
        Some("-v") | None => match repo.get_remote("origin").await {
            Some(url) => CommandOutput::ok(format!("origin\t{url} (fetch)\norigin\t{url} (push)\n")),
            None => CommandOutput::ok(String::new()),
        },
        Some(other) => CommandOutput::err(format!("git: remote: unknown subcommand '{other}'\n"), 1),
    }
}

async fn cmd_config(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let repo = match discover_or_init_message(ctx).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    match args {
        [key] => match repo.get_config(key).await {
            Some(value) => CommandOutput::ok(format!("{value}\n")),
            None => CommandOutput::err(String::new(), 1),
        },
        [key, value] => match repo.set_config(key, value).await {
            Ok(()) => CommandOutput::ok(String::new()),
            Err(err) => err_output(err),
        },
        _ => CommandOutput::err("git: usage: git config <key> [<value>]\n".to_string(), 1),
    }
}

/// Shallow (depth-1) clone over smart HTTP, routed through the configured
/// CORS relay since a browser tab has no other way to reach an arbitrary
/// git host. Unpacks every object the server sends into loose objects, then
/// builds an index and working tree from the fetched commit's flat tree.
async fn cmd_clone(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let Some(url) = args.first() else {
        return CommandOutput::err("git: usage: git clone <url> [<dir>]\n".to_string(), 1);
    };
    let dir_name = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| url.rsplit('/').next().unwrap_or("repo").trim_end_matches(".git").to_string());
    let work_dir = format!("{}/{}", ctx.env.pwd().trim_end_matches('/'), dir_name);

    let relay = Some(ctx.config.git_cors_relay.as_str());
    info!(url = %url, dir = %work_dir, "git: cloning");
    let refs = match http::discover_refs(url, relay).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    let head_oid = refs
        .iter()
        .find(|r| r.name == "HEAD")
        .or_else(|| refs.iter().find(|r| r.name.ends_with("/main") || r.name.ends_with("/master")))
        .map(|r| r.oid.clone());
    let Some(head_oid) = head_oid else {
        return CommandOutput::err("git: remote has no refs to clone\n".to_string(), 1);
    };

    let pack_bytes = match http::fetch_pack(url, relay, &head_oid).await {
        Ok(b) => b,
        Err(err) => return err_output(err),
    };
    if !pack::verify_checksum(&pack_bytes) {
        warn!(url = %url, "git: pack checksum did not verify, continuing anyway");
    }
    let objects_map = match pack::parse_pack(&pack_bytes) {
        Ok(m) => m,
        Err(err) => return err_output(err),
    };

    let repo = match Repository::init(ctx.vfs.clone(), &work_dir).await {
        Ok(r) => r,
        Err(err) => return err_output(err),
    };
    for (oid, obj) in &objects_map {
        if let Err(err) = objects::write_object(&repo.vfs, &repo.git_dir, obj.kind, &obj.content).await {
            return err_output(GitError::Fs(err));
        }
        let _ = oid;
    }

    let Some(commit_obj) = objects_map.get(&head_oid) else {
        return CommandOutput::err("git: clone fetched a pack without the requested commit\n".to_string(), 1);
    };
    let commit = objects::decode_commit(&commit_obj.content);
    let Some(tree_obj) = objects_map.get(&commit.tree) else {
        return CommandOutput::err("git: clone fetched a commit without its tree\n".to_string(), 1);
    };
    let entries = objects::decode_tree(&tree_obj.content);

    for entry in &entries {
        if entry.is_dir {
            continue;
        }
        if let Err(err) = repo.add_blob_to_index(&entry.name, &entry.oid).await {
            return err_output(err);
        }
    }
    if let Err(err) = repo.set_head_commit(&head_oid).await {
        return err_output(err);
    }
    if let Err(err) = repo.set_remote("origin", url).await {
        return err_output(err);
    }
    if let Err(err) = repo.restore_working_tree().await {
        return err_output(err);
    }

    CommandOutput::ok(format!("Cloning into '{dir_name}'...\n"))
}

fn extract_flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}
