//! The `npm` façade: a CLI surface over the registry/tarball/package.json
//! helpers, the same shape `facades::git` gives `repo::Repository` — one
//! `register` function, one subcommand dispatcher.

mod package_json;
mod registry;
mod tarball;

use std::collections::HashMap;

use tracing::{info, warn};

use crate::path::PathResolver;
use crate::registry::{CommandContext, CommandOutput, Handler};
use crate::vfs::Vfs;

use package_json::PackageJson;

#[derive(Debug, thiserror::Error)]
pub enum NpmError {
    #[error("{0}")]
    Fs(#[from] crate::vfs::FsError),
    #[error("malformed package.json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("registry request failed: {0}")]
    RegistryFetch(String),
    #[error("404 Not Found: '{0}' is not in the npm registry")]
    NotFound(String),
    #[error("No matching version found for {0}@{1}")]
    VersionNotFound(String, String),
    #[error("tarball extraction failed: {0}")]
    TarballDecode(String),
}

pub fn register(handlers: &mut HashMap<&'static str, Handler>) {
    handlers.insert("npm", |ctx| Box::pin(run(ctx)));
}

fn err_output(err: NpmError) -> CommandOutput {
    CommandOutput::err(format!("npm error {err}\n"), 1)
}

async fn run(ctx: CommandContext<'_>) -> CommandOutput {
    let Some(sub) = ctx.args.first().cloned() else {
        return CommandOutput::err("usage: npm <command>\n".to_string(), 1);
    };
    let rest = ctx.args[1..].to_vec();
    match sub.as_str() {
        "init" => cmd_init(&ctx, &rest).await,
        "install" | "i" | "add" => cmd_install(&ctx, &rest).await,
        "list" | "ls" => cmd_list(&ctx).await,
        "run" | "run-script" => cmd_run(&ctx, &rest).await,
        other => CommandOutput::err(format!("npm: unknown command '{other}'\n"), 1),
    }
}

async fn cmd_init(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let dir = ctx.env.pwd();
    let path = PackageJson::path_at(&dir);
    if ctx.vfs.exists(&path).await {
        return CommandOutput::err("npm: package.json already exists\n".to_string(), 1);
    }
    let name = PathResolver::basename(&dir);
    let pkg = PackageJson::minimal(if name.is_empty() || name == "/" { "project" } else { &name });
    if let Err(err) = pkg.write(ctx.vfs, &dir).await {
        return err_output(err);
    }
    let body = serde_json::to_string_pretty(&pkg).unwrap_or_default();
    if args.iter().any(|a| a == "-y" || a == "--yes") {
        CommandOutput::ok(format!("Wrote to {path}:\n\n{body}\n\n"))
    } else {
        // No interactive prompt behind this shell either way; `npm init`
        // without `-y` gets the same minimal file a real `npm init -y` would.
        CommandOutput::ok(format!("Wrote to {path}:\n\n{body}\n\n"))
    }
}

async fn cmd_install(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let dir = ctx.env.pwd();
    let mut pkg = match PackageJson::read(ctx.vfs, &dir).await {
        Ok(pkg) => pkg,
        Err(NpmError::Fs(fs_err)) if fs_err.code == crate::vfs::ErrorCode::ENOENT => {
            PackageJson::minimal(&PathResolver::basename(&dir))
        }
        Err(err) => return err_output(err),
    };

    let specs: Vec<(String, Option<String>)> = if args.is_empty() {
        pkg.dependencies
            .iter()
            .map(|(name, range)| (name.clone(), Some(range.trim_start_matches(['^', '~']).to_string())))
            .collect()
    } else {
        args.iter().map(|spec| registry::parse_spec(spec)).collect()
    };

    if specs.is_empty() {
        return CommandOutput::ok("up to date\n".to_string());
    }

    let mut stdout = String::new();
    let mut code = 0;
    for (name, version_spec) in specs {
        match install_one(ctx, &dir, &name, version_spec.as_deref()).await {
            Ok(resolved) => {
                pkg.dependencies.insert(resolved.name.clone(), format!("^{}", resolved.version));
                stdout.push_str(&format!("+ {}@{}\n", resolved.name, resolved.version));
            }
            Err(err) => {
                stdout.push_str(&format!("npm error {err}\n"));
                code = 1;
            }
        }
    }
    if code == 0 {
        if let Err(err) = pkg.write(ctx.vfs, &dir).await {
            return err_output(err);
        }
    }
    CommandOutput { stdout, stderr: String::new(), exit_code: code }
}

async fn install_one(
    ctx: &CommandContext<'_>,
    dir: &str,
    name: &str,
    version_spec: Option<&str>,
) -> Result<registry::ResolvedPackage, NpmError> {
    info!(name, "npm: installing package");
    match registry::resolve(&ctx.config.npm_registry, name, version_spec).await {
        Ok(resolved) => {
            let bytes = registry::fetch_tarball(&resolved.tarball_url).await?;
            tarball::extract(ctx.vfs, dir, name, &bytes).await?;
            Ok(resolved)
        }
        Err(primary_err) => {
            warn!(name, error = %primary_err, "npm: registry install failed, trying CDN fallback");
            cdn_fallback_install(ctx, dir, name, version_spec).await.map_err(|_| primary_err)
        }
    }
}

/// Degrade to the configured ESM CDN (spec.md §4.8 "Network failures
/// degrade to a fallback ESM CDN when possible"): fetch the package's
/// bundled ESM source as a single file and install it as a minimal
/// one-file module rather than a full tarball tree.
async fn cdn_fallback_install(
    ctx: &CommandContext<'_>,
    dir: &str,
    name: &str,
    version_spec: Option<&str>,
) -> Result<registry::ResolvedPackage, NpmError> {
    let version = version_spec.unwrap_or("latest");
    let url = format!("{}/{name}@{version}", ctx.config.npm_cdn_fallback.trim_end_matches('/'));
    let client = reqwest::Client::new();
    let resp = client.get(&url).send().await.map_err(|e| NpmError::RegistryFetch(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(NpmError::RegistryFetch(format!("{url} returned {}", resp.status())));
    }
    let body = resp.text().await.map_err(|e| NpmError::RegistryFetch(e.to_string()))?;

    let pkg_dir = format!("{}/node_modules/{name}", dir.trim_end_matches('/'));
    ctx.vfs.mkdir(&pkg_dir, true).await?;
    ctx.vfs.write_file(&format!("{pkg_dir}/index.js"), body.into_bytes()).await?;

    let resolved_version = if version == "latest" { "0.0.0".to_string() } else { version.to_string() };
    let mut module_pkg = PackageJson::minimal(name);
    module_pkg.version = resolved_version.clone();
    module_pkg.main = "index.js".to_string();
    module_pkg.write(ctx.vfs, &pkg_dir).await?;

    Ok(registry::ResolvedPackage { name: name.to_string(), version: resolved_version, tarball_url: url })
}

async fn cmd_list(ctx: &CommandContext<'_>) -> CommandOutput {
    let dir = ctx.env.pwd();
    let node_modules = format!("{}/node_modules", dir.trim_end_matches('/'));
    let root_name = PackageJson::read(ctx.vfs, &dir)
        .await
        .map(|pkg| pkg.name)
        .unwrap_or_else(|_| PathResolver::basename(&dir));

    let Ok(mut entries) = ctx.vfs.readdir(&node_modules).await else {
        return CommandOutput::ok(format!("{root_name}\n(empty)\n"));
    };
    entries.sort();

    let mut lines = vec![root_name];
    for name in entries {
        if let Some(scope) = name.strip_prefix('@') {
            let scope_dir = format!("{node_modules}/@{scope}");
            if let Ok(scoped) = ctx.vfs.readdir(&scope_dir).await {
                for scoped_name in scoped {
                    let full_name = format!("@{scope}/{scoped_name}");
                    let version = read_version(ctx.vfs, &format!("{node_modules}/{full_name}")).await;
                    lines.push(format!("└── {full_name}@{version}"));
                }
            }
            continue;
        }
        let version = read_version(ctx.vfs, &format!("{node_modules}/{name}")).await;
        lines.push(format!("└── {name}@{version}"));
    }
    CommandOutput::ok(format!("{}\n", lines.join("\n")))
}

async fn read_version(vfs: &Vfs, pkg_dir: &str) -> String {
    PackageJson::read(vfs, pkg_dir).await.map(|pkg| pkg.version).unwrap_or_else(|_| "unknown".to_string())
}

async fn cmd_run(ctx: &CommandContext<'_>, args: &[String]) -> CommandOutput {
    let dir = ctx.env.pwd();
    let Some(script) = args.first() else {
        let mut out = String::from("Lifecycle scripts included in package.json:\n");
        if let Ok(pkg) = PackageJson::read(ctx.vfs, &dir).await {
            for (name, body) in &pkg.scripts {
                out.push_str(&format!("  {name}\n    {body}\n"));
            }
        }
        return CommandOutput::ok(out);
    };
    // Only reached when the executor's own `npm run` fast path (which
    // re-enters the shell parser so the script can use pipes/redirects)
    // didn't find the script; report the same error a real npm would.
    CommandOutput::err(format!("npm error missing script: {script}\n"), 1)
}

/// Look up `package.json.scripts[script_name]` under `dir` for the
/// executor's `npm run` fast path (`shell::executor::dispatch_simple`),
/// which re-parses the body through the shell itself so pipes/redirects in
/// the script still work.
pub async fn read_script(vfs: &Vfs, dir: &str, script_name: &str) -> Option<String> {
    let pkg = PackageJson::read(vfs, dir).await.ok()?;
    pkg.scripts.get(script_name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;
    use std::sync::Arc;

    async fn vfs() -> Vfs {
        Vfs::new(Arc::new(MemoryBackend::new()), "foam", "/home/foam").await
    }

    #[tokio::test]
    async fn init_writes_minimal_package_json() {
        let fs = vfs().await;
        let config = crate::config::FoamConfig::default();
        let mut env = crate::env::Environment::new("foam", "/home/foam");
        env.set_pwd("/home/foam");
        let ctx = CommandContext { args: vec!["init".into(), "-y".into()], vfs: &fs, env: &mut env, stdin: String::new(), config: &config };
        let out = cmd_init(&ctx, &["-y".to_string()]).await;
        assert_eq!(out.exit_code, 0);
        assert!(fs.exists("/home/foam/package.json").await);
    }

    #[tokio::test]
    async fn read_script_returns_none_without_package_json() {
        let fs = vfs().await;
        assert!(read_script(&fs, "/home/foam", "build").await.is_none());
    }

    #[tokio::test]
    async fn read_script_finds_declared_script() {
        let fs = vfs().await;
        let mut pkg = PackageJson::minimal("demo");
        pkg.scripts.insert("build".to_string(), "echo built".to_string());
        pkg.write(&fs, "/home/foam").await.unwrap();
        assert_eq!(read_script(&fs, "/home/foam", "build").await.as_deref(), Some("echo built"));
    }
}
