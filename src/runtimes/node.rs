//! `node`/`js`: a sandboxed JS evaluator over `rquickjs` (spec.md §4.9).
//! The sandbox exposes exactly `console`, `process`, `Buffer`, `__dirname`,
//! `__filename`, and a `require()` that resolves against `node_modules`
//! out of the VFS — nothing else of the host leaks in (no raw `fetch`, no
//! DOM, no timers), per the "Sandboxed JS evaluation" guidance.
//!
//! `require` is implemented entirely in JS: every `node_modules/<pkg>`
//! entry point this process can see is read out of the VFS *before* the
//! QuickJS context is entered, so the interpreter itself never needs to
//! suspend mid-script to do I/O — it stays a single synchronous region,
//! matching the cooperative single-threaded scheduling model (§5).

use std::collections::HashMap;
use std::rc::Rc;
use std::cell::RefCell;

use rquickjs::function::Rest;
use rquickjs::{Context, Object, Runtime, Value};
use tracing::debug;

use crate::path::PathResolver;
use crate::registry::{CommandContext, CommandOutput};

pub async fn run(ctx: CommandContext<'_>) -> CommandOutput {
    let pwd = ctx.env.pwd();
    let (source, argv) = match parse_invocation(&ctx, &pwd).await {
        Ok(parsed) => parsed,
        Err(message) => return CommandOutput::err(message, 1),
    };
    let modules = collect_node_modules(ctx.vfs, &pwd).await;
    let env_vars: Vec<(String, String)> = ctx.env.all().map(|(k, v)| (k.clone(), v.clone())).collect();
    evaluate(&source, &pwd, &env_vars, argv, &modules)
}

/// The `js` builtin: a plain inline evaluator (spec.md §4.6 core builtins),
/// distinct from `node` in that its argv *is* the code rather than a flag.
pub async fn run_inline(ctx: CommandContext<'_>) -> CommandOutput {
    let source = ctx.args.join(" ");
    if source.trim().is_empty() {
        return CommandOutput::err("usage: js <code>\n".to_string(), 1);
    }
    let pwd = ctx.env.pwd();
    let modules = collect_node_modules(ctx.vfs, &pwd).await;
    let env_vars: Vec<(String, String)> = ctx.env.all().map(|(k, v)| (k.clone(), v.clone())).collect();
    evaluate(&source, &pwd, &env_vars, Vec::new(), &modules)
}

async fn parse_invocation(ctx: &CommandContext<'_>, pwd: &str) -> Result<(String, Vec<String>), String> {
    let args = &ctx.args;
    match args.first().map(String::as_str) {
        Some("-e") => {
            let code = args.get(1).cloned().unwrap_or_default();
            Ok((code, args[2.min(args.len())..].to_vec()))
        }
        Some("-p") => {
            let expr = args.get(1).cloned().unwrap_or_default();
            Ok((format!("console.log({expr});"), args[2.min(args.len())..].to_vec()))
        }
        Some(file) => {
            let path = PathResolver::join(pwd, file);
            let bytes = ctx
                .vfs
                .read_file(&path)
                .await
                .map_err(|err| format!("node: {err}\n"))?;
            let source = String::from_utf8_lossy(&bytes).into_owned();
            Ok((source, args[1..].to_vec()))
        }
        None => Err("usage: node [-e CODE | -p EXPR | FILE [args]]\n".to_string()),
    }
}

/// Preload every package's main module under `<pwd>/node_modules`,
/// including one extra level for `@scope/name` packages. Best-effort: a
/// package missing `package.json` or its declared `main` file is skipped
/// rather than failing the whole run.
async fn collect_node_modules(vfs: &crate::vfs::Vfs, pwd: &str) -> HashMap<String, String> {
    let mut modules = HashMap::new();
    let root = format!("{}/node_modules", pwd.trim_end_matches('/'));
    let Ok(entries) = vfs.readdir(&root).await else {
        return modules;
    };
    for entry in entries {
        if let Some(scope) = entry.strip_prefix('@') {
            let scope_dir = format!("{root}/@{scope}");
            if let Ok(scoped) = vfs.readdir(&scope_dir).await {
                for name in scoped {
                    let full_name = format!("@{scope}/{name}");
                    load_one_module(vfs, &format!("{scope_dir}/{name}"), &full_name, &mut modules).await;
                }
            }
            continue;
        }
        load_one_module(vfs, &format!("{root}/{entry}"), &entry, &mut modules).await;
    }
    modules
}

async fn load_one_module(vfs: &crate::vfs::Vfs, pkg_dir: &str, name: &str, out: &mut HashMap<String, String>) {
    let pkg_json_path = format!("{pkg_dir}/package.json");
    let main = match vfs.read_file(&pkg_json_path).await {
        Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|doc| doc.get("main").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| "index.js".to_string()),
        Err(_) => "index.js".to_string(),
    };
    let entry_path = format!("{pkg_dir}/{main}");
    match vfs.read_file(&entry_path).await {
        Ok(bytes) => {
            out.insert(name.to_string(), String::from_utf8_lossy(&bytes).into_owned());
        }
        Err(err) => debug!(name, error = %err, "node: skipping module with unreadable entry point"),
    }
}

const BUFFER_SHIM: &str = r#"
var Buffer = {
  from: function (input) {
    var s = String(input);
    return { toString: function () { return s; }, length: s.length, __isBuffer: true };
  }
};
"#;

const REQUIRE_SHIM: &str = r#"
var __foam_sources = {};
var __foam_cache = {};
function require(name) {
  if (Object.prototype.hasOwnProperty.call(__foam_cache, name)) {
    return __foam_cache[name].exports;
  }
  if (!Object.prototype.hasOwnProperty.call(__foam_sources, name)) {
    throw new Error("Cannot find module '" + name + "'");
  }
  var mod = { exports: {} };
  __foam_cache[name] = mod;
  var wrapper = new Function('module', 'exports', 'require', '__dirname', '__filename', __foam_sources[name]);
  wrapper(mod, mod.exports, require, '', '');
  return mod.exports;
}
"#;

fn build_prelude(modules: &HashMap<String, String>) -> String {
    let mut prelude = String::new();
    prelude.push_str(BUFFER_SHIM);
    prelude.push_str(REQUIRE_SHIM);
    for (name, source) in modules {
        let name_lit = serde_json::to_string(name).unwrap_or_default();
        let source_lit = serde_json::to_string(source).unwrap_or_default();
        prelude.push_str(&format!("__foam_sources[{name_lit}] = {source_lit};\n"));
    }
    prelude
}

fn evaluate(
    user_code: &str,
    pwd: &str,
    env_vars: &[(String, String)],
    argv: Vec<String>,
    modules: &HashMap<String, String>,
) -> CommandOutput {
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(err) => return CommandOutput::err(format!("node: failed to start interpreter: {err}\n"), 1),
    };
    let context = match Context::full(&runtime) {
        Ok(ctx) => ctx,
        Err(err) => return CommandOutput::err(format!("node: failed to start interpreter: {err}\n"), 1),
    };

    let output = Rc::new(RefCell::new(String::new()));
    let eval_result: Result<(), String> = context.with(|ctx| -> Result<(), String> {
        let globals = ctx.globals();

        let console_obj = Object::new(ctx.clone()).map_err(|e| e.to_string())?;
        let log_buf = output.clone();
        let log_fn = rquickjs::Function::new(ctx.clone(), move |args: Rest<Value>| {
            let line = args.0.iter().map(stringify_value).collect::<Vec<_>>().join(" ");
            log_buf.borrow_mut().push_str(&line);
            log_buf.borrow_mut().push('\n');
        })
        .map_err(|e| e.to_string())?;
        console_obj.set("log", log_fn.clone()).map_err(|e| e.to_string())?;
        console_obj.set("info", log_fn).map_err(|e| e.to_string())?;
        let err_buf = output.clone();
        let err_fn = rquickjs::Function::new(ctx.clone(), move |args: Rest<Value>| {
            let line = args.0.iter().map(stringify_value).collect::<Vec<_>>().join(" ");
            err_buf.borrow_mut().push_str(&line);
            err_buf.borrow_mut().push('\n');
        })
        .map_err(|e| e.to_string())?;
        console_obj.set("error", err_fn.clone()).map_err(|e| e.to_string())?;
        console_obj.set("warn", err_fn).map_err(|e| e.to_string())?;
        globals.set("console", console_obj).map_err(|e| e.to_string())?;

        let process_obj = Object::new(ctx.clone()).map_err(|e| e.to_string())?;
        let env_obj = Object::new(ctx.clone()).map_err(|e| e.to_string())?;
        for (k, v) in env_vars {
            env_obj.set(k.as_str(), v.as_str()).map_err(|e| e.to_string())?;
        }
        process_obj.set("env", env_obj).map_err(|e| e.to_string())?;
        process_obj.set("cwd", pwd).map_err(|e| e.to_string())?;
        let argv_js: Vec<String> = std::iter::once("node".to_string()).chain(argv).collect();
        process_obj.set("argv", argv_js).map_err(|e| e.to_string())?;
        process_obj.set("version", "v18.0.0-foam").map_err(|e| e.to_string())?;
        globals.set("process", process_obj).map_err(|e| e.to_string())?;

        globals.set("__dirname", pwd).map_err(|e| e.to_string())?;
        globals.set("__filename", PathResolver::join(pwd, "script.js")).map_err(|e| e.to_string())?;

        let full_source = format!("{}\n{}", build_prelude(modules), user_code);
        ctx.eval::<(), _>(full_source).map_err(|e| e.to_string())
    });

    match eval_result {
        Ok(()) => CommandOutput::ok(output.borrow().clone()),
        Err(message) => {
            let mut stdout = output.borrow().clone();
            let stderr = format!("node: {message}\n");
            if !stdout.is_empty() {
                stdout.push('\n');
            }
            CommandOutput { stdout, stderr, exit_code: 1 }
        }
    }
}

fn stringify_value(value: &Value) -> String {
    if value.is_undefined() {
        "undefined".to_string()
    } else if value.is_null() {
        "null".to_string()
    } else if let Some(b) = value.as_bool() {
        b.to_string()
    } else if let Some(n) = value.as_float() {
        n.to_string()
    } else if let Some(s) = value.as_string() {
        s.to_string().unwrap_or_default()
    } else if value.is_array() {
        "[object Array]".to_string()
    } else if value.is_function() {
        "[Function]".to_string()
    } else if value.is_object() {
        "[object Object]".to_string()
    } else {
        "[unknown]".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_embeds_module_sources_as_json_strings() {
        let mut modules = HashMap::new();
        modules.insert("is-number".to_string(), "module.exports = function(n) { return true; };".to_string());
        let prelude = build_prelude(&modules);
        assert!(prelude.contains("__foam_sources[\"is-number\"]"));
        assert!(prelude.contains("function require(name)"));
    }

    #[test]
    fn console_log_evaluates_simple_expressions() {
        let modules = HashMap::new();
        let out = evaluate("console.log(1 + 2);", "/home/foam", &[], Vec::new(), &modules);
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "3\n");
    }

    #[test]
    fn thrown_errors_become_nonzero_exit() {
        let modules = HashMap::new();
        let out = evaluate("throw new Error('boom');", "/home/foam", &[], Vec::new(), &modules);
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("node:"));
    }
}
