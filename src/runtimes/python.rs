//! `python`/`pip` (spec.md §4.9): a lazily-initialized WASM-capable Python
//! interpreter over `rustpython-vm`, reused across calls within one shell
//! session rather than rebuilt per invocation, with `print` rebound to the
//! shell's own output buffer instead of the host's real stdout.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use flate2::read::GzDecoder;
use rustpython_vm::{Interpreter, PyResult, VirtualMachine};
use tar::Archive;
use tracing::debug;

use crate::path::PathResolver;
use crate::registry::{CommandContext, CommandOutput};

thread_local! {
    static INTERPRETER: Interpreter = Interpreter::without_stdlib(Default::default());
}

pub async fn run(ctx: CommandContext<'_>) -> CommandOutput {
    let source = match parse_invocation(&ctx).await {
        Ok(source) => source,
        Err(message) => return CommandOutput::err(message, 1),
    };
    let pwd = ctx.env.pwd();
    let files = mount_readable_files(ctx.vfs, &pwd).await;
    execute(&source, &files)
}

/// Read every regular file reachable under `pwd` (spec.md §4.9: "mounts
/// the VFS path subset needed for `open()` reads of files the script
/// requests") into memory before entering the interpreter, since the VM's
/// execution region is synchronous and can't suspend mid-script to await a
/// VFS read. Both the absolute path and the path relative to `pwd` are
/// keyed in, so `open('data.txt')` and `open('/home/foam/data.txt')` both
/// resolve.
async fn mount_readable_files(vfs: &crate::vfs::Vfs, pwd: &str) -> HashMap<String, String> {
    let mut files = HashMap::new();
    let trimmed_pwd = pwd.trim_end_matches('/');
    for path in vfs.glob(pwd, "**/*").await {
        if let Ok(bytes) = vfs.read_file(&path).await {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if let Some(rel) = path.strip_prefix(&format!("{trimmed_pwd}/")) {
                files.insert(rel.to_string(), text.clone());
            }
            files.insert(path, text);
        }
    }
    files
}

async fn parse_invocation(ctx: &CommandContext<'_>) -> Result<String, String> {
    let args = &ctx.args;
    match args.first().map(String::as_str) {
        Some("-c") => Ok(args.get(1).cloned().unwrap_or_default()),
        Some("-m") => {
            let module = args.get(1).cloned().unwrap_or_default();
            Ok(format!("import runpy\nrunpy.run_module({module:?}, run_name='__main__')\n"))
        }
        Some(file) => {
            let pwd = ctx.env.pwd();
            let path = PathResolver::join(&pwd, file);
            let bytes = ctx.vfs.read_file(&path).await.map_err(|err| format!("python: {err}\n"))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        None => Err("usage: python [-c CODE | -m MOD | FILE]\n".to_string()),
    }
}

/// Python-level `open()`/file-object shim. Defined in pure Python rather
/// than as a native binding: the VM's builtin exception hierarchy
/// (`FileNotFoundError`) is already available with `without_stdlib`, and
/// this keeps the shim readable instead of reaching for the VM's internal
/// exception-construction API, which this crate doesn't otherwise touch.
const OPEN_SHIM: &str = r#"
__foam_files = {}

class _FoamFile:
    def __init__(self, text):
        self._text = text
        self._pos = 0

    def read(self, n=-1):
        if n is None or n < 0:
            data = self._text[self._pos:]
            self._pos = len(self._text)
            return data
        data = self._text[self._pos:self._pos + n]
        self._pos += len(data)
        return data

    def readline(self):
        if self._pos >= len(self._text):
            return ''
        idx = self._text.find('\n', self._pos)
        if idx == -1:
            data = self._text[self._pos:]
            self._pos = len(self._text)
        else:
            data = self._text[self._pos:idx + 1]
            self._pos = idx + 1
        return data

    def readlines(self):
        return self._text.splitlines(keepends=True)

    def __iter__(self):
        return iter(self.readlines())

    def __enter__(self):
        return self

    def __exit__(self, exc_type, exc_value, traceback):
        return False

    def close(self):
        pass

def open(path, mode='r', *args, **kwargs):
    if path not in __foam_files:
        raise FileNotFoundError("[Errno 2] No such file or directory: '" + path + "'")
    return _FoamFile(__foam_files[path])
"#;

/// Embed `files` as `__foam_files[path] = "..."` assignments after
/// [`OPEN_SHIM`], the same literal-embedding technique `runtimes::node`
/// uses for `node_modules` sources (`serde_json::to_string` produces a
/// quoted, escaped literal that both JSON and Python accept).
fn build_prelude(files: &HashMap<String, String>) -> String {
    let mut prelude = String::new();
    prelude.push_str(OPEN_SHIM);
    for (path, content) in files {
        let path_lit = serde_json::to_string(path).unwrap_or_default();
        let content_lit = serde_json::to_string(content).unwrap_or_default();
        prelude.push_str(&format!("__foam_files[{path_lit}] = {content_lit}\n"));
    }
    prelude
}

fn execute(source: &str, files: &HashMap<String, String>) -> CommandOutput {
    let output = Rc::new(RefCell::new(String::new()));
    let error = Rc::new(RefCell::new(None::<String>));
    let full_source = format!("{}\n{}", build_prelude(files), source);

    INTERPRETER.with(|interp| {
        interp.enter(|vm| {
            let scope = vm.new_scope_with_builtins();
            if let Err(err) = install_print_override(vm, &scope, output.clone()) {
                *error.borrow_mut() = Some(describe_exception(vm, err));
                return;
            }
            let code_obj = match vm.compile(&full_source, rustpython_vm::compiler::Mode::Exec, "<string>".to_owned()) {
                Ok(code) => code,
                Err(err) => {
                    *error.borrow_mut() = Some(format!("{err}"));
                    return;
                }
            };
            if let Err(err) = vm.run_code_obj(code_obj, scope) {
                *error.borrow_mut() = Some(describe_exception(vm, err));
            }
        });
    });

    match error.borrow_mut().take() {
        None => CommandOutput::ok(output.borrow().clone()),
        Some(message) => {
            let stdout = output.borrow().clone();
            CommandOutput { stdout, stderr: format!("python: {message}\n"), exit_code: 1 }
        }
    }
}

fn install_print_override(
    vm: &VirtualMachine,
    scope: &rustpython_vm::scope::Scope,
    output: Rc<RefCell<String>>,
) -> PyResult<()> {
    let print_fn = vm.new_function("print", move |args: rustpython_vm::function::FuncArgs, vm: &VirtualMachine| -> PyResult<()> {
        let mut parts = Vec::with_capacity(args.args.len());
        for arg in &args.args {
            parts.push(arg.str(vm)?.as_str().to_owned());
        }
        let mut buf = output.borrow_mut();
        buf.push_str(&parts.join(" "));
        buf.push('\n');
        Ok(())
    });
    scope.globals.set_item("print", print_fn.into(), vm)
}

fn describe_exception(vm: &VirtualMachine, exc: rustpython_vm::builtins::PyBaseExceptionRef) -> String {
    let mut out = String::new();
    vm.write_exception(&mut out, &exc).ok();
    if out.is_empty() {
        "unhandled exception".to_string()
    } else {
        out
    }
}

/// `pip install <pkg>` (spec.md §4.9): fetches PyPI's JSON API and installs
/// the first available sdist (`.tar.gz`) the same way the npm façade
/// installs tarballs, into `<pwd>/site-packages/<pkg>/`. Pure-Python sdists
/// extract cleanly; wheels and compiled extensions are out of scope for
/// this interpreter and are reported, not silently skipped.
pub async fn pip(ctx: CommandContext<'_>) -> CommandOutput {
    if ctx.args.first().map(String::as_str) != Some("install") {
        return CommandOutput::err("usage: pip install <package>\n".to_string(), 1);
    }
    let Some(name) = ctx.args.get(1) else {
        return CommandOutput::err("usage: pip install <package>\n".to_string(), 1);
    };

    let url = format!("https://pypi.org/pypi/{name}/json");
    let client = reqwest::Client::new();
    let resp = match client.get(&url).send().await {
        Ok(resp) => resp,
        Err(err) => return CommandOutput::err(format!("pip: request failed: {err}\n"), 1),
    };
    if !resp.status().is_success() {
        return CommandOutput::err(format!("pip: {name} not found on PyPI\n"), 1);
    }
    let doc: serde_json::Value = match resp.json().await {
        Ok(doc) => doc,
        Err(err) => return CommandOutput::err(format!("pip: malformed registry response: {err}\n"), 1),
    };

    let version = doc.pointer("/info/version").and_then(|v| v.as_str()).unwrap_or("0.0.0").to_string();
    let sdist_url = doc
        .pointer("/urls")
        .and_then(|urls| urls.as_array())
        .and_then(|urls| {
            urls.iter().find(|entry| {
                entry.get("packagetype").and_then(|t| t.as_str()) == Some("sdist")
                    && entry.get("filename").and_then(|f| f.as_str()).is_some_and(|f| f.ends_with(".tar.gz"))
            })
        })
        .and_then(|entry| entry.get("url").and_then(|u| u.as_str()).map(str::to_string));

    let Some(sdist_url) = sdist_url else {
        return CommandOutput::err(
            format!("pip: no pure-Python sdist available for {name} {version}; wheels are unsupported\n"),
            1,
        );
    };

    let bytes = match client.get(&sdist_url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.bytes().await {
            Ok(b) => b.to_vec(),
            Err(err) => return CommandOutput::err(format!("pip: download failed: {err}\n"), 1),
        },
        Ok(resp) => return CommandOutput::err(format!("pip: download returned {}\n", resp.status()), 1),
        Err(err) => return CommandOutput::err(format!("pip: download failed: {err}\n"), 1),
    };

    let dir = ctx.env.pwd();
    let dest_root = format!("{}/site-packages/{name}", dir.trim_end_matches('/'));
    if let Err(err) = extract_sdist(ctx.vfs, &dest_root, &bytes).await {
        return CommandOutput::err(format!("pip: {err}\n"), 1);
    }

    CommandOutput::ok(format!("Successfully installed {name}-{version}\n"))
}

async fn extract_sdist(vfs: &crate::vfs::Vfs, dest_root: &str, bytes: &[u8]) -> Result<(), String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).map_err(|e| e.to_string())?;

    vfs.mkdir(dest_root, true).await.map_err(|e| e.to_string())?;
    let mut archive = Archive::new(&raw[..]);
    let mut entries = archive.entries().map_err(|e| e.to_string())?;
    while let Some(entry) = entries.next() {
        let mut entry = entry.map_err(|e| e.to_string())?;
        let entry_type = entry.header().entry_type();
        let raw_path = entry.path().map_err(|e| e.to_string())?.to_string_lossy().to_string();
        // PyPI sdists are rooted under `<pkg>-<version>/`; drop that single
        // top component the same way npm tarballs drop `package/`.
        let rel_path = raw_path.splitn(2, '/').nth(1).unwrap_or(&raw_path).to_string();
        if rel_path.is_empty() {
            continue;
        }
        if rel_path.split('/').any(|segment| segment == "..") {
            debug!(path = %rel_path, "pip: skipping tar entry that escapes the package root");
            continue;
        }
        if entry_type.is_dir() {
            vfs.mkdir(&format!("{dest_root}/{}", rel_path.trim_end_matches('/')), true)
                .await
                .map_err(|e| e.to_string())?;
            continue;
        }
        if !entry_type.is_file() {
            debug!(path = %rel_path, "pip: skipping non-regular tar entry");
            continue;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(|e| e.to_string())?;
        let file_path = format!("{dest_root}/{rel_path}");
        let parent = PathResolver::dirname(&file_path);
        if !vfs.exists(&parent).await {
            vfs.mkdir(&parent, true).await.map_err(|e| e.to_string())?;
        }
        vfs.write_file(&file_path, buf).await.map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;
    use std::io::Write as _;
    use std::sync::Arc;

    fn make_sdist(top: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            for (name, content) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, format!("{top}/{name}"), *content).unwrap();
            }
            builder.finish().unwrap();
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn extract_sdist_rejects_entries_that_escape_the_package_root() {
        let backend = Arc::new(MemoryBackend::new());
        let vfs = crate::vfs::Vfs::new(backend, "foam", "/home/foam").await;
        let sdist = make_sdist("demo-1.0.0", &[("demo/__init__.py", b"x = 1"), ("../../escape.py", b"pwned")]);
        extract_sdist(&vfs, "/home/foam/site-packages/demo", &sdist).await.unwrap();
        assert!(vfs.exists("/home/foam/site-packages/demo/demo/__init__.py").await);
        assert!(!vfs.exists("/home/foam/escape.py").await);
        assert!(!vfs.exists("/escape.py").await);
    }

    #[test]
    fn runs_simple_expression_statement() {
        let out = execute("print(1 + 2)", &HashMap::new());
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "3\n");
    }

    #[test]
    fn syntax_errors_report_nonzero_exit() {
        let out = execute("def (:", &HashMap::new());
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.starts_with("python:"));
    }

    #[test]
    fn open_reads_a_mounted_file() {
        let mut files = HashMap::new();
        files.insert("data.txt".to_string(), "hello from vfs".to_string());
        let out = execute("print(open('data.txt').read())", &files);
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "hello from vfs\n");
    }

    #[test]
    fn open_on_an_unmounted_path_raises_file_not_found() {
        let out = execute("open('missing.txt')", &HashMap::new());
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("No such file or directory"));
    }
}
