//! The command registry: a name -> async handler map, the direct
//! descendant of the teacher's `dispatch::registry::Registry`
//! (`ModelEntry`/`BackendConfig` keyed by model name -> here, a builtin
//! keyed by command name). Every shell command that isn't a function
//! lookup goes through this table.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::env::Environment;
use crate::vfs::Vfs;

/// Everything a command handler needs: its own argv, the VFS, a mutable
/// view of the environment, stdin captured from an upstream pipeline
/// stage, and the current working directory at invocation time. Mirrors
/// the teacher's `ProviderRequest` in spirit — one plain struct carrying
/// everything a dispatch target needs, rather than a trait object per
/// command.
pub struct CommandContext<'a> {
    pub args: Vec<String>,
    pub vfs: &'a Vfs,
    pub env: &'a mut Environment,
    pub stdin: String,
    pub config: &'a crate::config::FoamConfig,
}

/// What a builtin or coreutil returns: its own stdout/stderr bodies and
/// exit code, matching `ExecResult`'s shape one level down (a pipeline
/// stage's result before the executor joins stages together).
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), stderr: String::new(), exit_code: 0 }
    }

    pub fn err(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self { stdout: String::new(), stderr: stderr.into(), exit_code }
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = CommandOutput> + Send + 'a>>;
pub type Handler = for<'a> fn(CommandContext<'a>) -> HandlerFuture<'a>;

/// Name -> handler map. Construction happens once per `Shell`; lookup is a
/// synchronous `HashMap::get`, same as the teacher's `Registry::get`.
#[derive(Clone)]
pub struct CommandRegistry {
    handlers: Arc<HashMap<&'static str, Handler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
        crate::coreutils::register_all(&mut handlers);
        crate::facades::git::register(&mut handlers);
        crate::facades::npm::register(&mut handlers);
        crate::runtimes::register(&mut handlers);
        Self { handlers: Arc::new(handlers) }
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_core_builtins() {
        let registry = CommandRegistry::new();
        for name in ["echo", "cat", "ls", "pwd", "grep", "git", "npm", "node"] {
            assert!(registry.contains(name), "missing builtin `{name}`");
        }
    }
}
