//! The sandboxed language runtimes: `node`/`js` over `rquickjs`, `python`/
//! `pip` over `rustpython-vm` (spec.md §4.9, `"Runtimes (5%)"`). Both are
//! cooperative-scheduled like everything else in the shell — the
//! interpreter itself runs synchronously once entered, with VFS I/O
//! resolved up front so no `await` point is needed mid-script.

mod node;
#[cfg(feature = "python")]
mod python;

use std::collections::HashMap;

use crate::registry::{CommandContext, CommandOutput, Handler};

pub fn register(handlers: &mut HashMap<&'static str, Handler>) {
    handlers.insert("node", |ctx| Box::pin(node::run(ctx)));
    handlers.insert("js", |ctx| Box::pin(node::run_inline(ctx)));

    #[cfg(feature = "python")]
    {
        handlers.insert("python", |ctx| Box::pin(python::run(ctx)));
        handlers.insert("pip", |ctx| Box::pin(python::pip(ctx)));
    }
    #[cfg(not(feature = "python"))]
    {
        handlers.insert("python", |ctx| Box::pin(python_disabled(ctx)));
        handlers.insert("pip", |ctx| Box::pin(python_disabled(ctx)));
    }
}

#[cfg(not(feature = "python"))]
async fn python_disabled(_ctx: CommandContext<'_>) -> CommandOutput {
    CommandOutput::err("python: runtime not built with the `python` feature\n".to_string(), 127)
}
