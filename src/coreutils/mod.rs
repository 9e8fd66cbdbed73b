//! Builtin commands. spec.md's Non-goals exclude most coreutils' *bodies*
//! beyond their I/O contract — these implementations are deliberately
//! plain, covering the documented stdin/stdout/exit-code behavior without
//! chasing full GNU-coreutils flag compatibility.

mod fs_utils;
mod misc;
mod net;
mod text;

use std::collections::HashMap;

use crate::registry::Handler;

pub fn register_all(handlers: &mut HashMap<&'static str, Handler>) {
    fs_utils::register(handlers);
    text::register(handlers);
    misc::register(handlers);
    net::register(handlers);
}
