//! Foam: a zero-backend, browser-embeddable POSIX-like development
//! environment. This crate provides the durable virtual filesystem, the
//! Bourne-style shell that runs against it, and the git/npm/node/python
//! façades that make the shell feel like a real dev box.

pub mod config;
pub mod coreutils;
pub mod env;
pub mod facades;
pub mod path;
pub mod registry;
pub mod runtimes;
pub mod shell;
pub mod store;
pub mod vfs;

pub use config::FoamConfig;
pub use env::Environment;
pub use path::PathResolver;
pub use shell::{ExecResult, Shell};
pub use vfs::{FsError, Vfs};
