//! Shell-internal failures, distinct from a command's own exit code. These
//! never escape `Shell::exec` (spec.md §7 "errors never escape exec()") —
//! the executor catches every variant here and turns it into a nonzero
//! exit code plus a stderr line, the same boundary `SquallError` sat behind
//! in the teacher's MCP tool handlers.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ShellError {
    #[error("syntax error near unexpected token `{0}`")]
    Syntax(String),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    #[error("{0}: command not found")]
    CommandNotFound(String),
    #[error("{0}: no such file or directory")]
    NoSuchFile(String),
    #[error("too many here-documents")]
    TooManyHeredocs,
    #[error("loop iteration cap exceeded")]
    LoopCapExceeded,
}

impl ShellError {
    /// The POSIX-conventional exit code a shell reports for this class of
    /// failure (127 for command-not-found, 2 for a syntax/usage error,
    /// 1 otherwise).
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::CommandNotFound(_) => 127,
            ShellError::NoSuchFile(_) => 127,
            ShellError::Syntax(_) | ShellError::UnexpectedEof => 2,
            _ => 1,
        }
    }
}
