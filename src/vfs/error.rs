//! Node.js `fs`-compatible error taxonomy (spec.md §4.3). Every VFS failure
//! carries the same three things a Node `fs` error does: a symbolic `code`
//! (`"ENOENT"`), a negative `errno`, and a message shaped like Node's own
//! (`"ENOENT: no such file or directory, <syscall> '<path>'"`) — load-bearing
//! because git-library-style code written against this VFS inspects `code`,
//! not the message, to decide how to recover.

use std::fmt;

/// Symbolic error codes the VFS can raise, each carrying its POSIX `errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No such file or directory.
    ENOENT,
    /// File already exists.
    EEXIST,
    /// Is a directory (operation expected a file).
    EISDIR,
    /// Not a directory (operation expected a directory).
    ENOTDIR,
    /// Directory not empty.
    ENOTEMPTY,
    /// Too many levels of symbolic links.
    ELOOP,
    /// Unspecified failure.
    EUNSPEC,
}

impl ErrorCode {
    pub fn code_str(self) -> &'static str {
        match self {
            ErrorCode::ENOENT => "ENOENT",
            ErrorCode::EEXIST => "EEXIST",
            ErrorCode::EISDIR => "EISDIR",
            ErrorCode::ENOTDIR => "ENOTDIR",
            ErrorCode::ENOTEMPTY => "ENOTEMPTY",
            ErrorCode::ELOOP => "ELOOP",
            ErrorCode::EUNSPEC => "UNKNOWN",
        }
    }

    pub fn errno(self) -> i32 {
        match self {
            ErrorCode::ENOENT => -2,
            ErrorCode::EEXIST => -17,
            ErrorCode::ENOTDIR => -20,
            ErrorCode::EISDIR => -21,
            ErrorCode::ENOTEMPTY => -39,
            ErrorCode::ELOOP => -40,
            ErrorCode::EUNSPEC => -1,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            ErrorCode::ENOENT => "no such file or directory",
            ErrorCode::EEXIST => "file already exists",
            ErrorCode::EISDIR => "illegal operation on a directory",
            ErrorCode::ENOTDIR => "not a directory",
            ErrorCode::ENOTEMPTY => "directory not empty",
            ErrorCode::ELOOP => "too many symbolic links encountered",
            ErrorCode::EUNSPEC => "unknown error",
        }
    }
}

/// A VFS operation failure, matching the shape of a Node.js `fs` error
/// object (`err.code`, `err.errno`, `err.message`, `err.path`).
#[derive(Debug, Clone, thiserror::Error)]
pub struct FsError {
    pub code: ErrorCode,
    pub syscall: &'static str,
    pub path: String,
}

impl FsError {
    pub fn new(code: ErrorCode, syscall: &'static str, path: impl Into<String>) -> Self {
        Self {
            code,
            syscall,
            path: path.into(),
        }
    }

    pub fn enoent(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::ENOENT, syscall, path)
    }

    pub fn eexist(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::EEXIST, syscall, path)
    }

    pub fn eisdir(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::EISDIR, syscall, path)
    }

    pub fn enotdir(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::ENOTDIR, syscall, path)
    }

    pub fn enotempty(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::ENOTEMPTY, syscall, path)
    }

    pub fn eloop(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::ELOOP, syscall, path)
    }

    pub fn errno(&self) -> i32 {
        self.code.errno()
    }

    /// A short form suitable for a coreutil's stderr line:
    /// `"<cmd>: <path>: <reason>"`.
    pub fn short_message(&self) -> String {
        format!("{}: {}", self.path, self.code.reason())
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}, {} '{}'",
            self.code.code_str(),
            self.code.reason(),
            self.syscall,
            self.path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_matches_node_format() {
        let err = FsError::enoent("open", "/missing");
        assert_eq!(
            err.to_string(),
            "ENOENT: no such file or directory, open '/missing'"
        );
        assert_eq!(err.errno(), -2);
        assert_eq!(err.code.code_str(), "ENOENT");
    }

    #[test]
    fn errno_table_matches_spec() {
        assert_eq!(ErrorCode::EEXIST.errno(), -17);
        assert_eq!(ErrorCode::ENOTDIR.errno(), -20);
        assert_eq!(ErrorCode::EISDIR.errno(), -21);
        assert_eq!(ErrorCode::ENOTEMPTY.errno(), -39);
        assert_eq!(ErrorCode::ELOOP.errno(), -40);
        assert_eq!(ErrorCode::EUNSPEC.errno(), -1);
    }
}
