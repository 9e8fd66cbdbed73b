//! The DevTools façade layer (spec.md §4.6-4.9): git, npm, and the node/
//! python runtimes, each exposed to the shell as ordinary registered
//! commands rather than special-cased executor paths.

pub mod git;
pub mod npm;
