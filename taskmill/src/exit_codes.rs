//! Stable exit codes for taskmill CLI commands.

/// Command succeeded; for `taskmill run`, the project finished.
pub const OK: i32 = 0;
/// Command failed: bad config, unreadable task file, or a fatal run error.
pub const ERROR: i32 = 1;
/// `taskmill run` hit the iteration ceiling before the project was done.
pub const MAX_ITERATIONS: i32 = 2;
/// The loop was interrupted (SIGINT).
pub const INTERRUPTED: i32 = 130;
