//! Stable exit codes for the `ttdctl` binary.

/// The session ended cleanly.
pub const OK: i32 = 0;
/// Invalid arguments, settings or session directory, or a fatal runtime error.
pub const INVALID: i32 = 1;
/// The server exited on its own with a non-zero status.
pub const SERVER_FAILED: i32 = 2;
