//! Stable exit codes for bisector CLI commands.

/// Command succeeded; for `good`/`bad` this covers both "probe again" and a
/// concluded search (the conclusion is printed, not encoded).
pub const OK: i32 = 0;
/// Command failed: no active search, missing/invalid config, or corrupt state.
pub const INVALID: i32 = 1;
