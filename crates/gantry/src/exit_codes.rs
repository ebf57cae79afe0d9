//! Exit codes for the CLI

/// Clean shutdown, or nothing left to run
pub const SUCCESS: i32 = 0;

/// Task failure, no matching tasks, or a startup error
pub const ERROR: i32 = 1;
