//! Exit codes for the CLI

/// Every requested target finished
pub const SUCCESS: i32 = 0;

/// A task failed, the build file was invalid, or the run was interrupted
pub const FAILURE: i32 = 1;
