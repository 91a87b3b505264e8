//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - invalid stack config, project descriptor or declaration
pub const CONFIG_ERROR: i32 = 2;

/// Stack reference error - referenced stack or required output missing
pub const STACK_REFERENCE_ERROR: i32 = 3;

/// Deployment error - a resource failed against the cluster
pub const DEPLOYMENT_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
