//! muxctl-utils: Common utilities shared across muxctl crates
//!
//! This crate provides:
//! - Unified error types ([`MuxctlError`], [`Result`])
//! - Logging setup ([`init_logging_with_config`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{MuxctlError, Result};
pub use logging::{default_log_file, init_logging_with_config, LogConfig, LogOutput};

// Re-export commonly used path functions
pub use paths::{config_dir, config_file, log_dir, state_dir, tmux_socket_dir, tmux_socket_path};
