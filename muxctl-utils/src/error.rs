//! Error types for muxctl
//!
//! Provides a unified error type used across all muxctl crates.

use std::path::PathBuf;

/// Main error type for muxctl operations
#[derive(Debug, thiserror::Error)]
pub enum MuxctlError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Multiplexer Errors ===

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{command}` failed (exit {}): {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Multiplexer server not running at {path}")]
    ServerNotRunning { path: PathBuf },

    #[error("Unexpected multiplexer output: {0}")]
    UnexpectedOutput(String),

    // === Target Errors ===

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Pane not found: {0}")]
    PaneNotFound(String),

    #[error("Buffer not found: {0}")]
    BufferNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MuxctlError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unexpected-output error
    pub fn unexpected_output(msg: impl Into<String>) -> Self {
        Self::UnexpectedOutput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error means the addressed target does not currently exist
    ///
    /// A missing server counts: with no server there are no live sessions.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::WindowNotFound(_)
                | Self::PaneNotFound(_)
                | Self::BufferNotFound(_)
                | Self::ServerNotRunning { .. }
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(e) | Self::Spawn { source: e, .. } => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Result type alias using MuxctlError
pub type Result<T> = std::result::Result<T, MuxctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Display Tests ====================

    #[test]
    fn test_error_display() {
        let err = MuxctlError::SessionNotFound("test".into());
        assert_eq!(err.to_string(), "Session not found: test");
    }

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let err = MuxctlError::FileRead {
            path: PathBuf::from("/etc/passwd"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/etc/passwd"));
    }

    #[test]
    fn test_error_display_command_failed() {
        let err = MuxctlError::CommandFailed {
            command: "tmux send-keys".into(),
            code: Some(1),
            stderr: "boom".into(),
        };
        assert_eq!(err.to_string(), "`tmux send-keys` failed (exit 1): boom");
    }

    #[test]
    fn test_error_display_command_killed_by_signal() {
        let err = MuxctlError::CommandFailed {
            command: "tmux".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("exit signal"));
    }

    #[test]
    fn test_error_display_server_not_running() {
        let err = MuxctlError::ServerNotRunning {
            path: PathBuf::from("/tmp/tmux-1000/default"),
        };
        let msg = err.to_string();
        assert!(msg.contains("not running"));
        assert!(msg.contains("/tmp/tmux-1000/default"));
    }

    #[test]
    fn test_error_display_targets() {
        assert_eq!(
            MuxctlError::WindowNotFound("s:dev".into()).to_string(),
            "Window not found: s:dev"
        );
        assert_eq!(
            MuxctlError::PaneNotFound("s:dev.3".into()).to_string(),
            "Pane not found: s:dev.3"
        );
        assert_eq!(
            MuxctlError::BufferNotFound("handoff".into()).to_string(),
            "Buffer not found: handoff"
        );
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = MuxctlError::ConfigInvalid {
            path: PathBuf::from("/home/user/.config/muxctl/config.toml"),
            message: "syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("syntax error"));
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_not_found_variants() {
        let not_found = [
            MuxctlError::SessionNotFound("s".into()),
            MuxctlError::WindowNotFound("w".into()),
            MuxctlError::PaneNotFound("p".into()),
            MuxctlError::BufferNotFound("b".into()),
            MuxctlError::ServerNotRunning {
                path: PathBuf::from("/tmp/sock"),
            },
        ];
        for err in not_found {
            assert!(err.is_not_found(), "Expected {:?} to be not-found", err);
        }
    }

    #[test]
    fn test_other_errors_are_not_not_found() {
        let others = [
            MuxctlError::SessionExists("s".into()),
            MuxctlError::config("bad"),
            MuxctlError::internal("oops"),
            MuxctlError::unexpected_output("garbage"),
            MuxctlError::CommandFailed {
                command: "tmux".into(),
                code: Some(1),
                stderr: "unknown command".into(),
            },
        ];
        for err in others {
            assert!(!err.is_not_found(), "Expected {:?} to NOT be not-found", err);
        }
    }

    #[test]
    fn test_retryable() {
        let interrupted = std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr");
        assert!(MuxctlError::Io(interrupted).is_retryable());

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no tmux");
        assert!(!MuxctlError::Spawn {
            program: "tmux".into(),
            source: missing,
        }
        .is_retryable());
        assert!(!MuxctlError::PaneNotFound("x".into()).is_retryable());
    }

    // ==================== From Trait Tests ====================

    #[test]
    fn test_from_io_error_preserves_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MuxctlError = io_err.into();
        if let MuxctlError::Io(inner) = err {
            assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
        } else {
            panic!("Expected Io variant");
        }
    }
}
