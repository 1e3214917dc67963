//! Logging setup for muxctl
//!
//! Stdout belongs to command results (captures, buffer payloads, pane
//! addresses), so diagnostics only ever go to stderr or a log file.
//!
//! Two environment variables control it:
//! - `MUXCTL_LOG`: an `EnvFilter` directive such as `debug` or `muxctl_core=trace`
//! - `MUXCTL_LOG_FILE`: log to this file instead of stderr; an empty value
//!   selects `$XDG_STATE_HOME/muxctl/log/muxctl.log`

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{paths, MuxctlError, Result};

/// Environment variable holding the log filter
pub const LOG_ENV_VAR: &str = "MUXCTL_LOG";

/// Environment variable redirecting logs to a file
pub const LOG_FILE_ENV_VAR: &str = "MUXCTL_LOG_FILE";

const DEFAULT_LOG_FILE: &str = "muxctl.log";

/// Where log lines are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    /// Appended to, created along with its parent directory if needed
    File(PathBuf),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub output: LogOutput,
    /// `EnvFilter` directive
    pub filter: String,
    /// Include source file and line in each event
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "warn".into(),
            file_line: false,
        }
    }
}

impl LogConfig {
    /// Configuration for the command-line tool, read from the environment
    pub fn cli() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`LogConfig::cli`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = lookup(LOG_ENV_VAR)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| "warn".into());

        let output = match lookup(LOG_FILE_ENV_VAR) {
            Some(path) if path.trim().is_empty() => LogOutput::File(default_log_file()),
            Some(path) => LogOutput::File(PathBuf::from(path)),
            None => LogOutput::Stderr,
        };

        // File logs are read after the fact, where locations help
        let file_line = matches!(output, LogOutput::File(_));

        Self {
            output,
            filter,
            file_line,
        }
    }
}

/// Default log file under the state directory
pub fn default_log_file() -> PathBuf {
    paths::log_dir().join(DEFAULT_LOG_FILE)
}

/// Install the global subscriber
///
/// Fails if the filter does not parse, the log file cannot be opened, or a
/// subscriber is already installed.
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| MuxctlError::config(format!("Invalid log filter {:?}: {}", config.filter, e)))?;

    let layer = fmt::layer()
        .with_target(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match &config.output {
        LogOutput::Stderr => registry.with(layer.with_writer(std::io::stderr)).try_init(),
        LogOutput::File(path) => {
            let file = open_log_file(path)?;
            registry
                .with(layer.with_writer(file).with_ansi(false))
                .try_init()
        }
    };

    installed.map_err(|e| MuxctlError::internal(format!("Failed to init logging: {}", e)))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| MuxctlError::FileWrite {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| MuxctlError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
}
