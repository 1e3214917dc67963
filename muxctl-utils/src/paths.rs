//! Path utilities for muxctl
//!
//! Follows the XDG Base Directory layout for config and
//! state directories, and locates the tmux server socket.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "muxctl";

/// Socket name tmux uses when no `-L` is given
pub const DEFAULT_TMUX_SOCKET_NAME: &str = "default";

/// Get project directories
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/muxctl` or `~/.config/muxctl`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(fallback_config_dir)
}

/// Get the main configuration file path
///
/// Location: `$XDG_CONFIG_HOME/muxctl/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/muxctl` or `~/.local/state/muxctl`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/muxctl/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Get the directory tmux keeps its server sockets in
///
/// Location: `$TMUX_TMPDIR/tmux-$UID` or `/tmp/tmux-$UID`
pub fn tmux_socket_dir() -> PathBuf {
    let base = std::env::var("TMUX_TMPDIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    // SAFETY: getuid() is always safe to call
    let uid = unsafe { libc::getuid() };
    base.join(format!("tmux-{}", uid))
}

/// Get the tmux server socket path for a socket name (`tmux -L NAME`)
pub fn tmux_socket_path(name: Option<&str>) -> PathBuf {
    tmux_socket_dir().join(name.unwrap_or(DEFAULT_TMUX_SOCKET_NAME))
}

// Fallback implementations when ProjectDirs is unavailable

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_config_dir() -> PathBuf {
    home_dir().join(".config").join(APP_NAME)
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let path = config_dir();
        assert!(path.to_string_lossy().contains("muxctl"));
    }

    #[test]
    fn test_config_file_is_toml() {
        let path = config_file();
        assert!(path.to_string_lossy().ends_with(".toml"));
        assert!(path.starts_with(config_dir()));
    }

    #[test]
    fn test_log_dir_in_state_dir() {
        let log = log_dir();
        assert!(log.starts_with(state_dir()));
        assert_eq!(log.file_name().unwrap(), "log");
    }

    #[test]
    fn test_tmux_socket_dir_names_uid() {
        let uid = unsafe { libc::getuid() };
        let dir = tmux_socket_dir();
        assert_eq!(
            dir.file_name().unwrap().to_string_lossy(),
            format!("tmux-{}", uid)
        );
    }

    #[test]
    fn test_tmux_socket_path_default_name() {
        let path = tmux_socket_path(None);
        assert_eq!(path.file_name().unwrap(), DEFAULT_TMUX_SOCKET_NAME);
        assert!(path.starts_with(tmux_socket_dir()));
    }

    #[test]
    fn test_tmux_socket_path_custom_name() {
        let path = tmux_socket_path(Some("agents"));
        assert_eq!(path.file_name().unwrap(), "agents");
    }

    #[test]
    fn test_fallback_paths_use_app_name() {
        assert!(fallback_config_dir().ends_with(".config/muxctl"));
        assert!(fallback_state_dir().ends_with(".local/state/muxctl"));
    }
}
