//! Configuration loader

use std::path::Path;

use muxctl_utils::{config_file, MuxctlError, Result};

use super::AppConfig;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<AppConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Err(MuxctlError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| MuxctlError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| MuxctlError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        if config.wait.poll_interval_ms < 10 {
            return Err(MuxctlError::config("wait.poll_interval_ms must be at least 10"));
        }

        if config.wait.timeout_ms < config.wait.poll_interval_ms {
            return Err(MuxctlError::config(
                "wait.timeout_ms must not be shorter than wait.poll_interval_ms",
            ));
        }

        if config.wait.shell_commands.iter().all(|s| s.trim().is_empty()) {
            return Err(MuxctlError::config(
                "wait.shell_commands must name at least one shell",
            ));
        }

        if config.tmux.program.trim().is_empty() {
            return Err(MuxctlError::config("tmux.program must not be empty"));
        }

        for (name, plan) in &config.layouts {
            plan.validate()
                .map_err(|e| MuxctlError::config(format!("layouts.{}: {}", name, e)))?;
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<AppConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load and validate from an explicit path
    pub fn load_and_validate_from(path: &Path) -> Result<AppConfig> {
        let config = Self::load_from_path(path)?;
        Self::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutStep;
    use crate::mux::SplitDirection;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.tmux.program, "tmux");
        assert_eq!(config.ambient.current_pane_var, "MUXCTL_PANE");
        assert!(config.wait.shell_commands.contains(&"bash".to_string()));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(
            &path,
            r#"
            [tmux]
            socket_name = "agents"

            [wait]
            poll_interval_ms = 250

            [layouts.pair]
            steps = [
                { op = "split", pane = 0, direction = "horizontal", percent = 40 },
                { op = "set_env", key = "MUXCTL_PAIRED_PANE", value = { pane = 1 } },
            ]
            "#,
        )
        .unwrap();

        let config = ConfigLoader::load_and_validate_from(&path).unwrap();
        assert_eq!(config.tmux.socket_name.as_deref(), Some("agents"));
        assert_eq!(config.wait.poll_interval_ms, 250);
        // Unspecified fields keep their defaults
        assert_eq!(config.wait.timeout_ms, 30_000);

        let pair = &config.layouts["pair"];
        assert_eq!(pair.len(), 2);
        assert_eq!(
            pair.steps[0],
            LayoutStep::Split {
                pane: 0,
                direction: SplitDirection::Horizontal,
                percent: 40
            }
        );
    }

    #[test]
    fn test_missing_explicit_path() {
        let dir = tempdir().unwrap();
        let err = ConfigLoader::load_from_path(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, MuxctlError::ConfigNotFound(_)));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = ConfigLoader::parse("invalid { toml", Path::new("test.toml"));
        assert!(matches!(result, Err(MuxctlError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_validate_poll_interval() {
        let mut config = AppConfig::default();
        config.wait.poll_interval_ms = 5;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_timeout_shorter_than_poll() {
        let mut config = AppConfig::default();
        config.wait.poll_interval_ms = 500;
        config.wait.timeout_ms = 100;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_shells() {
        let mut config = AppConfig::default();
        config.wait.shell_commands.clear();
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_layout_percent() {
        let config = ConfigLoader::parse(
            r#"
            [layouts.bad]
            steps = [{ op = "split", direction = "vertical", percent = 0 }]
            "#,
            Path::new("test.toml"),
        )
        .unwrap();
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(err.to_string().contains("layouts.bad"));
    }

    #[test]
    fn test_capture_range_from_config() {
        let mut config = AppConfig::default();
        assert_eq!(config.capture.range(), crate::observe::CaptureRange::visible());
        config.capture.last_lines = 200;
        assert_eq!(
            config.capture.range(),
            crate::observe::CaptureRange::last_lines(200)
        );
    }
}
