//! Configuration schema structs

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::{CURRENT_PANE_VAR, PAIRED_PANE_VAR};
use crate::layout::LayoutPlan;
use crate::observe::CaptureRange;
use crate::wait::{CompletionCriterion, WaitOptions};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tmux: TmuxConfig,
    pub wait: WaitConfig,
    pub capture: CaptureConfig,
    pub ambient: AmbientConfig,
    /// Named layout plans, applied with `muxctl layout --layout NAME`
    pub layouts: HashMap<String, LayoutPlan>,
}

/// How to reach the tmux server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxConfig {
    /// tmux binary (default: "tmux" from PATH)
    pub program: String,
    /// Server socket name, as `tmux -L`
    pub socket_name: Option<String>,
    /// Server socket path, as `tmux -S`; wins over `socket_name`
    pub socket_path: Option<PathBuf>,
    /// Size of newly created sessions
    pub width: Option<u16>,
    pub height: Option<u16>,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            program: "tmux".to_string(),
            socket_name: None,
            socket_path: None,
            width: None,
            height: None,
        }
    }
}

/// Completion polling defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Delay between captures (default: 100)
    pub poll_interval_ms: u64,
    /// Give up after this long (default: 30000)
    pub timeout_ms: u64,
    /// Process names that mean "back at the prompt"
    pub shell_commands: Vec<String>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 30_000,
            shell_commands: ["bash", "zsh", "sh", "fish", "dash", "ksh"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl WaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn options(&self) -> WaitOptions {
        WaitOptions::new(self.poll_interval(), self.timeout())
    }

    /// Criterion satisfied when the pane is back at any configured shell
    pub fn shell_criterion(&self) -> CompletionCriterion {
        CompletionCriterion::ProcessNameReturnedToShell(self.shell_commands.clone())
    }
}

/// Capture defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture only the last N lines through the bottom of the pane,
    /// reaching into scrollback past the pane height (default: 0, the
    /// visible screen)
    pub last_lines: u32,
}

impl CaptureConfig {
    pub fn range(&self) -> CaptureRange {
        if self.last_lines == 0 {
            CaptureRange::visible()
        } else {
            CaptureRange::last_lines(self.last_lines)
        }
    }
}

/// Environment variables naming the controller's panes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub current_pane_var: String,
    pub paired_pane_var: String,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            current_pane_var: CURRENT_PANE_VAR.to_string(),
            paired_pane_var: PAIRED_PANE_VAR.to_string(),
        }
    }
}
