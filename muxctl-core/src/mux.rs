//! The multiplexer control surface.
//!
//! [`Multiplexer`] is the narrow, typed boundary to the external server that
//! owns every session, window and pane. Implementations hold no cached view
//! of that state; each call is a fresh query or mutation against it.

use async_trait::async_trait;
use muxctl_utils::Result;
use serde::{Deserialize, Serialize};

use crate::address::{PaneAddress, WindowRef};
use crate::observe::CaptureRange;

/// Which way a pane is split
///
/// `Horizontal` places the new pane to the right of its parent,
/// `Vertical` places it below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    Horizontal,
    Vertical,
}

/// One row of the authority's pane table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaneInfo {
    pub session: String,
    pub window_index: u32,
    pub window_name: String,
    pub pane_index: u32,
    pub current_command: String,
    pub width: u16,
    pub height: u16,
    pub left: u16,
    pub top: u16,
    pub active: bool,
}

impl PaneInfo {
    /// Whether `addr` names this pane (window by index or by name)
    pub fn matches(&self, addr: &PaneAddress) -> bool {
        self.session == addr.session()
            && self.pane_index == addr.pane()
            && match addr.window() {
                WindowRef::Index(i) => self.window_index == *i,
                WindowRef::Name(n) => &self.window_name == n,
            }
    }

    /// Address of this pane using the window index
    pub fn address(&self) -> Option<PaneAddress> {
        PaneAddress::new(
            self.session.clone(),
            WindowRef::Index(self.window_index),
            self.pane_index,
        )
        .ok()
    }
}

/// Control surface of a terminal multiplexer server
///
/// "Target does not exist" is reported through the `*NotFound` variants of
/// [`MuxctlError`](muxctl_utils::MuxctlError) (or `ServerNotRunning`).
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Whether a session with exactly this name is live
    async fn has_session(&self, name: &str) -> Result<bool>;

    /// Create a detached session whose first window is `first_window`
    async fn new_session(&self, name: &str, first_window: &str) -> Result<()>;

    /// Create a detached window in an existing session
    async fn new_window(&self, session: &str, name: &str) -> Result<()>;

    /// Split `target`; the new pane takes `percent` of the parent's width
    /// (horizontal) or height (vertical). Returns the new pane's index.
    async fn split_pane(
        &self,
        target: &PaneAddress,
        direction: SplitDirection,
        percent: u8,
    ) -> Result<u32>;

    /// List panes of one session, or of every session when `None`
    async fn list_panes(&self, session: Option<&str>) -> Result<Vec<PaneInfo>>;

    /// Type `text` into the pane without key-name interpretation
    async fn send_literal(&self, target: &PaneAddress, text: &str) -> Result<()>;

    /// Press one named key (`Enter`, `C-c`, ...)
    async fn send_key(&self, target: &PaneAddress, key: &str) -> Result<()>;

    /// Text of the pane within `range`, one line per row
    async fn capture(&self, target: &PaneAddress, range: &CaptureRange) -> Result<String>;

    /// Name of the pane's foreground process
    async fn current_command(&self, target: &PaneAddress) -> Result<String>;

    /// Bind a variable in a session's environment, or globally when `None`
    async fn set_environment(&self, session: Option<&str>, key: &str, value: &str) -> Result<()>;

    /// Read a variable from a session's environment, or globally when `None`
    async fn show_environment(&self, session: Option<&str>, key: &str) -> Result<Option<String>>;

    /// Replace the contents of a named buffer in one write
    async fn set_buffer(&self, name: &str, payload: &[u8]) -> Result<()>;

    /// Contents of a named buffer
    async fn show_buffer(&self, name: &str) -> Result<Vec<u8>>;

    async fn delete_buffer(&self, name: &str) -> Result<()>;

    async fn list_buffers(&self) -> Result<Vec<String>>;

    async fn kill_window(&self, session: &str, window: &WindowRef) -> Result<()>;

    async fn kill_session(&self, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> PaneInfo {
        PaneInfo {
            session: "s".into(),
            window_index: 2,
            window_name: "dev".into(),
            pane_index: 1,
            current_command: "bash".into(),
            width: 80,
            height: 24,
            left: 0,
            top: 0,
            active: true,
        }
    }

    #[test]
    fn matches_by_index_or_name() {
        let pane = info();
        assert!(pane.matches(&PaneAddress::parse("s:2.1").unwrap()));
        assert!(pane.matches(&PaneAddress::parse("s:dev.1").unwrap()));
        assert!(!pane.matches(&PaneAddress::parse("s:dev.0").unwrap()));
        assert!(!pane.matches(&PaneAddress::parse("S:dev.1").unwrap()));
        assert!(!pane.matches(&PaneAddress::parse("s:Dev.1").unwrap()));
    }

    #[test]
    fn address_uses_window_index() {
        assert_eq!(info().address().unwrap().to_string(), "s:2.1");
    }

    #[test]
    fn split_direction_serde_names() {
        #[derive(Deserialize)]
        struct Holder {
            d: SplitDirection,
        }
        let h: Holder = toml::from_str("d = \"vertical\"").unwrap();
        assert_eq!(h.d, SplitDirection::Vertical);
    }
}
