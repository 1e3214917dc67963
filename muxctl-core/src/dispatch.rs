//! Sending input to panes.
//!
//! Text is always delivered literally: the multiplexer never interprets a
//! word inside it as a key name. Control keys go through [`ControlKey`],
//! which is the only way to send one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::PaneAddress;
use crate::error::DispatchError;
use crate::mux::Multiplexer;

/// A non-text key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKey {
    /// Ctrl+C
    Interrupt,
    /// Ctrl+D
    Eof,
    /// Ctrl+Z
    Suspend,
    /// Ctrl+\
    Quit,
    /// Ctrl+L
    ClearScreen,
    Escape,
    Enter,
    Tab,
    Backspace,
    Up,
    Down,
    Left,
    Right,
}

impl ControlKey {
    pub const ALL: [ControlKey; 13] = [
        ControlKey::Interrupt,
        ControlKey::Eof,
        ControlKey::Suspend,
        ControlKey::Quit,
        ControlKey::ClearScreen,
        ControlKey::Escape,
        ControlKey::Enter,
        ControlKey::Tab,
        ControlKey::Backspace,
        ControlKey::Up,
        ControlKey::Down,
        ControlKey::Left,
        ControlKey::Right,
    ];

    /// Key name as the multiplexer spells it
    pub fn key_name(self) -> &'static str {
        match self {
            ControlKey::Interrupt => "C-c",
            ControlKey::Eof => "C-d",
            ControlKey::Suspend => "C-z",
            ControlKey::Quit => "C-\\",
            ControlKey::ClearScreen => "C-l",
            ControlKey::Escape => "Escape",
            ControlKey::Enter => "Enter",
            ControlKey::Tab => "Tab",
            ControlKey::Backspace => "BSpace",
            ControlKey::Up => "Up",
            ControlKey::Down => "Down",
            ControlKey::Left => "Left",
            ControlKey::Right => "Right",
        }
    }

    fn friendly_name(self) -> &'static str {
        match self {
            ControlKey::Interrupt => "interrupt",
            ControlKey::Eof => "eof",
            ControlKey::Suspend => "suspend",
            ControlKey::Quit => "quit",
            ControlKey::ClearScreen => "clear_screen",
            ControlKey::Escape => "escape",
            ControlKey::Enter => "enter",
            ControlKey::Tab => "tab",
            ControlKey::Backspace => "backspace",
            ControlKey::Up => "up",
            ControlKey::Down => "down",
            ControlKey::Left => "left",
            ControlKey::Right => "right",
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.friendly_name())
    }
}

/// Unrecognized control key name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown control key {0:?}")]
pub struct UnknownKey(pub String);

impl FromStr for ControlKey {
    type Err = UnknownKey;

    /// Accepts `interrupt`, `C-c`, `Ctrl+C`, `^C` and friends
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase().replace('-', "_");

        if let Some(key) = ControlKey::ALL.iter().copied().find(|k| {
            k.friendly_name() == lower || k.key_name().eq_ignore_ascii_case(trimmed)
        }) {
            return Ok(key);
        }

        let ctrl = lower
            .strip_prefix("ctrl+")
            .or_else(|| lower.strip_prefix("ctrl_"))
            .or_else(|| lower.strip_prefix('^'));
        let key = match (ctrl, lower.as_str()) {
            (Some("c"), _) => ControlKey::Interrupt,
            (Some("d"), _) => ControlKey::Eof,
            (Some("z"), _) => ControlKey::Suspend,
            (Some("\\"), _) => ControlKey::Quit,
            (Some("l"), _) => ControlKey::ClearScreen,
            (Some("m"), _) | (None, "return") => ControlKey::Enter,
            (Some("["), _) | (None, "esc") => ControlKey::Escape,
            (None, "bspace") => ControlKey::Backspace,
            _ => return Err(UnknownKey(trimmed.to_string())),
        };
        Ok(key)
    }
}

/// Delivers text and control keys to panes
pub struct Dispatcher<'a, M: ?Sized> {
    mux: &'a M,
}

impl<'a, M: Multiplexer + ?Sized> Dispatcher<'a, M> {
    pub fn new(mux: &'a M) -> Self {
        Self { mux }
    }

    /// Type `text` literally into the pane, then press Enter if asked
    ///
    /// Delivery is fire-and-forget: success means the multiplexer accepted
    /// the keystrokes, not that anything read them.
    pub async fn send_text(
        &self,
        target: &PaneAddress,
        text: &str,
        press_enter: bool,
    ) -> Result<(), DispatchError> {
        if !text.is_empty() {
            self.mux
                .send_literal(target, text)
                .await
                .map_err(|e| DispatchError::from_backend(target, e))?;
        }
        if press_enter {
            self.send_control(target, ControlKey::Enter).await?;
        }
        tracing::debug!(pane = %target, bytes = text.len(), press_enter, "Sent text");
        Ok(())
    }

    /// Press a single control key in the pane
    pub async fn send_control(
        &self,
        target: &PaneAddress,
        key: ControlKey,
    ) -> Result<(), DispatchError> {
        self.mux
            .send_key(target, key.key_name())
            .await
            .map_err(|e| DispatchError::from_backend(target, e))?;
        tracing::debug!(pane = %target, key = %key, "Sent control key");
        Ok(())
    }
}
