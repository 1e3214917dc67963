//! Pane addressing: parse, format and resolve `session:window.pane`.
//!
//! A [`PaneAddress`] is an immutable value naming a pane; it never owns the
//! pane and may go stale at any moment. Addresses are only constructed
//! through validation ([`PaneAddress::parse`] / [`PaneAddress::new`]), so a
//! formatted address always parses back to the same value.
//!
//! Addressing is case-sensitive and whitespace-intolerant: `" s:w.0"` is an
//! error, not `s:w.0`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NotFoundError, ParseError, ParseErrorKind, ResolveError};
use crate::mux::Multiplexer;

/// Environment variable naming the controller's own pane
pub const CURRENT_PANE_VAR: &str = "MUXCTL_PANE";

/// Environment variable naming the controller's paired pane
pub const PAIRED_PANE_VAR: &str = "MUXCTL_PAIRED_PANE";

/// A window within a session, by index or by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WindowRef {
    Index(u32),
    Name(String),
}

impl fmt::Display for WindowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowRef::Index(i) => write!(f, "{}", i),
            WindowRef::Name(n) => f.write_str(n),
        }
    }
}

/// Address of a single pane: `session:window.pane`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaneAddress {
    session: String,
    window: WindowRef,
    pane: u32,
}

impl PaneAddress {
    /// Build an address from parts, applying the same rules as [`parse`](Self::parse)
    pub fn new(
        session: impl Into<String>,
        window: WindowRef,
        pane: u32,
    ) -> Result<Self, ParseError> {
        let session = session.into();
        let rendered = format!("{}:{}.{}", session, window, pane);
        validate_session(&rendered, &session)?;
        if let WindowRef::Name(name) = &window {
            validate_window_name(&rendered, name)?;
            if is_all_digits(name) {
                return Err(ParseError::new(&rendered, name, ParseErrorKind::InvalidCharacter));
            }
        }
        Ok(Self {
            session,
            window,
            pane,
        })
    }

    /// Parse `session:window.pane`
    ///
    /// `window` is an index when it is all digits and a name otherwise;
    /// `pane` must be a non-negative integer.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::new(input, input, ParseErrorKind::EmptySession));
        }
        let trimmed_start = input.trim_start();
        if trimmed_start.len() != input.len() {
            let ws = &input[..input.len() - trimmed_start.len()];
            return Err(ParseError::new(input, ws, ParseErrorKind::SurroundingWhitespace));
        }
        let trimmed = input.trim_end();
        if trimmed.len() != input.len() {
            let ws = &input[trimmed.len()..];
            return Err(ParseError::new(input, ws, ParseErrorKind::SurroundingWhitespace));
        }

        let (session, rest) = input
            .split_once(':')
            .ok_or_else(|| ParseError::new(input, input, ParseErrorKind::MissingWindowSeparator))?;
        validate_session(input, session)?;

        let (window, pane) = rest
            .split_once('.')
            .ok_or_else(|| ParseError::new(input, rest, ParseErrorKind::MissingPaneSeparator))?;

        if window.is_empty() {
            return Err(ParseError::new(input, window, ParseErrorKind::EmptyWindow));
        }
        let window = if is_all_digits(window) {
            WindowRef::Index(
                window
                    .parse::<u32>()
                    .map_err(|_| ParseError::new(input, window, ParseErrorKind::IndexOutOfRange))?,
            )
        } else {
            validate_window_name(input, window)?;
            WindowRef::Name(window.to_string())
        };

        let pane = parse_pane_index(input, pane)?;

        Ok(Self {
            session: session.to_string(),
            window,
            pane,
        })
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn window(&self) -> &WindowRef {
        &self.window
    }

    pub fn pane(&self) -> u32 {
        self.pane
    }

    /// Same session and window, different pane
    pub fn with_pane(&self, pane: u32) -> Self {
        Self {
            session: self.session.clone(),
            window: self.window.clone(),
            pane,
        }
    }
}

impl fmt::Display for PaneAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.session, self.window, self.pane)
    }
}

impl FromStr for PaneAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PaneAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PaneAddress> for String {
    fn from(addr: PaneAddress) -> Self {
        addr.to_string()
    }
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn first_bad_char(s: &str, extra: &[char]) -> Option<char> {
    s.chars()
        .find(|c| c.is_whitespace() || c.is_control() || extra.contains(c))
}

fn validate_session(input: &str, session: &str) -> Result<(), ParseError> {
    if session.is_empty() {
        return Err(ParseError::new(input, session, ParseErrorKind::EmptySession));
    }
    if let Some(c) = first_bad_char(session, &[':', '.']) {
        return Err(ParseError::new(input, &c.to_string(), ParseErrorKind::InvalidCharacter));
    }
    Ok(())
}

fn validate_window_name(input: &str, name: &str) -> Result<(), ParseError> {
    if name.is_empty() {
        return Err(ParseError::new(input, name, ParseErrorKind::EmptyWindow));
    }
    if name.starts_with('-') || name.starts_with('+') {
        return Err(ParseError::new(input, name, ParseErrorKind::RelativeWindow));
    }
    if let Some(c) = first_bad_char(name, &[':', '.']) {
        return Err(ParseError::new(input, &c.to_string(), ParseErrorKind::InvalidCharacter));
    }
    Ok(())
}

fn parse_pane_index(input: &str, pane: &str) -> Result<u32, ParseError> {
    if pane.is_empty() {
        return Err(ParseError::new(input, pane, ParseErrorKind::EmptyPane));
    }
    if let Some(digits) = pane.strip_prefix('-') {
        if is_all_digits(digits) {
            return Err(ParseError::new(input, pane, ParseErrorKind::NegativePaneIndex));
        }
    }
    if !is_all_digits(pane) {
        return Err(ParseError::new(input, pane, ParseErrorKind::InvalidPaneIndex));
    }
    pane.parse::<u32>()
        .map_err(|_| ParseError::new(input, pane, ParseErrorKind::IndexOutOfRange))
}

// ---------------------------------------------------------------------------
// Ambient context
// ---------------------------------------------------------------------------

/// "Which pane am I" signals read once from the environment at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientContext {
    current_var: String,
    current: Option<String>,
    paired_var: String,
    paired: Option<String>,
}

impl AmbientContext {
    /// Read the default variables ([`CURRENT_PANE_VAR`], [`PAIRED_PANE_VAR`])
    pub fn from_env() -> Self {
        Self::from_env_vars(CURRENT_PANE_VAR, PAIRED_PANE_VAR)
    }

    /// Read custom variable names
    pub fn from_env_vars(current_var: &str, paired_var: &str) -> Self {
        Self::from_lookup(current_var, paired_var, |var| std::env::var(var).ok())
    }

    /// Build from an arbitrary lookup (tests, embedding)
    pub fn from_lookup<F>(current_var: &str, paired_var: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            current_var: current_var.to_string(),
            current: lookup(current_var).filter(|v| !v.is_empty()),
            paired_var: paired_var.to_string(),
            paired: lookup(paired_var).filter(|v| !v.is_empty()),
        }
    }

    /// Raw current-pane text, if set
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Raw paired-pane text, if set
    pub fn paired(&self) -> Option<&str> {
        self.paired.as_deref()
    }
}

/// Parses addresses and resolves ambient ones against the live authority
pub struct AddressResolver<'a, M: ?Sized> {
    mux: &'a M,
}

impl<'a, M: Multiplexer + ?Sized> AddressResolver<'a, M> {
    pub fn new(mux: &'a M) -> Self {
        Self { mux }
    }

    pub fn parse(&self, text: &str) -> Result<PaneAddress, ParseError> {
        PaneAddress::parse(text)
    }

    pub fn format(&self, addr: &PaneAddress) -> String {
        addr.to_string()
    }

    /// Resolve the controller's own pane
    ///
    /// Fails with `NotFound` when the variable is unset or names a pane that
    /// no longer exists; never falls back to a default session.
    pub async fn resolve_current(&self, ambient: &AmbientContext) -> Result<PaneAddress, ResolveError> {
        self.resolve_var(&ambient.current_var, ambient.current.as_deref())
            .await
    }

    /// Resolve the controller's paired pane
    pub async fn resolve_paired(&self, ambient: &AmbientContext) -> Result<PaneAddress, ResolveError> {
        self.resolve_var(&ambient.paired_var, ambient.paired.as_deref())
            .await
    }

    /// Check that an address names a live pane
    pub async fn exists(&self, addr: &PaneAddress) -> muxctl_utils::Result<bool> {
        match self.mux.list_panes(Some(addr.session())).await {
            Ok(panes) => Ok(panes.iter().any(|p| p.matches(addr))),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn resolve_var(&self, var: &str, raw: Option<&str>) -> Result<PaneAddress, ResolveError> {
        let raw = raw.ok_or_else(|| NotFoundError::AmbientUnset {
            var: var.to_string(),
        })?;
        let addr = PaneAddress::parse(raw).map_err(|source| ResolveError::Malformed {
            var: var.to_string(),
            source,
        })?;
        if self.exists(&addr).await.map_err(ResolveError::Backend)? {
            Ok(addr)
        } else {
            tracing::warn!(var = %var, address = %addr, "Ambient pane no longer exists");
            Err(NotFoundError::Pane(addr).into())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
