//! Operation-scoped error types
//!
//! Backend calls fail with [`MuxctlError`]; the orchestration components
//! translate those into the narrower errors below so callers can match on
//! "target not found" without string inspection. Every variant is
//! recoverable by the caller; none implies corrupted state.

use muxctl_utils::MuxctlError;

use crate::address::PaneAddress;

/// Why a pane address failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("leading or trailing whitespace")]
    SurroundingWhitespace,
    #[error("missing ':' between session and window")]
    MissingWindowSeparator,
    #[error("missing '.' between window and pane")]
    MissingPaneSeparator,
    #[error("empty session name")]
    EmptySession,
    #[error("empty window")]
    EmptyWindow,
    #[error("empty pane index")]
    EmptyPane,
    #[error("pane index must not be negative")]
    NegativePaneIndex,
    #[error("pane index is not a non-negative integer")]
    InvalidPaneIndex,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("invalid character")]
    InvalidCharacter,
    #[error("window name must not start with '-' or '+'")]
    RelativeWindow,
}

/// Malformed address text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pane address {input:?}: {kind} (at {offending:?})")]
pub struct ParseError {
    /// The full text that was rejected
    pub input: String,
    /// The substring responsible for the rejection
    pub offending: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(input: &str, offending: &str, kind: ParseErrorKind) -> Self {
        Self {
            input: input.to_string(),
            offending: offending.to_string(),
            kind,
        }
    }
}

/// A named target does not currently exist
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("ambient pane variable {var} is not set")]
    AmbientUnset { var: String },

    #[error("session {0:?} does not exist")]
    Session(String),

    #[error("window {window:?} does not exist in session {session:?}")]
    Window { session: String, window: String },

    #[error("pane {0} does not exist")]
    Pane(PaneAddress),

    #[error("buffer {0:?} has never been written")]
    Buffer(String),
}

/// Failure resolving an ambient pane address
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("ambient variable {var} holds a malformed address: {source}")]
    Malformed {
        var: String,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Backend(MuxctlError),
}

/// Cause of a failed layout step
#[derive(Debug, thiserror::Error)]
pub enum LayoutFailure {
    #[error("pane index {0} was not created by an earlier step")]
    UnknownPane(u32),

    #[error("{0}")]
    InvalidStep(String),

    #[error(transparent)]
    TargetNotFound(#[from] NotFoundError),

    #[error(transparent)]
    Backend(#[from] MuxctlError),
}

impl LayoutFailure {
    /// `missing` when the backend reports a not-found error, else the error itself
    pub(crate) fn or_missing(err: MuxctlError, missing: NotFoundError) -> Self {
        if err.is_not_found() {
            Self::TargetNotFound(missing)
        } else {
            Self::Backend(err)
        }
    }
}

/// A layout step's precondition failed
///
/// `step` indexes into the plan being applied; `None` means the failure
/// happened before the first step ran (checking for an existing window).
/// Nothing created by earlier steps is rolled back.
#[derive(Debug, thiserror::Error)]
#[error("{}: {reason}", step_label(*step, description))]
pub struct LayoutError {
    pub step: Option<usize>,
    pub description: String,
    #[source]
    pub reason: LayoutFailure,
}

impl LayoutError {
    pub(crate) fn at(step: usize, description: impl Into<String>, reason: impl Into<LayoutFailure>) -> Self {
        Self {
            step: Some(step),
            description: description.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn before_steps(description: impl Into<String>, reason: impl Into<LayoutFailure>) -> Self {
        Self {
            step: None,
            description: description.into(),
            reason: reason.into(),
        }
    }
}

fn step_label(step: Option<usize>, description: &str) -> String {
    match step {
        Some(i) => format!("layout step {} ({}) failed", i, description),
        None => format!("layout check ({}) failed", description),
    }
}

/// Failure sending input to a pane
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("cannot send to {0}: target not found")]
    TargetNotFound(PaneAddress),

    #[error(transparent)]
    Backend(MuxctlError),
}

impl DispatchError {
    pub(crate) fn from_backend(target: &PaneAddress, err: MuxctlError) -> Self {
        if err.is_not_found() {
            Self::TargetNotFound(target.clone())
        } else {
            Self::Backend(err)
        }
    }

    /// Check if the pane was gone at dispatch time
    pub fn is_target_not_found(&self) -> bool {
        matches!(self, Self::TargetNotFound(_))
    }
}

/// Failure reading from a pane
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("cannot capture {0}: target not found")]
    TargetNotFound(PaneAddress),

    #[error(transparent)]
    Backend(MuxctlError),
}

impl CaptureError {
    pub(crate) fn from_backend(target: &PaneAddress, err: MuxctlError) -> Self {
        if err.is_not_found() {
            Self::TargetNotFound(target.clone())
        } else {
            Self::Backend(err)
        }
    }

    /// Check if the pane was gone at capture time
    pub fn is_target_not_found(&self) -> bool {
        matches!(self, Self::TargetNotFound(_))
    }
}

/// Failure using a named buffer
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("invalid buffer name {0:?}: must be non-empty without whitespace")]
    InvalidName(String),

    #[error(transparent)]
    Backend(MuxctlError),
}

/// Any orchestration error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Backend(#[from] MuxctlError),
}

/// Result type alias using the orchestration [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
