//! muxctl-core: orchestration of terminal-multiplexer panes
//!
//! Treats a running multiplexer server (tmux) as an external authority and
//! drives it through narrow, typed operations:
//!
//! - [`address`]: parse/format `session:window.pane` addresses and resolve the
//!   ambient "current pane"
//! - [`layout`]: idempotent session/window/pane provisioning from a [`LayoutPlan`]
//! - [`dispatch`]: type text and control keys into a pane
//! - [`observe`]: capture immutable [`PaneSnapshot`]s
//! - [`wait`]: poll snapshots until a [`CompletionCriterion`] holds
//! - [`buffer`]: last-writer-wins named buffers shared between controllers
//! - [`run`]: dispatch a command and wait for its sentinel in one call
//!
//! Backends implement [`Multiplexer`]: [`TmuxMultiplexer`] for a real server
//! and [`MemoryMultiplexer`] for dry runs and tests.
//!
//! Nothing about the authority's state is cached; every read re-queries it.

pub mod address;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod memory;
pub mod mux;
pub mod observe;
pub mod run;
pub mod tmux;
pub mod wait;

pub use address::{AddressResolver, AmbientContext, PaneAddress, WindowRef};
pub use buffer::{BufferChannel, NamedBuffer};
pub use config::{
    AmbientConfig, AppConfig, CaptureConfig, ConfigLoader, TmuxConfig, WaitConfig,
};
pub use dispatch::{ControlKey, Dispatcher, UnknownKey};
pub use error::{
    BufferError, CaptureError, DispatchError, Error, LayoutError, LayoutFailure, NotFoundError,
    ParseError, ParseErrorKind, ResolveError, Result,
};
pub use layout::{EnvScope, EnvValue, LayoutEngine, LayoutPlan, LayoutStep, PaneRef};
pub use memory::MemoryMultiplexer;
pub use mux::{Multiplexer, PaneInfo, SplitDirection};
pub use observe::{CaptureRange, EndLine, Observer, PaneSnapshot, StartLine};
pub use run::{RunOutcome, Runner};
pub use tmux::{TmuxMultiplexer, TmuxSocket};
pub use wait::{CompletionCriterion, CompletionWaiter, WaitOptions, WaitOutcome, WaitState};
