//! Declarative window provisioning.
//!
//! A [`LayoutPlan`] is an ordered list of steps. [`LayoutEngine::ensure_layout`]
//! applies it to a named window at most once: if the window already exists
//! its panes are returned untouched.
//!
//! Plans are usually written in TOML:
//!
//! ```toml
//! [[layouts.pair.steps]]
//! op = "split"
//! pane = 0
//! direction = "horizontal"
//! percent = 50
//!
//! [[layouts.pair.steps]]
//! op = "set_env"
//! key = "MUXCTL_PAIRED_PANE"
//! value = { pane = 1 }
//! ```

use std::collections::BTreeSet;
use std::fmt;

use muxctl_utils::MuxctlError;
use serde::{Deserialize, Serialize};

use crate::address::{PaneAddress, WindowRef};
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, LayoutError, LayoutFailure, NotFoundError};
use crate::mux::{Multiplexer, SplitDirection};

/// Share of the parent pane given to a split when none is specified
pub const DEFAULT_SPLIT_PERCENT: u8 = 50;

fn default_percent() -> u8 {
    DEFAULT_SPLIT_PERCENT
}

fn default_true() -> bool {
    true
}

/// A pane named inside a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaneRef {
    /// Pane index within the window being provisioned
    Index(u32),
    /// A pane outside it, such as the controller's own
    Address(PaneAddress),
}

impl fmt::Display for PaneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaneRef::Index(i) => write!(f, "pane {}", i),
            PaneRef::Address(addr) => write!(f, "{}", addr),
        }
    }
}

/// Where an environment binding lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvScope {
    #[default]
    Session,
    Global,
}

/// Value of an environment binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    /// Formatted address of a pane in the new window
    Pane { pane: u32 },
}

/// One provisioning step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LayoutStep {
    NewSession {
        session: String,
        window: String,
    },
    NewWindow {
        session: String,
        window: String,
    },
    Split {
        #[serde(default)]
        pane: u32,
        direction: SplitDirection,
        #[serde(default = "default_percent")]
        percent: u8,
    },
    SendKeys {
        pane: PaneRef,
        text: String,
        #[serde(default = "default_true")]
        enter: bool,
    },
    SetEnv {
        key: String,
        value: EnvValue,
        #[serde(default)]
        scope: EnvScope,
    },
}

impl LayoutStep {
    fn is_creation(&self) -> bool {
        matches!(self, Self::NewSession { .. } | Self::NewWindow { .. })
    }
}

impl fmt::Display for LayoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewSession { session, window } => {
                write!(f, "new session {} with window {}", session, window)
            }
            Self::NewWindow { session, window } => write!(f, "new window {}:{}", session, window),
            Self::Split {
                pane,
                direction,
                percent,
            } => write!(f, "split pane {} {:?} {}%", pane, direction, percent),
            Self::SendKeys { pane, .. } => write!(f, "send keys to {}", pane),
            Self::SetEnv { key, scope, .. } => write!(f, "set {:?} env {}", scope, key),
        }
    }
}

/// Ordered provisioning steps for one window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutPlan {
    #[serde(default)]
    pub steps: Vec<LayoutStep>,
}

impl LayoutPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: LayoutStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn split(self, pane: u32, direction: SplitDirection, percent: u8) -> Self {
        self.step(LayoutStep::Split {
            pane,
            direction,
            percent,
        })
    }

    pub fn send_keys(self, pane: impl Into<PaneRef>, text: impl Into<String>, enter: bool) -> Self {
        self.step(LayoutStep::SendKeys {
            pane: pane.into(),
            text: text.into(),
            enter,
        })
    }

    pub fn set_env(self, key: impl Into<String>, value: EnvValue) -> Self {
        self.step(LayoutStep::SetEnv {
            key: key.into(),
            value,
            scope: EnvScope::Session,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check step arguments that do not depend on live state
    pub fn validate(&self) -> Result<(), LayoutError> {
        for (i, step) in self.steps.iter().enumerate() {
            if let LayoutStep::Split { percent, .. } = step {
                if !(1..=99).contains(percent) {
                    return Err(LayoutError::at(
                        i,
                        step.to_string(),
                        LayoutFailure::InvalidStep(format!(
                            "split percent {} is outside 1..=99",
                            percent
                        )),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl From<u32> for PaneRef {
    fn from(index: u32) -> Self {
        PaneRef::Index(index)
    }
}

impl From<PaneAddress> for PaneRef {
    fn from(addr: PaneAddress) -> Self {
        PaneRef::Address(addr)
    }
}

/// Applies [`LayoutPlan`]s against a [`Multiplexer`]
pub struct LayoutEngine<'a, M: ?Sized> {
    mux: &'a M,
}

impl<'a, M: Multiplexer + ?Sized> LayoutEngine<'a, M> {
    pub fn new(mux: &'a M) -> Self {
        Self { mux }
    }

    /// Prepend the step that creates the target window
    ///
    /// Leading creation steps already in `plan` must name the same target
    /// and are folded into the derived one; creation steps anywhere else
    /// are rejected. Error step indices refer to `plan` as given.
    pub fn compile(
        session: &str,
        window: &str,
        plan: &LayoutPlan,
        session_exists: bool,
    ) -> Result<Vec<LayoutStep>, LayoutError> {
        plan.validate()?;

        let leading = plan.steps.iter().take_while(|s| s.is_creation()).count();
        for (i, step) in plan.steps.iter().enumerate() {
            let names_target = match step {
                LayoutStep::NewSession { session: s, window: w }
                | LayoutStep::NewWindow { session: s, window: w } => s == session && w == window,
                _ => continue,
            };
            if i >= leading || !names_target {
                return Err(LayoutError::at(
                    i,
                    step.to_string(),
                    LayoutFailure::InvalidStep(format!(
                        "only the target window {}:{} may be created, before any other step",
                        session, window
                    )),
                ));
            }
        }

        let create = if session_exists {
            LayoutStep::NewWindow {
                session: session.to_string(),
                window: window.to_string(),
            }
        } else {
            LayoutStep::NewSession {
                session: session.to_string(),
                window: window.to_string(),
            }
        };
        let mut compiled = Vec::with_capacity(plan.len() + 1 - leading);
        compiled.push(create);
        compiled.extend(plan.steps[leading..].iter().cloned());
        Ok(compiled)
    }

    /// Make sure `session:window` exists, provisioning it with `plan` if not
    ///
    /// Returns the window's pane addresses ordered by pane index. When the
    /// window already exists nothing is sent or created. A failing step
    /// aborts the call; whatever earlier steps created is left in place.
    pub async fn ensure_layout(
        &self,
        session: &str,
        window: &str,
        plan: &LayoutPlan,
    ) -> Result<Vec<PaneAddress>, LayoutError> {
        PaneAddress::new(session, WindowRef::Name(window.to_string()), 0).map_err(|e| {
            LayoutError::before_steps("check names", LayoutFailure::InvalidStep(e.to_string()))
        })?;

        let existing = self
            .window_panes(session, window)
            .await
            .map_err(|e| LayoutError::before_steps("list panes", e))?;
        if !existing.is_empty() {
            tracing::info!(session, window, panes = existing.len(), "Layout already present");
            return Ok(existing);
        }

        let session_exists = self
            .mux
            .has_session(session)
            .await
            .map_err(|e| LayoutError::before_steps("check session", e))?;
        let steps = Self::compile(session, window, plan, session_exists)?;

        tracing::info!(session, window, steps = steps.len(), "Provisioning layout");

        let mut created = BTreeSet::new();
        for (i, step) in steps.iter().enumerate() {
            if let Some(panes) = self
                .apply(session, window, step, &mut created)
                .await
                .map_err(|reason| LayoutError::at(i, step.to_string(), reason))?
            {
                // Someone else provisioned the window first
                return Ok(panes);
            }
        }

        self.window_panes(session, window)
            .await
            .map_err(|e| LayoutError::before_steps("list panes", e))
    }

    /// Run one step; `Some` ends provisioning early with those panes
    async fn apply(
        &self,
        session: &str,
        window: &str,
        step: &LayoutStep,
        created: &mut BTreeSet<u32>,
    ) -> Result<Option<Vec<PaneAddress>>, LayoutFailure> {
        match step {
            LayoutStep::NewSession { .. } => {
                match self.mux.new_session(session, window).await {
                    Ok(()) => {}
                    Err(MuxctlError::SessionExists(_)) => {
                        tracing::warn!(session, "Session appeared concurrently");
                        let panes = self.window_panes(session, window).await?;
                        if !panes.is_empty() {
                            return Ok(Some(panes));
                        }
                        self.new_window(session, window).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
                self.record_window(session, window, created).await?;
            }
            LayoutStep::NewWindow { .. } => {
                self.new_window(session, window).await?;
                self.record_window(session, window, created).await?;
            }
            LayoutStep::Split {
                pane,
                direction,
                percent,
            } => {
                let parent = self.created_pane(session, window, *pane, created)?;
                let new = self
                    .mux
                    .split_pane(&parent, *direction, *percent)
                    .await
                    .map_err(|e| LayoutFailure::or_missing(e, NotFoundError::Pane(parent.clone())))?;
                tracing::debug!(parent = %parent, new, "Split pane");
                created.insert(new);
            }
            LayoutStep::SendKeys { pane, text, enter } => {
                let target = match pane {
                    PaneRef::Index(i) => self.created_pane(session, window, *i, created)?,
                    PaneRef::Address(addr) => addr.clone(),
                };
                Dispatcher::new(self.mux)
                    .send_text(&target, text, *enter)
                    .await
                    .map_err(|e| match e {
                        DispatchError::TargetNotFound(addr) => NotFoundError::Pane(addr).into(),
                        DispatchError::Backend(e) => LayoutFailure::Backend(e),
                    })?;
            }
            LayoutStep::SetEnv { key, value, scope } => {
                let value = match value {
                    EnvValue::Literal(s) => s.clone(),
                    EnvValue::Pane { pane } => {
                        self.created_pane(session, window, *pane, created)?.to_string()
                    }
                };
                let scope = match scope {
                    EnvScope::Session => Some(session),
                    EnvScope::Global => None,
                };
                self.mux
                    .set_environment(scope, key, &value)
                    .await
                    .map_err(|e| LayoutFailure::or_missing(e, NotFoundError::Session(session.to_string())))?;
            }
        }
        Ok(None)
    }

    async fn new_window(&self, session: &str, window: &str) -> Result<(), LayoutFailure> {
        self.mux
            .new_window(session, window)
            .await
            .map_err(|e| LayoutFailure::or_missing(e, NotFoundError::Session(session.to_string())))
    }

    async fn record_window(
        &self,
        session: &str,
        window: &str,
        created: &mut BTreeSet<u32>,
    ) -> Result<(), LayoutFailure> {
        let panes = self.window_panes(session, window).await?;
        if panes.is_empty() {
            return Err(NotFoundError::Window {
                session: session.to_string(),
                window: window.to_string(),
            }
            .into());
        }
        created.extend(panes.iter().map(PaneAddress::pane));
        Ok(())
    }

    fn created_pane(
        &self,
        session: &str,
        window: &str,
        pane: u32,
        created: &BTreeSet<u32>,
    ) -> Result<PaneAddress, LayoutFailure> {
        if !created.contains(&pane) {
            return Err(LayoutFailure::UnknownPane(pane));
        }
        PaneAddress::new(session, WindowRef::Name(window.to_string()), pane)
            .map_err(|e| LayoutFailure::InvalidStep(e.to_string()))
    }

    /// Panes of the lowest-indexed window named `window`, by pane index
    async fn window_panes(
        &self,
        session: &str,
        window: &str,
    ) -> Result<Vec<PaneAddress>, MuxctlError> {
        let panes = match self.mux.list_panes(Some(session)).await {
            Ok(panes) => panes,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let Some(first) = panes
            .iter()
            .filter(|p| p.window_name == window)
            .map(|p| p.window_index)
            .min()
        else {
            return Ok(Vec::new());
        };

        let mut indices: Vec<u32> = panes
            .iter()
            .filter(|p| p.window_index == first)
            .map(|p| p.pane_index)
            .collect();
        indices.sort_unstable();

        indices
            .into_iter()
            .map(|i| {
                PaneAddress::new(session, WindowRef::Name(window.to_string()), i)
                    .map_err(|e| MuxctlError::unexpected_output(e.to_string()))
            })
            .collect()
    }
}
