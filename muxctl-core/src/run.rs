//! Run a shell command in a pane and wait for it to finish.
//!
//! The command is typed untouched and submitted, then an `echo` of a fresh
//! sentinel follows as its own line. The shell reads that line once the
//! command returns, whatever the command ends with (`&`, `;`, a comment).
//! The sentinel is typed split in two quoted halves, so the echoed line
//! never contains it and only the `echo` output can satisfy the wait.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::address::PaneAddress;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::mux::Multiplexer;
use crate::wait::{CompletionCriterion, CompletionWaiter, WaitOptions, WaitOutcome};

const MARKER_PREFIX: &str = "__muxctl_done_";

/// Where the sentinel is cut in two on the typed line
const SPLIT_AT: usize = 10;

/// Result of [`Runner::run`]
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub command: String,
    pub marker: String,
    pub wait: WaitOutcome,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.wait.is_satisfied()
    }

    /// Captured lines preceding the sentinel
    ///
    /// Empty when the sentinel was never seen.
    pub fn output_lines(&self) -> Vec<&str> {
        let Some(snapshot) = &self.wait.snapshot else {
            return Vec::new();
        };
        let lines = snapshot.lines();
        let Some(end) = lines.iter().rposition(|l| l.contains(&self.marker)) else {
            return Vec::new();
        };
        // Output sits between the typed command and the typed sentinel line
        let typed = format!("'{}''", self.marker.get(..SPLIT_AT).unwrap_or(&self.marker));
        let echo_at = lines[..end]
            .iter()
            .rposition(|l| l.contains(&typed))
            .unwrap_or(end);
        let start = lines[..echo_at]
            .iter()
            .rposition(|l| l.contains(self.command.as_str()))
            .map(|i| i + 1)
            .unwrap_or(0);
        lines[start..echo_at]
            .iter()
            .filter(|l| !l.contains(&typed))
            .map(String::as_str)
            .collect()
    }
}

fn new_marker() -> String {
    format!("{}{}", MARKER_PREFIX, Uuid::new_v4().simple())
}

/// `echo 'first''second'`, which prints the marker unbroken
fn sentinel_line(marker: &str) -> String {
    let (head, tail) = marker.split_at(SPLIT_AT);
    format!("echo '{}''{}'", head, tail)
}

/// Dispatch-then-wait helper built on [`Dispatcher`] and [`CompletionWaiter`]
pub struct Runner<'a, M: ?Sized> {
    mux: &'a M,
}

impl<'a, M: Multiplexer + ?Sized> Runner<'a, M> {
    pub fn new(mux: &'a M) -> Self {
        Self { mux }
    }

    /// Type `command` into `target`, press Enter, and wait for its sentinel
    pub async fn run(
        &self,
        target: &PaneAddress,
        command: &str,
        options: &WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, Error> {
        let marker = new_marker();
        let dispatcher = Dispatcher::new(self.mux);
        dispatcher.send_text(target, command, true).await?;
        dispatcher
            .send_text(target, &sentinel_line(&marker), true)
            .await?;

        let criterion = CompletionCriterion::OutputContainsMarker(marker.clone());
        let wait = CompletionWaiter::new(self.mux)
            .wait_with(target, &criterion, options, cancel)
            .await?;

        tracing::debug!(pane = %target, state = %wait.state, "Run finished");
        Ok(RunOutcome {
            command: command.to_string(),
            marker,
            wait,
        })
    }
}
