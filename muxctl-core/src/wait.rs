//! Polling for command completion.
//!
//! There is no completion event to subscribe to, only repeated captures.
//! A waiter starts `Pending` and ends in exactly one of `Satisfied`,
//! `TimedOut` or `Cancelled`. Results are best effort: a marker can appear
//! by coincidence, and a job that finishes between two polls is only seen
//! through its effects.
//!
//! All timing goes through `tokio::time`, so tests drive it with a paused
//! clock.

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::address::PaneAddress;
use crate::error::CaptureError;
use crate::mux::Multiplexer;
use crate::observe::{CaptureRange, Observer, PaneSnapshot};

/// Default delay between captures
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default upper bound on a wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stand-in deadline for durations too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `base + offset`, saturating instead of overflowing
fn saturating_after(base: Instant, offset: Duration) -> Instant {
    base.checked_add(offset)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// What counts as "the command finished"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionCriterion {
    /// The pane's foreground process is one of these idle shells again
    ProcessNameReturnedToShell(Vec<String>),
    /// The captured text contains this string
    OutputContainsMarker(String),
    /// This much time has passed since the wait began
    FixedDelay(Duration),
}

impl CompletionCriterion {
    pub fn returned_to_shell(shell: impl Into<String>) -> Self {
        Self::ProcessNameReturnedToShell(vec![shell.into()])
    }

    pub fn marker(marker: impl Into<String>) -> Self {
        Self::OutputContainsMarker(marker.into())
    }

    /// Evaluate against the latest snapshot, `elapsed` after the wait began
    pub fn is_satisfied(&self, snapshot: &PaneSnapshot, elapsed: Duration) -> bool {
        match self {
            Self::ProcessNameReturnedToShell(shells) => {
                // Login shells show up as "-bash"
                let current = snapshot.current_command().trim_start_matches('-');
                shells.iter().any(|s| s == current)
            }
            Self::OutputContainsMarker(marker) => snapshot.contains(marker),
            Self::FixedDelay(delay) => elapsed >= *delay,
        }
    }
}

impl fmt::Display for CompletionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessNameReturnedToShell(shells) => {
                write!(f, "process returned to {}", shells.join("|"))
            }
            Self::OutputContainsMarker(marker) => write!(f, "output contains {:?}", marker),
            Self::FixedDelay(delay) => write!(f, "fixed delay of {:?}", delay),
        }
    }
}

/// Waiter state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Pending,
    Satisfied,
    TimedOut,
    Cancelled,
}

impl WaitState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Satisfied => "satisfied",
            Self::TimedOut => "timed out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Poll cadence, deadline and capture range for a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub range: CaptureRange,
}

impl WaitOptions {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
            range: CaptureRange::visible(),
        }
    }

    pub fn with_range(mut self, range: CaptureRange) -> Self {
        self.range = range;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT)
    }
}

/// Terminal result of a wait
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    pub state: WaitState,
    /// Last capture taken; `None` only when cancelled before the first poll
    pub snapshot: Option<PaneSnapshot>,
    pub elapsed: Duration,
    pub polls: u32,
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        self.state == WaitState::Satisfied
    }
}

/// Decides when a dispatched command has finished by polling its pane
pub struct CompletionWaiter<'a, M: ?Sized> {
    observer: Observer<'a, M>,
}

impl<'a, M: Multiplexer + ?Sized> CompletionWaiter<'a, M> {
    pub fn new(mux: &'a M) -> Self {
        Self {
            observer: Observer::new(mux),
        }
    }

    /// Poll `target` every `poll_interval` until `criterion` holds or
    /// `timeout` elapses
    pub async fn wait(
        &self,
        target: &PaneAddress,
        criterion: &CompletionCriterion,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<WaitOutcome, CaptureError> {
        let options = WaitOptions::new(poll_interval, timeout);
        self.wait_with(target, criterion, &options, &CancellationToken::new())
            .await
    }

    /// Like [`wait`](Self::wait), also ending early when `cancel` fires
    ///
    /// Cancelling only stops observation; the pane is left untouched.
    /// A pane that disappears mid-wait ends it with
    /// [`CaptureError::TargetNotFound`].
    pub async fn wait_with(
        &self,
        target: &PaneAddress,
        criterion: &CompletionCriterion,
        options: &WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, CaptureError> {
        let started = Instant::now();
        let deadline = saturating_after(started, options.timeout);
        let poll_interval = options.poll_interval.max(Duration::from_millis(1));

        let mut state = WaitState::Pending;
        let mut snapshot = None;
        let mut polls = 0u32;

        tracing::debug!(pane = %target, criterion = %criterion, timeout = ?options.timeout, "Waiting");

        while !state.is_terminal() {
            if cancel.is_cancelled() {
                state = WaitState::Cancelled;
                break;
            }

            let snap = self.observer.capture(target, &options.range).await?;
            polls += 1;
            let satisfied = criterion.is_satisfied(&snap, started.elapsed());
            snapshot = Some(snap);
            if satisfied {
                state = WaitState::Satisfied;
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                state = WaitState::TimedOut;
                break;
            }

            let mut wake = saturating_after(now, poll_interval).min(deadline);
            if let CompletionCriterion::FixedDelay(delay) = criterion {
                wake = wake.min(saturating_after(started, *delay));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => state = WaitState::Cancelled,
                _ = sleep_until(wake) => {}
            }
        }

        let elapsed = started.elapsed();
        if state == WaitState::Satisfied {
            tracing::debug!(pane = %target, polls, ?elapsed, "Wait satisfied");
        } else {
            tracing::info!(pane = %target, state = %state, polls, ?elapsed, "Wait ended unsatisfied");
        }

        Ok(WaitOutcome {
            state,
            snapshot,
            elapsed,
            polls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::dispatch::Dispatcher;
    use crate::memory::MemoryMultiplexer;

    async fn setup() -> (Arc<MemoryMultiplexer>, PaneAddress) {
        let mux = Arc::new(MemoryMultiplexer::new());
        mux.new_session("s", "w").await.unwrap();
        (mux, PaneAddress::parse("s:w.0").unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_wait_is_satisfied() {
        let (mux, addr) = setup().await;
        Dispatcher::new(mux.as_ref())
            .send_text(&addr, "echo DONE_MARKER_123", true)
            .await
            .unwrap();

        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::marker("DONE_MARKER_123"),
                Duration::from_millis(100),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, WaitState::Satisfied);
        assert!(outcome.snapshot.unwrap().contains("DONE_MARKER_123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_appearing_later() {
        let (mux, addr) = setup().await;
        let writer = {
            let mux = mux.clone();
            let addr = addr.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(350)).await;
                mux.append_output(&addr, "build finished").unwrap();
            })
        };

        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::marker("finished"),
                Duration::from_millis(100),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        writer.await.unwrap();

        assert!(outcome.is_satisfied());
        assert_eq!(outcome.elapsed, Duration::from_millis(400));
        assert_eq!(outcome.polls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let (mux, addr) = setup().await;
        mux.append_output(&addr, "partial output").unwrap();

        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::marker("NEVER_APPEARS"),
                Duration::from_millis(50),
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, WaitState::TimedOut);
        assert_eq!(outcome.elapsed, Duration::from_millis(200));
        assert_eq!(outcome.polls, 5);
        assert!(outcome.snapshot.unwrap().contains("partial output"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_not_multiple_of_interval() {
        let (mux, addr) = setup().await;
        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::marker("NEVER_APPEARS"),
                Duration::from_millis(300),
                Duration::from_millis(500),
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, WaitState::TimedOut);
        assert_eq!(outcome.elapsed, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_returned_to_shell() {
        let (mux, addr) = setup().await;
        mux.set_foreground(&addr, Some("cargo")).unwrap();
        let releaser = {
            let mux = mux.clone();
            let addr = addr.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                mux.set_foreground(&addr, None).unwrap();
            })
        };

        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::returned_to_shell("bash"),
                Duration::from_millis(100),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        releaser.await.unwrap();

        assert!(outcome.is_satisfied());
        assert_eq!(outcome.elapsed, Duration::from_millis(300));
        assert_eq!(outcome.snapshot.unwrap().current_command(), "bash");
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_shell_name() {
        let mux = MemoryMultiplexer::with_shell("-zsh");
        mux.new_session("s", "w").await.unwrap();
        let addr = PaneAddress::parse("s:w.0").unwrap();

        let outcome = CompletionWaiter::new(&mux)
            .wait(
                &addr,
                &CompletionCriterion::returned_to_shell("zsh"),
                Duration::from_millis(100),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(outcome.is_satisfied());
        assert_eq!(outcome.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay() {
        let (mux, addr) = setup().await;
        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::FixedDelay(Duration::from_millis(250)),
                Duration::from_millis(100),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert!(outcome.is_satisfied());
        assert_eq!(outcome.elapsed, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_longer_than_timeout() {
        let (mux, addr) = setup().await;
        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::FixedDelay(Duration::from_secs(10)),
                Duration::from_millis(100),
                Duration::from_millis(300),
            )
            .await
            .unwrap();
        assert_eq!(outcome.state, WaitState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let (mux, addr) = setup().await;
        mux.set_foreground(&addr, Some("sleep")).unwrap();
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(120)).await;
                cancel.cancel();
            })
        };

        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait_with(
                &addr,
                &CompletionCriterion::marker("NEVER_APPEARS"),
                &WaitOptions::new(Duration::from_millis(100), Duration::from_secs(60)),
                &cancel,
            )
            .await
            .unwrap();
        canceller.await.unwrap();

        assert_eq!(outcome.state, WaitState::Cancelled);
        assert_eq!(outcome.elapsed, Duration::from_millis(120));
        assert!(outcome.snapshot.is_some());
        // Cancelling must not touch the pane
        assert_eq!(mux.current_command(&addr).await.unwrap(), "sleep");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_durations_do_not_overflow() {
        let (mux, addr) = setup().await;
        mux.append_output(&addr, "READY").unwrap();
        let waiter = CompletionWaiter::new(mux.as_ref());

        // "Wait forever" still returns as soon as the criterion holds
        let outcome = waiter
            .wait(
                &addr,
                &CompletionCriterion::marker("READY"),
                Duration::from_millis(10),
                Duration::MAX,
            )
            .await
            .unwrap();
        assert_eq!(outcome.state, WaitState::Satisfied);

        let outcome = waiter
            .wait(
                &addr,
                &CompletionCriterion::FixedDelay(Duration::MAX),
                Duration::MAX,
                Duration::from_millis(200),
            )
            .await
            .unwrap();
        assert_eq!(outcome.state, WaitState::TimedOut);
        assert_eq!(outcome.elapsed, Duration::from_millis(200));

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };
        let outcome = waiter
            .wait_with(
                &addr,
                &CompletionCriterion::marker("NEVER_APPEARS"),
                &WaitOptions::new(Duration::MAX, Duration::MAX),
                &cancel,
            )
            .await
            .unwrap();
        canceller.await.unwrap();
        assert_eq!(outcome.state, WaitState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_poll() {
        let (mux, addr) = setup().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = CompletionWaiter::new(mux.as_ref())
            .wait_with(
                &addr,
                &CompletionCriterion::marker("x"),
                &WaitOptions::default(),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(outcome.state, WaitState::Cancelled);
        assert!(outcome.snapshot.is_none());
        assert_eq!(outcome.polls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pane_vanishing_mid_wait() {
        let (mux, addr) = setup().await;
        let killer = {
            let mux = mux.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                mux.kill_session("s").await.unwrap();
            })
        };

        let err = CompletionWaiter::new(mux.as_ref())
            .wait(
                &addr,
                &CompletionCriterion::marker("x"),
                Duration::from_millis(100),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        killer.await.unwrap();
        assert!(err.is_target_not_found());
    }

    #[test]
    fn test_criterion_display() {
        assert_eq!(
            CompletionCriterion::ProcessNameReturnedToShell(vec!["bash".into(), "zsh".into()])
                .to_string(),
            "process returned to bash|zsh"
        );
        assert_eq!(
            CompletionCriterion::marker("DONE").to_string(),
            "output contains \"DONE\""
        );
    }
}
