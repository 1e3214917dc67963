//! Pane observation: point-in-time text snapshots.
//!
//! A [`PaneSnapshot`] is immutable once produced. Two captures of a busy
//! pane are unrelated values; callers that need a diff compute it from two
//! snapshots themselves.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::address::PaneAddress;
use crate::error::CaptureError;
use crate::mux::Multiplexer;

/// First line of a capture
///
/// Non-negative lines count down from the first visible line. Negative
/// lines count back from the bottom of the pane: `Line(-50)` is 50 lines
/// before the bottom, reaching into the scrollback when the pane is shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLine {
    Line(i64),
    /// Oldest retained scrollback line
    HistoryStart,
}

/// Last line of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndLine {
    Line(i64),
    /// Bottom of the pane
    End,
}

/// Window into a pane's scrollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRange {
    pub start: StartLine,
    pub end: EndLine,
}

impl CaptureRange {
    pub fn new(start: StartLine, end: EndLine) -> Self {
        Self { start, end }
    }

    /// The visible screen
    pub fn visible() -> Self {
        Self::new(StartLine::Line(0), EndLine::End)
    }

    /// The last `lines` lines through the bottom of the pane
    pub fn last_lines(lines: u32) -> Self {
        Self::new(StartLine::Line(-i64::from(lines)), EndLine::End)
    }

    /// All retained scrollback through the bottom of the pane
    pub fn full() -> Self {
        Self::new(StartLine::HistoryStart, EndLine::End)
    }
}

impl CaptureRange {
    /// Whether either bound is counted from the bottom of the pane
    pub fn is_bottom_relative(&self) -> bool {
        matches!(self.start, StartLine::Line(n) if n < 0)
            || matches!(self.end, EndLine::Line(n) if n < 0)
    }
}

impl Default for CaptureRange {
    fn default() -> Self {
        Self::visible()
    }
}

/// Immutable capture of a pane's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneSnapshot {
    address: PaneAddress,
    captured_at: u64,
    lines: Vec<String>,
    current_command: String,
}

impl PaneSnapshot {
    pub(crate) fn new(
        address: PaneAddress,
        captured_at: u64,
        text: &str,
        current_command: String,
    ) -> Self {
        Self {
            address,
            captured_at,
            lines: text.lines().map(str::to_string).collect(),
            current_command,
        }
    }

    pub fn address(&self) -> &PaneAddress {
        &self.address
    }

    /// Logical capture time; strictly increasing per [`Observer`]
    pub fn captured_at(&self) -> u64 {
        self.captured_at
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Foreground process of the pane when captured
    pub fn current_command(&self) -> &str {
        &self.current_command
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.lines.iter().any(|l| l.contains(pattern))
    }

    pub fn last_non_empty_line(&self) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .map(|l| l.trim_end())
            .find(|l| !l.is_empty())
    }
}

/// Captures pane text through a [`Multiplexer`]
pub struct Observer<'a, M: ?Sized> {
    mux: &'a M,
    clock: AtomicU64,
}

impl<'a, M: Multiplexer + ?Sized> Observer<'a, M> {
    pub fn new(mux: &'a M) -> Self {
        Self {
            mux,
            clock: AtomicU64::new(0),
        }
    }

    /// Capture the pane's text within `range` along with its foreground process
    pub async fn capture(
        &self,
        addr: &PaneAddress,
        range: &CaptureRange,
    ) -> Result<PaneSnapshot, CaptureError> {
        let text = self
            .mux
            .capture(addr, range)
            .await
            .map_err(|e| CaptureError::from_backend(addr, e))?;
        let command = self.current_command_name(addr).await?;
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::trace!(address = %addr, tick, lines = text.lines().count(), "Captured pane");
        Ok(PaneSnapshot::new(addr.clone(), tick, &text, command))
    }

    /// Name of the pane's foreground process
    ///
    /// A heuristic: the process may be unrelated to anything this controller
    /// dispatched.
    pub async fn current_command_name(&self, addr: &PaneAddress) -> Result<String, CaptureError> {
        self.mux
            .current_command(addr)
            .await
            .map_err(|e| CaptureError::from_backend(addr, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMultiplexer;

    async fn setup() -> (MemoryMultiplexer, PaneAddress) {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        (mux, PaneAddress::parse("s:w.0").unwrap())
    }

    #[test]
    fn snapshot_helpers() {
        let snap = PaneSnapshot::new(
            PaneAddress::parse("s:w.0").unwrap(),
            1,
            "$ make\nbuilding\n\n   \n",
            "make".into(),
        );
        assert_eq!(snap.lines().len(), 4);
        assert!(snap.contains("build"));
        assert_eq!(snap.last_non_empty_line(), Some("building"));
        assert_eq!(snap.text(), "$ make\nbuilding\n\n   ");
    }

    #[test]
    fn range_constructors() {
        assert_eq!(CaptureRange::default(), CaptureRange::visible());
        assert_eq!(CaptureRange::last_lines(50).start, StartLine::Line(-50));
        assert!(CaptureRange::last_lines(50).is_bottom_relative());
        assert!(!CaptureRange::visible().is_bottom_relative());
        assert!(!CaptureRange::full().is_bottom_relative());
        assert_eq!(CaptureRange::full().start, StartLine::HistoryStart);
    }

    #[tokio::test]
    async fn capture_reports_text_and_command() {
        let (mux, addr) = setup().await;
        mux.append_output(&addr, "hello").unwrap();
        mux.set_foreground(&addr, Some("vim")).unwrap();

        let observer = Observer::new(&mux);
        let snap = observer.capture(&addr, &CaptureRange::visible()).await.unwrap();
        assert!(snap.contains("hello"));
        assert_eq!(snap.current_command(), "vim");
        assert_eq!(snap.address(), &addr);
    }

    #[tokio::test]
    async fn captures_are_independent_and_ordered() {
        let (mux, addr) = setup().await;
        let observer = Observer::new(&mux);

        let first = observer.capture(&addr, &CaptureRange::visible()).await.unwrap();
        mux.append_output(&addr, "later").unwrap();
        let second = observer.capture(&addr, &CaptureRange::visible()).await.unwrap();

        assert!(second.captured_at() > first.captured_at());
        assert!(!first.contains("later"));
        assert!(second.contains("later"));
    }

    #[tokio::test]
    async fn capture_scrollback_window() {
        let (mux, addr) = setup().await;
        for i in 0..40 {
            mux.append_output(&addr, &format!("line {}", i)).unwrap();
        }
        let observer = Observer::new(&mux);

        let visible = observer.capture(&addr, &CaptureRange::visible()).await.unwrap();
        assert!(!visible.contains("line 0"));
        assert_eq!(visible.lines().len(), 24);

        let full = observer.capture(&addr, &CaptureRange::full()).await.unwrap();
        assert!(full.contains("line 0"));
        assert!(full.contains("line 39"));

        let tail = observer
            .capture(&addr, &CaptureRange::last_lines(5))
            .await
            .unwrap();
        assert_eq!(tail.lines().len(), 5);
    }

    #[tokio::test]
    async fn negative_lines_count_from_the_bottom() {
        let (mux, addr) = setup().await;
        for i in 0..100 {
            mux.append_output(&addr, &format!("line {}", i)).unwrap();
        }
        let observer = Observer::new(&mux);

        // Taller than the 24-row pane: reaches into the scrollback
        let snap = observer
            .capture(&addr, &CaptureRange::new(StartLine::Line(-50), EndLine::End))
            .await
            .unwrap();
        assert_eq!(snap.lines().len(), 50);
        assert_eq!(snap.lines()[0], "line 51");
        assert_eq!(snap.lines()[49], "$ ");

        // Both bounds bottom-relative: -1 is the last line
        let snap = observer
            .capture(&addr, &CaptureRange::new(StartLine::Line(-3), EndLine::Line(-2)))
            .await
            .unwrap();
        assert_eq!(snap.lines(), ["line 98", "line 99"]);

        // Positive lines still count from the first visible line
        let snap = observer
            .capture(&addr, &CaptureRange::new(StartLine::Line(0), EndLine::Line(0)))
            .await
            .unwrap();
        assert_eq!(snap.lines(), ["line 77"]);
    }

    #[tokio::test]
    async fn capture_missing_pane_is_target_not_found() {
        let (mux, _) = setup().await;
        let observer = Observer::new(&mux);
        let gone = PaneAddress::parse("s:w.9").unwrap();

        let err = observer.capture(&gone, &CaptureRange::visible()).await.unwrap_err();
        assert!(err.is_target_not_found());
        let err = observer.current_command_name(&gone).await.unwrap_err();
        assert!(err.is_target_not_found());
    }
}
