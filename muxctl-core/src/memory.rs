//! In-memory multiplexer.
//!
//! A deterministic stand-in for a real server: sessions, windows and panes
//! with split geometry, a tiny line shell per pane, environments and named
//! buffers. Used for `--dry-run` and throughout the test-suite.
//!
//! The shell understands `echo ARGS` (quotes are dropped, so `'a''b'`
//! prints `ab`) and `;`-separated sequences; anything else prints a
//! "command not found" line. Tests change a pane's foreground process with
//! [`MemoryMultiplexer::set_foreground`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use muxctl_utils::{MuxctlError, Result};
use parking_lot::Mutex;

use crate::address::{PaneAddress, WindowRef};
use crate::mux::{Multiplexer, PaneInfo, SplitDirection};
use crate::observe::{CaptureRange, EndLine, StartLine};

const DEFAULT_WIDTH: u16 = 80;
const DEFAULT_HEIGHT: u16 = 24;
const PROMPT: &str = "$ ";

#[derive(Debug)]
struct Pane {
    index: u32,
    width: u16,
    height: u16,
    left: u16,
    top: u16,
    foreground: Option<String>,
    history: Vec<String>,
    input: String,
}

impl Pane {
    fn new(index: u32, left: u16, top: u16, width: u16, height: u16) -> Self {
        Self {
            index,
            width,
            height,
            left,
            top,
            foreground: None,
            history: Vec::new(),
            input: String::new(),
        }
    }

    /// History, the prompt line, then blank rows filling the screen
    fn screen(&self) -> Vec<String> {
        let mut lines = self.history.clone();
        lines.push(format!("{}{}", PROMPT, self.input));
        while lines.len() < usize::from(self.height) {
            lines.push(String::new());
        }
        lines
    }

    fn press_enter(&mut self) {
        let line = std::mem::take(&mut self.input);
        self.history.push(format!("{}{}", PROMPT, line));
        if self.foreground.is_some() {
            return;
        }
        for command in line.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            match command.split_once(char::is_whitespace) {
                Some(("echo", args)) => self.history.push(unquote(args.trim())),
                None if command == "echo" => self.history.push(String::new()),
                _ => {
                    let name = command.split_whitespace().next().unwrap_or(command);
                    self.history.push(format!("sh: {}: command not found", name));
                }
            }
        }
    }

    fn interrupt(&mut self) {
        let line = std::mem::take(&mut self.input);
        self.history.push(format!("{}{}^C", PROMPT, line));
        self.foreground = None;
    }
}

fn unquote(s: &str) -> String {
    s.chars().filter(|c| *c != '\'' && *c != '"').collect()
}

#[derive(Debug)]
struct Window {
    index: u32,
    name: String,
    panes: Vec<Pane>,
}

#[derive(Debug)]
struct Session {
    name: String,
    windows: Vec<Window>,
    env: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    sessions: Vec<Session>,
    global_env: BTreeMap<String, String>,
    buffers: BTreeMap<String, Vec<u8>>,
}

impl State {
    fn session(&self, name: &str) -> Result<&Session> {
        self.sessions
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| MuxctlError::SessionNotFound(name.to_string()))
    }

    fn session_mut(&mut self, name: &str) -> Result<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| MuxctlError::SessionNotFound(name.to_string()))
    }

    fn pane_mut(&mut self, addr: &PaneAddress) -> Result<&mut Pane> {
        let session = self.session_mut(addr.session())?;
        let window = find_window_mut(session, addr.window())
            .ok_or_else(|| MuxctlError::WindowNotFound(format!("{}:{}", addr.session(), addr.window())))?;
        window
            .panes
            .iter_mut()
            .find(|p| p.index == addr.pane())
            .ok_or_else(|| MuxctlError::PaneNotFound(addr.to_string()))
    }

    fn pane(&self, addr: &PaneAddress) -> Result<&Pane> {
        let session = self.session(addr.session())?;
        let window = session
            .windows
            .iter()
            .find(|w| window_matches(w, addr.window()))
            .ok_or_else(|| MuxctlError::WindowNotFound(format!("{}:{}", addr.session(), addr.window())))?;
        window
            .panes
            .iter()
            .find(|p| p.index == addr.pane())
            .ok_or_else(|| MuxctlError::PaneNotFound(addr.to_string()))
    }

    fn env_mut(&mut self, session: Option<&str>) -> Result<&mut BTreeMap<String, String>> {
        match session {
            Some(name) => Ok(&mut self.session_mut(name)?.env),
            None => Ok(&mut self.global_env),
        }
    }
}

fn window_matches(window: &Window, target: &WindowRef) -> bool {
    match target {
        WindowRef::Index(i) => window.index == *i,
        WindowRef::Name(n) => &window.name == n,
    }
}

fn find_window_mut<'s>(session: &'s mut Session, target: &WindowRef) -> Option<&'s mut Window> {
    session.windows.iter_mut().find(|w| window_matches(w, target))
}

fn fresh_window(index: u32, name: &str) -> Window {
    Window {
        index,
        name: name.to_string(),
        panes: vec![Pane::new(0, 0, 0, DEFAULT_WIDTH, DEFAULT_HEIGHT)],
    }
}

/// Map a capture bound onto an absolute line index into `screen`
///
/// Negative lines count back from the bottom.
fn resolve_line(visible_top: usize, line: i64, len: usize) -> i64 {
    let absolute = if line < 0 {
        len as i64 + line
    } else {
        visible_top as i64 + line
    };
    absolute.clamp(0, len as i64 - 1)
}

/// In-memory [`Multiplexer`]
#[derive(Debug)]
pub struct MemoryMultiplexer {
    state: Mutex<State>,
    shell: String,
}

impl MemoryMultiplexer {
    pub fn new() -> Self {
        Self::with_shell("bash")
    }

    /// Use `shell` as every pane's idle foreground process name
    pub fn with_shell(shell: &str) -> Self {
        Self {
            state: Mutex::new(State::default()),
            shell: shell.to_string(),
        }
    }

    /// Pretend a job took over (or, with `None`, released) the pane
    pub fn set_foreground(&self, addr: &PaneAddress, command: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        state.pane_mut(addr)?.foreground = command.map(str::to_string);
        Ok(())
    }

    /// Append a line of program output to the pane
    pub fn append_output(&self, addr: &PaneAddress, line: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.pane_mut(addr)?.history.push(line.to_string());
        Ok(())
    }

    /// Text typed into the pane but not yet submitted
    pub fn pending_input(&self, addr: &PaneAddress) -> Result<String> {
        let state = self.state.lock();
        Ok(state.pane(addr)?.input.clone())
    }

    /// Number of windows named `name` in `session`
    pub fn window_count(&self, session: &str, name: &str) -> usize {
        let state = self.state.lock();
        state
            .session(session)
            .map(|s| s.windows.iter().filter(|w| w.name == name).count())
            .unwrap_or(0)
    }
}

impl Default for MemoryMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Multiplexer for MemoryMultiplexer {
    async fn has_session(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().session(name).is_ok())
    }

    async fn new_session(&self, name: &str, first_window: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.session(name).is_ok() {
            return Err(MuxctlError::SessionExists(name.to_string()));
        }
        state.sessions.push(Session {
            name: name.to_string(),
            windows: vec![fresh_window(0, first_window)],
            env: BTreeMap::new(),
        });
        Ok(())
    }

    async fn new_window(&self, session: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let session = state.session_mut(session)?;
        let index = session
            .windows
            .iter()
            .map(|w| w.index + 1)
            .max()
            .unwrap_or(0);
        session.windows.push(fresh_window(index, name));
        Ok(())
    }

    async fn split_pane(
        &self,
        target: &PaneAddress,
        direction: SplitDirection,
        percent: u8,
    ) -> Result<u32> {
        let mut state = self.state.lock();
        let session = state.session_mut(target.session())?;
        let window = find_window_mut(session, target.window()).ok_or_else(|| {
            MuxctlError::WindowNotFound(format!("{}:{}", target.session(), target.window()))
        })?;
        let next_index = window.panes.iter().map(|p| p.index + 1).max().unwrap_or(0);
        let parent = window
            .panes
            .iter_mut()
            .find(|p| p.index == target.pane())
            .ok_or_else(|| MuxctlError::PaneNotFound(target.to_string()))?;

        // One cell of the parent goes to the separator line.
        let percent = u32::from(percent.clamp(1, 99));
        let child = match direction {
            SplitDirection::Horizontal => {
                let total = u32::from(parent.width);
                let size = (total * percent / 100).max(1);
                if total < size + 2 {
                    return Err(MuxctlError::CommandFailed {
                        command: "split-window".into(),
                        code: Some(1),
                        stderr: "no space for new pane".into(),
                    });
                }
                parent.width = (total - size - 1) as u16;
                Pane::new(
                    next_index,
                    parent.left + parent.width + 1,
                    parent.top,
                    size as u16,
                    parent.height,
                )
            }
            SplitDirection::Vertical => {
                let total = u32::from(parent.height);
                let size = (total * percent / 100).max(1);
                if total < size + 2 {
                    return Err(MuxctlError::CommandFailed {
                        command: "split-window".into(),
                        code: Some(1),
                        stderr: "no space for new pane".into(),
                    });
                }
                parent.height = (total - size - 1) as u16;
                Pane::new(
                    next_index,
                    parent.left,
                    parent.top + parent.height + 1,
                    parent.width,
                    size as u16,
                )
            }
        };
        window.panes.push(child);
        Ok(next_index)
    }

    async fn list_panes(&self, session: Option<&str>) -> Result<Vec<PaneInfo>> {
        let state = self.state.lock();
        let sessions: Vec<&Session> = match session {
            Some(name) => vec![state.session(name)?],
            None => state.sessions.iter().collect(),
        };

        let mut panes = Vec::new();
        for s in sessions {
            let mut windows: Vec<&Window> = s.windows.iter().collect();
            windows.sort_by_key(|w| w.index);
            for w in windows {
                let mut ordered: Vec<&Pane> = w.panes.iter().collect();
                ordered.sort_by_key(|p| p.index);
                for (i, p) in ordered.iter().enumerate() {
                    panes.push(PaneInfo {
                        session: s.name.clone(),
                        window_index: w.index,
                        window_name: w.name.clone(),
                        pane_index: p.index,
                        current_command: p.foreground.clone().unwrap_or_else(|| self.shell.clone()),
                        width: p.width,
                        height: p.height,
                        left: p.left,
                        top: p.top,
                        active: i == 0,
                    });
                }
            }
        }
        Ok(panes)
    }

    async fn send_literal(&self, target: &PaneAddress, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        let pane = state.pane_mut(target)?;
        for c in text.chars() {
            if c == '\n' || c == '\r' {
                pane.press_enter();
            } else {
                pane.input.push(c);
            }
        }
        Ok(())
    }

    async fn send_key(&self, target: &PaneAddress, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        let pane = state.pane_mut(target)?;
        match key {
            "Enter" | "C-m" => pane.press_enter(),
            "C-c" => pane.interrupt(),
            "BSpace" => {
                pane.input.pop();
            }
            "C-u" => pane.input.clear(),
            "C-l" => pane.history.clear(),
            "Tab" => pane.input.push('\t'),
            "Space" => pane.input.push(' '),
            // Cursor movement and other control keys do not change the toy shell
            _ => {}
        }
        Ok(())
    }

    async fn capture(&self, target: &PaneAddress, range: &CaptureRange) -> Result<String> {
        let state = self.state.lock();
        let pane = state.pane(target)?;
        let screen = pane.screen();
        let visible_top = screen.len() - usize::from(pane.height);

        let start = match range.start {
            StartLine::HistoryStart => 0,
            StartLine::Line(n) => resolve_line(visible_top, n, screen.len()),
        };
        let end = match range.end {
            EndLine::End => screen.len() as i64 - 1,
            EndLine::Line(n) => resolve_line(visible_top, n, screen.len()),
        };
        if start > end {
            return Ok(String::new());
        }

        let mut out = String::new();
        for line in &screen[start as usize..=end as usize] {
            out.push_str(line);
            out.push('\n');
        }
        Ok(out)
    }

    async fn current_command(&self, target: &PaneAddress) -> Result<String> {
        let state = self.state.lock();
        let pane = state.pane(target)?;
        Ok(pane.foreground.clone().unwrap_or_else(|| self.shell.clone()))
    }

    async fn set_environment(&self, session: Option<&str>, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.env_mut(session)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn show_environment(&self, session: Option<&str>, key: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        Ok(state.env_mut(session)?.get(key).cloned())
    }

    async fn set_buffer(&self, name: &str, payload: &[u8]) -> Result<()> {
        self.state
            .lock()
            .buffers
            .insert(name.to_string(), payload.to_vec());
        Ok(())
    }

    async fn show_buffer(&self, name: &str) -> Result<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .get(name)
            .cloned()
            .ok_or_else(|| MuxctlError::BufferNotFound(name.to_string()))
    }

    async fn delete_buffer(&self, name: &str) -> Result<()> {
        self.state
            .lock()
            .buffers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| MuxctlError::BufferNotFound(name.to_string()))
    }

    async fn list_buffers(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().buffers.keys().cloned().collect())
    }

    async fn kill_window(&self, session: &str, window: &WindowRef) -> Result<()> {
        let mut state = self.state.lock();
        let s = state.session_mut(session)?;
        let before = s.windows.len();
        s.windows.retain(|w| !window_matches(w, window));
        if s.windows.len() == before {
            return Err(MuxctlError::WindowNotFound(format!("{}:{}", session, window)));
        }
        if s.windows.is_empty() {
            state.sessions.retain(|x| x.name != session);
        }
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.name != name);
        if state.sessions.len() == before {
            return Err(MuxctlError::SessionNotFound(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PaneAddress {
        PaneAddress::parse(s).unwrap()
    }

    #[tokio::test]
    async fn new_session_creates_first_window() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "main").await.unwrap();
        assert!(mux.has_session("s").await.unwrap());
        assert!(!mux.has_session("S").await.unwrap());

        let panes = mux.list_panes(Some("s")).await.unwrap();
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].window_name, "main");
        assert_eq!((panes[0].width, panes[0].height), (80, 24));
    }

    #[tokio::test]
    async fn duplicate_session_is_rejected() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "main").await.unwrap();
        let err = mux.new_session("s", "other").await.unwrap_err();
        assert!(matches!(err, MuxctlError::SessionExists(_)));
    }

    #[tokio::test]
    async fn windows_get_next_index() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "a").await.unwrap();
        mux.new_window("s", "b").await.unwrap();
        let panes = mux.list_panes(Some("s")).await.unwrap();
        assert_eq!(panes[1].window_index, 1);
        assert_eq!(panes[1].window_name, "b");
        assert!(matches!(
            mux.new_window("nope", "c").await.unwrap_err(),
            MuxctlError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn horizontal_split_geometry() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        let new = mux
            .split_pane(&addr("s:w.0"), SplitDirection::Horizontal, 25)
            .await
            .unwrap();
        assert_eq!(new, 1);

        let panes = mux.list_panes(Some("s")).await.unwrap();
        assert_eq!(panes[1].width, 20);
        assert_eq!(panes[0].width, 59);
        assert_eq!(panes[1].left, 60);
        assert_eq!(panes[1].height, panes[0].height);
    }

    #[tokio::test]
    async fn split_too_small_fails() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        let mut target = addr("s:w.0");
        for _ in 0..4 {
            let idx = mux
                .split_pane(&target, SplitDirection::Vertical, 50)
                .await
                .unwrap();
            target = target.with_pane(idx);
        }
        let err = mux
            .split_pane(&target, SplitDirection::Vertical, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, MuxctlError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn shell_echoes_and_runs_sequences() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        let pane = addr("s:w.0");

        mux.send_literal(&pane, "echo hi; echo 'a''b'; frob").await.unwrap();
        assert_eq!(mux.pending_input(&pane).unwrap(), "echo hi; echo 'a''b'; frob");
        mux.send_key(&pane, "Enter").await.unwrap();

        let text = mux.capture(&pane, &CaptureRange::full()).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "$ echo hi; echo 'a''b'; frob");
        assert_eq!(lines[1], "hi");
        assert_eq!(lines[2], "ab");
        assert_eq!(lines[3], "sh: frob: command not found");
        assert_eq!(lines[4], "$ ");
    }

    #[tokio::test]
    async fn interrupt_releases_foreground() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        let pane = addr("s:w.0");
        mux.set_foreground(&pane, Some("sleep")).unwrap();
        assert_eq!(mux.current_command(&pane).await.unwrap(), "sleep");

        mux.send_key(&pane, "C-c").await.unwrap();
        assert_eq!(mux.current_command(&pane).await.unwrap(), "bash");
    }

    #[tokio::test]
    async fn environment_scopes() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        mux.set_environment(Some("s"), "PEER", "s:w.1").await.unwrap();
        mux.set_environment(None, "GLOBAL", "yes").await.unwrap();

        assert_eq!(
            mux.show_environment(Some("s"), "PEER").await.unwrap().as_deref(),
            Some("s:w.1")
        );
        assert_eq!(mux.show_environment(Some("s"), "GLOBAL").await.unwrap(), None);
        assert_eq!(
            mux.show_environment(None, "GLOBAL").await.unwrap().as_deref(),
            Some("yes")
        );
    }

    #[tokio::test]
    async fn kill_last_window_ends_session() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        mux.kill_window("s", &WindowRef::Name("w".into())).await.unwrap();
        assert!(!mux.has_session("s").await.unwrap());
        assert!(mux.kill_session("s").await.is_err());
    }
}
