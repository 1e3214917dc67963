//! tmux-backed [`Multiplexer`].
//!
//! Every call runs one short-lived `tmux` client process. Nothing about the
//! server's state is cached between calls.
//!
//! Targets are always written in exact-match form (`=session`, `=name`) so
//! tmux never falls back to prefix or glob matching and silently picks a
//! similarly named session.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use muxctl_utils::{paths, MuxctlError, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::address::{PaneAddress, WindowRef};
use crate::config::TmuxConfig;
use crate::mux::{Multiplexer, PaneInfo, SplitDirection};
use crate::observe::{CaptureRange, EndLine, StartLine};

/// Field order of [`PANE_FORMAT`]
const PANE_FIELDS: usize = 10;

const PANE_FORMAT: &str = "#{session_name}\t#{window_index}\t#{window_name}\t#{pane_index}\t\
#{pane_current_command}\t#{pane_width}\t#{pane_height}\t#{pane_left}\t#{pane_top}\t#{pane_active}";

/// Which tmux server to talk to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TmuxSocket {
    /// The user's default server
    #[default]
    Default,
    /// `tmux -L NAME`
    Name(String),
    /// `tmux -S PATH`
    Path(PathBuf),
}

impl TmuxSocket {
    fn args(&self) -> Vec<String> {
        match self {
            TmuxSocket::Default => Vec::new(),
            TmuxSocket::Name(name) => vec!["-L".into(), name.clone()],
            TmuxSocket::Path(path) => vec!["-S".into(), path.display().to_string()],
        }
    }

    /// Filesystem location of the server socket
    pub fn path(&self) -> PathBuf {
        match self {
            TmuxSocket::Default => paths::tmux_socket_path(None),
            TmuxSocket::Name(name) => paths::tmux_socket_path(Some(name.as_str())),
            TmuxSocket::Path(path) => path.clone(),
        }
    }
}

fn session_target(session: &str) -> String {
    format!("={}", session)
}

fn window_target(session: &str, window: &WindowRef) -> String {
    match window {
        WindowRef::Index(i) => format!("={}:{}", session, i),
        WindowRef::Name(name) => format!("={}:={}", session, name),
    }
}

fn pane_target(addr: &PaneAddress) -> String {
    format!("{}.{}", window_target(addr.session(), addr.window()), addr.pane())
}

/// tmux numbers lines from the first visible row; bottom-relative lines
/// are rebased onto that using the pane height
fn tmux_line(line: i64, height: u32) -> String {
    if line < 0 {
        (i64::from(height) + line).to_string()
    } else {
        line.to_string()
    }
}

fn capture_args(target: &str, range: &CaptureRange, height: u32) -> Vec<String> {
    let start = match range.start {
        StartLine::Line(n) => tmux_line(n, height),
        StartLine::HistoryStart => "-".to_string(),
    };
    let end = match range.end {
        EndLine::Line(n) => tmux_line(n, height),
        EndLine::End => "-".to_string(),
    };
    vec![
        "capture-pane".into(),
        "-p".into(),
        "-J".into(),
        "-t".into(),
        target.into(),
        "-S".into(),
        start,
        "-E".into(),
        end,
    ]
}

fn split_args(target: &str, direction: SplitDirection, percent: u8) -> Vec<String> {
    let flag = match direction {
        SplitDirection::Horizontal => "-h",
        SplitDirection::Vertical => "-v",
    };
    vec![
        "split-window".into(),
        "-d".into(),
        flag.into(),
        "-l".into(),
        format!("{}%", percent),
        "-t".into(),
        target.into(),
        "-P".into(),
        "-F".into(),
        "#{pane_index}".into(),
    ]
}

fn env_scope_args(session: Option<&str>) -> Vec<String> {
    match session {
        Some(s) => vec!["-t".into(), session_target(s)],
        None => vec!["-g".into()],
    }
}

/// Map a failed tmux invocation onto the error it means
fn classify_failure(
    command: &str,
    subject: &str,
    code: Option<i32>,
    stderr: &str,
    socket: PathBuf,
) -> MuxctlError {
    let lower = stderr.to_ascii_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("no server running") || has("error connecting to") {
        MuxctlError::ServerNotRunning { path: socket }
    } else if has("can't find session") || has("session not found") {
        MuxctlError::SessionNotFound(subject.to_string())
    } else if has("can't find window") || has("window not found") {
        MuxctlError::WindowNotFound(subject.to_string())
    } else if has("can't find pane") || has("pane not found") {
        MuxctlError::PaneNotFound(subject.to_string())
    } else if has("no buffer") || has("unknown buffer") {
        MuxctlError::BufferNotFound(subject.to_string())
    } else if has("duplicate session") {
        MuxctlError::SessionExists(subject.to_string())
    } else {
        MuxctlError::CommandFailed {
            command: command.to_string(),
            code,
            stderr: stderr.to_string(),
        }
    }
}

fn parse_pane_line(line: &str) -> Result<PaneInfo> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != PANE_FIELDS {
        return Err(MuxctlError::unexpected_output(format!(
            "list-panes row has {} fields: {:?}",
            fields.len(),
            line
        )));
    }
    let num = |i: usize| -> Result<u32> {
        fields[i].parse().map_err(|_| {
            MuxctlError::unexpected_output(format!("non-numeric field {:?} in {:?}", fields[i], line))
        })
    };
    let dim = |i: usize| -> Result<u16> {
        fields[i].parse().map_err(|_| {
            MuxctlError::unexpected_output(format!("non-numeric field {:?} in {:?}", fields[i], line))
        })
    };

    Ok(PaneInfo {
        session: fields[0].to_string(),
        window_index: num(1)?,
        window_name: fields[2].to_string(),
        pane_index: num(3)?,
        current_command: fields[4].to_string(),
        width: dim(5)?,
        height: dim(6)?,
        left: dim(7)?,
        top: dim(8)?,
        active: fields[9] == "1",
    })
}

/// Parse `show-environment` output; `-KEY` marks a removed variable
fn parse_environment(output: &str, key: &str) -> Option<String> {
    output.lines().find_map(|line| {
        if line == format!("-{}", key) {
            return None;
        }
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string)
    })
}

/// Talks to a tmux server through its command-line client
#[derive(Debug, Clone)]
pub struct TmuxMultiplexer {
    program: String,
    socket: TmuxSocket,
    size: Option<(u16, u16)>,
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self::new(TmuxSocket::Default)
    }
}

impl TmuxMultiplexer {
    pub fn new(socket: TmuxSocket) -> Self {
        Self {
            program: "tmux".to_string(),
            socket,
            size: None,
        }
    }

    pub fn from_config(config: &TmuxConfig) -> Self {
        let socket = match (&config.socket_path, &config.socket_name) {
            (Some(path), _) => TmuxSocket::Path(path.clone()),
            (None, Some(name)) => TmuxSocket::Name(name.clone()),
            (None, None) => TmuxSocket::Default,
        };
        Self {
            program: config.program.clone(),
            socket,
            size: config.width.zip(config.height),
        }
    }

    pub fn socket(&self) -> &TmuxSocket {
        &self.socket
    }

    async fn exec(&self, args: &[String], stdin: Option<&[u8]>, subject: &str) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.program);
        cmd.kill_on_drop(true);
        cmd.args(self.socket.args())
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        tracing::debug!(program = %self.program, ?args, "Running tmux");

        let spawn_error = |source| MuxctlError::Spawn {
            program: self.program.clone(),
            source,
        };
        let mut child = match cmd.spawn().map_err(spawn_error) {
            Ok(child) => child,
            Err(e) if e.is_retryable() => {
                tracing::debug!(error = %e, "Retrying tmux spawn");
                cmd.spawn().map_err(spawn_error)?
            }
            Err(e) => return Err(e),
        };
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input).await?;
            }
        }
        let output = child.wait_with_output().await?;

        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = args.first().map(String::as_str).unwrap_or_default();
        tracing::debug!(command, code = ?output.status.code(), %stderr, "tmux failed");
        Err(classify_failure(
            command,
            subject,
            output.status.code(),
            &stderr,
            self.socket.path(),
        ))
    }

    async fn exec_text(&self, args: &[String], subject: &str) -> Result<String> {
        let out = self.exec(args, None, subject).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    async fn has_session(&self, name: &str) -> Result<bool> {
        let target = session_target(name);
        match self
            .exec(&strings(&["has-session", "-t", &target]), None, name)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn new_session(&self, name: &str, first_window: &str) -> Result<()> {
        let mut args = strings(&["new-session", "-d", "-s", name, "-n", first_window]);
        if let Some((w, h)) = self.size {
            args.extend(["-x".to_string(), w.to_string(), "-y".to_string(), h.to_string()]);
        }
        self.exec(&args, None, name).await?;
        tracing::info!(session = name, window = first_window, "Created session");
        Ok(())
    }

    async fn new_window(&self, session: &str, name: &str) -> Result<()> {
        let target = format!("{}:", session_target(session));
        self.exec(
            &strings(&["new-window", "-d", "-t", &target, "-n", name]),
            None,
            session,
        )
        .await?;
        tracing::info!(session, window = name, "Created window");
        Ok(())
    }

    async fn split_pane(
        &self,
        target: &PaneAddress,
        direction: SplitDirection,
        percent: u8,
    ) -> Result<u32> {
        let t = pane_target(target);
        let out = self
            .exec_text(&split_args(&t, direction, percent), &target.to_string())
            .await?;
        out.trim().parse().map_err(|_| {
            MuxctlError::unexpected_output(format!("split-window printed {:?}", out.trim()))
        })
    }

    async fn list_panes(&self, session: Option<&str>) -> Result<Vec<PaneInfo>> {
        let args = match session {
            Some(s) => strings(&["list-panes", "-s", "-t", &session_target(s), "-F", PANE_FORMAT]),
            None => strings(&["list-panes", "-a", "-F", PANE_FORMAT]),
        };
        let out = match self.exec_text(&args, session.unwrap_or_default()).await {
            Ok(out) => out,
            Err(MuxctlError::ServerNotRunning { .. }) => match session {
                Some(s) => return Err(MuxctlError::SessionNotFound(s.to_string())),
                None => return Ok(Vec::new()),
            },
            Err(e) => return Err(e),
        };
        out.lines()
            .filter(|l| !l.is_empty())
            .map(parse_pane_line)
            .collect()
    }

    async fn send_literal(&self, target: &PaneAddress, text: &str) -> Result<()> {
        let t = pane_target(target);
        self.exec(
            &strings(&["send-keys", "-t", &t, "-l", "--", text]),
            None,
            &target.to_string(),
        )
        .await?;
        Ok(())
    }

    async fn send_key(&self, target: &PaneAddress, key: &str) -> Result<()> {
        let t = pane_target(target);
        self.exec(&strings(&["send-keys", "-t", &t, key]), None, &target.to_string())
            .await?;
        Ok(())
    }

    async fn capture(&self, target: &PaneAddress, range: &CaptureRange) -> Result<String> {
        let t = pane_target(target);
        let subject = target.to_string();
        let height = if range.is_bottom_relative() {
            let out = self
                .exec_text(
                    &strings(&["display-message", "-p", "-t", &t, "#{pane_height}"]),
                    &subject,
                )
                .await?;
            out.trim().parse().map_err(|_| {
                MuxctlError::unexpected_output(format!("pane height {:?}", out.trim()))
            })?
        } else {
            0
        };
        self.exec_text(&capture_args(&t, range, height), &subject)
            .await
    }

    async fn current_command(&self, target: &PaneAddress) -> Result<String> {
        let t = pane_target(target);
        let out = self
            .exec_text(
                &strings(&["display-message", "-p", "-t", &t, "#{pane_current_command}"]),
                &target.to_string(),
            )
            .await?;
        Ok(out.trim_end().to_string())
    }

    async fn set_environment(&self, session: Option<&str>, key: &str, value: &str) -> Result<()> {
        let mut args = strings(&["set-environment"]);
        args.extend(env_scope_args(session));
        args.extend([key.to_string(), value.to_string()]);
        self.exec(&args, None, session.unwrap_or("global")).await?;
        Ok(())
    }

    async fn show_environment(&self, session: Option<&str>, key: &str) -> Result<Option<String>> {
        let mut args = strings(&["show-environment"]);
        args.extend(env_scope_args(session));
        args.push(key.to_string());
        match self.exec_text(&args, session.unwrap_or("global")).await {
            Ok(out) => Ok(parse_environment(&out, key)),
            Err(MuxctlError::CommandFailed { stderr, .. })
                if stderr.to_ascii_lowercase().contains("unknown variable") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn set_buffer(&self, name: &str, payload: &[u8]) -> Result<()> {
        self.exec(&strings(&["load-buffer", "-b", name, "-"]), Some(payload), name)
            .await?;
        Ok(())
    }

    async fn show_buffer(&self, name: &str) -> Result<Vec<u8>> {
        self.exec(&strings(&["show-buffer", "-b", name]), None, name)
            .await
    }

    async fn delete_buffer(&self, name: &str) -> Result<()> {
        self.exec(&strings(&["delete-buffer", "-b", name]), None, name)
            .await?;
        Ok(())
    }

    async fn list_buffers(&self) -> Result<Vec<String>> {
        match self
            .exec_text(&strings(&["list-buffers", "-F", "#{buffer_name}"]), "buffers")
            .await
        {
            Ok(out) => Ok(out.lines().filter(|l| !l.is_empty()).map(str::to_string).collect()),
            Err(MuxctlError::ServerNotRunning { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn kill_window(&self, session: &str, window: &WindowRef) -> Result<()> {
        let t = window_target(session, window);
        self.exec(&strings(&["kill-window", "-t", &t]), None, &t)
            .await?;
        tracing::info!(session, window = %window, "Killed window");
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        let t = session_target(name);
        self.exec(&strings(&["kill-session", "-t", &t]), None, name)
            .await?;
        tracing::info!(session = name, "Killed session");
        Ok(())
    }
}
