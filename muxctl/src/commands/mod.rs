//! Command implementations
//!
//! Every command returns the process exit code: 0 on success, 1 when the
//! operation failed, 2 when a wait ended without its criterion holding.

mod buffer;
mod layout;
mod pane;

use std::path::Path;
use std::time::Duration;

use muxctl_core::{
    AddressResolver, AmbientContext, AppConfig, ConfigLoader, MemoryMultiplexer, Multiplexer,
    PaneAddress, Result, TmuxMultiplexer, WaitOptions,
};
use tokio_util::sync::CancellationToken;

use crate::cli::{BufferCommand, Cli, Command, WaitArgs};

/// Exit code for a wait that timed out or was cancelled
pub const EXIT_UNSATISFIED: i32 = 2;

/// Everything a command needs
pub struct Context {
    pub mux: Box<dyn Multiplexer>,
    pub config: AppConfig,
    pub ambient: AmbientContext,
    /// Fired on Ctrl-C
    pub cancel: CancellationToken,
}

impl Context {
    pub fn mux(&self) -> &(dyn Multiplexer + 'static) {
        self.mux.as_ref()
    }

    /// Parse `target`, or fall back to the controller's own pane
    pub async fn target(&self, target: Option<&str>) -> Result<PaneAddress> {
        match target {
            Some(t) => Ok(PaneAddress::parse(t)?),
            None => Ok(AddressResolver::new(self.mux())
                .resolve_current(&self.ambient)
                .await?),
        }
    }

    /// Configured wait defaults with command-line overrides applied
    pub fn wait_options(&self, args: &WaitArgs) -> WaitOptions {
        let mut options = self.config.wait.options().with_range(self.config.capture.range());
        if let Some(ms) = args.interval {
            options.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = args.timeout {
            options.timeout = Duration::from_millis(ms);
        }
        options
    }
}

fn load_config(path: Option<&Path>) -> muxctl_utils::Result<AppConfig> {
    match path {
        Some(p) => ConfigLoader::load_and_validate_from(p),
        None => ConfigLoader::load_and_validate(),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

/// Build the context from global flags and run the command
pub async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    let mux: Box<dyn Multiplexer> = if cli.dry_run {
        tracing::info!("Dry run: using in-memory multiplexer");
        Box::new(MemoryMultiplexer::new())
    } else {
        let mut tmux = config.tmux.clone();
        if let Some(name) = cli.socket_name {
            tmux.socket_name = Some(name);
            tmux.socket_path = None;
        }
        Box::new(TmuxMultiplexer::from_config(&tmux))
    };

    let ambient = AmbientContext::from_env_vars(
        &config.ambient.current_pane_var,
        &config.ambient.paired_pane_var,
    );
    let ctx = Context {
        mux,
        config,
        ambient,
        cancel: cancel_on_ctrl_c(),
    };

    execute(cli.command, &ctx).await
}

/// Execute a CLI command
pub async fn execute(command: Command, ctx: &Context) -> Result<i32> {
    match command {
        // Addressing
        Command::Parse { address } => pane::parse(&address),
        Command::Current => pane::current(ctx).await,
        Command::Paired => pane::paired(ctx).await,
        Command::ListPanes { session, json } => {
            pane::list_panes(ctx, session.as_deref(), json).await
        }

        // Provisioning
        Command::Layout {
            session,
            window,
            layout,
            plan,
        } => layout::layout(ctx, &session, &window, layout.as_deref(), plan.as_deref()).await,
        Command::KillWindow { session, window } => {
            layout::kill_window(ctx, &session, &window).await
        }
        Command::KillSession { session } => layout::kill_session(ctx, &session).await,

        // Pane I/O
        Command::Send {
            target,
            no_enter,
            text,
        } => pane::send(ctx, target.as_deref(), &text.join(" "), !no_enter).await,
        Command::Control { target, key } => pane::control(ctx, target.as_deref(), &key).await,
        Command::Capture {
            target,
            lines,
            all,
        } => pane::capture(ctx, target.as_deref(), lines, all).await,
        Command::Wait {
            target,
            marker,
            shell,
            delay,
            wait,
        } => pane::wait(ctx, target.as_deref(), marker, shell, delay, &wait).await,
        Command::Run {
            target,
            wait,
            command,
        } => pane::run(ctx, target.as_deref(), &command.join(" "), &wait).await,

        // Buffers
        Command::Buffer { command } => match command {
            BufferCommand::Write { name, data } => buffer::write(ctx, &name, data).await,
            BufferCommand::Read { name, meta } => buffer::read(ctx, &name, meta).await,
            BufferCommand::Delete { name } => buffer::delete(ctx, &name).await,
            BufferCommand::List => buffer::list(ctx).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use muxctl_core::Error;

    fn context(mux: MemoryMultiplexer, current: Option<&str>) -> Context {
        let current = current.map(str::to_string);
        Context {
            mux: Box::new(mux),
            config: AppConfig::default(),
            ambient: AmbientContext::from_lookup("MUXCTL_PANE", "MUXCTL_PAIRED_PANE", move |var| {
                (var == "MUXCTL_PANE").then(|| current.clone()).flatten()
            }),
            cancel: CancellationToken::new(),
        }
    }

    async fn exec(ctx: &Context, args: &[&str]) -> Result<i32> {
        let cli = Cli::try_parse_from(std::iter::once("muxctl").chain(args.iter().copied()))
            .unwrap();
        execute(cli.command, ctx).await
    }

    #[tokio::test]
    async fn test_layout_then_send() {
        let ctx = context(MemoryMultiplexer::new(), None);
        assert_eq!(exec(&ctx, &["layout", "-s", "s", "-w", "dev"]).await.unwrap(), 0);
        assert_eq!(
            exec(&ctx, &["send", "-t", "s:dev.0", "echo", "hi"]).await.unwrap(),
            0
        );
        assert_eq!(exec(&ctx, &["capture", "-t", "s:dev.0"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_to_missing_pane_fails() {
        let ctx = context(MemoryMultiplexer::new(), None);
        let err = exec(&ctx, &["send", "-t", "s:w.0", "ls"]).await.unwrap_err();
        assert!(matches!(err, Error::Dispatch(ref e) if e.is_target_not_found()));
    }

    #[tokio::test]
    async fn test_default_target_is_current_pane() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        let ctx = context(mux, Some("s:w.0"));
        assert_eq!(exec(&ctx, &["send", "echo", "hi"]).await.unwrap(), 0);
        assert_eq!(exec(&ctx, &["current"]).await.unwrap(), 0);

        let unset = context(MemoryMultiplexer::new(), None);
        assert!(matches!(
            exec(&unset, &["current"]).await.unwrap_err(),
            Error::Resolve(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_exit_codes() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        let ctx = context(mux, None);
        exec(&ctx, &["send", "-t", "s:w.0", "echo", "DONE"]).await.unwrap();

        let code = exec(&ctx, &["wait", "-t", "s:w.0", "--marker", "DONE", "--timeout", "500"])
            .await
            .unwrap();
        assert_eq!(code, 0);

        let code = exec(&ctx, &["wait", "-t", "s:w.0", "--marker", "NOPE", "--timeout", "500"])
            .await
            .unwrap();
        assert_eq!(code, EXIT_UNSATISFIED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_command() {
        let mux = MemoryMultiplexer::new();
        mux.new_session("s", "w").await.unwrap();
        let ctx = context(mux, None);
        assert_eq!(exec(&ctx, &["run", "-t", "s:w.0", "echo", "ok"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_buffer_round_trip() {
        let ctx = context(MemoryMultiplexer::new(), Some("s:w.0"));
        assert_eq!(exec(&ctx, &["buffer", "write", "note", "hello"]).await.unwrap(), 0);
        assert_eq!(exec(&ctx, &["buffer", "read", "note"]).await.unwrap(), 0);
        assert_eq!(exec(&ctx, &["buffer", "delete", "note"]).await.unwrap(), 0);
        assert!(exec(&ctx, &["buffer", "read", "note"]).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_layout_name() {
        let ctx = context(MemoryMultiplexer::new(), None);
        let code = exec(&ctx, &["layout", "-s", "s", "-w", "w", "--layout", "nope"])
            .await
            .unwrap();
        assert_eq!(code, 1);
        assert!(!ctx.mux().has_session("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_starts_empty_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "").unwrap();
        let config = config.to_str().unwrap();

        let cli = |args: &[&str]| {
            let base = ["muxctl", "--dry-run", "--config", config];
            Cli::try_parse_from(base.iter().chain(args.iter()).copied()).unwrap()
        };

        assert_eq!(run(cli(&["layout", "-s", "s", "-w", "w"])).await.unwrap(), 0);
        // The previous invocation's session is gone
        let err = run(cli(&["send", "-t", "s:w.0", "ls"])).await.unwrap_err();
        assert!(matches!(err, Error::Dispatch(ref e) if e.is_target_not_found()));
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(pane::parse("s:w.0").unwrap(), 0);
        assert!(pane::parse("s:w.-1").is_err());
    }

    #[test]
    fn test_wait_options_overrides() {
        let ctx = context(MemoryMultiplexer::new(), None);
        let options = ctx.wait_options(&WaitArgs {
            timeout: Some(1500),
            interval: None,
        });
        assert_eq!(options.timeout, Duration::from_millis(1500));
        assert_eq!(options.poll_interval, Duration::from_millis(100));
    }
}
