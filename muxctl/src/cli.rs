//! CLI argument parsing

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Drive tmux panes from scripts and agents
#[derive(Parser, Debug)]
#[command(name = "muxctl")]
#[command(about = "Provision, drive and observe tmux panes")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/muxctl/config.toml)
    #[arg(long, global = true, env = "MUXCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// tmux server socket name, as `tmux -L`
    #[arg(short = 'L', long, global = true, env = "MUXCTL_SOCKET_NAME")]
    pub socket_name: Option<String>,

    /// Run against an empty in-memory multiplexer instead of tmux.
    ///
    /// Nothing persists between invocations, so this previews `layout`
    /// plans; commands addressing existing panes report them as not found.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// How long and how often to poll
#[derive(Args, Debug, Clone, Default)]
pub struct WaitArgs {
    /// Give up after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Delay between captures in milliseconds
    #[arg(long, value_name = "MS")]
    pub interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a pane address and print it in canonical form
    Parse {
        address: String,
    },

    /// Print the controller's own pane address
    Current,

    /// Print the controller's paired pane address
    Paired,

    /// List panes
    #[command(name = "list-panes")]
    ListPanes {
        /// Only this session
        #[arg(short = 's', long)]
        session: Option<String>,

        /// Print JSON instead of addresses
        #[arg(long)]
        json: bool,
    },

    /// Create a window from a layout plan unless it already exists
    Layout {
        #[arg(short = 's', long)]
        session: String,

        #[arg(short = 'w', long)]
        window: String,

        /// Named layout from the configuration file
        #[arg(long, conflicts_with = "plan")]
        layout: Option<String>,

        /// Standalone TOML plan file
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Type text into a pane
    Send {
        /// Target pane (default: current pane)
        #[arg(short = 't', long = "target")]
        target: Option<String>,

        /// Do not press Enter afterwards
        #[arg(long)]
        no_enter: bool,

        /// Text to send; words are joined with spaces
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },

    /// Press a control key in a pane (interrupt, eof, C-c, Ctrl+D, ...)
    Control {
        #[arg(short = 't', long = "target")]
        target: Option<String>,

        key: String,
    },

    /// Print a pane's text
    Capture {
        #[arg(short = 't', long = "target")]
        target: Option<String>,

        /// Only the last N lines, reaching into scrollback past the pane height
        #[arg(short = 'n', long, value_name = "N", conflicts_with = "all")]
        lines: Option<u32>,

        /// Include all retained scrollback
        #[arg(long)]
        all: bool,
    },

    /// Wait for a command in a pane to finish
    Wait {
        #[arg(short = 't', long = "target")]
        target: Option<String>,

        /// Finished when this text appears
        #[arg(long, group = "criterion")]
        marker: Option<String>,

        /// Finished when the pane is back at a shell (optionally this one)
        #[arg(long, group = "criterion", num_args = 0..=1, default_missing_value = "")]
        shell: Option<String>,

        /// Finished after this many milliseconds
        #[arg(long, group = "criterion", value_name = "MS")]
        delay: Option<u64>,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Run a shell command in a pane and print its output once it finishes
    Run {
        #[arg(short = 't', long = "target")]
        target: Option<String>,

        #[command(flatten)]
        wait: WaitArgs,

        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Shared named buffers
    Buffer {
        #[command(subcommand)]
        command: BufferCommand,
    },

    /// Kill a window
    #[command(name = "kill-window")]
    KillWindow {
        #[arg(short = 's', long)]
        session: String,

        /// Window name or index
        #[arg(short = 'w', long)]
        window: String,
    },

    /// Kill a session
    #[command(name = "kill-session")]
    KillSession {
        #[arg(short = 's', long)]
        session: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BufferCommand {
    /// Replace a buffer's contents (from the argument, or stdin)
    Write {
        name: String,
        data: Option<String>,
    },

    /// Print a buffer's contents
    Read {
        name: String,

        /// Also print who wrote it and when
        #[arg(long)]
        meta: bool,
    },

    Delete {
        name: String,
    },

    List,
}
