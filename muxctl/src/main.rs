//! muxctl: command-line controller for tmux panes
//!
//! Each subcommand is a thin wrapper over one `muxctl-core` operation so
//! shell scripts and agents can provision layouts, type into panes, read
//! them back, wait for completion and pass messages through buffers.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use muxctl_utils::LogConfig;

#[tokio::main]
async fn main() {
    // Logs go to stderr, filtered by MUXCTL_LOG (default warn)
    if let Err(e) = muxctl_utils::init_logging_with_config(LogConfig::cli()) {
        eprintln!("warning: logging disabled: {}", e);
    }

    let cli = Cli::parse();

    let exit_code = match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    };

    std::process::exit(exit_code);
}
