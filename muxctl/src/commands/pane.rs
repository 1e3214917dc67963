//! Pane addressing, dispatch and observation commands

use std::time::Duration;

use muxctl_core::{
    AddressResolver, CaptureRange, CompletionCriterion, CompletionWaiter, ControlKey, Dispatcher,
    Observer, PaneAddress, Result, Runner, WaitState,
};
use muxctl_utils::MuxctlError;

use super::{Context, EXIT_UNSATISFIED};
use crate::cli::WaitArgs;

/// Print an address in canonical form
pub fn parse(address: &str) -> Result<i32> {
    let addr = PaneAddress::parse(address)?;
    println!("{}", addr);
    Ok(0)
}

/// Print the controller's own pane
pub async fn current(ctx: &Context) -> Result<i32> {
    let addr = AddressResolver::new(ctx.mux())
        .resolve_current(&ctx.ambient)
        .await?;
    println!("{}", addr);
    Ok(0)
}

/// Print the controller's paired pane
pub async fn paired(ctx: &Context) -> Result<i32> {
    let addr = AddressResolver::new(ctx.mux())
        .resolve_paired(&ctx.ambient)
        .await?;
    println!("{}", addr);
    Ok(0)
}

/// List panes, one per line or as JSON
pub async fn list_panes(ctx: &Context, session: Option<&str>, json: bool) -> Result<i32> {
    let panes = ctx.mux().list_panes(session).await?;

    if json {
        let out = serde_json::to_string_pretty(&panes)
            .map_err(|e| MuxctlError::internal(format!("serializing panes: {}", e)))?;
        println!("{}", out);
        return Ok(0);
    }

    for pane in &panes {
        let addr = pane
            .address()
            .map(|a| a.to_string())
            .unwrap_or_else(|| format!("{}:{}.{}", pane.session, pane.window_index, pane.pane_index));
        println!(
            "{}\t{}\t{}\t{}x{}{}",
            addr,
            pane.window_name,
            pane.current_command,
            pane.width,
            pane.height,
            if pane.active { "\t(active)" } else { "" }
        );
    }
    Ok(0)
}

/// Type text into a pane
pub async fn send(ctx: &Context, target: Option<&str>, text: &str, enter: bool) -> Result<i32> {
    let addr = ctx.target(target).await?;
    Dispatcher::new(ctx.mux())
        .send_text(&addr, text, enter)
        .await?;
    Ok(0)
}

/// Press a control key
pub async fn control(ctx: &Context, target: Option<&str>, key: &str) -> Result<i32> {
    let key: ControlKey = match key.parse() {
        Ok(k) => k,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(1);
        }
    };
    let addr = ctx.target(target).await?;
    Dispatcher::new(ctx.mux()).send_control(&addr, key).await?;
    Ok(0)
}

/// Print a pane's text
pub async fn capture(
    ctx: &Context,
    target: Option<&str>,
    lines: Option<u32>,
    all: bool,
) -> Result<i32> {
    let addr = ctx.target(target).await?;
    let range = match (all, lines) {
        (true, _) => CaptureRange::full(),
        (false, Some(n)) => CaptureRange::last_lines(n),
        (false, None) => ctx.config.capture.range(),
    };

    let snapshot = Observer::new(ctx.mux()).capture(&addr, &range).await?;
    for line in snapshot.lines() {
        println!("{}", line);
    }
    Ok(0)
}

/// Block until a completion criterion holds
pub async fn wait(
    ctx: &Context,
    target: Option<&str>,
    marker: Option<String>,
    shell: Option<String>,
    delay: Option<u64>,
    args: &WaitArgs,
) -> Result<i32> {
    let addr = ctx.target(target).await?;
    let criterion = match (marker, shell, delay) {
        (Some(m), _, _) => CompletionCriterion::OutputContainsMarker(m),
        (_, _, Some(ms)) => CompletionCriterion::FixedDelay(Duration::from_millis(ms)),
        (_, Some(name), _) if !name.is_empty() => CompletionCriterion::returned_to_shell(name),
        _ => ctx.config.wait.shell_criterion(),
    };

    let outcome = CompletionWaiter::new(ctx.mux())
        .wait_with(&addr, &criterion, &ctx.wait_options(args), &ctx.cancel)
        .await?;

    if outcome.state == WaitState::Satisfied {
        return Ok(0);
    }
    eprintln!(
        "{} after {:?} ({} polls)",
        outcome.state, outcome.elapsed, outcome.polls
    );
    if let Some(last) = outcome.snapshot.as_ref().and_then(|s| s.last_non_empty_line()) {
        eprintln!("last line: {}", last);
    }
    Ok(EXIT_UNSATISFIED)
}

/// Run a shell command and print what it wrote
pub async fn run(ctx: &Context, target: Option<&str>, command: &str, args: &WaitArgs) -> Result<i32> {
    let addr = ctx.target(target).await?;
    let outcome = Runner::new(ctx.mux())
        .run(&addr, command, &ctx.wait_options(args), &ctx.cancel)
        .await?;

    if !outcome.is_complete() {
        eprintln!("{} after {:?}", outcome.wait.state, outcome.wait.elapsed);
        return Ok(EXIT_UNSATISFIED);
    }
    for line in outcome.output_lines() {
        println!("{}", line);
    }
    Ok(0)
}
