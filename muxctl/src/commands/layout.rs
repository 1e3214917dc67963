//! Window provisioning and teardown commands

use std::path::Path;

use muxctl_core::{LayoutEngine, LayoutPlan, Result, WindowRef};
use muxctl_utils::MuxctlError;

use super::Context;

fn load_plan(path: &Path) -> muxctl_utils::Result<LayoutPlan> {
    let content = std::fs::read_to_string(path).map_err(|e| MuxctlError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| MuxctlError::ConfigInvalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Ensure `session:window` exists and print its pane addresses
pub async fn layout(
    ctx: &Context,
    session: &str,
    window: &str,
    layout: Option<&str>,
    plan_file: Option<&Path>,
) -> Result<i32> {
    let plan = match (layout, plan_file) {
        (Some(name), _) => match ctx.config.layouts.get(name) {
            Some(plan) => plan.clone(),
            None => {
                eprintln!("error: no layout named {:?} in configuration", name);
                return Ok(1);
            }
        },
        (None, Some(path)) => load_plan(path)?,
        (None, None) => LayoutPlan::default(),
    };

    let panes = LayoutEngine::new(ctx.mux())
        .ensure_layout(session, window, &plan)
        .await?;
    for pane in panes {
        println!("{}", pane);
    }
    Ok(0)
}

/// Kill a window by name or index
pub async fn kill_window(ctx: &Context, session: &str, window: &str) -> Result<i32> {
    let window = match window.parse::<u32>() {
        Ok(i) => WindowRef::Index(i),
        Err(_) => WindowRef::Name(window.to_string()),
    };
    ctx.mux().kill_window(session, &window).await?;
    Ok(0)
}

/// Kill a session
pub async fn kill_session(ctx: &Context, session: &str) -> Result<i32> {
    ctx.mux().kill_session(session).await?;
    Ok(0)
}
