//! Shared buffer commands

use std::io::Write;

use muxctl_core::{BufferChannel, Multiplexer, Result};
use muxctl_utils::MuxctlError;
use tokio::io::AsyncReadExt;

use super::Context;

/// Attribute writes to the controller's pane when it is known
fn channel(ctx: &Context) -> BufferChannel<'_, dyn Multiplexer> {
    match ctx.ambient.current() {
        Some(pane) => BufferChannel::with_writer(ctx.mux(), pane),
        None => BufferChannel::new(ctx.mux()),
    }
}

/// Replace a buffer with `data`, or with stdin when absent
pub async fn write(ctx: &Context, name: &str, data: Option<String>) -> Result<i32> {
    let payload = match data {
        Some(d) => d.into_bytes(),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await.map_err(MuxctlError::Io)?;
            buf
        }
    };
    channel(ctx).write(name, &payload).await?;
    Ok(0)
}

/// Print a buffer's payload to stdout
pub async fn read(ctx: &Context, name: &str, meta: bool) -> Result<i32> {
    let buffer = channel(ctx).read(name).await?;
    if meta {
        eprintln!(
            "writer={} at={}",
            buffer.writer.as_deref().unwrap_or("unknown"),
            buffer
                .written_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        );
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&buffer.payload).map_err(MuxctlError::Io)?;
    stdout.flush().map_err(MuxctlError::Io)?;
    Ok(0)
}

pub async fn delete(ctx: &Context, name: &str) -> Result<i32> {
    channel(ctx).delete(name).await?;
    Ok(0)
}

pub async fn list(ctx: &Context) -> Result<i32> {
    for name in channel(ctx).list().await? {
        println!("{}", name);
    }
    Ok(0)
}
