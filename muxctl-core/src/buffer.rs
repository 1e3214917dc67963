//! Named shared buffers for passing messages between controllers.
//!
//! Buffers live on the multiplexer server, keyed by name. A write replaces
//! the whole buffer in one server-side operation, so readers see either
//! the previous payload or the new one, never a mix. There is no locking
//! and no history: concurrent writers race and the last write wins.
//!
//! Each payload is stored behind a one-line header recording who wrote it
//! and when:
//!
//! ```text
//! #muxctl writer=work:dev.0 at=2026-01-05T10:00:00Z
//! <payload bytes>
//! ```
//!
//! Buffers written by other tools have no header and are returned as-is.

use chrono::{DateTime, SecondsFormat, Utc};
use muxctl_utils::MuxctlError;

use crate::error::{BufferError, NotFoundError};
use crate::mux::Multiplexer;

const HEADER_PREFIX: &str = "#muxctl ";

/// A buffer's payload plus its provenance, when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBuffer {
    pub name: String,
    pub payload: Vec<u8>,
    pub writer: Option<String>,
    pub written_at: Option<DateTime<Utc>>,
}

impl NamedBuffer {
    /// Payload as text, replacing invalid UTF-8
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

fn encode(writer: &str, at: DateTime<Utc>, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "{}writer={} at={}\n",
        HEADER_PREFIX,
        writer,
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

fn decode(name: &str, raw: Vec<u8>) -> NamedBuffer {
    let plain = |raw: Vec<u8>| NamedBuffer {
        name: name.to_string(),
        payload: raw,
        writer: None,
        written_at: None,
    };

    if !raw.starts_with(HEADER_PREFIX.as_bytes()) {
        return plain(raw);
    }
    let Some(newline) = raw.iter().position(|b| *b == b'\n') else {
        return plain(raw);
    };
    let Ok(header) = std::str::from_utf8(&raw[HEADER_PREFIX.len()..newline]) else {
        return plain(raw);
    };

    let mut writer = None;
    let mut written_at = None;
    for field in header.split_whitespace() {
        match field.split_once('=') {
            Some(("writer", w)) => writer = Some(w.to_string()),
            Some(("at", t)) => {
                written_at = DateTime::parse_from_rfc3339(t)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            }
            _ => {}
        }
    }
    if writer.is_none() || written_at.is_none() {
        return plain(raw);
    }

    NamedBuffer {
        name: name.to_string(),
        payload: raw[newline + 1..].to_vec(),
        writer,
        written_at,
    }
}

fn validate_name(name: &str) -> Result<(), BufferError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(BufferError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn map_backend(name: &str, err: MuxctlError) -> BufferError {
    match err {
        MuxctlError::BufferNotFound(_) | MuxctlError::ServerNotRunning { .. } => {
            NotFoundError::Buffer(name.to_string()).into()
        }
        other => BufferError::Backend(other),
    }
}

/// Reads and writes named buffers on behalf of one controller
pub struct BufferChannel<'a, M: ?Sized> {
    mux: &'a M,
    writer: String,
}

impl<'a, M: Multiplexer + ?Sized> BufferChannel<'a, M> {
    /// Channel whose writes are attributed to this process
    pub fn new(mux: &'a M) -> Self {
        Self::with_writer(mux, format!("pid-{}", std::process::id()))
    }

    /// Channel whose writes are attributed to `writer`, usually a pane address
    pub fn with_writer(mux: &'a M, writer: impl Into<String>) -> Self {
        let writer: String = writer
            .into()
            .chars()
            .map(|c| if c.is_whitespace() || c.is_control() { '_' } else { c })
            .collect();
        Self { mux, writer }
    }

    pub fn writer(&self) -> &str {
        &self.writer
    }

    /// Replace the contents of `name` with `payload`
    pub async fn write(&self, name: &str, payload: &[u8]) -> Result<(), BufferError> {
        validate_name(name)?;
        let encoded = encode(&self.writer, Utc::now(), payload);
        self.mux
            .set_buffer(name, &encoded)
            .await
            .map_err(BufferError::Backend)?;
        tracing::debug!(buffer = name, bytes = payload.len(), writer = %self.writer, "Wrote buffer");
        Ok(())
    }

    /// Latest contents of `name`
    ///
    /// Never blocks waiting for a first write: a name nobody has written
    /// fails with [`NotFoundError::Buffer`].
    pub async fn read(&self, name: &str) -> Result<NamedBuffer, BufferError> {
        validate_name(name)?;
        let raw = self
            .mux
            .show_buffer(name)
            .await
            .map_err(|e| map_backend(name, e))?;
        Ok(decode(name, raw))
    }

    /// Latest contents of `name` as UTF-8 text
    pub async fn read_string(&self, name: &str) -> Result<String, BufferError> {
        let buffer = self.read(name).await?;
        String::from_utf8(buffer.payload).map_err(|e| {
            BufferError::Backend(MuxctlError::unexpected_output(format!(
                "buffer {:?} is not valid UTF-8: {}",
                name, e
            )))
        })
    }

    pub async fn delete(&self, name: &str) -> Result<(), BufferError> {
        validate_name(name)?;
        self.mux
            .delete_buffer(name)
            .await
            .map_err(|e| map_backend(name, e))
    }

    /// Names of every buffer on the server, including ones other tools wrote
    pub async fn list(&self) -> Result<Vec<String>, BufferError> {
        self.mux.list_buffers().await.map_err(BufferError::Backend)
    }
}
