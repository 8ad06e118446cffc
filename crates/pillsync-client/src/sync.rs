//! Keeps a [`CareState`] in step with the server's event stream.
//!
//! The loop follows the current user. When they change, the open stream is
//! dropped and the cached state reset before a stream for the new user is
//! opened. A stream that ends on its own is not reopened until the user
//! changes again.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt as _;
use pillsync_core::{identity::AuthUser, sync::Snapshot};
use tokio::sync::{RwLock, watch};

use crate::{client::ApiClient, state::CareState};

// ─── Event framing ───────────────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
  pub event: String,
  pub data:  String,
}

/// Incremental `text/event-stream` decoder. Bytes may be split anywhere,
/// including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
  pending: Vec<u8>,
  event:   Option<String>,
  data:    Vec<String>,
}

impl SseDecoder {
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
    self.pending.extend_from_slice(chunk);
    let mut frames = Vec::new();

    while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
      let raw: Vec<u8> = self.pending.drain(..=pos).collect();
      let line = String::from_utf8_lossy(&raw);
      let line = line.trim_end_matches(['\n', '\r']);

      if line.is_empty() {
        if let Some(frame) = self.dispatch() {
          frames.push(frame);
        }
        continue;
      }
      if line.starts_with(':') {
        continue;
      }

      let (field, value) = match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
      };
      match field {
        "event" => self.event = Some(value.to_owned()),
        "data" => self.data.push(value.to_owned()),
        _ => {}
      }
    }
    frames
  }

  fn dispatch(&mut self) -> Option<SseFrame> {
    let event = self.event.take();
    if self.data.is_empty() {
      return None;
    }
    let data = std::mem::take(&mut self.data).join("\n");
    Some(SseFrame {
      event: event.unwrap_or_else(|| "message".to_owned()),
      data,
    })
  }
}

// ─── Follow loop ─────────────────────────────────────────────────────────────

/// Run until the user channel closes.
pub async fn follow(
  api: ApiClient,
  mut users: watch::Receiver<Option<AuthUser>>,
  state: Arc<RwLock<CareState>>,
) {
  loop {
    let current = users.borrow_and_update().clone();
    state.write().await.reset();

    if let Some(user) = current {
      tracing::debug!(uid = %user.uid, "opening event stream");
      tokio::select! {
        result = stream_into(&api, &state) => {
          if let Err(e) = result {
            tracing::warn!(error = %e, uid = %user.uid, "event stream failed");
          } else {
            tracing::debug!(uid = %user.uid, "event stream ended");
          }
        }
        _ = users.changed() => continue,
      }
    }

    if users.changed().await.is_err() {
      return;
    }
  }
}

/// Apply every snapshot on one event stream to `state`.
pub async fn stream_into(api: &ApiClient, state: &RwLock<CareState>) -> Result<()> {
  let resp = api.events().await?;
  let mut body = resp.bytes_stream();
  let mut decoder = SseDecoder::default();

  while let Some(chunk) = body.next().await {
    let chunk = chunk.context("reading event stream")?;
    for frame in decoder.push(&chunk) {
      match decode_snapshot(&frame) {
        Ok(snapshot) => state.write().await.apply(snapshot),
        Err(e) => tracing::warn!(error = %e, event = %frame.event, "ignoring event"),
      }
    }
  }
  Ok(())
}

fn decode_snapshot(frame: &SseFrame) -> Result<Snapshot> {
  let data = serde_json::from_str(&frame.data).context("event data is not JSON")?;
  Ok(Snapshot::from_parts(&frame.event, data)?)
}
