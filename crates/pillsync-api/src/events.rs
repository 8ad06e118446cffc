//! `GET /events`: the caller's live collections as server-sent events.
//!
//! The stream opens with one snapshot per collection, then sends a fresh
//! snapshot of a collection whenever one of the caller's writes touches it.
//! Each event is named after its collection and carries the full result set
//! as JSON. A subscriber that falls behind the change feed is resent every
//! collection. The stream ends at the first change after its token has been
//! revoked or has expired.

use std::{convert::Infallible, sync::Arc};

use axum::{
  extract::State,
  response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt as _};
use pillsync_core::{
  identity::IdentityProvider, service::CareService, store::CareStore,
  sync::{Change, Collection},
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{ApiState, auth::Caller};

pub async fn stream<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
  S: CareStore + 'static,
  I: IdentityProvider + 'static,
{
  // Subscribe before the initial snapshots so no write falls in between.
  let feed = Feed {
    changes:  state.service.subscribe(),
    identity: state.identity,
    token:    caller.token,
    uid:      caller.user.uid.clone(),
    first:    true,
  };
  let uid = caller.user.uid;
  tracing::debug!(%uid, "event stream opened");

  let batches = stream::unfold(feed, |mut feed| async move {
    let batch = feed.next_batch().await?;
    Some((batch, feed))
  });

  let service = state.service;
  let events = batches
    .then(move |batch| {
      let service = service.clone();
      let uid = uid.clone();
      async move {
        let mut events = Vec::with_capacity(batch.len());
        for collection in batch {
          if let Some(event) = snapshot_event(&service, &uid, collection).await {
            events.push(Ok(event));
          }
        }
        stream::iter(events)
      }
    })
    .flatten();

  Sse::new(events).keep_alive(KeepAlive::default())
}

/// Per-stream state: the caller's change subscription and the token the
/// stream was opened with.
struct Feed<I> {
  changes:  broadcast::Receiver<Change>,
  identity: Arc<I>,
  token:    String,
  uid:      String,
  first:    bool,
}

impl<I: IdentityProvider> Feed<I> {
  /// The collections to resend next, or `None` once the feed closes or the
  /// token stops verifying.
  async fn next_batch(&mut self) -> Option<Vec<Collection>> {
    if std::mem::take(&mut self.first) {
      return Some(Collection::ALL.to_vec());
    }
    let batch = loop {
      match self.changes.recv().await {
        Ok(change) if change.owner == self.uid => break vec![change.collection],
        Ok(_) => continue,
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(uid = %self.uid, skipped, "event stream lagged; resending everything");
          break Collection::ALL.to_vec();
        }
        Err(RecvError::Closed) => return None,
      }
    };
    if let Err(e) = self.identity.verify(&self.token).await {
      tracing::debug!(uid = %self.uid, error = %e, "event stream closed; token no longer valid");
      return None;
    }
    Some(batch)
  }
}

async fn snapshot_event<S: CareStore>(
  service: &CareService<S>,
  uid: &str,
  collection: Collection,
) -> Option<Event> {
  let snapshot = match service.snapshot(uid, collection).await {
    Ok(snapshot) => snapshot,
    Err(e) => {
      tracing::warn!(error = %e, %collection, "snapshot failed");
      return None;
    }
  };
  let data = snapshot.to_json().ok()?;
  Event::default().event(collection.as_ref()).json_data(data).ok()
}
