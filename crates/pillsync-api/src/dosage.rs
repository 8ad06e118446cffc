//! Handlers for `/dosage-changes`. The log is append-only.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use pillsync_core::{
  identity::IdentityProvider,
  model::{DosageChange, NewDosageChange},
  store::CareStore,
};

use crate::{
  ApiState, auth::Caller, envelope::Envelope, error::ApiError,
  extract::JsonBody,
};

/// `GET /dosage-changes`: newest first.
pub async fn list<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Result<Envelope<Vec<DosageChange>>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let changes = state.service.list_dosage_changes(&caller.user).await?;
  let count = changes.len();
  Ok(Envelope::data(changes).with_count(count))
}

/// `POST /dosage-changes`: body:
/// `{"medId":"…","prevDosage":"…","newDosage":"…","reason":"…"}`
pub async fn create<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  JsonBody(body): JsonBody<NewDosageChange>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let change = state.service.add_dosage_change(&caller.user, body).await?;
  Ok((
    StatusCode::CREATED,
    Envelope::data(change).with_message("Dosage change recorded"),
  ))
}
