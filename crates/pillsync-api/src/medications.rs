//! Handlers for `/medications` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/medications` | Caller's medications, newest first |
//! | `POST`   | `/medications` | `name` and `dosage` required |
//! | `GET`    | `/medications/{id}` | 404 if absent, 403 if foreign |
//! | `PUT`    | `/medications/{id}` | Partial update |
//! | `DELETE` | `/medications/{id}` | Hard delete |

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use pillsync_core::{
  identity::IdentityProvider,
  model::{Medication, MedicationPatch, NewMedication},
  store::CareStore,
};
use crate::{
  ApiState,
  auth::Caller,
  envelope::Envelope,
  error::ApiError,
  extract::{JsonBody, PathParam, record_id},
};

/// `GET /medications`
pub async fn list<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Result<Envelope<Vec<Medication>>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let meds = state.service.list_medications(&caller.user).await?;
  let count = meds.len();
  Ok(Envelope::data(meds).with_count(count))
}

/// `GET /medications/{id}`
pub async fn get_one<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  PathParam(id): PathParam<String>,
) -> Result<Envelope<Medication>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let id = record_id(&id, "Medication")?;
  let med = state.service.get_medication(&caller.user, id).await?;
  Ok(Envelope::data(med))
}

/// `POST /medications`: body: `{"name":"…","dosage":"…", …}`
pub async fn create<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  JsonBody(body): JsonBody<NewMedication>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let med = state.service.create_medication(&caller.user, body).await?;
  tracing::debug!(id = %med.id, owner = %med.user_id, "medication created");
  Ok((
    StatusCode::CREATED,
    Envelope::data(med).with_message("Medication created successfully"),
  ))
}

/// `PUT /medications/{id}`: body: any subset of the medication fields.
pub async fn update<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  PathParam(id): PathParam<String>,
  JsonBody(patch): JsonBody<MedicationPatch>,
) -> Result<Envelope<Medication>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let id = record_id(&id, "Medication")?;
  let med = state.service.update_medication(&caller.user, id, patch).await?;
  Ok(Envelope::data(med).with_message("Medication updated successfully"))
}

/// `DELETE /medications/{id}`
pub async fn delete<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  PathParam(id): PathParam<String>,
) -> Result<Envelope<()>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let id = record_id(&id, "Medication")?;
  state.service.delete_medication(&caller.user, id).await?;
  Ok(Envelope::done("Medication deleted successfully"))
}
