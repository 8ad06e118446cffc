//! Handlers for `/reminders` endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use pillsync_core::{
  identity::IdentityProvider,
  model::{NewReminder, Reminder, ReminderPatch},
  store::CareStore,
};
use crate::{
  ApiState,
  auth::Caller,
  envelope::Envelope,
  error::ApiError,
  extract::{JsonBody, PathParam, record_id},
};

/// `GET /reminders`
pub async fn list<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Result<Envelope<Vec<Reminder>>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let reminders = state.service.list_reminders(&caller.user).await?;
  let count = reminders.len();
  Ok(Envelope::data(reminders).with_count(count))
}

/// `POST /reminders`: body: `{"medId":"…","time":"Morning", …}`.
/// `medicineName` is copied from the medication when omitted.
pub async fn create<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  JsonBody(body): JsonBody<NewReminder>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let reminder = state.service.add_reminder(&caller.user, body).await?;
  Ok((
    StatusCode::CREATED,
    Envelope::data(reminder).with_message("Reminder created successfully"),
  ))
}

/// `PUT /reminders/{id}`
pub async fn update<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  PathParam(id): PathParam<String>,
  JsonBody(patch): JsonBody<ReminderPatch>,
) -> Result<Envelope<Reminder>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let id = record_id(&id, "Reminder")?;
  let reminder = state.service.update_reminder(&caller.user, id, patch).await?;
  Ok(Envelope::data(reminder).with_message("Reminder updated successfully"))
}

/// `DELETE /reminders/{id}`
pub async fn delete<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  PathParam(id): PathParam<String>,
) -> Result<Envelope<()>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let id = record_id(&id, "Reminder")?;
  state.service.delete_reminder(&caller.user, id).await?;
  Ok(Envelope::done("Reminder deleted successfully"))
}
