//! Handlers for `/adherence`.
//!
//! `POST` appends a record for every toggle; `PUT` sets the state of one
//! (medication, date, time slot) and is idempotent.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::{NaiveDate, Utc};
use pillsync_core::{
  identity::IdentityProvider,
  model::{AdherenceRecord, AdherenceSummary, NewAdherence},
  store::CareStore,
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState,
  auth::Caller,
  envelope::Envelope,
  error::ApiError,
  extract::{JsonBody, QueryParams},
};

#[derive(Debug, Deserialize)]
pub struct DayParams {
  /// `YYYY-MM-DD`; today (UTC) when omitted.
  pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AdherenceDay {
  pub records: Vec<AdherenceRecord>,
  pub summary: AdherenceSummary,
}

/// `GET /adherence[?date=YYYY-MM-DD]`
pub async fn day<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  QueryParams(params): QueryParams<DayParams>,
) -> Result<Envelope<AdherenceDay>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let date = params.date.unwrap_or_else(|| Utc::now().date_naive());
  let (records, summary) = state.service.adherence(&caller.user, date).await?;
  let count = records.len();
  Ok(Envelope::data(AdherenceDay { records, summary }).with_count(count))
}

/// `POST /adherence`: body: `{"medId":"…","time":"Morning","taken":true}`
pub async fn record<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  JsonBody(body): JsonBody<NewAdherence>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let record = state.service.record_adherence(&caller.user, body).await?;
  Ok((StatusCode::CREATED, Envelope::data(record)))
}

/// `PUT /adherence`: same body as `POST`.
pub async fn set<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  JsonBody(body): JsonBody<NewAdherence>,
) -> Result<Envelope<AdherenceRecord>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let record = state.service.set_adherence(&caller.user, body).await?;
  Ok(Envelope::data(record))
}
