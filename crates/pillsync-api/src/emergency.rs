//! Emergency cards: generation (authenticated) and the public read-only view.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::Utc;
use pillsync_core::{
  emergency::{EmergencyCard, EmergencyView},
  identity::IdentityProvider,
  store::CareStore,
};
use qrcode::{QrCode, render::svg};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  ApiState, auth::Caller, envelope::Envelope, error::ApiError,
  extract::PathParam,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCard {
  pub card:    EmergencyCard,
  pub url:     String,
  /// `data:image/svg+xml;base64,…`
  pub qr_code: String,
}

/// Render `url` as an SVG QR code wrapped in a data URI.
pub fn qr_data_uri(url: &str) -> Result<String, ApiError> {
  let code =
    QrCode::new(url.as_bytes()).map_err(|e| ApiError::Internal(Box::new(e)))?;
  let svg = code
    .render::<svg::Color>()
    .min_dimensions(200, 200)
    .dark_color(svg::Color("#000000"))
    .light_color(svg::Color("#ffffff"))
    .quiet_zone(true)
    .build();
  Ok(format!("data:image/svg+xml;base64,{}", B64.encode(svg)))
}

/// `POST /emergency-cards`: snapshot the caller's profile and medications.
pub async fn generate<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let card = state.service.generate_emergency_card(&caller.user).await?;
  let url = card.public_url(&state.public_base_url);
  let qr_code = qr_data_uri(&url)?;
  tracing::info!(id = %card.id, expires_at = %card.expires_at, "emergency card issued");
  Ok((
    StatusCode::CREATED,
    Envelope::data(IssuedCard { card, url, qr_code }),
  ))
}

/// `GET /emergency/{id}`: public. Expired cards remain readable and are
/// flagged with `expired: true`. A malformed id reads as an unknown link.
pub async fn view<S, I>(
  State(state): State<ApiState<S, I>>,
  PathParam(id): PathParam<String>,
) -> Result<Envelope<EmergencyView>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let id = Uuid::parse_str(&id)
    .map_err(|_| ApiError::NotFound("No data found for this link.".into()))?;
  let view = state.service.view_emergency_card(id, Utc::now()).await?;
  Ok(Envelope::data(view))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn qr_is_an_svg_data_uri() {
    let uri = qr_data_uri("http://localhost:3000/emergency/abc").unwrap();
    let payload = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
    let svg = String::from_utf8(B64.decode(payload).unwrap()).unwrap();
    assert!(svg.contains("<svg"));
  }
}
