//! Extractors whose rejections are rendered as [`ApiError`] envelopes instead
//! of axum's plain-text bodies.

use axum::extract::{FromRequest, FromRequestParts};
use uuid::Uuid;

use crate::error::ApiError;

/// `axum::Json`, rejecting malformed bodies with a 400 envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Query`, rejecting bad parameters with a 400 envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

/// `axum::extract::Path`, rejecting unparseable segments with a 400 envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// Parse a record id taken from the path. An id that is not a UUID cannot
/// name a stored record, so it reads as `"{kind} not found"`.
pub fn record_id(raw: &str, kind: &str) -> Result<Uuid, ApiError> {
  Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("{kind} not found")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn malformed_id_is_not_found() {
    let id = Uuid::new_v4();
    assert_eq!(record_id(&id.to_string(), "Medication").unwrap(), id);
    assert!(matches!(
      record_id("not-a-uuid", "Medication"),
      Err(ApiError::NotFound(msg)) if msg == "Medication not found"
    ));
  }
}
