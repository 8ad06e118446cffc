//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use pillsync_core::Error as CoreError;
use thiserror::Error;

use crate::envelope::Envelope;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  Unauthorized(String),

  #[error("{0}")]
  Forbidden(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// The short category placed in the envelope's `error` field.
  pub fn label(&self) -> &'static str {
    match self {
      ApiError::Unauthorized(_) => "Unauthorized",
      ApiError::Forbidden(_) => "Forbidden",
      ApiError::NotFound(_) => "Not found",
      ApiError::BadRequest(_) => "Validation error",
      ApiError::Conflict(_) => "Conflict",
      ApiError::Internal(_) => "Internal server error",
    }
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    match e {
      CoreError::NotFound(m) => ApiError::NotFound(m),
      e @ CoreError::Forbidden(_) => ApiError::Forbidden(e.to_string()),
      CoreError::Validation(m) => ApiError::BadRequest(m),
      CoreError::Unauthorized(m) => ApiError::Unauthorized(m),
      CoreError::Conflict(m) => ApiError::Conflict(m),
      e @ (CoreError::Store(_) | CoreError::Serialization(_)) => {
        ApiError::Internal(Box::new(e))
      }
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

// ─── Response ────────────────────────────────────────────────────────────────

/// Attached to 500 responses as a response extension. Carries the message and
/// the error's source chain so an outer layer can decide whether to expose it.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
  pub message: String,
  pub stack:   Vec<String>,
}

impl ErrorDetail {
  fn of(e: &(dyn std::error::Error + Send + Sync + 'static)) -> Self {
    let mut stack = vec![format!("{e:?}")];
    let mut source = e.source();
    while let Some(inner) = source {
      stack.push(inner.to_string());
      source = inner.source();
    }
    Self {
      message: e.to_string(),
      stack,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = Envelope::failure(self.label(), self.to_string());

    match &self {
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        let detail = ErrorDetail::of(e.as_ref());
        let mut res = (status, body).into_response();
        res.extensions_mut().insert(detail);
        res
      }
      _ => (status, body).into_response(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn core_errors_map_to_statuses() {
    let cases = [
      (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
      (CoreError::Forbidden("Medication"), StatusCode::FORBIDDEN),
      (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
      (CoreError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
      (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
    ];
    for (core, status) in cases {
      assert_eq!(ApiError::from(core).status(), status);
    }
  }

  #[test]
  fn forbidden_message_names_the_kind() {
    let err = ApiError::from(CoreError::Forbidden("Medication"));
    assert_eq!(err.to_string(), "You do not have access to this medication");
  }

  #[test]
  fn internal_errors_carry_detail() {
    let io = std::io::Error::other("disk on fire");
    let res = ApiError::from(CoreError::store(io)).into_response();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = res.extensions().get::<ErrorDetail>().unwrap();
    assert!(detail.message.contains("disk on fire"));
    assert!(detail.stack.len() >= 2);
  }
}
