//! The JSON envelope every API response is wrapped in:
//! `{success, data?, message?, count?, error?}`.

use axum::{
  Json,
  response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data:    Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count:   Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<String>,
}

impl<T> Envelope<T> {
  pub fn data(data: T) -> Self {
    Self {
      success: true,
      data:    Some(data),
      message: None,
      count:   None,
      error:   None,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn with_count(mut self, count: usize) -> Self {
    self.count = Some(count);
    self
  }
}

impl Envelope<()> {
  /// A successful response with a message and no payload.
  pub fn done(message: impl Into<String>) -> Self {
    Self {
      success: true,
      data:    None,
      message: Some(message.into()),
      count:   None,
      error:   None,
    }
  }

  pub fn failure(error: &str, message: impl Into<String>) -> Self {
    Self {
      success: false,
      data:    None,
      message: Some(message.into()),
      count:   None,
      error:   Some(error.to_owned()),
    }
  }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
  fn into_response(self) -> Response { Json(self).into_response() }
}
