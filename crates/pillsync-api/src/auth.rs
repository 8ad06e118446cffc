//! Bearer-token extractor.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use pillsync_core::{
  Error as CoreError, identity::{AuthUser, IdentityProvider}, store::CareStore,
};

use crate::{ApiState, error::ApiError};

/// The verified identity behind a request, plus the token it presented.
#[derive(Debug, Clone)]
pub struct Caller {
  pub user:  AuthUser,
  pub token: String,
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
  let value = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .ok_or_else(|| {
      ApiError::Unauthorized(
        "Missing or invalid authorization header. Format: Bearer <token>".into(),
      )
    })?;

  let token = value.trim();
  if token.is_empty() {
    return Err(ApiError::Unauthorized("Token not provided".into()));
  }
  Ok(token.to_owned())
}

impl<S, I> FromRequestParts<ApiState<S, I>> for Caller
where
  S: CareStore + 'static,
  I: IdentityProvider + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S, I>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers)?;
    let user = state.identity.verify(&token).await.map_err(|e| match e {
      CoreError::Store(_) | CoreError::Serialization(_) => ApiError::from(e),
      other => {
        tracing::debug!(error = %other, "token rejected");
        ApiError::Unauthorized("Invalid or expired token".into())
      }
    })?;
    Ok(Caller { user, token })
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    h
  }

  #[test]
  fn accepts_bearer() {
    assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
  }

  #[test]
  fn rejects_missing_and_other_schemes() {
    assert!(matches!(
      bearer_token(&HeaderMap::new()),
      Err(ApiError::Unauthorized(m)) if m.starts_with("Missing or invalid")
    ));
    assert!(matches!(
      bearer_token(&headers("Basic dXNlcjpwYXNz")),
      Err(ApiError::Unauthorized(_))
    ));
  }

  #[test]
  fn rejects_empty_token() {
    assert!(matches!(
      bearer_token(&headers("Bearer   ")),
      Err(ApiError::Unauthorized(m)) if m == "Token not provided"
    ));
  }
}
