//! HTTP server for PillSync.
//!
//! Combines the authenticated API under `/api`, the public emergency view,
//! a health check and a JSON 404 fallback into one axum [`Router`], wrapped in
//! CORS and request tracing.

pub mod identity;

use std::path::PathBuf;

use axum::{
  Json, Router,
  body::Body,
  extract::OriginalUri,
  http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE, InvalidHeaderValue},
  },
  middleware,
  response::Response,
  routing::get,
};
use chrono::{SecondsFormat, Utc};
use pillsync_api::{ApiError, ApiState, ErrorDetail};
use pillsync_core::{identity::IdentityProvider, store::CareStore};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use identity::LocalIdentity;

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
  #[default]
  Development,
  Production,
}

impl RunMode {
  pub fn as_str(self) -> &'static str {
    match self {
      RunMode::Development => "development",
      RunMode::Production => "production",
    }
  }
}

/// Runtime server configuration, deserialised from `config.toml` and
/// `PILLSYNC_*` environment variables.
#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  pub run_mode:        RunMode,
  /// The single origin allowed to make credentialed cross-origin requests.
  pub cors_origin:     String,
  /// Origin emergency-card links point at.
  pub public_base_url: String,
  pub store_path:      PathBuf,
  pub token_ttl_secs:  i64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:            "0.0.0.0".to_string(),
      port:            5000,
      run_mode:        RunMode::Development,
      cors_origin:     "http://localhost:3000".to_string(),
      public_base_url: "http://localhost:3000".to_string(),
      store_path:      PathBuf::from("pillsync.db"),
      token_ttl_secs:  3600,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the complete application router.
pub fn router<S, I>(
  config: &ServerConfig,
  state: ApiState<S, I>,
) -> Result<Router, InvalidHeaderValue>
where
  S: CareStore + 'static,
  I: IdentityProvider + 'static,
{
  let cors = CorsLayer::new()
    .allow_origin(HeaderValue::from_str(&config.cors_origin)?)
    .allow_credentials(true)
    .allow_methods([
      Method::GET,
      Method::POST,
      Method::PUT,
      Method::DELETE,
      Method::OPTIONS,
    ])
    .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

  let environment = config.run_mode.as_str();
  let mut app = Router::new()
    .route("/health", get(move || health(environment)))
    .nest("/api", pillsync_api::api_router(state.clone()))
    .merge(pillsync_api::public_router(state))
    .fallback(not_found);

  if config.run_mode != RunMode::Production {
    app = app.layer(middleware::map_response(expose_error_stack));
  }

  Ok(app.layer(cors).layer(TraceLayer::new_for_http()))
}

async fn health(environment: &'static str) -> Json<serde_json::Value> {
  Json(json!({
    "success":     true,
    "message":     "PillSync-360 Backend API is running",
    "timestamp":   Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    "environment": environment,
  }))
}

async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
  ApiError::NotFound(format!("Route {method} {} not found", uri.path()))
}

/// Rewrite internal-error bodies to include the error's source chain.
async fn expose_error_stack(response: Response) -> Response {
  let Some(detail) = response.extensions().get::<ErrorDetail>().cloned() else {
    return response;
  };
  let (parts, _) = response.into_parts();
  let body = json!({
    "success": false,
    "error":   "Internal server error",
    "message": detail.message,
    "stack":   detail.stack,
  });
  Response::from_parts(parts, Body::from(body.to_string()))
}

// ─── Integration tests ────────────────────────────────────────────────────────
