//! JSON REST API for PillSync.
//!
//! Exposes axum [`Router`]s backed by any [`CareStore`] and
//! [`IdentityProvider`]. Every care-document mutation goes through the shared
//! [`CareService`]. TLS, CORS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new()
//!   .nest("/api", pillsync_api::api_router(state.clone()))
//!   .merge(pillsync_api::public_router(state))
//! ```

pub mod account;
pub mod adherence;
pub mod auth;
pub mod dosage;
pub mod emergency;
pub mod envelope;
pub mod error;
pub mod events;
pub mod extract;
pub mod medications;
pub mod reminders;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use pillsync_core::{
  identity::IdentityProvider, service::CareService, store::CareStore,
};

pub use envelope::Envelope;
pub use error::{ApiError, ErrorDetail};

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared state threaded through all API handlers.
pub struct ApiState<S, I> {
  pub service:         CareService<S>,
  pub identity:        Arc<I>,
  /// Origin the public emergency view is served from, used to build card
  /// links.
  pub public_base_url: Arc<str>,
}

impl<S, I> Clone for ApiState<S, I> {
  fn clone(&self) -> Self {
    Self {
      service:         self.service.clone(),
      identity:        Arc::clone(&self.identity),
      public_base_url: Arc::clone(&self.public_base_url),
    }
  }
}

// ─── Routers ─────────────────────────────────────────────────────────────────

/// Build the authenticated API router, meant to be nested under `/api`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, I>(state: ApiState<S, I>) -> Router<()>
where
  S: CareStore + 'static,
  I: IdentityProvider + 'static,
{
  Router::new()
    // Identity and profile
    .route("/auth/signup", post(account::sign_up::<S, I>))
    .route("/auth/signin", post(account::sign_in::<S, I>))
    .route("/auth/signout", post(account::sign_out::<S, I>))
    .route("/auth/verify", get(account::verify::<S, I>))
    .route(
      "/auth/profile",
      get(account::profile::<S, I>)
        .post(account::create_profile::<S, I>)
        .put(account::update_profile::<S, I>),
    )
    // Medications
    .route(
      "/medications",
      get(medications::list::<S, I>).post(medications::create::<S, I>),
    )
    .route(
      "/medications/{id}",
      get(medications::get_one::<S, I>)
        .put(medications::update::<S, I>)
        .delete(medications::delete::<S, I>),
    )
    // Dosage history
    .route(
      "/dosage-changes",
      get(dosage::list::<S, I>).post(dosage::create::<S, I>),
    )
    // Reminders
    .route(
      "/reminders",
      get(reminders::list::<S, I>).post(reminders::create::<S, I>),
    )
    .route(
      "/reminders/{id}",
      put(reminders::update::<S, I>).delete(reminders::delete::<S, I>),
    )
    // Adherence
    .route(
      "/adherence",
      get(adherence::day::<S, I>)
        .post(adherence::record::<S, I>)
        .put(adherence::set::<S, I>),
    )
    // Emergency cards
    .route("/emergency-cards", post(emergency::generate::<S, I>))
    // Live snapshots
    .route("/events", get(events::stream::<S, I>))
    .with_state(state)
}

/// Routes served without authentication, mounted at the root.
pub fn public_router<S, I>(state: ApiState<S, I>) -> Router<()>
where
  S: CareStore + 'static,
  I: IdentityProvider + 'static,
{
  Router::new()
    .route("/emergency/{id}", get(emergency::view::<S, I>))
    .with_state(state)
}
