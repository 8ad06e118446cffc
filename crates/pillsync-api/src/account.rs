//! Handlers for `/auth` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/signup` | Creates the identity only |
//! | `POST` | `/auth/signin` | Returns a bearer token |
//! | `POST` | `/auth/signout` | Revokes the presented token |
//! | `GET`  | `/auth/verify` | 404 if the user document is missing |
//! | `GET`  | `/auth/profile` | 404 if the user document is missing |
//! | `POST` | `/auth/profile` | Creates the user document if absent |
//! | `PUT`  | `/auth/profile` | Replaces the profile |

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use pillsync_core::{
  identity::{AuthUser, IdentityProvider},
  model::{Profile, Role, UserRecord},
  store::CareStore,
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState, auth::Caller, envelope::Envelope, error::ApiError,
  extract::JsonBody,
};

// ─── Views ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedUser {
  pub uid:            String,
  pub email:          String,
  pub email_verified: bool,
  pub profile:        Profile,
  pub role:           Role,
  pub created_at:     DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
  pub uid:        String,
  pub email:      String,
  pub profile:    Profile,
  pub role:       Role,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl ProfileView {
  fn of(caller: &AuthUser, user: UserRecord) -> Self {
    Self {
      uid:        caller.uid.clone(),
      email:      caller.email.clone(),
      profile:    user.profile,
      role:       user.role,
      created_at: user.created_at,
      updated_at: user.updated_at,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
  pub user:       AuthUser,
}

// ─── Sign up / in / out ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Credentials {
  pub email:    String,
  pub password: String,
}

/// `POST /auth/signup`: body: `{"email":"…","password":"…"}`
pub async fn sign_up<S, I>(
  State(state): State<ApiState<S, I>>,
  JsonBody(body): JsonBody<Credentials>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let user = state.identity.sign_up(&body.email, &body.password).await?;
  tracing::info!(uid = %user.uid, "account created");
  Ok((
    StatusCode::CREATED,
    Envelope::data(user).with_message("Account created successfully"),
  ))
}

/// `POST /auth/signin`: body: `{"email":"…","password":"…"}`
pub async fn sign_in<S, I>(
  State(state): State<ApiState<S, I>>,
  JsonBody(body): JsonBody<Credentials>,
) -> Result<Envelope<SignedIn>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let (user, issued) = state.identity.sign_in(&body.email, &body.password).await?;
  Ok(Envelope::data(SignedIn {
    token: issued.token,
    expires_at: issued.expires_at,
    user,
  }))
}

/// `POST /auth/signout`
pub async fn sign_out<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Result<Envelope<()>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  state.identity.sign_out(&caller.token).await?;
  Ok(Envelope::done("Signed out successfully"))
}

// ─── Verify / profile ────────────────────────────────────────────────────────

/// `GET /auth/verify`
pub async fn verify<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Result<Envelope<VerifiedUser>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let user = state.service.user(&caller.user).await?;
  Ok(Envelope::data(VerifiedUser {
    uid:            caller.user.uid,
    email:          caller.user.email,
    email_verified: caller.user.email_verified,
    profile:        user.profile,
    role:           user.role,
    created_at:     user.created_at,
  }))
}

/// `GET /auth/profile`
pub async fn profile<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
) -> Result<Envelope<ProfileView>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let user = state.service.user(&caller.user).await?;
  Ok(Envelope::data(ProfileView::of(&caller.user, user)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateProfileBody {
  pub name: Option<String>,
  pub role: Option<Role>,
}

/// `POST /auth/profile`: body: `{"name":"…","role":"patient"}`, both
/// optional. 201 when the document was created, 200 when it already existed.
pub async fn create_profile<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  JsonBody(body): JsonBody<CreateProfileBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let (user, created) = state
    .service
    .ensure_user(&caller.user, body.name, body.role)
    .await?;
  let (status, message) = if created {
    (StatusCode::CREATED, "Profile created successfully")
  } else {
    (StatusCode::OK, "Profile already exists")
  };
  Ok((
    status,
    Envelope::data(ProfileView::of(&caller.user, user)).with_message(message),
  ))
}

/// `PUT /auth/profile`: body: a full profile object.
pub async fn update_profile<S, I>(
  State(state): State<ApiState<S, I>>,
  caller: Caller,
  JsonBody(profile): JsonBody<Profile>,
) -> Result<Envelope<ProfileView>, ApiError>
where
  S: CareStore,
  I: IdentityProvider,
{
  let user = state.service.update_profile(&caller.user, profile).await?;
  Ok(
    Envelope::data(ProfileView::of(&caller.user, user))
      .with_message("Profile updated successfully"),
  )
}
