//! Identity provider abstraction.
//!
//! The provider issues and verifies bearer credentials. Creating the user
//! document that backs an identity is the caller's responsibility, not the
//! provider's.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A verified identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
  pub uid:            String,
  pub email:          String,
  pub email_verified: bool,
}

/// A bearer credential handed out on sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

/// A persisted local account.
#[derive(Debug, Clone)]
pub struct Account {
  pub uid:            String,
  pub email:          String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash:  String,
  pub email_verified: bool,
  pub created_at:     DateTime<Utc>,
}

impl Account {
  pub fn auth_user(&self) -> AuthUser {
    AuthUser {
      uid:            self.uid.clone(),
      email:          self.email.clone(),
      email_verified: self.email_verified,
    }
  }
}

/// A persisted token. Only a digest of the bearer string is kept.
#[derive(Debug, Clone)]
pub struct TokenRecord {
  pub token_hash: String,
  pub uid:        String,
  pub issued_at:  DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

/// Sign-up, sign-in, verification and sign-out against an identity service.
///
/// Errors are reported as [`crate::Error::Unauthorized`],
/// [`crate::Error::Validation`] or [`crate::Error::Conflict`] and are meant to
/// be shown to the user as-is.
pub trait IdentityProvider: Send + Sync {
  /// Create an identity. Does not create a user document.
  fn sign_up<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AuthUser>> + Send + 'a;

  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<(AuthUser, IssuedToken)>> + Send + 'a;

  /// Resolve a bearer token to the identity it was issued for.
  fn verify<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<AuthUser>> + Send + 'a;

  /// Revoke a bearer token.
  fn sign_out<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a;
}
