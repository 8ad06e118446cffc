//! [`LocalIdentity`]: an [`IdentityProvider`] over locally stored accounts.
//!
//! Passwords are hashed with argon2. Bearer tokens are 32 random bytes,
//! hex-encoded; only their SHA-256 digest is persisted.

use std::sync::Arc;

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use chrono::{Duration, Utc};
use pillsync_core::{
  Error, Result,
  identity::{Account, AuthUser, IdentityProvider, IssuedToken, TokenRecord},
  store::AccountStore,
};
use rand_core::{OsRng, RngCore as _};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

/// argon2's error type does not implement `std::error::Error` in every
/// feature configuration, so its message is carried instead.
#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
struct HashError(String);

pub struct LocalIdentity<A> {
  accounts:  Arc<A>,
  token_ttl: Duration,
}

impl<A: AccountStore> LocalIdentity<A> {
  pub fn new(accounts: Arc<A>, token_ttl: Duration) -> Self {
    Self { accounts, token_ttl }
  }

  async fn issue_token(&self, uid: &str) -> Result<IssuedToken> {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let now = Utc::now();
    let purged = self
      .accounts
      .purge_expired_tokens(now)
      .await
      .map_err(Error::store)?;
    if purged > 0 {
      tracing::debug!(purged, "expired tokens removed");
    }

    let expires_at = now + self.token_ttl;
    self
      .accounts
      .insert_token(TokenRecord {
        token_hash: digest(&token),
        uid: uid.to_owned(),
        issued_at: now,
        expires_at,
      })
      .await
      .map_err(Error::store)?;

    Ok(IssuedToken { token, expires_at })
  }
}

fn digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

fn invalid_token() -> Error { Error::Unauthorized("Invalid or expired token".into()) }

impl<A: AccountStore> IdentityProvider for LocalIdentity<A> {
  async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
    let email = normalize_email(email);
    if !email.contains('@') {
      return Err(Error::Validation("The email address is badly formatted".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
      return Err(Error::Validation(format!(
        "Password should be at least {MIN_PASSWORD_LEN} characters"
      )));
    }
    if self
      .accounts
      .find_account_by_email(&email)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Err(Error::Conflict(
        "The email address is already in use by another account".into(),
      ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| Error::store(HashError(e.to_string())))?
      .to_string();

    let account = Account {
      uid: Uuid::new_v4().simple().to_string(),
      email,
      password_hash,
      email_verified: false,
      created_at: Utc::now(),
    };
    let user = account.auth_user();
    self
      .accounts
      .insert_account(account)
      .await
      .map_err(Error::store)?;
    Ok(user)
  }

  async fn sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> Result<(AuthUser, IssuedToken)> {
    let rejected = || Error::Unauthorized("Invalid email or password".into());

    let account = self
      .accounts
      .find_account_by_email(&normalize_email(email))
      .await
      .map_err(Error::store)?
      .ok_or_else(rejected)?;

    let parsed = PasswordHash::new(&account.password_hash).map_err(|_| rejected())?;
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .map_err(|_| rejected())?;

    let issued = self.issue_token(&account.uid).await?;
    tracing::info!(uid = %account.uid, "signed in");
    Ok((account.auth_user(), issued))
  }

  async fn verify(&self, token: &str) -> Result<AuthUser> {
    let hash = digest(token);
    let record = self
      .accounts
      .find_token(&hash)
      .await
      .map_err(Error::store)?
      .ok_or_else(invalid_token)?;

    if Utc::now() >= record.expires_at {
      self.accounts.delete_token(&hash).await.map_err(Error::store)?;
      return Err(invalid_token());
    }

    let account = self
      .accounts
      .get_account(&record.uid)
      .await
      .map_err(Error::store)?
      .ok_or_else(invalid_token)?;
    Ok(account.auth_user())
  }

  async fn sign_out(&self, token: &str) -> Result<()> {
    self
      .accounts
      .delete_token(&digest(token))
      .await
      .map_err(Error::store)
  }
}

#[cfg(test)]
mod tests {
  use pillsync_store_sqlite::SqliteStore;

  use super::*;

  async fn identity(ttl: Duration) -> LocalIdentity<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    LocalIdentity::new(Arc::new(store), ttl)
  }

  #[tokio::test]
  async fn sign_up_then_sign_in_and_verify() {
    let id = identity(Duration::hours(1)).await;
    let user = id.sign_up(" Alice@Example.com ", "secret1").await.unwrap();
    assert_eq!(user.email, "alice@example.com");
    assert!(!user.email_verified);

    let (signed_in, issued) = id.sign_in("alice@example.com", "secret1").await.unwrap();
    assert_eq!(signed_in.uid, user.uid);
    assert_eq!(issued.token.len(), 64);

    let verified = id.verify(&issued.token).await.unwrap();
    assert_eq!(verified, user);
  }

  #[tokio::test]
  async fn sign_up_validates_input() {
    let id = identity(Duration::hours(1)).await;
    assert!(matches!(
      id.sign_up("not-an-email", "secret1").await,
      Err(Error::Validation(_))
    ));
    assert!(matches!(
      id.sign_up("a@example.com", "12345").await,
      Err(Error::Validation(_))
    ));

    id.sign_up("a@example.com", "secret1").await.unwrap();
    assert!(matches!(
      id.sign_up("A@example.com", "secret2").await,
      Err(Error::Conflict(_))
    ));
  }

  #[tokio::test]
  async fn wrong_password_is_unauthorized() {
    let id = identity(Duration::hours(1)).await;
    id.sign_up("a@example.com", "secret1").await.unwrap();
    assert!(matches!(
      id.sign_in("a@example.com", "wrong!").await,
      Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
      id.sign_in("b@example.com", "secret1").await,
      Err(Error::Unauthorized(_))
    ));
  }

  #[tokio::test]
  async fn expired_token_is_rejected() {
    let id = identity(Duration::seconds(-1)).await;
    id.sign_up("a@example.com", "secret1").await.unwrap();
    let (_, issued) = id.sign_in("a@example.com", "secret1").await.unwrap();
    assert!(matches!(id.verify(&issued.token).await, Err(Error::Unauthorized(_))));
  }

  #[tokio::test]
  async fn sign_out_revokes_token() {
    let id = identity(Duration::hours(1)).await;
    id.sign_up("a@example.com", "secret1").await.unwrap();
    let (_, issued) = id.sign_in("a@example.com", "secret1").await.unwrap();

    id.sign_out(&issued.token).await.unwrap();
    assert!(matches!(id.verify(&issued.token).await, Err(Error::Unauthorized(_))));
  }

  #[tokio::test]
  async fn signing_in_purges_expired_tokens() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let expired = LocalIdentity::new(Arc::clone(&store), Duration::seconds(-1));
    expired.sign_up("a@example.com", "secret1").await.unwrap();
    let (_, stale) = expired.sign_in("a@example.com", "secret1").await.unwrap();
    assert!(store.find_token(&digest(&stale.token)).await.unwrap().is_some());

    let id = LocalIdentity::new(Arc::clone(&store), Duration::hours(1));
    let (_, fresh) = id.sign_in("a@example.com", "secret1").await.unwrap();
    assert!(store.find_token(&digest(&stale.token)).await.unwrap().is_none());
    assert!(store.find_token(&digest(&fresh.token)).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn unknown_token_is_rejected() {
    let id = identity(Duration::hours(1)).await;
    assert!(matches!(id.verify("deadbeef").await, Err(Error::Unauthorized(_))));
  }
}
