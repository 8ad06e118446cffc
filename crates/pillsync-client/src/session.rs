//! Who is signed in, and every mutation made on their behalf.
//!
//! The current user is published on a [`watch`] channel; the sync loop
//! follows it. All writes go through the API and require a signed-in user.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use pillsync_core::{
  identity::AuthUser,
  model::{
    AdherenceRecord, DosageChange, Medication, MedicationPatch, NewAdherence,
    NewDosageChange, NewMedication, NewReminder, Profile, Reminder,
    ReminderPatch, Role,
  },
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::client::{AdherenceDay, ApiClient, ApiFailure, IssuedCard};

/// `changedBy` recorded for dosage changes made from this client.
pub const CHANGED_BY_USER: &str = "User";

#[derive(Debug, thiserror::Error)]
#[error("User not authenticated")]
pub struct NotSignedIn;

/// What is persisted between runs.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedSession {
  token:      String,
  expires_at: DateTime<Utc>,
  user:       AuthUser,
}

pub struct Session {
  api:  ApiClient,
  file: Option<PathBuf>,
  user: watch::Sender<Option<AuthUser>>,
}

impl Session {
  pub fn new(api: ApiClient, file: Option<PathBuf>) -> Self {
    let (user, _) = watch::channel(None);
    Self { api, file, user }
  }

  pub fn api(&self) -> &ApiClient { &self.api }

  pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> { self.user.subscribe() }

  pub fn current(&self) -> Option<AuthUser> { self.user.borrow().clone() }

  fn require(&self) -> Result<AuthUser> { self.current().ok_or_else(|| NotSignedIn.into()) }

  // ─── Sign up / in / out ────────────────────────────────────────────────────

  /// Create the identity, sign in, then create the user document.
  pub async fn sign_up(
    &self,
    email: &str,
    password: &str,
    name: Option<&str>,
    role: Option<Role>,
  ) -> Result<AuthUser> {
    self.api.sign_up(email, password).await?;
    let signed_in = self.api.sign_in(email, password).await?;
    self.api.set_token(Some(signed_in.token.clone()));

    if let Err(e) = self.api.create_profile(name, role).await {
      self.api.set_token(None);
      return Err(e);
    }
    self.establish(signed_in.token, signed_in.expires_at, signed_in.user).await
  }

  /// Sign in and make sure the user document exists.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
    let signed_in = self.api.sign_in(email, password).await?;
    self.api.set_token(Some(signed_in.token.clone()));

    if let Err(e) = self.ensure_profile().await {
      self.api.set_token(None);
      return Err(e);
    }
    self.establish(signed_in.token, signed_in.expires_at, signed_in.user).await
  }

  /// Resume the session saved by a previous run, if it is still valid.
  pub async fn restore(&self) -> Result<Option<AuthUser>> {
    let Some(path) = &self.file else { return Ok(None) };
    let raw = match tokio::fs::read_to_string(path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => {
        return Err(e).with_context(|| format!("reading session file {}", path.display()));
      }
    };
    let saved: SavedSession = match serde_json::from_str(&raw) {
      Ok(saved) => saved,
      Err(e) => {
        tracing::warn!(error = %e, "discarding unreadable session file");
        self.forget().await;
        return Ok(None);
      }
    };
    if Utc::now() >= saved.expires_at {
      self.forget().await;
      return Ok(None);
    }

    self.api.set_token(Some(saved.token));
    match self.ensure_profile().await {
      Ok(()) => {}
      Err(e)
        if ApiFailure::of(&e).is_some_and(|f| f.status == StatusCode::UNAUTHORIZED) =>
      {
        tracing::info!("saved session was rejected; signing out");
        self.api.set_token(None);
        self.forget().await;
        return Ok(None);
      }
      Err(e) => {
        self.api.set_token(None);
        return Err(e);
      }
    }

    self.user.send_replace(Some(saved.user.clone()));
    Ok(Some(saved.user))
  }

  /// Revoke the token and clear local state. Succeeds even if the server
  /// cannot be reached.
  pub async fn sign_out(&self) -> Result<()> {
    if self.api.token().is_some()
      && let Err(e) = self.api.sign_out().await
    {
      tracing::warn!(error = %e, "server sign-out failed");
    }
    self.api.set_token(None);
    self.forget().await;
    self.user.send_replace(None);
    Ok(())
  }

  async fn ensure_profile(&self) -> Result<()> {
    match self.api.verify().await {
      Ok(_) => Ok(()),
      Err(e) if ApiFailure::is_not_found(&e) => {
        self.api.create_profile(None, None).await?;
        Ok(())
      }
      Err(e) => Err(e),
    }
  }

  async fn establish(
    &self,
    token: String,
    expires_at: DateTime<Utc>,
    user: AuthUser,
  ) -> Result<AuthUser> {
    if let Some(path) = &self.file {
      let saved = SavedSession { token, expires_at, user: user.clone() };
      if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
          .await
          .with_context(|| format!("creating {}", dir.display()))?;
      }
      tokio::fs::write(path, serde_json::to_vec_pretty(&saved)?)
        .await
        .with_context(|| format!("writing session file {}", path.display()))?;
    }
    tracing::info!(uid = %user.uid, "signed in");
    self.user.send_replace(Some(user.clone()));
    Ok(user)
  }

  async fn forget(&self) {
    if let Some(path) = &self.file
      && let Err(e) = tokio::fs::remove_file(path).await
      && e.kind() != std::io::ErrorKind::NotFound
    {
      tracing::warn!(error = %e, "failed to remove session file");
    }
  }

  // ─── Profile ───────────────────────────────────────────────────────────────

  pub async fn update_profile(&self, profile: &Profile) -> Result<Profile> {
    self.require()?;
    Ok(self.api.update_profile(profile).await?.profile)
  }

  // ─── Medications ───────────────────────────────────────────────────────────

  pub async fn add_medication(&self, new: &NewMedication) -> Result<Medication> {
    self.require()?;
    self.api.create_medication(new).await
  }

  pub async fn update_medication(
    &self,
    id: Uuid,
    patch: &MedicationPatch,
  ) -> Result<Medication> {
    self.require()?;
    self.api.update_medication(id, patch).await
  }

  pub async fn delete_medication(&self, id: Uuid) -> Result<()> {
    self.require()?;
    self.api.delete_medication(id).await
  }

  // ─── Dosage changes ────────────────────────────────────────────────────────

  pub async fn add_dosage_change(&self, new: &NewDosageChange) -> Result<DosageChange> {
    self.require()?;
    self.api.add_dosage_change(new).await
  }

  /// Set a medication's dosage and log the change. No entry is logged when
  /// the dosage is unchanged.
  pub async fn change_dosage(
    &self,
    med_id: Uuid,
    new_dosage: &str,
    reason: &str,
  ) -> Result<(Medication, Option<DosageChange>)> {
    self.require()?;
    let current = self.api.get_medication(med_id).await?;
    let updated = self
      .api
      .update_medication(med_id, &MedicationPatch {
        dosage: Some(new_dosage.to_owned()),
        ..MedicationPatch::default()
      })
      .await?;
    if current.dosage == updated.dosage {
      return Ok((updated, None));
    }

    let change = self
      .api
      .add_dosage_change(&NewDosageChange {
        med_id,
        prev_dosage: current.dosage,
        new_dosage: updated.dosage.clone(),
        reason: reason.to_owned(),
        changed_by: CHANGED_BY_USER.to_owned(),
      })
      .await?;
    Ok((updated, Some(change)))
  }

  // ─── Reminders ─────────────────────────────────────────────────────────────

  pub async fn add_reminder(&self, new: &NewReminder) -> Result<Reminder> {
    self.require()?;
    self.api.add_reminder(new).await
  }

  pub async fn update_reminder(&self, id: Uuid, patch: &ReminderPatch) -> Result<Reminder> {
    self.require()?;
    self.api.update_reminder(id, patch).await
  }

  pub async fn delete_reminder(&self, id: Uuid) -> Result<()> {
    self.require()?;
    self.api.delete_reminder(id).await
  }

  // ─── Adherence ─────────────────────────────────────────────────────────────

  pub async fn adherence(&self, date: Option<NaiveDate>) -> Result<AdherenceDay> {
    self.require()?;
    self.api.adherence(date).await
  }

  pub async fn record_adherence(&self, new: &NewAdherence) -> Result<AdherenceRecord> {
    self.require()?;
    self.api.record_adherence(new).await
  }

  pub async fn set_adherence(&self, new: &NewAdherence) -> Result<AdherenceRecord> {
    self.require()?;
    self.api.set_adherence(new).await
  }

  // ─── Emergency cards ───────────────────────────────────────────────────────

  pub async fn generate_emergency_card(&self) -> Result<IssuedCard> {
    self.require()?;
    self.api.generate_emergency_card().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn session(file: Option<PathBuf>) -> Session {
    Session::new(ApiClient::new("http://127.0.0.1:9").unwrap(), file)
  }

  #[tokio::test]
  async fn mutations_require_a_signed_in_user() {
    let session = session(None);
    let err = session
      .add_medication(&NewMedication::default())
      .await
      .unwrap_err();
    assert!(err.downcast_ref::<NotSignedIn>().is_some());
    assert_eq!(err.to_string(), "User not authenticated");

    let err = session.change_dosage(Uuid::new_v4(), "10mg", "").await.unwrap_err();
    assert!(err.downcast_ref::<NotSignedIn>().is_some());

    let err = session.generate_emergency_card().await.unwrap_err();
    assert!(err.downcast_ref::<NotSignedIn>().is_some());
  }

  #[tokio::test]
  async fn restore_without_a_file_is_signed_out() {
    let session = session(None);
    assert!(session.restore().await.unwrap().is_none());
    assert!(session.current().is_none());
  }

  #[tokio::test]
  async fn expired_saved_session_is_discarded() {
    let path = std::env::temp_dir().join(format!("pillsync-session-{}.json", Uuid::new_v4()));
    let saved = SavedSession {
      token:      "abc".into(),
      expires_at: Utc::now() - chrono::Duration::minutes(1),
      user:       AuthUser {
        uid:            "u1".into(),
        email:          "a@example.com".into(),
        email_verified: false,
      },
    };
    std::fs::write(&path, serde_json::to_vec(&saved).unwrap()).unwrap();

    let session = session(Some(path.clone()));
    assert!(session.restore().await.unwrap().is_none());
    assert!(!path.exists());
    assert!(session.api().token().is_none());
  }

  #[tokio::test]
  async fn sign_out_notifies_subscribers() {
    let session = session(None);
    let mut users = session.subscribe();
    session.user.send_replace(Some(AuthUser {
      uid:            "u1".into(),
      email:          "a@example.com".into(),
      email_verified: false,
    }));
    users.borrow_and_update();

    session.sign_out().await.unwrap();
    assert!(users.has_changed().unwrap());
    assert!(users.borrow_and_update().is_none());
  }
}
