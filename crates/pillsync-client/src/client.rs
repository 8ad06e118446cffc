//! Async HTTP client wrapping the PillSync JSON API.
//!
//! Every response arrives in the `{success, data?, message?, count?, error?}`
//! envelope. A non-2xx status is surfaced as an [`ApiFailure`] inside the
//! returned [`anyhow::Error`], so callers can downcast and branch on it.

use std::{
  sync::{Arc, RwLock},
  time::Duration,
};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use pillsync_core::{
  emergency::{EmergencyCard, EmergencyView},
  identity::AuthUser,
  model::{
    AdherenceRecord, AdherenceSummary, DosageChange, Medication,
    MedicationPatch, NewAdherence, NewDosageChange, NewMedication, NewReminder,
    Profile, Reminder, ReminderPatch, Role,
  },
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
  data:    Option<T>,
  message: Option<String>,
  error:   Option<String>,
}

/// A request the server answered with a non-success status.
#[derive(Debug, thiserror::Error)]
#[error("{status}: {error}: {message}")]
pub struct ApiFailure {
  pub status:  StatusCode,
  pub error:   String,
  pub message: String,
}

impl ApiFailure {
  /// The [`ApiFailure`] behind `err`, if any.
  pub fn of(err: &anyhow::Error) -> Option<&ApiFailure> { err.downcast_ref() }

  pub fn is_not_found(err: &anyhow::Error) -> bool {
    Self::of(err).is_some_and(|f| f.status == StatusCode::NOT_FOUND)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
  pub user:       AuthUser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedUser {
  pub uid:            String,
  pub email:          String,
  pub email_verified: bool,
  pub profile:        Profile,
  pub role:           Role,
  pub created_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
  pub uid:        String,
  pub email:      String,
  pub profile:    Profile,
  pub role:       Role,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdherenceDay {
  pub records: Vec<AdherenceRecord>,
  pub summary: AdherenceSummary,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCard {
  pub card:    EmergencyCard,
  pub url:     String,
  pub qr_code: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
  email:    &'a str,
  password: &'a str,
}

#[derive(Serialize)]
struct CreateProfile<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  name: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<Role>,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Async HTTP client for the PillSync API.
///
/// Clones share the HTTP connection pool and the bearer token.
#[derive(Clone)]
pub struct ApiClient {
  client:   Client,
  base_url: Arc<str>,
  token:    Arc<RwLock<Option<String>>>,
}

impl ApiClient {
  pub fn new(base_url: &str) -> Result<Self> {
    let client = Client::builder()
      .connect_timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self {
      client,
      base_url: Arc::from(base_url.trim_end_matches('/')),
      token: Arc::default(),
    })
  }

  pub fn set_token(&self, token: Option<String>) {
    if let Ok(mut slot) = self.token.write() {
      *slot = token;
    }
  }

  pub fn token(&self) -> Option<String> {
    self.token.read().ok().and_then(|slot| slot.clone())
  }

  fn url(&self, path: &str) -> String { format!("{}/api{}", self.base_url, path) }

  fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
    match self.token() {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  /// Send `req`, mapping a non-success status to [`ApiFailure`].
  async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
    let resp = self
      .authorize(req)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;

    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let envelope = serde_json::from_str::<Envelope<serde_json::Value>>(&body).ok();
    let (error, message) = match envelope {
      Some(env) => (
        env.error.unwrap_or_default(),
        env.message.unwrap_or_default(),
      ),
      None => (status.canonical_reason().unwrap_or_default().to_owned(), body),
    };
    Err(anyhow::Error::new(ApiFailure { status, error, message }).context(what.to_owned()))
  }

  async fn envelope<T: DeserializeOwned>(
    &self,
    req: RequestBuilder,
    what: &str,
  ) -> Result<Envelope<T>> {
    let resp = self.send(req, what).await?;
    resp
      .json()
      .await
      .with_context(|| format!("deserialising response to {what}"))
  }

  async fn data<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
    self
      .envelope(req, what)
      .await?
      .data
      .ok_or_else(|| anyhow!("{what}: response carried no data"))
  }

  async fn unit(&self, req: RequestBuilder, what: &str) -> Result<Option<String>> {
    Ok(self.envelope::<serde_json::Value>(req, what).await?.message)
  }

  // ── Auth ──────────────────────────────────────────────────────────────────

  /// `POST /api/auth/signup`
  pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
    let req = self
      .client
      .post(self.url("/auth/signup"))
      .json(&Credentials { email, password });
    self.data(req, "POST /auth/signup").await
  }

  /// `POST /api/auth/signin`
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn> {
    let req = self
      .client
      .post(self.url("/auth/signin"))
      .json(&Credentials { email, password });
    self.data(req, "POST /auth/signin").await
  }

  /// `POST /api/auth/signout`
  pub async fn sign_out(&self) -> Result<()> {
    self
      .unit(self.client.post(self.url("/auth/signout")), "POST /auth/signout")
      .await
      .map(drop)
  }

  /// `GET /api/auth/verify`
  pub async fn verify(&self) -> Result<VerifiedUser> {
    self
      .data(self.client.get(self.url("/auth/verify")), "GET /auth/verify")
      .await
  }

  /// `GET /api/auth/profile`
  pub async fn profile(&self) -> Result<ProfileView> {
    self
      .data(self.client.get(self.url("/auth/profile")), "GET /auth/profile")
      .await
  }

  /// `POST /api/auth/profile`
  pub async fn create_profile(
    &self,
    name: Option<&str>,
    role: Option<Role>,
  ) -> Result<ProfileView> {
    let req = self
      .client
      .post(self.url("/auth/profile"))
      .json(&CreateProfile { name, role });
    self.data(req, "POST /auth/profile").await
  }

  /// `PUT /api/auth/profile`
  pub async fn update_profile(&self, profile: &Profile) -> Result<ProfileView> {
    let req = self.client.put(self.url("/auth/profile")).json(profile);
    self.data(req, "PUT /auth/profile").await
  }

  // ── Medications ───────────────────────────────────────────────────────────

  /// `GET /api/medications`
  pub async fn list_medications(&self) -> Result<Vec<Medication>> {
    self
      .data(self.client.get(self.url("/medications")), "GET /medications")
      .await
  }

  /// `GET /api/medications/{id}`
  pub async fn get_medication(&self, id: Uuid) -> Result<Medication> {
    let req = self.client.get(self.url(&format!("/medications/{id}")));
    self.data(req, "GET /medications/{id}").await
  }

  /// `POST /api/medications`
  pub async fn create_medication(&self, new: &NewMedication) -> Result<Medication> {
    let req = self.client.post(self.url("/medications")).json(new);
    self.data(req, "POST /medications").await
  }

  /// `PUT /api/medications/{id}`
  pub async fn update_medication(
    &self,
    id: Uuid,
    patch: &MedicationPatch,
  ) -> Result<Medication> {
    let req = self
      .client
      .put(self.url(&format!("/medications/{id}")))
      .json(patch);
    self.data(req, "PUT /medications/{id}").await
  }

  /// `DELETE /api/medications/{id}`
  pub async fn delete_medication(&self, id: Uuid) -> Result<()> {
    let req = self.client.delete(self.url(&format!("/medications/{id}")));
    self.unit(req, "DELETE /medications/{id}").await.map(drop)
  }

  // ── Dosage changes ────────────────────────────────────────────────────────

  /// `GET /api/dosage-changes`
  pub async fn list_dosage_changes(&self) -> Result<Vec<DosageChange>> {
    self
      .data(self.client.get(self.url("/dosage-changes")), "GET /dosage-changes")
      .await
  }

  /// `POST /api/dosage-changes`
  pub async fn add_dosage_change(&self, new: &NewDosageChange) -> Result<DosageChange> {
    let req = self.client.post(self.url("/dosage-changes")).json(new);
    self.data(req, "POST /dosage-changes").await
  }

  // ── Reminders ─────────────────────────────────────────────────────────────

  /// `GET /api/reminders`
  pub async fn list_reminders(&self) -> Result<Vec<Reminder>> {
    self
      .data(self.client.get(self.url("/reminders")), "GET /reminders")
      .await
  }

  /// `POST /api/reminders`
  pub async fn add_reminder(&self, new: &NewReminder) -> Result<Reminder> {
    let req = self.client.post(self.url("/reminders")).json(new);
    self.data(req, "POST /reminders").await
  }

  /// `PUT /api/reminders/{id}`
  pub async fn update_reminder(&self, id: Uuid, patch: &ReminderPatch) -> Result<Reminder> {
    let req = self
      .client
      .put(self.url(&format!("/reminders/{id}")))
      .json(patch);
    self.data(req, "PUT /reminders/{id}").await
  }

  /// `DELETE /api/reminders/{id}`
  pub async fn delete_reminder(&self, id: Uuid) -> Result<()> {
    let req = self.client.delete(self.url(&format!("/reminders/{id}")));
    self.unit(req, "DELETE /reminders/{id}").await.map(drop)
  }

  // ── Adherence ─────────────────────────────────────────────────────────────

  /// `GET /api/adherence[?date=YYYY-MM-DD]`
  pub async fn adherence(&self, date: Option<NaiveDate>) -> Result<AdherenceDay> {
    let mut req = self.client.get(self.url("/adherence"));
    if let Some(date) = date {
      req = req.query(&[("date", date.to_string())]);
    }
    self.data(req, "GET /adherence").await
  }

  /// `POST /api/adherence`: appends a record.
  pub async fn record_adherence(&self, new: &NewAdherence) -> Result<AdherenceRecord> {
    let req = self.client.post(self.url("/adherence")).json(new);
    self.data(req, "POST /adherence").await
  }

  /// `PUT /api/adherence`: sets the state for a (medication, date, slot).
  pub async fn set_adherence(&self, new: &NewAdherence) -> Result<AdherenceRecord> {
    let req = self.client.put(self.url("/adherence")).json(new);
    self.data(req, "PUT /adherence").await
  }

  // ── Emergency cards ───────────────────────────────────────────────────────

  /// `POST /api/emergency-cards`
  pub async fn generate_emergency_card(&self) -> Result<IssuedCard> {
    let req = self.client.post(self.url("/emergency-cards"));
    self.data(req, "POST /emergency-cards").await
  }

  /// `GET /emergency/{id}`: public, sent without credentials.
  pub async fn view_emergency_card(&self, id: &str) -> Result<EmergencyView> {
    let url = format!("{}/emergency/{id}", self.base_url);
    let resp = self
      .client
      .get(url)
      .send()
      .await
      .context("GET /emergency/{id} failed")?;
    if !resp.status().is_success() {
      let status = resp.status();
      let env = resp.json::<Envelope<serde_json::Value>>().await.ok();
      return Err(anyhow::Error::new(ApiFailure {
        status,
        error: env.as_ref().and_then(|e| e.error.clone()).unwrap_or_default(),
        message: env.and_then(|e| e.message).unwrap_or_default(),
      }));
    }
    resp
      .json::<Envelope<EmergencyView>>()
      .await
      .context("deserialising emergency card")?
      .data
      .ok_or_else(|| anyhow!("GET /emergency/{{id}}: response carried no data"))
  }

  // ── Events ────────────────────────────────────────────────────────────────

  /// `GET /api/events`: the raw server-sent event stream.
  pub async fn events(&self) -> Result<Response> {
    let req = self
      .client
      .get(self.url("/events"))
      .header(reqwest::header::ACCEPT, "text/event-stream");
    self.send(req, "GET /events").await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn failure_is_recoverable_from_anyhow() {
    let err = anyhow::Error::new(ApiFailure {
      status:  StatusCode::NOT_FOUND,
      error:   "Not found".into(),
      message: "User profile not found".into(),
    })
    .context("GET /auth/verify");
    assert!(ApiFailure::is_not_found(&err));
    assert_eq!(ApiFailure::of(&err).unwrap().message, "User profile not found");
  }

  #[test]
  fn envelope_tolerates_missing_fields() {
    let env: Envelope<Vec<Medication>> =
      serde_json::from_str(r#"{"success":true,"data":[],"count":0}"#).unwrap();
    assert_eq!(env.data.map(|d| d.len()), Some(0));
    assert!(env.message.is_none());
    assert!(env.error.is_none());
  }

  #[test]
  fn urls_are_rooted_under_api() {
    let client = ApiClient::new("http://localhost:3000/").unwrap();
    assert_eq!(client.url("/medications"), "http://localhost:3000/api/medications");
  }

  #[test]
  fn token_is_shared_between_clones() {
    let client = ApiClient::new("http://localhost:3000").unwrap();
    let other = client.clone();
    client.set_token(Some("abc".into()));
    assert_eq!(other.token().as_deref(), Some("abc"));
  }
}
