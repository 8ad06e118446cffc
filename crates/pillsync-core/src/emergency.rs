//! Emergency cards: immutable, time-boxed, publicly readable snapshots of a
//! user's medical summary.
//!
//! Expiry is advisory: a card stays readable after `expires_at`, and readers
//! compare the embedded timestamp against their own clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Medication, Owned, Profile};

/// How long a freshly generated card is reported as valid, in minutes.
pub const CARD_LIFETIME_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCard {
  pub id:           Uuid,
  pub user_id:      String,
  pub patient:      Profile,
  pub medications:  Vec<Medication>,
  pub generated_at: DateTime<Utc>,
  pub expires_at:   DateTime<Utc>,
}

impl EmergencyCard {
  /// Snapshot `patient` and `medications` as of `now`.
  pub fn snapshot(
    user_id: impl Into<String>,
    patient: Profile,
    medications: Vec<Medication>,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      user_id: user_id.into(),
      patient,
      medications,
      generated_at: now,
      expires_at: now + Duration::minutes(CARD_LIFETIME_MINUTES),
    }
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now > self.expires_at }

  /// Public read-only location of this card under `base_url`.
  pub fn public_url(&self, base_url: &str) -> String {
    format!("{}/emergency/{}", base_url.trim_end_matches('/'), self.id)
  }
}

impl Owned for EmergencyCard {
  fn owner(&self) -> &str { &self.user_id }
}

/// What the public viewer receives: the card plus its expiry verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyView {
  #[serde(flatten)]
  pub card:    EmergencyCard,
  pub expired: bool,
}

impl EmergencyView {
  pub fn at(card: EmergencyCard, now: DateTime<Utc>) -> Self {
    let expired = card.is_expired_at(now);
    Self { card, expired }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn profile() -> Profile {
    Profile {
      name:       "A".into(),
      age:        Some(30),
      conditions: vec![],
      allergies:  vec![],
    }
  }

  #[test]
  fn card_expires_thirty_minutes_after_generation() {
    let now = Utc::now();
    let card = EmergencyCard::snapshot("u1", profile(), vec![], now);
    assert_eq!(card.expires_at - card.generated_at, Duration::minutes(30));
    assert!(!card.is_expired_at(now + Duration::minutes(29)));
    assert!(!card.is_expired_at(card.expires_at));
    assert!(card.is_expired_at(now + Duration::minutes(31)));
  }

  #[test]
  fn view_keeps_data_after_expiry() {
    let now = Utc::now();
    let card = EmergencyCard::snapshot("u1", profile(), vec![], now);
    let view = EmergencyView::at(card.clone(), now + Duration::hours(2));
    assert!(view.expired);
    assert_eq!(view.card.patient, profile());
  }

  #[test]
  fn public_url_trims_trailing_slash() {
    let card = EmergencyCard::snapshot("u1", profile(), vec![], Utc::now());
    assert_eq!(
      card.public_url("https://pillsync.example/"),
      format!("https://pillsync.example/emergency/{}", card.id)
    );
  }

  #[test]
  fn view_serialises_flat() {
    let card = EmergencyCard::snapshot("u1", profile(), vec![], Utc::now());
    let json = serde_json::to_value(EmergencyView::at(card, Utc::now())).unwrap();
    assert!(json.get("patient").is_some());
    assert!(json.get("expiresAt").is_some());
    assert_eq!(json["expired"], false);
  }
}
