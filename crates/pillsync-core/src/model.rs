//! Domain records: the documents held per user.
//!
//! Every record carries the id of the account that owns it (`user_id`).
//! Cross-record references (`med_id`) are informational only: nothing checks
//! that the referenced medication still exists, so deleting a medication
//! leaves its reminders, dosage changes and adherence records in place.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Ownership ───────────────────────────────────────────────────────────────

/// A record owned by exactly one account.
pub trait Owned {
  fn owner(&self) -> &str;
}

// ─── Display dates ───────────────────────────────────────────────────────────

/// Short display form used for `start`, e.g. `"31 Oct"`.
pub fn short_date(at: DateTime<Utc>) -> String { at.format("%d %b").to_string() }

/// Long display form used for `updated`, e.g. `"31 Oct 2025"`.
pub fn long_date(at: DateTime<Utc>) -> String {
  at.format("%d %b %Y").to_string()
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// What kind of person an account belongs to.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  #[default]
  Patient,
  Caregiver,
  /// Read-only clinician access.
  Doctor,
}

/// The medical summary shown on the dashboard and copied into emergency
/// cards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  #[serde(default)]
  pub name:       String,
  pub age:        Option<u32>,
  #[serde(default)]
  pub conditions: Vec<String>,
  #[serde(default)]
  pub allergies:  Vec<String>,
}

/// One document per authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
  pub uid:        String,
  pub email:      String,
  pub name:       String,
  pub role:       Role,
  pub profile:    Profile,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── Medications ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
  pub id:         Uuid,
  pub user_id:    String,
  pub name:       String,
  pub dosage:     String,
  pub frequency:  String,
  pub start:      String,
  pub end:        Option<String>,
  pub added_by:   String,
  /// Display string of the last change, e.g. `"31 Oct 2025"`.
  pub updated:    String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Owned for Medication {
  fn owner(&self) -> &str { &self.user_id }
}

/// Input to create a medication. Ownership is never taken from the caller's
/// payload; the service stamps it from the verified identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedication {
  pub name:      Option<String>,
  pub dosage:    Option<String>,
  pub frequency: Option<String>,
  pub start:     Option<String>,
  pub end:       Option<String>,
  pub added_by:  Option<String>,
}

/// Partial update of a medication. Identity fields (`id`, `userId`,
/// `createdAt`) have no slot here and are dropped during deserialisation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationPatch {
  pub name:      Option<String>,
  pub dosage:    Option<String>,
  pub frequency: Option<String>,
  pub start:     Option<String>,
  pub end:       Option<String>,
  pub added_by:  Option<String>,
}

// ─── Dosage changes ──────────────────────────────────────────────────────────

/// An append-only log entry; never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosageChange {
  pub id:          Uuid,
  pub user_id:     String,
  pub med_id:      Uuid,
  pub prev_dosage: String,
  pub new_dosage:  String,
  pub reason:      String,
  pub changed_by:  String,
  pub ts:          DateTime<Utc>,
}

impl Owned for DosageChange {
  fn owner(&self) -> &str { &self.user_id }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDosageChange {
  pub med_id:      Uuid,
  pub prev_dosage: String,
  pub new_dosage:  String,
  #[serde(default)]
  pub reason:      String,
  #[serde(default = "default_changed_by")]
  pub changed_by:  String,
}

fn default_changed_by() -> String { "User".to_owned() }

// ─── Reminders ───────────────────────────────────────────────────────────────

/// Time-of-day slot shared by reminders and adherence records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
pub enum TimeOfDay {
  Morning,
  Afternoon,
  Evening,
  Night,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
pub enum ReminderFrequency {
  #[default]
  Daily,
  Weekly,
  #[serde(rename = "As needed")]
  #[strum(serialize = "As needed")]
  AsNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
  pub id:            Uuid,
  pub user_id:       String,
  pub med_id:        Uuid,
  /// Copy of the medication name at creation time; may drift afterwards.
  pub medicine_name: String,
  pub time:          TimeOfDay,
  pub frequency:     ReminderFrequency,
  pub enabled:       bool,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl Owned for Reminder {
  fn owner(&self) -> &str { &self.user_id }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
  pub med_id:        Uuid,
  /// Looked up from the medication when omitted.
  pub medicine_name: Option<String>,
  pub time:          TimeOfDay,
  #[serde(default)]
  pub frequency:     ReminderFrequency,
  #[serde(default = "default_enabled")]
  pub enabled:       bool,
}

fn default_enabled() -> bool { true }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPatch {
  pub med_id:        Option<Uuid>,
  pub medicine_name: Option<String>,
  pub time:          Option<TimeOfDay>,
  pub frequency:     Option<ReminderFrequency>,
  pub enabled:       Option<bool>,
}

// ─── Adherence ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceRecord {
  pub id:         Uuid,
  pub user_id:    String,
  pub med_id:     Uuid,
  pub date:       NaiveDate,
  pub time:       TimeOfDay,
  pub taken:      bool,
  pub created_at: DateTime<Utc>,
}

impl Owned for AdherenceRecord {
  fn owner(&self) -> &str { &self.user_id }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdherence {
  pub med_id: Uuid,
  /// Defaults to today (UTC) when omitted.
  pub date:   Option<NaiveDate>,
  pub time:   TimeOfDay,
  pub taken:  bool,
}

/// Same-day adherence, computed over every record of one user and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceSummary {
  pub date:       NaiveDate,
  pub taken:      usize,
  pub total:      usize,
  /// Rounded to the nearest whole percent; `0` when there are no records.
  pub percentage: u8,
}

impl AdherenceSummary {
  pub fn compute(date: NaiveDate, records: &[AdherenceRecord]) -> Self {
    let total = records.len();
    let taken = records.iter().filter(|r| r.taken).count();
    let percentage = if total == 0 {
      0
    } else {
      ((taken as f64 * 100.0) / total as f64).round() as u8
    };
    Self { date, taken, total, percentage }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn record(taken: bool) -> AdherenceRecord {
    AdherenceRecord {
      id: Uuid::new_v4(),
      user_id: "u1".into(),
      med_id: Uuid::new_v4(),
      date: NaiveDate::from_ymd_opt(2025, 10, 30).unwrap(),
      time: TimeOfDay::Morning,
      taken,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn summary_of_no_records_is_zero() {
    let day = NaiveDate::from_ymd_opt(2025, 10, 30).unwrap();
    let s = AdherenceSummary::compute(day, &[]);
    assert_eq!(s.total, 0);
    assert_eq!(s.percentage, 0);
  }

  #[test]
  fn summary_rounds_to_whole_percent() {
    let day = NaiveDate::from_ymd_opt(2025, 10, 30).unwrap();
    let s = AdherenceSummary::compute(
      day,
      &[record(true), record(true), record(false)],
    );
    assert_eq!(s.taken, 2);
    assert_eq!(s.total, 3);
    assert_eq!(s.percentage, 67);
  }

  #[test]
  fn display_dates() {
    let at = Utc.with_ymd_and_hms(2025, 10, 31, 9, 0, 0).unwrap();
    assert_eq!(short_date(at), "31 Oct");
    assert_eq!(long_date(at), "31 Oct 2025");
  }

  #[test]
  fn frequency_labels_round_trip() {
    let json = serde_json::to_string(&ReminderFrequency::AsNeeded).unwrap();
    assert_eq!(json, "\"As needed\"");
    assert_eq!(ReminderFrequency::AsNeeded.to_string(), "As needed");
    assert_eq!(
      "As needed".parse::<ReminderFrequency>().unwrap(),
      ReminderFrequency::AsNeeded
    );
  }

  #[test]
  fn medication_patch_ignores_identity_fields() {
    let patch: MedicationPatch = serde_json::from_str(
      r#"{"id":"x","userId":"intruder","createdAt":"now","dosage":"750mg"}"#,
    )
    .unwrap();
    assert_eq!(patch.dosage.as_deref(), Some("750mg"));
    assert!(patch.name.is_none());
  }
}
