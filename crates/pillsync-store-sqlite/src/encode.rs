//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed nanosecond
//! precision so that lexical order equals chronological order. Profiles and
//! medication arrays embedded in user documents and emergency cards are stored
//! as compact JSON. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pillsync_core::{
  emergency::EmergencyCard,
  identity::{Account, TokenRecord},
  model::{
    AdherenceRecord, DosageChange, Medication, Reminder, ReminderFrequency,
    Role, TimeOfDay, UserRecord,
  },
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> / NaiveDate ────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_day(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_day(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Labels ──────────────────────────────────────────────────────────────────

fn decode_label<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::UnknownLabel {
    kind,
    value: s.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub uid:          String,
  pub email:        String,
  pub name:         String,
  pub role:         String,
  pub profile_json: String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawUser {
  pub fn into_user(self) -> Result<UserRecord> {
    Ok(UserRecord {
      uid:        self.uid,
      email:      self.email,
      name:       self.name,
      role:       decode_label::<Role>("role", &self.role)?,
      profile:    serde_json::from_str(&self.profile_json)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const MEDICATION_COLUMNS: &str = "id, user_id, name, dosage, frequency, \
   start, end_date, added_by, updated, created_at, updated_at";

/// Raw strings read directly from a `medications` row.
pub struct RawMedication {
  pub id:         String,
  pub user_id:    String,
  pub name:       String,
  pub dosage:     String,
  pub frequency:  String,
  pub start:      String,
  pub end:        Option<String>,
  pub added_by:   String,
  pub updated:    String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawMedication {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      user_id:    row.get(1)?,
      name:       row.get(2)?,
      dosage:     row.get(3)?,
      frequency:  row.get(4)?,
      start:      row.get(5)?,
      end:        row.get(6)?,
      added_by:   row.get(7)?,
      updated:    row.get(8)?,
      created_at: row.get(9)?,
      updated_at: row.get(10)?,
    })
  }

  pub fn into_medication(self) -> Result<Medication> {
    Ok(Medication {
      id:         decode_uuid(&self.id)?,
      user_id:    self.user_id,
      name:       self.name,
      dosage:     self.dosage,
      frequency:  self.frequency,
      start:      self.start,
      end:        self.end,
      added_by:   self.added_by,
      updated:    self.updated,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `dosage_changes` row.
pub struct RawDosageChange {
  pub id:          String,
  pub user_id:     String,
  pub med_id:      String,
  pub prev_dosage: String,
  pub new_dosage:  String,
  pub reason:      String,
  pub changed_by:  String,
  pub changed_at:  String,
}

impl RawDosageChange {
  pub fn into_change(self) -> Result<DosageChange> {
    Ok(DosageChange {
      id:          decode_uuid(&self.id)?,
      user_id:     self.user_id,
      med_id:      decode_uuid(&self.med_id)?,
      prev_dosage: self.prev_dosage,
      new_dosage:  self.new_dosage,
      reason:      self.reason,
      changed_by:  self.changed_by,
      ts:          decode_dt(&self.changed_at)?,
    })
  }
}

pub const REMINDER_COLUMNS: &str = "id, user_id, med_id, medicine_name, \
   time_of_day, frequency, enabled, created_at, updated_at";

/// Raw strings read directly from a `reminders` row.
pub struct RawReminder {
  pub id:            String,
  pub user_id:       String,
  pub med_id:        String,
  pub medicine_name: String,
  pub time_of_day:   String,
  pub frequency:     String,
  pub enabled:       bool,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawReminder {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      user_id:       row.get(1)?,
      med_id:        row.get(2)?,
      medicine_name: row.get(3)?,
      time_of_day:   row.get(4)?,
      frequency:     row.get(5)?,
      enabled:       row.get(6)?,
      created_at:    row.get(7)?,
      updated_at:    row.get(8)?,
    })
  }

  pub fn into_reminder(self) -> Result<Reminder> {
    Ok(Reminder {
      id:            decode_uuid(&self.id)?,
      user_id:       self.user_id,
      med_id:        decode_uuid(&self.med_id)?,
      medicine_name: self.medicine_name,
      time:          decode_label::<TimeOfDay>("time of day", &self.time_of_day)?,
      frequency:     decode_label::<ReminderFrequency>("frequency", &self.frequency)?,
      enabled:       self.enabled,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub const ADHERENCE_COLUMNS: &str =
  "id, user_id, med_id, day, time_of_day, taken, created_at";

/// Raw strings read directly from an `adherence` row.
pub struct RawAdherence {
  pub id:          String,
  pub user_id:     String,
  pub med_id:      String,
  pub day:         String,
  pub time_of_day: String,
  pub taken:       bool,
  pub created_at:  String,
}

impl RawAdherence {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      user_id:     row.get(1)?,
      med_id:      row.get(2)?,
      day:         row.get(3)?,
      time_of_day: row.get(4)?,
      taken:       row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_record(self) -> Result<AdherenceRecord> {
    Ok(AdherenceRecord {
      id:         decode_uuid(&self.id)?,
      user_id:    self.user_id,
      med_id:     decode_uuid(&self.med_id)?,
      date:       decode_day(&self.day)?,
      time:       decode_label::<TimeOfDay>("time of day", &self.time_of_day)?,
      taken:      self.taken,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `emergency_cards` row.
pub struct RawEmergencyCard {
  pub id:               String,
  pub user_id:          String,
  pub patient_json:     String,
  pub medications_json: String,
  pub generated_at:     String,
  pub expires_at:       String,
}

impl RawEmergencyCard {
  pub fn into_card(self) -> Result<EmergencyCard> {
    Ok(EmergencyCard {
      id:           decode_uuid(&self.id)?,
      user_id:      self.user_id,
      patient:      serde_json::from_str(&self.patient_json)?,
      medications:  serde_json::from_str(&self.medications_json)?,
      generated_at: decode_dt(&self.generated_at)?,
      expires_at:   decode_dt(&self.expires_at)?,
    })
  }
}

/// Raw strings read directly from an `accounts` row.
pub struct RawAccount {
  pub uid:            String,
  pub email:          String,
  pub password_hash:  String,
  pub email_verified: bool,
  pub created_at:     String,
}

impl RawAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uid:            row.get(0)?,
      email:          row.get(1)?,
      password_hash:  row.get(2)?,
      email_verified: row.get(3)?,
      created_at:     row.get(4)?,
    })
  }

  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      uid:            self.uid,
      email:          self.email,
      password_hash:  self.password_hash,
      email_verified: self.email_verified,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `tokens` row.
pub struct RawToken {
  pub token_hash: String,
  pub uid:        String,
  pub issued_at:  String,
  pub expires_at: String,
}

impl RawToken {
  pub fn into_token(self) -> Result<TokenRecord> {
    Ok(TokenRecord {
      token_hash: self.token_hash,
      uid:        self.uid,
      issued_at:  decode_dt(&self.issued_at)?,
      expires_at: decode_dt(&self.expires_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2025, 10, 31, 9, 0, 1).unwrap();
    let b = a + chrono::Duration::microseconds(1500);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn unknown_label_is_reported() {
    let err = decode_label::<TimeOfDay>("time of day", "Dawn").unwrap_err();
    assert!(matches!(err, Error::UnknownLabel { .. }));
  }
}
