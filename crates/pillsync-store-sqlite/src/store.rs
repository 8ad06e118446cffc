//! [`SqliteStore`]: the SQLite implementation of [`CareStore`] and
//! [`AccountStore`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use pillsync_core::{
  emergency::EmergencyCard,
  identity::{Account, TokenRecord},
  model::{
    AdherenceRecord, DosageChange, Medication, MedicationPatch, Reminder,
    ReminderPatch, UserRecord,
  },
  store::{AccountStore, CareStore},
};

use crate::{
  Error, Result,
  encode::{
    ADHERENCE_COLUMNS, MEDICATION_COLUMNS, REMINDER_COLUMNS, RawAccount,
    RawAdherence, RawDosageChange, RawEmergencyCard, RawMedication, RawReminder,
    RawToken, RawUser, encode_day, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A PillSync document store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── CareStore impl ──────────────────────────────────────────────────────────

impl CareStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>> {
    let uid = uid.to_owned();

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT uid, email, name, role, profile_json, created_at, updated_at
             FROM users WHERE uid = ?1",
            rusqlite::params![uid],
            |row| {
              Ok(RawUser {
                uid:          row.get(0)?,
                email:        row.get(1)?,
                name:         row.get(2)?,
                role:         row.get(3)?,
                profile_json: row.get(4)?,
                created_at:   row.get(5)?,
                updated_at:   row.get(6)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn put_user(&self, user: UserRecord) -> Result<()> {
    let profile_json = serde_json::to_string(&user.profile)?;
    let role = user.role.to_string();
    let created_at = encode_dt(user.created_at);
    let updated_at = encode_dt(user.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO users
             (uid, email, name, role, profile_json, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            user.uid,
            user.email,
            user.name,
            role,
            profile_json,
            created_at,
            updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Medications ───────────────────────────────────────────────────────────

  async fn insert_medication(&self, med: Medication) -> Result<()> {
    let id = encode_uuid(med.id);
    let created_at = encode_dt(med.created_at);
    let updated_at = encode_dt(med.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO medications (
             id, user_id, name, dosage, frequency, start, end_date,
             added_by, updated, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
          rusqlite::params![
            id,
            med.user_id,
            med.name,
            med.dosage,
            med.frequency,
            med.start,
            med.end,
            med.added_by,
            med.updated,
            created_at,
            updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_medication(&self, id: Uuid) -> Result<Option<Medication>> {
    let id = encode_uuid(id);

    let raw: Option<RawMedication> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"),
            rusqlite::params![id],
            RawMedication::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMedication::into_medication).transpose()
  }

  async fn list_medications(&self, owner: &str) -> Result<Vec<Medication>> {
    let owner = owner.to_owned();

    let raws: Vec<RawMedication> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MEDICATION_COLUMNS} FROM medications
           WHERE user_id = ?1
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner], RawMedication::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMedication::into_medication).collect()
  }

  async fn update_medication(
    &self,
    id:         Uuid,
    patch:      MedicationPatch,
    updated:    String,
    updated_at: DateTime<Utc>,
  ) -> Result<Option<Medication>> {
    let id = encode_uuid(id);
    let updated_at = encode_dt(updated_at);

    let raw: Option<RawMedication> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE medications SET
             name       = COALESCE(?2, name),
             dosage     = COALESCE(?3, dosage),
             frequency  = COALESCE(?4, frequency),
             start      = COALESCE(?5, start),
             end_date   = CASE WHEN ?6 IS NULL THEN end_date ELSE NULLIF(?6, '') END,
             added_by   = COALESCE(?7, added_by),
             updated    = ?8,
             updated_at = ?9
           WHERE id = ?1",
          rusqlite::params![
            id,
            patch.name,
            patch.dosage,
            patch.frequency,
            patch.start,
            patch.end,
            patch.added_by,
            updated,
            updated_at,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(Some(conn.query_row(
          &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"),
          rusqlite::params![id],
          RawMedication::from_row,
        )?))
      })
      .await?;

    raw.map(RawMedication::into_medication).transpose()
  }

  async fn delete_medication(&self, id: Uuid) -> Result<bool> {
    let id = encode_uuid(id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM medications WHERE id = ?1",
          rusqlite::params![id],
        )?)
      })
      .await?;
    Ok(deleted > 0)
  }

  // ── Dosage changes ────────────────────────────────────────────────────────

  async fn insert_dosage_change(&self, change: DosageChange) -> Result<()> {
    let id = encode_uuid(change.id);
    let med_id = encode_uuid(change.med_id);
    let changed_at = encode_dt(change.ts);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO dosage_changes (
             id, user_id, med_id, prev_dosage, new_dosage, reason, changed_by, changed_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id,
            change.user_id,
            med_id,
            change.prev_dosage,
            change.new_dosage,
            change.reason,
            change.changed_by,
            changed_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_dosage_changes(&self, owner: &str) -> Result<Vec<DosageChange>> {
    let owner = owner.to_owned();

    let raws: Vec<RawDosageChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, user_id, med_id, prev_dosage, new_dosage, reason, changed_by, changed_at
           FROM dosage_changes
           WHERE user_id = ?1
           ORDER BY changed_at DESC, rowid DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![owner], |row| {
            Ok(RawDosageChange {
              id:          row.get(0)?,
              user_id:     row.get(1)?,
              med_id:      row.get(2)?,
              prev_dosage: row.get(3)?,
              new_dosage:  row.get(4)?,
              reason:      row.get(5)?,
              changed_by:  row.get(6)?,
              changed_at:  row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDosageChange::into_change).collect()
  }

  // ── Reminders ─────────────────────────────────────────────────────────────

  async fn insert_reminder(&self, reminder: Reminder) -> Result<()> {
    let id = encode_uuid(reminder.id);
    let med_id = encode_uuid(reminder.med_id);
    let time_of_day = reminder.time.to_string();
    let frequency = reminder.frequency.to_string();
    let created_at = encode_dt(reminder.created_at);
    let updated_at = encode_dt(reminder.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reminders (
             id, user_id, med_id, medicine_name, time_of_day, frequency,
             enabled, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id,
            reminder.user_id,
            med_id,
            reminder.medicine_name,
            time_of_day,
            frequency,
            reminder.enabled,
            created_at,
            updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_reminder(&self, id: Uuid) -> Result<Option<Reminder>> {
    let id = encode_uuid(id);

    let raw: Option<RawReminder> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
            rusqlite::params![id],
            RawReminder::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawReminder::into_reminder).transpose()
  }

  async fn list_reminders(&self, owner: &str) -> Result<Vec<Reminder>> {
    let owner = owner.to_owned();

    let raws: Vec<RawReminder> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REMINDER_COLUMNS} FROM reminders
           WHERE user_id = ?1
           ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner], RawReminder::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReminder::into_reminder).collect()
  }

  async fn update_reminder(
    &self,
    id:         Uuid,
    patch:      ReminderPatch,
    updated_at: DateTime<Utc>,
  ) -> Result<Option<Reminder>> {
    let id = encode_uuid(id);
    let med_id = patch.med_id.map(encode_uuid);
    let time_of_day = patch.time.map(|t| t.to_string());
    let frequency = patch.frequency.map(|f| f.to_string());
    let updated_at = encode_dt(updated_at);

    let raw: Option<RawReminder> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE reminders SET
             med_id        = COALESCE(?2, med_id),
             medicine_name = COALESCE(?3, medicine_name),
             time_of_day   = COALESCE(?4, time_of_day),
             frequency     = COALESCE(?5, frequency),
             enabled       = COALESCE(?6, enabled),
             updated_at    = ?7
           WHERE id = ?1",
          rusqlite::params![
            id,
            med_id,
            patch.medicine_name,
            time_of_day,
            frequency,
            patch.enabled,
            updated_at,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(Some(conn.query_row(
          &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
          rusqlite::params![id],
          RawReminder::from_row,
        )?))
      })
      .await?;

    raw.map(RawReminder::into_reminder).transpose()
  }

  async fn delete_reminder(&self, id: Uuid) -> Result<bool> {
    let id = encode_uuid(id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM reminders WHERE id = ?1",
          rusqlite::params![id],
        )?)
      })
      .await?;
    Ok(deleted > 0)
  }

  // ── Adherence ─────────────────────────────────────────────────────────────

  async fn append_adherence(&self, record: AdherenceRecord) -> Result<()> {
    let id = encode_uuid(record.id);
    let med_id = encode_uuid(record.med_id);
    let day = encode_day(record.date);
    let time_of_day = record.time.to_string();
    let created_at = encode_dt(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO adherence (id, user_id, med_id, day, time_of_day, taken, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id,
            record.user_id,
            med_id,
            day,
            time_of_day,
            record.taken,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn upsert_adherence(&self, record: AdherenceRecord) -> Result<AdherenceRecord> {
    let id = encode_uuid(record.id);
    let med_id = encode_uuid(record.med_id);
    let day = encode_day(record.date);
    let time_of_day = record.time.to_string();
    let created_at = encode_dt(record.created_at);

    let raw: RawAdherence = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
          .query_row(
            "SELECT id FROM adherence
             WHERE user_id = ?1 AND med_id = ?2 AND day = ?3 AND time_of_day = ?4
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            rusqlite::params![record.user_id, med_id, day, time_of_day],
            |r| r.get(0),
          )
          .optional()?;

        let stored_id = match existing {
          Some(existing_id) => {
            tx.execute(
              "UPDATE adherence SET taken = ?2 WHERE id = ?1",
              rusqlite::params![existing_id, record.taken],
            )?;
            existing_id
          }
          None => {
            tx.execute(
              "INSERT INTO adherence (id, user_id, med_id, day, time_of_day, taken, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
              rusqlite::params![
                id,
                record.user_id,
                med_id,
                day,
                time_of_day,
                record.taken,
                created_at,
              ],
            )?;
            id
          }
        };

        let raw = tx.query_row(
          &format!("SELECT {ADHERENCE_COLUMNS} FROM adherence WHERE id = ?1"),
          rusqlite::params![stored_id],
          RawAdherence::from_row,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_record()
  }

  async fn list_adherence(
    &self,
    owner: &str,
    date:  NaiveDate,
  ) -> Result<Vec<AdherenceRecord>> {
    let owner = owner.to_owned();
    let day = encode_day(date);

    let raws: Vec<RawAdherence> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ADHERENCE_COLUMNS} FROM adherence
           WHERE user_id = ?1 AND day = ?2
           ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner, day], RawAdherence::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAdherence::into_record).collect()
  }

  // ── Emergency cards ───────────────────────────────────────────────────────

  async fn insert_emergency_card(&self, card: EmergencyCard) -> Result<()> {
    let id = encode_uuid(card.id);
    let patient_json = serde_json::to_string(&card.patient)?;
    let medications_json = serde_json::to_string(&card.medications)?;
    let generated_at = encode_dt(card.generated_at);
    let expires_at = encode_dt(card.expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO emergency_cards
             (id, user_id, patient_json, medications_json, generated_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id,
            card.user_id,
            patient_json,
            medications_json,
            generated_at,
            expires_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_emergency_card(&self, id: Uuid) -> Result<Option<EmergencyCard>> {
    let id = encode_uuid(id);

    let raw: Option<RawEmergencyCard> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, user_id, patient_json, medications_json, generated_at, expires_at
             FROM emergency_cards WHERE id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawEmergencyCard {
                id:               row.get(0)?,
                user_id:          row.get(1)?,
                patient_json:     row.get(2)?,
                medications_json: row.get(3)?,
                generated_at:     row.get(4)?,
                expires_at:       row.get(5)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEmergencyCard::into_card).transpose()
  }
}

// ─── AccountStore impl ───────────────────────────────────────────────────────

impl AccountStore for SqliteStore {
  type Error = Error;

  async fn insert_account(&self, account: Account) -> Result<()> {
    let email = account.email.clone();
    let created_at = encode_dt(account.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO accounts
             (uid, email, password_hash, email_verified, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            account.uid,
            account.email,
            account.password_hash,
            account.email_verified,
            created_at,
          ],
        )?;
        Ok(n == 1)
      })
      .await?;

    if !inserted {
      return Err(Error::EmailTaken(email));
    }
    Ok(())
  }

  async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
    let email = email.to_owned();

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT uid, email, password_hash, email_verified, created_at
             FROM accounts WHERE email = ?1",
            rusqlite::params![email],
            RawAccount::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn get_account(&self, uid: &str) -> Result<Option<Account>> {
    let uid = uid.to_owned();

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT uid, email, password_hash, email_verified, created_at
             FROM accounts WHERE uid = ?1",
            rusqlite::params![uid],
            RawAccount::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn insert_token(&self, token: TokenRecord) -> Result<()> {
    let issued_at = encode_dt(token.issued_at);
    let expires_at = encode_dt(token.expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO tokens (token_hash, uid, issued_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![token.token_hash, token.uid, issued_at, expires_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn find_token(&self, token_hash: &str) -> Result<Option<TokenRecord>> {
    let token_hash = token_hash.to_owned();

    let raw: Option<RawToken> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT token_hash, uid, issued_at, expires_at
             FROM tokens WHERE token_hash = ?1",
            rusqlite::params![token_hash],
            |row| {
              Ok(RawToken {
                token_hash: row.get(0)?,
                uid:        row.get(1)?,
                issued_at:  row.get(2)?,
                expires_at: row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawToken::into_token).transpose()
  }

  async fn delete_token(&self, token_hash: &str) -> Result<()> {
    let token_hash = token_hash.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM tokens WHERE token_hash = ?1",
          rusqlite::params![token_hash],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize> {
    // Timestamps share one fixed-width UTC format, so text order is time order.
    let now = encode_dt(now);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM tokens WHERE expires_at < ?1",
          rusqlite::params![now],
        )?)
      })
      .await?;
    Ok(removed)
  }
}
