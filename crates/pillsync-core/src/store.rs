//! The `CareStore` and `AccountStore` traits.
//!
//! Both are implemented by storage backends (e.g. `pillsync-store-sqlite`).
//! They are deliberately dumb: point reads and writes plus equality-filtered
//! queries on the owning user. Ownership checks, validation and change
//! notification live in [`crate::service::CareService`].

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  emergency::EmergencyCard,
  identity::{Account, TokenRecord},
  model::{
    AdherenceRecord, DosageChange, Medication, MedicationPatch, Reminder,
    ReminderPatch, UserRecord,
  },
};

// ─── Care documents ──────────────────────────────────────────────────────────

/// Abstraction over the per-user document collections.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CareStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  fn get_user<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, Self::Error>> + Send + 'a;

  /// Write a user document, replacing any existing one.
  fn put_user(
    &self,
    user: UserRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Medications ───────────────────────────────────────────────────────

  fn insert_medication(
    &self,
    med: Medication,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_medication(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Medication>, Self::Error>> + Send + '_;

  /// Medications owned by `owner`, newest-created first.
  fn list_medications<'a>(
    &'a self,
    owner: &'a str,
  ) -> impl Future<Output = Result<Vec<Medication>, Self::Error>> + Send + 'a;

  /// Merge the `Some` fields of `patch` into the stored medication and stamp
  /// the update time. Returns the merged record, or `None` if absent.
  fn update_medication(
    &self,
    id: Uuid,
    patch: MedicationPatch,
    updated: String,
    updated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Medication>, Self::Error>> + Send + '_;

  /// Returns `false` if nothing was deleted.
  fn delete_medication(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Dosage changes (append-only) ──────────────────────────────────────

  fn insert_dosage_change(
    &self,
    change: DosageChange,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Dosage changes owned by `owner`, newest first.
  fn list_dosage_changes<'a>(
    &'a self,
    owner: &'a str,
  ) -> impl Future<Output = Result<Vec<DosageChange>, Self::Error>> + Send + 'a;

  // ── Reminders ─────────────────────────────────────────────────────────

  fn insert_reminder(
    &self,
    reminder: Reminder,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_reminder(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Reminder>, Self::Error>> + Send + '_;

  /// Reminders owned by `owner`, oldest first.
  fn list_reminders<'a>(
    &'a self,
    owner: &'a str,
  ) -> impl Future<Output = Result<Vec<Reminder>, Self::Error>> + Send + 'a;

  fn update_reminder(
    &self,
    id: Uuid,
    patch: ReminderPatch,
    updated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Reminder>, Self::Error>> + Send + '_;

  fn delete_reminder(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Adherence ─────────────────────────────────────────────────────────

  /// Append a record, even if one already exists for the same medication,
  /// date and time slot.
  fn append_adherence(
    &self,
    record: AdherenceRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Set `taken` on the newest record with the same owner, medication, date
  /// and time slot, inserting `record` if there is none. Returns the stored
  /// record.
  fn upsert_adherence(
    &self,
    record: AdherenceRecord,
  ) -> impl Future<Output = Result<AdherenceRecord, Self::Error>> + Send + '_;

  /// Records owned by `owner` on `date`, oldest first.
  fn list_adherence<'a>(
    &'a self,
    owner: &'a str,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<AdherenceRecord>, Self::Error>> + Send + 'a;

  // ── Emergency cards ───────────────────────────────────────────────────

  fn insert_emergency_card(
    &self,
    card: EmergencyCard,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_emergency_card(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<EmergencyCard>, Self::Error>> + Send + '_;
}

// ─── Accounts ────────────────────────────────────────────────────────────────

/// Persistence for a local identity provider.
pub trait AccountStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fails if the email is already registered.
  fn insert_account(
    &self,
    account: Account,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn find_account_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  fn get_account<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  fn insert_token(
    &self,
    token: TokenRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn find_token<'a>(
    &'a self,
    token_hash: &'a str,
  ) -> impl Future<Output = Result<Option<TokenRecord>, Self::Error>> + Send + 'a;

  fn delete_token<'a>(
    &'a self,
    token_hash: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Drop every token that expired before `now`. Returns how many were
  /// removed.
  fn purge_expired_tokens(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
