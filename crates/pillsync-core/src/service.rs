//! [`CareService`]: the single authorization-checked entry point for every
//! read and mutation of care documents.
//!
//! Callers are identified by a verified [`AuthUser`]. Records owned by another
//! user are reported as [`Error::Forbidden`]; the store is never touched for
//! them. Each successful mutation publishes a [`Change`] on the service's
//! broadcast channel.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  Error, Result,
  emergency::{EmergencyCard, EmergencyView},
  identity::AuthUser,
  model::{
    AdherenceRecord, AdherenceSummary, DosageChange, Medication,
    MedicationPatch, NewAdherence, NewDosageChange, NewMedication, NewReminder,
    Owned, Profile, Reminder, ReminderPatch, Role, UserRecord, long_date,
    short_date,
  },
  store::CareStore,
  sync::{Change, Collection, Snapshot},
};

/// Capacity of the change channel; slower subscribers observe a lag and
/// resynchronise.
const CHANGE_BUFFER: usize = 256;

pub struct CareService<S> {
  store:   Arc<S>,
  changes: broadcast::Sender<Change>,
}

impl<S> Clone for CareService<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      changes: self.changes.clone(),
    }
  }
}

impl<S: CareStore> CareService<S> {
  pub fn new(store: Arc<S>) -> Self {
    let (changes, _) = broadcast::channel(CHANGE_BUFFER);
    Self { store, changes }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Receive a [`Change`] for every mutation made after this call.
  pub fn subscribe(&self) -> broadcast::Receiver<Change> {
    self.changes.subscribe()
  }

  fn publish(&self, owner: &str, collection: Collection) {
    // No subscribers is not an error.
    let _ = self.changes.send(Change {
      owner: owner.to_owned(),
      collection,
    });
  }

  // ── Users ─────────────────────────────────────────────────────────────

  /// The caller's user document.
  pub async fn user(&self, caller: &AuthUser) -> Result<UserRecord> {
    self
      .store
      .get_user(&caller.uid)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("User document does not exist".into()))
  }

  /// Create the caller's user document with an empty profile if it does not
  /// exist yet. Returns the document and whether it was created.
  pub async fn ensure_user(
    &self,
    caller: &AuthUser,
    name: Option<String>,
    role: Option<Role>,
  ) -> Result<(UserRecord, bool)> {
    if let Some(existing) =
      self.store.get_user(&caller.uid).await.map_err(Error::store)?
    {
      return Ok((existing, false));
    }

    let name = name.map(|n| n.trim().to_owned()).unwrap_or_default();
    let now = Utc::now();
    let user = UserRecord {
      uid:        caller.uid.clone(),
      email:      caller.email.clone(),
      name:       name.clone(),
      role:       role.unwrap_or_default(),
      profile:    Profile { name, ..Profile::default() },
      created_at: now,
      updated_at: now,
    };
    self.store.put_user(user.clone()).await.map_err(Error::store)?;
    self.publish(&caller.uid, Collection::Profile);
    Ok((user, true))
  }

  /// Replace the caller's profile.
  pub async fn update_profile(
    &self,
    caller: &AuthUser,
    profile: Profile,
  ) -> Result<UserRecord> {
    let mut user = self.user(caller).await?;
    user.profile = profile;
    user.updated_at = Utc::now();
    self.store.put_user(user.clone()).await.map_err(Error::store)?;
    self.publish(&caller.uid, Collection::Profile);
    Ok(user)
  }

  // ── Medications ───────────────────────────────────────────────────────

  pub async fn list_medications(
    &self,
    caller: &AuthUser,
  ) -> Result<Vec<Medication>> {
    self
      .store
      .list_medications(&caller.uid)
      .await
      .map_err(Error::store)
  }

  pub async fn get_medication(
    &self,
    caller: &AuthUser,
    id: Uuid,
  ) -> Result<Medication> {
    let found = self.store.get_medication(id).await.map_err(Error::store)?;
    owned(found, caller, "Medication")
  }

  pub async fn create_medication(
    &self,
    caller: &AuthUser,
    input: NewMedication,
  ) -> Result<Medication> {
    let (Some(name), Some(dosage)) = (non_empty(input.name), non_empty(input.dosage))
    else {
      return Err(Error::Validation(
        "Name and dosage are required fields".into(),
      ));
    };

    let now = Utc::now();
    let med = Medication {
      id: Uuid::new_v4(),
      user_id: caller.uid.clone(),
      name,
      dosage,
      frequency: input.frequency.unwrap_or_default(),
      start: non_empty(input.start).unwrap_or_else(|| short_date(now)),
      end: non_empty(input.end),
      added_by: non_empty(input.added_by).unwrap_or_else(|| "User".into()),
      updated: long_date(now),
      created_at: now,
      updated_at: now,
    };

    self
      .store
      .insert_medication(med.clone())
      .await
      .map_err(Error::store)?;
    self.publish(&caller.uid, Collection::Medications);
    Ok(med)
  }

  pub async fn update_medication(
    &self,
    caller: &AuthUser,
    id: Uuid,
    mut patch: MedicationPatch,
  ) -> Result<Medication> {
    self.get_medication(caller, id).await?;

    for (field, value) in [("name", &mut patch.name), ("dosage", &mut patch.dosage)] {
      if let Some(v) = value {
        let trimmed = v.trim();
        if trimmed.is_empty() {
          return Err(Error::Validation(format!("{field} must not be empty")));
        }
        *v = trimmed.to_owned();
      }
    }
    // An empty end date clears it.
    patch.end = patch.end.map(|end| end.trim().to_owned());

    let now = Utc::now();
    let med = self
      .store
      .update_medication(id, patch, long_date(now), now)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("Medication not found".into()))?;
    self.publish(&caller.uid, Collection::Medications);
    Ok(med)
  }

  /// Hard delete. Reminders, dosage changes and adherence records that
  /// reference the medication are left as they are.
  pub async fn delete_medication(&self, caller: &AuthUser, id: Uuid) -> Result<()> {
    self.get_medication(caller, id).await?;
    if !self.store.delete_medication(id).await.map_err(Error::store)? {
      return Err(Error::NotFound("Medication not found".into()));
    }
    self.publish(&caller.uid, Collection::Medications);
    Ok(())
  }

  // ── Dosage changes ────────────────────────────────────────────────────

  pub async fn list_dosage_changes(
    &self,
    caller: &AuthUser,
  ) -> Result<Vec<DosageChange>> {
    self
      .store
      .list_dosage_changes(&caller.uid)
      .await
      .map_err(Error::store)
  }

  pub async fn add_dosage_change(
    &self,
    caller: &AuthUser,
    input: NewDosageChange,
  ) -> Result<DosageChange> {
    let change = DosageChange {
      id:          Uuid::new_v4(),
      user_id:     caller.uid.clone(),
      med_id:      input.med_id,
      prev_dosage: input.prev_dosage,
      new_dosage:  input.new_dosage,
      reason:      input.reason,
      changed_by:  input.changed_by,
      ts:          Utc::now(),
    };
    self
      .store
      .insert_dosage_change(change.clone())
      .await
      .map_err(Error::store)?;
    self.publish(&caller.uid, Collection::DosageChanges);
    Ok(change)
  }

  // ── Reminders ─────────────────────────────────────────────────────────

  pub async fn list_reminders(&self, caller: &AuthUser) -> Result<Vec<Reminder>> {
    self
      .store
      .list_reminders(&caller.uid)
      .await
      .map_err(Error::store)
  }

  pub async fn add_reminder(
    &self,
    caller: &AuthUser,
    input: NewReminder,
  ) -> Result<Reminder> {
    let medicine_name = match non_empty(input.medicine_name) {
      Some(name) => name,
      None => match self.store.get_medication(input.med_id).await.map_err(Error::store)? {
        Some(med) if med.owner() == caller.uid => med.name,
        _ => {
          return Err(Error::Validation(
            "medicineName is required when the medication is unknown".into(),
          ));
        }
      },
    };

    let now = Utc::now();
    let reminder = Reminder {
      id: Uuid::new_v4(),
      user_id: caller.uid.clone(),
      med_id: input.med_id,
      medicine_name,
      time: input.time,
      frequency: input.frequency,
      enabled: input.enabled,
      created_at: now,
      updated_at: now,
    };
    self
      .store
      .insert_reminder(reminder.clone())
      .await
      .map_err(Error::store)?;
    self.publish(&caller.uid, Collection::Reminders);
    Ok(reminder)
  }

  pub async fn update_reminder(
    &self,
    caller: &AuthUser,
    id: Uuid,
    patch: ReminderPatch,
  ) -> Result<Reminder> {
    let found = self.store.get_reminder(id).await.map_err(Error::store)?;
    owned(found, caller, "Reminder")?;

    let reminder = self
      .store
      .update_reminder(id, patch, Utc::now())
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("Reminder not found".into()))?;
    self.publish(&caller.uid, Collection::Reminders);
    Ok(reminder)
  }

  pub async fn delete_reminder(&self, caller: &AuthUser, id: Uuid) -> Result<()> {
    let found = self.store.get_reminder(id).await.map_err(Error::store)?;
    owned(found, caller, "Reminder")?;

    if !self.store.delete_reminder(id).await.map_err(Error::store)? {
      return Err(Error::NotFound("Reminder not found".into()));
    }
    self.publish(&caller.uid, Collection::Reminders);
    Ok(())
  }

  // ── Adherence ─────────────────────────────────────────────────────────

  /// The caller's records for `date` and the same-day summary over them.
  pub async fn adherence(
    &self,
    caller: &AuthUser,
    date: NaiveDate,
  ) -> Result<(Vec<AdherenceRecord>, AdherenceSummary)> {
    let records = self
      .store
      .list_adherence(&caller.uid, date)
      .await
      .map_err(Error::store)?;
    let summary = AdherenceSummary::compute(date, &records);
    Ok((records, summary))
  }

  /// Log a toggle. Every call appends a new record, so repeated toggles of
  /// the same slot accumulate.
  pub async fn record_adherence(
    &self,
    caller: &AuthUser,
    input: NewAdherence,
  ) -> Result<AdherenceRecord> {
    let record = adherence_record(caller, input, Utc::now());
    self
      .store
      .append_adherence(record.clone())
      .await
      .map_err(Error::store)?;
    Ok(record)
  }

  /// Set the state of one slot. Idempotent per medication, date and time
  /// slot.
  pub async fn set_adherence(
    &self,
    caller: &AuthUser,
    input: NewAdherence,
  ) -> Result<AdherenceRecord> {
    let record = adherence_record(caller, input, Utc::now());
    self.store.upsert_adherence(record).await.map_err(Error::store)
  }

  // ── Emergency cards ───────────────────────────────────────────────────

  /// Snapshot the caller's profile and full medication list into a new card.
  pub async fn generate_emergency_card(
    &self,
    caller: &AuthUser,
  ) -> Result<EmergencyCard> {
    let profile = self
      .store
      .get_user(&caller.uid)
      .await
      .map_err(Error::store)?
      .map(|u| u.profile)
      .unwrap_or_default();
    let medications = self.list_medications(caller).await?;

    let card = EmergencyCard::snapshot(&caller.uid, profile, medications, Utc::now());
    self
      .store
      .insert_emergency_card(card.clone())
      .await
      .map_err(Error::store)?;
    Ok(card)
  }

  /// Public read by id. No authentication; expiry is judged against `now`
  /// but does not hide the data.
  pub async fn view_emergency_card(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<EmergencyView> {
    let card = self
      .store
      .get_emergency_card(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("No data found for this link.".into()))?;
    Ok(EmergencyView::at(card, now))
  }

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// The full current result set of `collection` for `uid`.
  pub async fn snapshot(&self, uid: &str, collection: Collection) -> Result<Snapshot> {
    let snap = match collection {
      Collection::Profile => Snapshot::Profile(
        self
          .store
          .get_user(uid)
          .await
          .map_err(Error::store)?
          .map(|u| u.profile)
          .unwrap_or_default(),
      ),
      Collection::Medications => Snapshot::Medications(
        self.store.list_medications(uid).await.map_err(Error::store)?,
      ),
      Collection::DosageChanges => Snapshot::DosageChanges(
        self.store.list_dosage_changes(uid).await.map_err(Error::store)?,
      ),
      Collection::Reminders => Snapshot::Reminders(
        self.store.list_reminders(uid).await.map_err(Error::store)?,
      ),
    };
    Ok(snap)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Resolve a point read into an owned record: absent is `NotFound`, owned by
/// someone else is `Forbidden`.
fn owned<T: Owned>(found: Option<T>, caller: &AuthUser, kind: &'static str) -> Result<T> {
  let record = found.ok_or_else(|| Error::NotFound(format!("{kind} not found")))?;
  if record.owner() != caller.uid {
    return Err(Error::Forbidden(kind));
  }
  Ok(record)
}

fn non_empty(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

fn adherence_record(
  caller: &AuthUser,
  input: NewAdherence,
  now: DateTime<Utc>,
) -> AdherenceRecord {
  AdherenceRecord {
    id:         Uuid::new_v4(),
    user_id:    caller.uid.clone(),
    med_id:     input.med_id,
    date:       input.date.unwrap_or_else(|| now.date_naive()),
    time:       input.time,
    taken:      input.taken,
    created_at: now,
  }
}
