//! Integration tests for `SqliteStore` against an in-memory database, both
//! directly and through `CareService`.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use pillsync_core::{
  Error as CoreError,
  identity::{Account, AuthUser, TokenRecord},
  intake::{candidate_lines, candidate_to_medication},
  model::{
    AdherenceRecord, MedicationPatch, NewAdherence, NewDosageChange,
    NewMedication, NewReminder, Profile, ReminderFrequency, ReminderPatch,
    Role, TimeOfDay,
  },
  service::CareService,
  store::{AccountStore, CareStore},
  sync::{Collection, Snapshot},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn service() -> CareService<SqliteStore> {
  CareService::new(Arc::new(store().await))
}

fn caller(uid: &str) -> AuthUser {
  AuthUser {
    uid:            uid.into(),
    email:          format!("{uid}@example.com"),
    email_verified: false,
  }
}

fn new_med(name: &str, dosage: &str) -> NewMedication {
  NewMedication {
    name: Some(name.into()),
    dosage: Some(dosage.into()),
    frequency: Some("Twice daily".into()),
    ..NewMedication::default()
  }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_user_creates_once() {
  let svc = service().await;
  let alice = caller("alice");

  let (user, created) = svc
    .ensure_user(&alice, Some("  Alice ".into()), Some(Role::Caregiver))
    .await
    .unwrap();
  assert!(created);
  assert_eq!(user.name, "Alice");
  assert_eq!(user.profile.name, "Alice");
  assert_eq!(user.role, Role::Caregiver);

  let (again, created) = svc.ensure_user(&alice, None, None).await.unwrap();
  assert!(!created);
  assert_eq!(again.role, Role::Caregiver);
}

#[tokio::test]
async fn missing_user_document_is_not_found() {
  let svc = service().await;
  let err = svc.user(&caller("ghost")).await.unwrap_err();
  assert!(matches!(err, CoreError::NotFound(m) if m == "User document does not exist"));
}

#[tokio::test]
async fn profile_update_replaces_profile() {
  let svc = service().await;
  let alice = caller("alice");
  svc.ensure_user(&alice, Some("Alice".into()), None).await.unwrap();

  let profile = Profile {
    name:       "Alice L".into(),
    age:        Some(71),
    conditions: vec!["Hypertension".into()],
    allergies:  vec!["Penicillin".into()],
  };
  svc.update_profile(&alice, profile.clone()).await.unwrap();

  let stored = svc.user(&alice).await.unwrap();
  assert_eq!(stored.profile, profile);
}

// ─── Medications ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_medication_stamps_owner_and_defaults() {
  let svc = service().await;
  let alice = caller("alice");

  let med = svc
    .create_medication(&alice, new_med("Metformin", "500mg"))
    .await
    .unwrap();
  assert_eq!(med.user_id, "alice");
  assert_eq!(med.added_by, "User");
  assert!(!med.start.is_empty());
  assert!(med.end.is_none());

  let fetched = svc.store().get_medication(med.id).await.unwrap().unwrap();
  assert_eq!(fetched, med);
}

#[tokio::test]
async fn create_medication_requires_name_and_dosage() {
  let svc = service().await;
  let alice = caller("alice");

  let err = svc
    .create_medication(&alice, new_med("Metformin", "  "))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
  assert!(svc.list_medications(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn scanned_candidates_are_all_accepted() {
  let svc = service().await;
  let alice = caller("alice");

  let lines = candidate_lines("Vitamin D tablets\nParacetamol 500mg\nDr. Smith");
  assert_eq!(lines.len(), 2);
  for line in &lines {
    svc
      .create_medication(&alice, candidate_to_medication(line))
      .await
      .unwrap();
  }

  let meds = svc.list_medications(&alice).await.unwrap();
  assert_eq!(meds.len(), 2);
  let vitamin = meds.iter().find(|m| m.name == "Vitamin").unwrap();
  assert_eq!(vitamin.dosage, "tablets");
  assert_eq!(vitamin.added_by, "Upload");
}

#[tokio::test]
async fn medications_list_newest_first_per_owner() {
  let svc = service().await;
  let alice = caller("alice");
  let bob = caller("bob");

  let first = svc.create_medication(&alice, new_med("A", "1mg")).await.unwrap();
  let second = svc.create_medication(&alice, new_med("B", "2mg")).await.unwrap();
  svc.create_medication(&bob, new_med("C", "3mg")).await.unwrap();

  let listed = svc.list_medications(&alice).await.unwrap();
  let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
  assert_eq!(ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn update_medication_merges_partial_patch() {
  let svc = service().await;
  let alice = caller("alice");
  let med = svc
    .create_medication(&alice, new_med("Metformin", "500mg"))
    .await
    .unwrap();

  let patched = svc
    .update_medication(&alice, med.id, MedicationPatch {
      dosage: Some("750mg".into()),
      ..MedicationPatch::default()
    })
    .await
    .unwrap();
  assert_eq!(patched.dosage, "750mg");
  assert_eq!(patched.name, "Metformin");
  assert_eq!(patched.frequency, "Twice daily");
  assert_eq!(patched.created_at, med.created_at);
  assert_eq!(patched.user_id, "alice");
}

#[tokio::test]
async fn empty_end_date_clears_it() {
  let svc = service().await;
  let alice = caller("alice");
  let med = svc
    .create_medication(&alice, NewMedication {
      end: Some("".into()),
      ..new_med("Metformin", "500mg")
    })
    .await
    .unwrap();
  assert!(med.end.is_none());

  let set = svc
    .update_medication(&alice, med.id, MedicationPatch {
      end: Some("2025-12-31".into()),
      ..MedicationPatch::default()
    })
    .await
    .unwrap();
  assert_eq!(set.end.as_deref(), Some("2025-12-31"));

  let untouched = svc
    .update_medication(&alice, med.id, MedicationPatch {
      frequency: Some("Daily".into()),
      ..MedicationPatch::default()
    })
    .await
    .unwrap();
  assert_eq!(untouched.end.as_deref(), Some("2025-12-31"));

  let cleared = svc
    .update_medication(&alice, med.id, MedicationPatch {
      end: Some(" ".into()),
      ..MedicationPatch::default()
    })
    .await
    .unwrap();
  assert!(cleared.end.is_none());
  let stored = svc.store().get_medication(med.id).await.unwrap().unwrap();
  assert!(stored.end.is_none());
}

#[tokio::test]
async fn foreign_medication_is_forbidden_and_untouched() {
  let svc = service().await;
  let alice = caller("alice");
  let mallory = caller("mallory");
  let med = svc
    .create_medication(&alice, new_med("Metformin", "500mg"))
    .await
    .unwrap();

  let err = svc
    .update_medication(&mallory, med.id, MedicationPatch {
      name: Some("Sugar".into()),
      ..MedicationPatch::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden("Medication")));

  let err = svc.delete_medication(&mallory, med.id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden(_)));

  let stored = svc.store().get_medication(med.id).await.unwrap().unwrap();
  assert_eq!(stored, med);
}

#[tokio::test]
async fn missing_medication_is_not_found() {
  let svc = service().await;
  let err = svc
    .delete_medication(&caller("alice"), Uuid::new_v4())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn delete_leaves_references_dangling() {
  let svc = service().await;
  let alice = caller("alice");
  let med = svc
    .create_medication(&alice, new_med("Metformin", "500mg"))
    .await
    .unwrap();

  svc
    .add_reminder(&alice, NewReminder {
      med_id:        med.id,
      medicine_name: None,
      time:          TimeOfDay::Morning,
      frequency:     ReminderFrequency::Daily,
      enabled:       true,
    })
    .await
    .unwrap();
  svc
    .add_dosage_change(&alice, NewDosageChange {
      med_id:      med.id,
      prev_dosage: "500mg".into(),
      new_dosage:  "750mg".into(),
      reason:      String::new(),
      changed_by:  "User".into(),
    })
    .await
    .unwrap();

  svc.delete_medication(&alice, med.id).await.unwrap();

  assert!(svc.list_medications(&alice).await.unwrap().is_empty());
  let reminders = svc.list_reminders(&alice).await.unwrap();
  assert_eq!(reminders.len(), 1);
  assert_eq!(reminders[0].medicine_name, "Metformin");
  assert_eq!(svc.list_dosage_changes(&alice).await.unwrap().len(), 1);
}

// ─── Reminders ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn reminder_requires_known_name() {
  let svc = service().await;
  let err = svc
    .add_reminder(&caller("alice"), NewReminder {
      med_id:        Uuid::new_v4(),
      medicine_name: None,
      time:          TimeOfDay::Night,
      frequency:     ReminderFrequency::default(),
      enabled:       true,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn reminder_toggle_and_order() {
  let svc = service().await;
  let alice = caller("alice");
  let med_id = Uuid::new_v4();

  let first = svc
    .add_reminder(&alice, NewReminder {
      med_id,
      medicine_name: Some("Aspirin".into()),
      time: TimeOfDay::Morning,
      frequency: ReminderFrequency::Daily,
      enabled: true,
    })
    .await
    .unwrap();
  let second = svc
    .add_reminder(&alice, NewReminder {
      med_id,
      medicine_name: Some("Aspirin".into()),
      time: TimeOfDay::Evening,
      frequency: ReminderFrequency::AsNeeded,
      enabled: true,
    })
    .await
    .unwrap();

  let toggled = svc
    .update_reminder(&alice, first.id, ReminderPatch {
      enabled: Some(false),
      ..ReminderPatch::default()
    })
    .await
    .unwrap();
  assert!(!toggled.enabled);
  assert_eq!(toggled.time, TimeOfDay::Morning);

  let listed = svc.list_reminders(&alice).await.unwrap();
  let ids: Vec<_> = listed.iter().map(|r| r.id).collect();
  assert_eq!(ids, vec![first.id, second.id]);
  assert_eq!(listed[1].frequency, ReminderFrequency::AsNeeded);

  let err = svc.delete_reminder(&caller("bob"), second.id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden("Reminder")));
  svc.delete_reminder(&alice, second.id).await.unwrap();
  assert_eq!(svc.list_reminders(&alice).await.unwrap().len(), 1);
}

// ─── Adherence ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_accumulates_and_upsert_replaces() {
  let svc = service().await;
  let alice = caller("alice");
  let med_id = Uuid::new_v4();
  let date = day(2025, 10, 31);
  let slot = |taken| NewAdherence {
    med_id,
    date: Some(date),
    time: TimeOfDay::Morning,
    taken,
  };

  svc.record_adherence(&alice, slot(true)).await.unwrap();
  svc.record_adherence(&alice, slot(false)).await.unwrap();
  let (records, summary) = svc.adherence(&alice, date).await.unwrap();
  assert_eq!(records.len(), 2);
  assert_eq!(summary.total, 2);
  assert_eq!(summary.taken, 1);
  assert_eq!(summary.percentage, 50);

  let stored = svc.set_adherence(&alice, slot(true)).await.unwrap();
  assert!(stored.taken);
  let (records, summary) = svc.adherence(&alice, date).await.unwrap();
  assert_eq!(records.len(), 2);
  assert_eq!(summary.taken, 2);
  assert_eq!(summary.percentage, 100);
}

#[tokio::test]
async fn upsert_inserts_new_slot() {
  let s = store().await;
  let record = AdherenceRecord {
    id:         Uuid::new_v4(),
    user_id:    "alice".into(),
    med_id:     Uuid::new_v4(),
    date:       day(2025, 11, 1),
    time:       TimeOfDay::Night,
    taken:      true,
    created_at: Utc::now(),
  };
  let stored = s.upsert_adherence(record.clone()).await.unwrap();
  assert_eq!(stored.id, record.id);

  let listed = s.list_adherence("alice", record.date).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert!(s.list_adherence("alice", day(2025, 11, 2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_day_summarises_to_zero() {
  let svc = service().await;
  let (records, summary) =
    svc.adherence(&caller("alice"), day(2025, 1, 1)).await.unwrap();
  assert!(records.is_empty());
  assert_eq!(summary.percentage, 0);
}

// ─── Emergency cards ─────────────────────────────────────────────────────────

#[tokio::test]
async fn emergency_card_snapshots_and_expires() {
  let svc = service().await;
  let alice = caller("alice");
  svc.ensure_user(&alice, Some("Alice".into()), None).await.unwrap();
  svc
    .create_medication(&alice, new_med("Metformin", "500mg"))
    .await
    .unwrap();

  let card = svc.generate_emergency_card(&alice).await.unwrap();
  assert_eq!(card.medications.len(), 1);
  assert_eq!(card.patient.name, "Alice");

  // Later edits do not reach an issued card.
  svc
    .create_medication(&alice, new_med("Aspirin", "81mg"))
    .await
    .unwrap();

  let view = svc.view_emergency_card(card.id, Utc::now()).await.unwrap();
  assert!(!view.expired);
  assert_eq!(view.card.medications.len(), 1);

  let later = card.generated_at + Duration::minutes(31);
  let view = svc.view_emergency_card(card.id, later).await.unwrap();
  assert!(view.expired);
  assert_eq!(view.card.patient.name, "Alice");
}

#[tokio::test]
async fn emergency_card_without_user_document_uses_empty_profile() {
  let svc = service().await;
  let card = svc.generate_emergency_card(&caller("nobody")).await.unwrap();
  assert_eq!(card.patient, Profile::default());
  assert!(card.medications.is_empty());
}

#[tokio::test]
async fn unknown_emergency_card_is_not_found() {
  let svc = service().await;
  let err = svc
    .view_emergency_card(Uuid::new_v4(), Utc::now())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotFound(m) if m == "No data found for this link."));
}

// ─── Change feed ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn mutations_publish_changes() {
  let svc = service().await;
  let alice = caller("alice");
  let mut rx = svc.subscribe();

  let med = svc
    .create_medication(&alice, new_med("Metformin", "500mg"))
    .await
    .unwrap();
  let change = rx.recv().await.unwrap();
  assert_eq!(change.owner, "alice");
  assert_eq!(change.collection, Collection::Medications);

  let Snapshot::Medications(meds) =
    svc.snapshot("alice", change.collection).await.unwrap()
  else {
    panic!("expected a medications snapshot");
  };
  assert_eq!(meds, vec![med]);

  // Adherence writes are not part of the live collections.
  svc
    .record_adherence(&alice, NewAdherence {
      med_id: Uuid::new_v4(),
      date:   None,
      time:   TimeOfDay::Afternoon,
      taken:  true,
    })
    .await
    .unwrap();
  assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn forbidden_mutation_publishes_nothing() {
  let svc = service().await;
  let med = svc
    .create_medication(&caller("alice"), new_med("Metformin", "500mg"))
    .await
    .unwrap();
  let mut rx = svc.subscribe();

  let _ = svc.delete_medication(&caller("bob"), med.id).await;
  assert!(rx.try_recv().is_err());
}

// ─── Accounts ────────────────────────────────────────────────────────────────

fn account(uid: &str, email: &str) -> Account {
  Account {
    uid:            uid.into(),
    email:          email.into(),
    password_hash:  "$argon2id$v=19$stub".into(),
    email_verified: false,
    created_at:     Utc::now(),
  }
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let s = store().await;
  s.insert_account(account("u1", "a@example.com")).await.unwrap();

  let err = s
    .insert_account(account("u2", "a@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::EmailTaken(e) if e == "a@example.com"));

  let found = s.find_account_by_email("a@example.com").await.unwrap().unwrap();
  assert_eq!(found.uid, "u1");
  assert!(s.get_account("u2").await.unwrap().is_none());
}

#[tokio::test]
async fn tokens_round_trip_and_delete() {
  let s = store().await;
  let now = Utc::now();
  s.insert_token(TokenRecord {
    token_hash: "abc".into(),
    uid:        "u1".into(),
    issued_at:  now,
    expires_at: now + Duration::hours(1),
  })
  .await
  .unwrap();

  let found = s.find_token("abc").await.unwrap().unwrap();
  assert_eq!(found.uid, "u1");

  s.delete_token("abc").await.unwrap();
  assert!(s.find_token("abc").await.unwrap().is_none());
}

#[tokio::test]
async fn purge_drops_only_expired_tokens() {
  let s = store().await;
  let now = Utc::now();
  for (hash, expires_at) in [
    ("old", now - Duration::minutes(5)),
    ("live", now + Duration::hours(1)),
  ] {
    s.insert_token(TokenRecord {
      token_hash: hash.into(),
      uid:        "u1".into(),
      issued_at:  now - Duration::hours(2),
      expires_at,
    })
    .await
    .unwrap();
  }

  assert_eq!(s.purge_expired_tokens(now).await.unwrap(), 1);
  assert!(s.find_token("old").await.unwrap().is_none());
  assert!(s.find_token("live").await.unwrap().is_some());
}
