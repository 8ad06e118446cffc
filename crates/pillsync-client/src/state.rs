//! The client's cached view of the signed-in user's data.
//!
//! Each slice is replaced wholesale by the snapshot that arrives for it;
//! nothing is merged. Signing out (or switching users) resets every slice.

use pillsync_core::{
  model::{DosageChange, Medication, Profile, Reminder, short_date},
  sync::Snapshot,
};
use uuid::Uuid;

/// Entries shown by [`CareState::history`].
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CareState {
  pub profile:        Profile,
  pub medications:    Vec<Medication>,
  pub dosage_changes: Vec<DosageChange>,
  pub reminders:      Vec<Reminder>,
}

impl CareState {
  pub fn apply(&mut self, snapshot: Snapshot) {
    match snapshot {
      Snapshot::Profile(profile) => self.profile = profile,
      Snapshot::Medications(meds) => self.medications = meds,
      Snapshot::DosageChanges(changes) => self.dosage_changes = changes,
      Snapshot::Reminders(reminders) => self.reminders = reminders,
    }
  }

  pub fn reset(&mut self) { *self = Self::default(); }

  pub fn medication(&self, id: Uuid) -> Option<&Medication> {
    self.medications.iter().find(|m| m.id == id)
  }

  /// Recent dosage changes, newest first, as display lines. A change whose
  /// medication is gone reads as `Unknown`.
  pub fn history(&self) -> Vec<String> {
    let mut changes: Vec<&DosageChange> = self.dosage_changes.iter().collect();
    changes.sort_by(|a, b| b.ts.cmp(&a.ts));
    changes
      .into_iter()
      .take(HISTORY_LIMIT)
      .map(|c| {
        let name = self
          .medication(c.med_id)
          .map_or("Unknown", |m| m.name.as_str());
        format!(
          "{} — Dosage changed: {} {} → {} ({})",
          short_date(c.ts),
          name,
          c.prev_dosage,
          c.new_dosage,
          c.changed_by
        )
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone, Utc};

  use super::*;

  fn med(name: &str) -> Medication {
    let now = Utc::now();
    Medication {
      id:         Uuid::new_v4(),
      user_id:    "u1".into(),
      name:       name.into(),
      dosage:     "500mg".into(),
      frequency:  "Twice daily".into(),
      start:      "2025-01-01".into(),
      end:        None,
      added_by:   "User".into(),
      updated:    "01 Jan 2025".into(),
      created_at: now,
      updated_at: now,
    }
  }

  fn change(med_id: Uuid, prev: &str, new: &str, ts: chrono::DateTime<Utc>) -> DosageChange {
    DosageChange {
      id: Uuid::new_v4(),
      user_id: "u1".into(),
      med_id,
      prev_dosage: prev.into(),
      new_dosage: new.into(),
      reason: String::new(),
      changed_by: "User".into(),
      ts,
    }
  }

  #[test]
  fn snapshots_replace_slices() {
    let mut state = CareState::default();
    state.apply(Snapshot::Medications(vec![med("A"), med("B")]));
    assert_eq!(state.medications.len(), 2);

    state.apply(Snapshot::Medications(vec![med("C")]));
    assert_eq!(state.medications.len(), 1);
    assert_eq!(state.medications[0].name, "C");

    state.apply(Snapshot::Profile(Profile {
      name: "Alice".into(),
      ..Profile::default()
    }));
    assert_eq!(state.profile.name, "Alice");
    assert_eq!(state.medications.len(), 1);
  }

  #[test]
  fn reset_clears_everything() {
    let mut state = CareState::default();
    state.apply(Snapshot::Medications(vec![med("A")]));
    state.reset();
    assert_eq!(state, CareState::default());
  }

  #[test]
  fn history_is_newest_first_and_names_medications() {
    let metformin = med("Metformin");
    let base = Utc.with_ymd_and_hms(2025, 3, 5, 9, 0, 0).unwrap();
    let mut state = CareState::default();
    state.apply(Snapshot::Medications(vec![metformin.clone()]));
    state.apply(Snapshot::DosageChanges(vec![
      change(metformin.id, "250mg", "500mg", base),
      change(Uuid::new_v4(), "5mg", "10mg", base + Duration::days(1)),
    ]));

    let lines = state.history();
    assert_eq!(lines, vec![
      "06 Mar — Dosage changed: Unknown 5mg → 10mg (User)".to_string(),
      "05 Mar — Dosage changed: Metformin 250mg → 500mg (User)".to_string(),
    ]);
  }

  #[test]
  fn history_is_capped() {
    let metformin = med("Metformin");
    let base = Utc::now();
    let changes = (0..15)
      .map(|i| change(metformin.id, "1mg", &format!("{i}mg"), base + Duration::minutes(i)))
      .collect();
    let mut state = CareState::default();
    state.apply(Snapshot::DosageChanges(changes));

    let lines = state.history();
    assert_eq!(lines.len(), HISTORY_LIMIT);
    assert!(lines[0].contains("1mg → 14mg"));
  }
}
