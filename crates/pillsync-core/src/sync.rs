//! Snapshot subscriptions.
//!
//! Every successful mutation publishes a [`Change`] naming the owner and the
//! collection it touched. Subscribers answer a change by re-reading the whole
//! slice and delivering it as a [`Snapshot`], which replaces the cached slice
//! wholesale. There is no ordering guarantee between collections.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Result,
  model::{DosageChange, Medication, Profile, Reminder},
};

/// The slices kept live on the client.
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
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Collection {
  Profile,
  Medications,
  DosageChanges,
  Reminders,
}

impl Collection {
  pub const ALL: [Collection; 4] = [
    Collection::Profile,
    Collection::Medications,
    Collection::DosageChanges,
    Collection::Reminders,
  ];
}

/// A write notification. Carries no payload; subscribers re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
  pub owner:      String,
  pub collection: Collection,
}

/// A full result set for one collection of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "collection", content = "data", rename_all = "camelCase")]
pub enum Snapshot {
  Profile(Profile),
  Medications(Vec<Medication>),
  DosageChanges(Vec<DosageChange>),
  Reminders(Vec<Reminder>),
}

impl Snapshot {
  pub fn collection(&self) -> Collection {
    match self {
      Self::Profile(_) => Collection::Profile,
      Self::Medications(_) => Collection::Medications,
      Self::DosageChanges(_) => Collection::DosageChanges,
      Self::Reminders(_) => Collection::Reminders,
    }
  }

  /// Serialise the inner payload (without the collection tag), as sent in
  /// the `data` field of an event.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild a snapshot from an event name and its JSON payload.
  pub fn from_parts(collection: &str, data: serde_json::Value) -> Result<Self> {
    let wrapped = serde_json::json!({ "collection": collection, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}
