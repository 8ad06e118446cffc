//! Prescription intake: turning recognised text into medication candidates.
//!
//! Recognition itself is delegated to a [`TextRecognizer`]; this module only
//! filters recognised lines and derives minimal records from them. No OCR
//! error correction happens here.

use std::{future::Future, path::Path, sync::LazyLock};

use regex::Regex;

use crate::model::NewMedication;

/// At most this many candidate lines are staged for review.
pub const MAX_CANDIDATES: usize = 10;

/// `addedBy` value for medications created from an upload.
pub const ADDED_BY_UPLOAD: &str = "Upload";

static DOSAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\d+\s*(?:mg|ml)|\btablets?\b").unwrap()
});

static DOSAGE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\d+\s*(?:mg|ml)").unwrap());

static TABLET: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\btablets?\b").unwrap());

static NAME_SPLIT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\s+-\s+|\s+").unwrap());

/// An external text recogniser (e.g. Tesseract) run over one image file.
pub trait TextRecognizer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn recognize<'a>(
    &'a self,
    image: &'a Path,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;
}

/// Whether `line` looks like a medication entry: it carries a number with a
/// `mg`/`ml` unit, or mentions tablets.
pub fn is_dosage_line(line: &str) -> bool { DOSAGE_LINE.is_match(line) }

/// Split recognised text on newlines, commas and semicolons, trim each piece
/// and keep the first [`MAX_CANDIDATES`] that look like medication entries.
pub fn candidate_lines(text: &str) -> Vec<String> {
  text
    .split(['\n', ',', ';'])
    .map(str::trim)
    .filter(|line| is_dosage_line(line))
    .take(MAX_CANDIDATES)
    .map(str::to_owned)
    .collect()
}

/// Derive a minimal medication from a confirmed candidate line.
///
/// The name is the first token (split on `" - "` or whitespace), the dosage
/// the first number+unit match, or the `tablet(s)` word on lines without
/// one. Frequency is left blank and no end date is set.
pub fn candidate_to_medication(line: &str) -> NewMedication {
  let line = line.trim();
  let name = NAME_SPLIT
    .split(line)
    .find(|t| !t.is_empty())
    .unwrap_or(line)
    .to_owned();
  let dosage = DOSAGE
    .find(line)
    .or_else(|| TABLET.find(line))
    .map(|m| m.as_str().to_owned())
    .unwrap_or_default();

  NewMedication {
    name:      Some(name),
    dosage:    Some(dosage),
    frequency: Some(String::new()),
    start:     None,
    end:       None,
    added_by:  Some(ADDED_BY_UPLOAD.to_owned()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keeps_only_dosage_lines() {
    let text = "Paracetamol 500mg\ntake after food\nAmoxicillin 250 mg\nfollow up in 2 weeks";
    assert_eq!(
      candidate_lines(text),
      vec!["Paracetamol 500mg".to_owned(), "Amoxicillin 250 mg".to_owned()]
    );
  }

  #[test]
  fn splits_on_commas_and_semicolons() {
    let text = "Metformin 500mg, Atorvastatin 10mg; Cough syrup 5 ml";
    assert_eq!(candidate_lines(text).len(), 3);
  }

  #[test]
  fn tablets_match_without_units() {
    assert!(is_dosage_line("2 Tablets after dinner"));
    assert!(is_dosage_line("one tablet"));
    assert!(!is_dosage_line("tabletop"));
  }

  #[test]
  fn caps_candidates() {
    let text = (0..25)
      .map(|i| format!("Drug{i} {i}mg"))
      .collect::<Vec<_>>()
      .join("\n");
    let lines = candidate_lines(&text);
    assert_eq!(lines.len(), MAX_CANDIDATES);
    assert_eq!(lines[0], "Drug0 0mg");
  }

  #[test]
  fn derives_name_and_dosage() {
    let med = candidate_to_medication("Amoxicillin 250 mg twice");
    assert_eq!(med.name.as_deref(), Some("Amoxicillin"));
    assert_eq!(med.dosage.as_deref(), Some("250 mg"));
    assert_eq!(med.added_by.as_deref(), Some("Upload"));
    assert!(med.end.is_none());
  }

  #[test]
  fn hyphenated_name_stops_at_separator() {
    let med = candidate_to_medication("Crocin - 650mg");
    assert_eq!(med.name.as_deref(), Some("Crocin"));
    assert_eq!(med.dosage.as_deref(), Some("650mg"));
  }

  #[test]
  fn tablet_line_falls_back_to_tablet_dosage() {
    let med = candidate_to_medication("Vitamin D tablets");
    assert_eq!(med.name.as_deref(), Some("Vitamin"));
    assert_eq!(med.dosage.as_deref(), Some("tablets"));

    let med = candidate_to_medication("Iron 1 Tablet daily");
    assert_eq!(med.dosage.as_deref(), Some("Tablet"));
  }
}
