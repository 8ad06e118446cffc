//! Prescription scanning: images in, candidate medication lines out.
//!
//! Images are recognised one after another. If any of them fails, the whole
//! scan yields no candidates.

use std::{
  path::{Path, PathBuf},
  process::ExitStatus,
};

use pillsync_core::{
  intake::{TextRecognizer, candidate_lines, candidate_to_medication},
  model::Medication,
};
use tokio::process::Command;

use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum RecognizeError {
  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source:  std::io::Error,
  },

  #[error("{program} exited with {status}: {stderr}")]
  Failed {
    program: String,
    status:  ExitStatus,
    stderr:  String,
  },
}

/// Runs the `tesseract` command line tool, reading the text from stdout.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
  program: PathBuf,
}

impl TesseractRecognizer {
  pub fn new(program: impl Into<PathBuf>) -> Self { Self { program: program.into() } }
}

impl Default for TesseractRecognizer {
  fn default() -> Self { Self::new("tesseract") }
}

impl TextRecognizer for TesseractRecognizer {
  type Error = RecognizeError;

  async fn recognize<'a>(&'a self, image: &'a Path) -> Result<String, RecognizeError> {
    let program = self.program.display().to_string();
    let output = Command::new(&self.program)
      .arg(image)
      .arg("stdout")
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|source| RecognizeError::Spawn { program: program.clone(), source })?;

    if !output.status.success() {
      return Err(RecognizeError::Failed {
        program,
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

/// Recognise `images` in order and return the candidate lines found across
/// all of them.
pub async fn scan<R: TextRecognizer>(recognizer: &R, images: &[PathBuf]) -> Vec<String> {
  let mut text = String::new();
  for image in images {
    match recognizer.recognize(image).await {
      Ok(page) => {
        text.push_str(&page);
        text.push('\n');
      }
      Err(e) => {
        tracing::error!(error = %e, image = %image.display(), "text recognition failed");
        return Vec::new();
      }
    }
  }
  candidate_lines(&text)
}

/// Create one medication per confirmed line. Lines that fail are logged and
/// skipped.
pub async fn confirm(session: &Session, lines: &[String]) -> Vec<Medication> {
  let mut created = Vec::with_capacity(lines.len());
  for line in lines {
    match session.add_medication(&candidate_to_medication(line)).await {
      Ok(med) => created.push(med),
      Err(e) => tracing::warn!(error = %e, line = %line, "could not add scanned medication"),
    }
  }
  created
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;
  use crate::client::ApiClient;

  #[derive(Debug, thiserror::Error)]
  #[error("unreadable image")]
  struct Unreadable;

  struct Canned(HashMap<PathBuf, String>);

  impl TextRecognizer for Canned {
    type Error = Unreadable;

    async fn recognize<'a>(&'a self, image: &'a Path) -> Result<String, Unreadable> {
      self.0.get(image).cloned().ok_or(Unreadable)
    }
  }

  fn canned() -> Canned {
    Canned(HashMap::from([
      (PathBuf::from("a.png"), "Paracetamol 500mg\nDr. Smith".to_owned()),
      (PathBuf::from("b.png"), "Amoxicillin 250 mg, rest well".to_owned()),
    ]))
  }

  #[tokio::test]
  async fn candidates_span_all_images() {
    let lines = scan(&canned(), &["a.png".into(), "b.png".into()]).await;
    assert_eq!(lines, vec![
      "Paracetamol 500mg".to_owned(),
      "Amoxicillin 250 mg".to_owned()
    ]);
  }

  #[tokio::test]
  async fn one_failure_empties_the_scan() {
    let lines = scan(&canned(), &["a.png".into(), "missing.png".into()]).await;
    assert!(lines.is_empty());
  }

  #[tokio::test]
  async fn missing_binary_is_a_spawn_error() {
    let recognizer = TesseractRecognizer::new("/nonexistent/tesseract");
    let err = recognizer.recognize(Path::new("a.png")).await.unwrap_err();
    assert!(matches!(err, RecognizeError::Spawn { .. }));
  }

  #[tokio::test]
  async fn confirming_while_signed_out_creates_nothing() {
    let session = Session::new(ApiClient::new("http://127.0.0.1:9").unwrap(), None);
    let created = confirm(&session, &["Paracetamol 500mg".to_owned()]).await;
    assert!(created.is_empty());
  }
}
