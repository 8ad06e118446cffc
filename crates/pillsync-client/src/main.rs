//! `pillsync`: command line client for the PillSync API.
//!
//! # Usage
//!
//! ```
//! pillsync signin --email alice@example.com --password secret1
//! pillsync meds add --name Metformin --dosage 500mg --frequency "Twice daily"
//! pillsync dose <MED_ID> 750mg --reason "HbA1c still high"
//! pillsync watch
//! ```
//!
//! The session token is kept in a file between runs (see `session_file` in
//! the config) so later commands act as the same user.

mod client;
mod intake;
mod session;
mod state;
mod sync;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use client::ApiClient;
use pillsync_core::{
  model::{
    Medication, MedicationPatch, NewAdherence, NewMedication, NewReminder,
    Profile, Reminder, ReminderFrequency, ReminderPatch, Role, TimeOfDay,
  },
  sync::Snapshot,
};
use qrcode::{QrCode, render::unicode};
use serde::Deserialize;
use session::Session;
use state::CareState;
use tokio::sync::RwLock;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pillsync", about = "Command line client for PillSync")]
struct Args {
  /// Path to a TOML config file (url, session_file, tesseract).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the PillSync server (default: http://localhost:5000).
  #[arg(long, env = "PILLSYNC_URL")]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create an account and sign in.
  Signup {
    #[arg(long)]
    email:    String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    name:     Option<String>,
    /// patient, caregiver or doctor.
    #[arg(long)]
    role:     Option<Role>,
  },
  /// Sign in to an existing account.
  Signin {
    #[arg(long)]
    email:    String,
    #[arg(long)]
    password: String,
  },
  /// Revoke the saved session.
  Signout,
  /// Show the signed-in account.
  Whoami,
  /// Show or edit the medical profile.
  Profile {
    #[command(subcommand)]
    action: Option<ProfileAction>,
  },
  /// Manage medications.
  Meds {
    #[command(subcommand)]
    action: MedsAction,
  },
  /// Change a medication's dosage and log the change.
  Dose {
    med:    Uuid,
    dosage: String,
    #[arg(long, default_value = "")]
    reason: String,
  },
  /// Recent dosage changes.
  History,
  /// Manage reminders.
  Reminders {
    #[command(subcommand)]
    action: Option<RemindersAction>,
  },
  /// Record or review adherence.
  Adherence {
    #[command(subcommand)]
    action: Option<AdherenceAction>,
  },
  /// Generate or view emergency cards.
  Emergency {
    #[command(subcommand)]
    action: EmergencyAction,
  },
  /// Read medications off prescription images.
  Scan {
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Add every candidate without asking.
    #[arg(long)]
    yes:    bool,
  },
  /// Follow live updates until interrupted.
  Watch,
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
  Set {
    #[arg(long)]
    name:       Option<String>,
    #[arg(long)]
    age:        Option<u32>,
    /// Comma-separated.
    #[arg(long, value_delimiter = ',')]
    conditions: Option<Vec<String>>,
    /// Comma-separated.
    #[arg(long, value_delimiter = ',')]
    allergies:  Option<Vec<String>>,
  },
}

#[derive(Subcommand, Debug)]
enum MedsAction {
  List,
  Add {
    #[arg(long)]
    name:      String,
    #[arg(long)]
    dosage:    String,
    #[arg(long)]
    frequency: String,
    /// Defaults to today on the server.
    #[arg(long)]
    start:     Option<String>,
    #[arg(long)]
    end:       Option<String>,
  },
  Update {
    id:        Uuid,
    #[arg(long)]
    name:      Option<String>,
    #[arg(long)]
    dosage:    Option<String>,
    #[arg(long)]
    frequency: Option<String>,
    #[arg(long)]
    start:     Option<String>,
    #[arg(long)]
    end:       Option<String>,
  },
  Delete {
    id: Uuid,
  },
}

#[derive(Subcommand, Debug)]
enum RemindersAction {
  Add {
    #[arg(long)]
    med:       Uuid,
    /// Morning, Afternoon, Evening or Night.
    #[arg(long)]
    time:      TimeOfDay,
    /// Daily, Weekly or "As needed".
    #[arg(long, default_value = "Daily")]
    frequency: ReminderFrequency,
  },
  Enable {
    id: Uuid,
  },
  Disable {
    id: Uuid,
  },
  Delete {
    id: Uuid,
  },
}

#[derive(Subcommand, Debug)]
enum AdherenceAction {
  /// Record a dose slot as taken (or missed).
  Mark {
    #[arg(long)]
    med:    Uuid,
    /// Morning, Afternoon, Evening or Night.
    #[arg(long)]
    time:   TimeOfDay,
    /// `YYYY-MM-DD`; today when omitted.
    #[arg(long)]
    date:   Option<NaiveDate>,
    #[arg(long)]
    missed: bool,
    /// Overwrite the slot's state instead of appending a record.
    #[arg(long)]
    set:    bool,
  },
  Show {
    #[arg(long)]
    date: Option<NaiveDate>,
  },
}

#[derive(Subcommand, Debug)]
enum EmergencyAction {
  /// Snapshot the profile and medications into a shareable card.
  Generate,
  /// Open a card by id (no sign-in needed).
  View { id: String },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:          String,
  #[serde(default)]
  session_file: Option<PathBuf>,
  #[serde(default)]
  tesseract:    Option<PathBuf>,
}

fn default_session_file() -> Option<PathBuf> {
  std::env::var_os("HOME")
    .map(|home| PathBuf::from(home).join(".config/pillsync/session.json"))
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags and environment override the config file, which overrides
  // defaults.
  let base_url = args
    .url
    .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
    .unwrap_or_else(|| "http://localhost:5000".to_string());
  let session_file = file_cfg.session_file.or_else(default_session_file);
  let tesseract = file_cfg
    .tesseract
    .map(intake::TesseractRecognizer::new)
    .unwrap_or_default();

  let api = ApiClient::new(&base_url)?;
  let session = Session::new(api, session_file);

  match args.command {
    Command::Signup { email, password, name, role } => {
      let user = session
        .sign_up(&email, &password, name.as_deref(), role)
        .await?;
      println!("Signed up as {} ({})", user.email, user.uid);
    }
    Command::Signin { email, password } => {
      let user = session.sign_in(&email, &password).await?;
      println!("Signed in as {}", user.email);
    }
    Command::Signout => {
      if let Err(e) = session.restore().await {
        tracing::warn!(error = %e, "could not resume session");
      }
      session.sign_out().await?;
      println!("Signed out");
    }
    Command::Whoami => match session.restore().await? {
      Some(_) => {
        let me = session.api().verify().await?;
        println!("{} ({})", me.email, me.uid);
        if !me.profile.name.is_empty() {
          println!("name:     {}", me.profile.name);
        }
        println!("role:     {}", me.role);
        println!("verified: {}", me.email_verified);
        println!("since:    {}", me.created_at.format("%d %b %Y"));
      }
      None => println!("Not signed in"),
    },
    Command::Profile { action } => {
      signed_in(&session).await?;
      profile(&session, action).await?;
    }
    Command::Meds { action } => {
      signed_in(&session).await?;
      meds(&session, action).await?;
    }
    Command::Dose { med, dosage, reason } => {
      signed_in(&session).await?;
      let (updated, change) = session.change_dosage(med, &dosage, &reason).await?;
      match change {
        Some(c) => println!(
          "{}: {} → {}",
          updated.name, c.prev_dosage, c.new_dosage
        ),
        None => println!("{}: dosage unchanged ({})", updated.name, updated.dosage),
      }
    }
    Command::History => {
      signed_in(&session).await?;
      let mut state = CareState::default();
      state.apply(Snapshot::Medications(session.api().list_medications().await?));
      state.apply(Snapshot::DosageChanges(
        session.api().list_dosage_changes().await?,
      ));
      let lines = state.history();
      if lines.is_empty() {
        println!("No dosage changes recorded");
      }
      for line in lines {
        println!("{line}");
      }
    }
    Command::Reminders { action } => {
      signed_in(&session).await?;
      reminders(&session, action).await?;
    }
    Command::Adherence { action } => {
      signed_in(&session).await?;
      adherence(&session, action).await?;
    }
    Command::Emergency { action } => emergency(&session, action).await?,
    Command::Scan { images, yes } => {
      signed_in(&session).await?;
      let lines = intake::scan(&tesseract, &images).await;
      if lines.is_empty() {
        println!("No medications recognised");
        return Ok(());
      }
      for (i, line) in lines.iter().enumerate() {
        println!("{:>2}. {line}", i + 1);
      }
      if yes {
        let created = intake::confirm(&session, &lines).await;
        println!("Added {} of {} medications", created.len(), lines.len());
      } else {
        println!("Re-run with --yes to add them");
      }
    }
    Command::Watch => {
      signed_in(&session).await?;
      watch(&session).await?;
    }
  }

  Ok(())
}

async fn signed_in(session: &Session) -> Result<()> {
  if session.restore().await?.is_none() {
    bail!(session::NotSignedIn);
  }
  Ok(())
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn profile(session: &Session, action: Option<ProfileAction>) -> Result<()> {
  let current = session.api().profile().await?.profile;
  let profile = match action {
    None => current,
    Some(ProfileAction::Set { name, age, conditions, allergies }) => {
      let updated = Profile {
        name:       name.unwrap_or(current.name),
        age:        age.or(current.age),
        conditions: conditions.unwrap_or(current.conditions),
        allergies:  allergies.unwrap_or(current.allergies),
      };
      session.update_profile(&updated).await?
    }
  };

  println!("name:       {}", profile.name);
  println!(
    "age:        {}",
    profile.age.map_or_else(|| "-".to_owned(), |a| a.to_string())
  );
  println!("conditions: {}", profile.conditions.join(", "));
  println!("allergies:  {}", profile.allergies.join(", "));
  Ok(())
}

fn print_medication(med: &Medication) {
  println!(
    "{}  {:<20} {:<10} {:<16} from {}{}",
    med.id,
    med.name,
    med.dosage,
    med.frequency,
    med.start,
    med.end.as_deref().map(|e| format!(" to {e}")).unwrap_or_default()
  );
}

async fn meds(session: &Session, action: MedsAction) -> Result<()> {
  match action {
    MedsAction::List => {
      let list = session.api().list_medications().await?;
      for med in &list {
        print_medication(med);
      }
      println!("{} medication(s)", list.len());
    }
    MedsAction::Add { name, dosage, frequency, start, end } => {
      let med = session
        .add_medication(&NewMedication {
          name: Some(name),
          dosage: Some(dosage),
          frequency: Some(frequency),
          start,
          end,
          added_by: None,
        })
        .await?;
      print_medication(&med);
    }
    MedsAction::Update { id, name, dosage, frequency, start, end } => {
      let med = session
        .update_medication(id, &MedicationPatch {
          name,
          dosage,
          frequency,
          start,
          end,
          added_by: None,
        })
        .await?;
      print_medication(&med);
    }
    MedsAction::Delete { id } => {
      session.delete_medication(id).await?;
      println!("Medication deleted");
    }
  }
  Ok(())
}

fn print_reminder(r: &Reminder) {
  println!(
    "{}  {:<20} {:<10} {:<10} {}",
    r.id,
    r.medicine_name,
    r.time,
    r.frequency,
    if r.enabled { "on" } else { "off" }
  );
}

async fn reminders(session: &Session, action: Option<RemindersAction>) -> Result<()> {
  let toggle = |enabled| ReminderPatch { enabled: Some(enabled), ..ReminderPatch::default() };
  match action {
    None => {
      for r in session.api().list_reminders().await? {
        print_reminder(&r);
      }
    }
    Some(RemindersAction::Add { med, time, frequency }) => {
      let r = session
        .add_reminder(&NewReminder {
          med_id: med,
          medicine_name: None,
          time,
          frequency,
          enabled: true,
        })
        .await?;
      print_reminder(&r);
    }
    Some(RemindersAction::Enable { id }) => {
      print_reminder(&session.update_reminder(id, &toggle(true)).await?);
    }
    Some(RemindersAction::Disable { id }) => {
      print_reminder(&session.update_reminder(id, &toggle(false)).await?);
    }
    Some(RemindersAction::Delete { id }) => {
      session.delete_reminder(id).await?;
      println!("Reminder deleted");
    }
  }
  Ok(())
}

async fn adherence(session: &Session, action: Option<AdherenceAction>) -> Result<()> {
  let date = match action {
    None => None,
    Some(AdherenceAction::Show { date }) => date,
    Some(AdherenceAction::Mark { med, time, date, missed, set }) => {
      let new = NewAdherence { med_id: med, date, time, taken: !missed };
      let record = if set {
        session.set_adherence(&new).await?
      } else {
        session.record_adherence(&new).await?
      };
      println!(
        "{} {} {}",
        record.date,
        record.time,
        if record.taken { "taken" } else { "missed" }
      );
      Some(record.date)
    }
  };

  let day = session.adherence(date).await?;
  for r in &day.records {
    println!("  {}  {:<10} {}", r.med_id, r.time, if r.taken { "taken" } else { "missed" });
  }
  println!(
    "{}: {}/{} taken ({}%)",
    day.summary.date, day.summary.taken, day.summary.total, day.summary.percentage
  );
  Ok(())
}

async fn emergency(session: &Session, action: EmergencyAction) -> Result<()> {
  match action {
    EmergencyAction::Generate => {
      signed_in(session).await?;
      let issued = session.generate_emergency_card().await?;
      let code = QrCode::new(issued.url.as_bytes()).context("encoding QR code")?;
      let qr = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();
      println!("{qr}");
      println!("{}", issued.url);
      println!(
        "Valid until {}",
        issued.card.expires_at.format("%d %b %Y %H:%M UTC")
      );
    }
    EmergencyAction::View { id } => {
      let view = session.api().view_emergency_card(&id).await?;
      let card = view.card;
      if view.expired {
        println!("This emergency card has expired.");
      }
      println!("Patient:    {}", card.patient.name);
      if let Some(age) = card.patient.age {
        println!("Age:        {age}");
      }
      println!("Conditions: {}", card.patient.conditions.join(", "));
      println!("Allergies:  {}", card.patient.allergies.join(", "));
      println!("Medications:");
      for med in &card.medications {
        println!("  {} {} ({})", med.name, med.dosage, med.frequency);
      }
      println!("Generated {}", card.generated_at.format("%d %b %Y %H:%M UTC"));
    }
  }
  Ok(())
}

async fn watch(session: &Session) -> Result<()> {
  let state = Arc::new(RwLock::new(CareState::default()));
  let follower = tokio::spawn(sync::follow(
    session.api().clone(),
    session.subscribe(),
    Arc::clone(&state),
  ));

  let mut seen = CareState::default();
  let mut tick = tokio::time::interval(Duration::from_millis(500));
  loop {
    tokio::select! {
      _ = tick.tick() => {
        let now = state.read().await.clone();
        if now != seen {
          print_state(&now);
          seen = now;
        }
      }
      result = tokio::signal::ctrl_c() => {
        result.context("waiting for Ctrl+C")?;
        break;
      }
    }
  }
  follower.abort();
  Ok(())
}

fn print_state(state: &CareState) {
  println!("── {} ──", Utc::now().format("%H:%M:%S"));
  println!(
    "{}: {} medication(s), {} reminder(s)",
    if state.profile.name.is_empty() { "(no name)" } else { state.profile.name.as_str() },
    state.medications.len(),
    state.reminders.len()
  );
  for med in &state.medications {
    print_medication(med);
  }
  for line in state.history() {
    println!("  {line}");
  }
}
