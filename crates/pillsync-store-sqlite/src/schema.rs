//! SQL schema for the PillSync SQLite store.
//!
//! There are deliberately no foreign keys between collections: `med_id`
//! columns may reference medications that have since been deleted.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS users (
    uid          TEXT PRIMARY KEY,
    email        TEXT NOT NULL,
    name         TEXT NOT NULL,
    role         TEXT NOT NULL,   -- 'patient' | 'caregiver' | 'doctor'
    profile_json TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medications (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    name       TEXT NOT NULL,
    dosage     TEXT NOT NULL,
    frequency  TEXT NOT NULL,
    start      TEXT NOT NULL,
    end_date   TEXT,
    added_by   TEXT NOT NULL,
    updated    TEXT NOT NULL,     -- display string
    created_at TEXT NOT NULL,     -- RFC 3339, fixed nanosecond precision
    updated_at TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS dosage_changes (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    med_id      TEXT NOT NULL,
    prev_dosage TEXT NOT NULL,
    new_dosage  TEXT NOT NULL,
    reason      TEXT NOT NULL,
    changed_by  TEXT NOT NULL,
    changed_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reminders (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    med_id        TEXT NOT NULL,
    medicine_name TEXT NOT NULL,
    time_of_day   TEXT NOT NULL,
    frequency     TEXT NOT NULL,
    enabled       INTEGER NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS adherence (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    med_id      TEXT NOT NULL,
    day         TEXT NOT NULL,    -- YYYY-MM-DD
    time_of_day TEXT NOT NULL,
    taken       INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

-- Immutable snapshots, readable by id without authentication.
CREATE TABLE IF NOT EXISTS emergency_cards (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    patient_json     TEXT NOT NULL,
    medications_json TEXT NOT NULL,
    generated_at     TEXT NOT NULL,
    expires_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    uid            TEXT PRIMARY KEY,
    email          TEXT NOT NULL UNIQUE,
    password_hash  TEXT NOT NULL,
    email_verified INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
    token_hash TEXT PRIMARY KEY,  -- hex SHA-256 of the bearer string
    uid        TEXT NOT NULL,
    issued_at  TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS medications_user_idx    ON medications(user_id);
CREATE INDEX IF NOT EXISTS dosage_changes_user_idx ON dosage_changes(user_id);
CREATE INDEX IF NOT EXISTS reminders_user_idx      ON reminders(user_id);
CREATE INDEX IF NOT EXISTS adherence_user_day_idx  ON adherence(user_id, day);

PRAGMA user_version = 1;
";
