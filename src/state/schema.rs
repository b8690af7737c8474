//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the stats database.
///
/// The UNIQUE constraint on (agent_id, submission_date, submission_time) is
/// the authoritative idempotency guard; application-level checks are only an
/// optimization in front of it.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Platform accounts (one per external identifier, first-seen wins)
CREATE TABLE IF NOT EXISTS accounts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id  TEXT NOT NULL UNIQUE,
    display_name TEXT,
    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Player agents; the name is the identity key
CREATE TABLE IF NOT EXISTS agents (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id  INTEGER NOT NULL REFERENCES accounts(id),
    name        TEXT NOT NULL UNIQUE,
    faction     TEXT NOT NULL CHECK (faction IN ('Enlightened', 'Resistance')),
    level       INTEGER CHECK (level BETWEEN 1 AND 16),
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per accepted stats submission
CREATE TABLE IF NOT EXISTS submissions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id        INTEGER NOT NULL REFERENCES agents(id),
    submission_date TEXT NOT NULL,
    submission_time TEXT NOT NULL,
    source_format   TEXT NOT NULL,
    field_count     INTEGER NOT NULL DEFAULT 0,
    level           INTEGER,
    lifetime_ap     INTEGER,
    processed_at    TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (agent_id, submission_date, submission_time)
);

-- One row per stat present in a submission
CREATE TABLE IF NOT EXISTS field_values (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    stat_idx      INTEGER NOT NULL CHECK (stat_idx >= 0),
    stat_name     TEXT NOT NULL,
    value_num     INTEGER,
    value_text    TEXT,
    kind          TEXT NOT NULL CHECK (kind IN ('numeric', 'text')),
    UNIQUE (submission_id, stat_idx)
);

-- Append-only time series for tracked stats; first value of a day wins
CREATE TABLE IF NOT EXISTS progress_snapshots (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id      INTEGER NOT NULL REFERENCES agents(id),
    snapshot_date TEXT NOT NULL,
    stat_idx      INTEGER NOT NULL,
    value         INTEGER NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (agent_id, snapshot_date, stat_idx)
);

-- Faction transitions, written when a submission disagrees with the stored
-- faction
CREATE TABLE IF NOT EXISTS faction_changes (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id           INTEGER NOT NULL REFERENCES agents(id),
    old_faction        TEXT NOT NULL CHECK (old_faction IN ('Enlightened', 'Resistance')),
    new_faction        TEXT NOT NULL CHECK (new_faction IN ('Enlightened', 'Resistance')),
    changed_at         TEXT NOT NULL,
    submissions_before INTEGER NOT NULL DEFAULT 0
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_agents_faction ON agents(faction);
CREATE INDEX IF NOT EXISTS idx_submissions_agent_date ON submissions(agent_id, submission_date);
CREATE INDEX IF NOT EXISTS idx_submissions_date ON submissions(submission_date);
CREATE INDEX IF NOT EXISTS idx_field_values_submission ON field_values(submission_id, stat_idx);
CREATE INDEX IF NOT EXISTS idx_field_values_stat ON field_values(stat_idx);
CREATE INDEX IF NOT EXISTS idx_snapshots_agent_date ON progress_snapshots(agent_id, snapshot_date);
CREATE INDEX IF NOT EXISTS idx_snapshots_stat_date ON progress_snapshots(stat_idx, snapshot_date);
CREATE INDEX IF NOT EXISTS idx_faction_changes_agent ON faction_changes(agent_id, changed_at);
"#;
