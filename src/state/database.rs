//! SQLite database wrapper with WAL mode and migration support.
//!
//! All writes for one submission happen inside a single transaction; the
//! UNIQUE constraint on (agent_id, submission_date, submission_time) is the
//! authoritative duplicate guard, and a constraint violation at insert time
//! is reported as the normal duplicate outcome.

use crate::catalog::{IDX_LIFETIME_AP, TRACKED_STATS};
use crate::error::SubmissionError;
use crate::state::schema;
use crate::types::{
    AccountMeta, AgentLatest, Faction, FieldRow, ParsedRecord, StoreStats, SubmissionResult,
    SubmissionSummary, TypedValue,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use tracing::{info, warn};

/// The stats database.
pub struct Database {
    conn: Connection,
}

/// A stored agent row.
#[derive(Debug, Clone)]
pub struct AgentRow {
    pub id: i64,
    pub name: String,
    pub faction: Faction,
    pub level: Option<i64>,
    pub active: bool,
}

/// Source row for the ranking engine: one agent's latest eligible value.
#[derive(Debug, Clone)]
pub struct RankSourceRow {
    pub agent_name: String,
    pub faction: Faction,
    pub level: Option<i64>,
    pub value: i64,
    pub submission_date: NaiveDate,
}

/// One snapshot row for a single agent.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRow {
    pub stat_idx: u16,
    pub snapshot_date: NaiveDate,
    pub value: i64,
}

/// One snapshot row joined with its agent, for population-wide progress.
#[derive(Debug, Clone)]
pub struct AgentSnapshotRow {
    pub agent_id: i64,
    pub agent_name: String,
    pub faction: Faction,
    pub stat_idx: u16,
    pub snapshot_date: NaiveDate,
    pub value: i64,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL for concurrent readers; foreign keys for the cascade delete
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> anyhow::Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version < schema::SCHEMA_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Submission path
    // -----------------------------------------------------------------------

    /// Persist a parsed record: resolve account and agent, detect faction
    /// changes, insert the submission with its field values and tracked-stat
    /// snapshots. All-or-nothing; duplicates are a normal result, not an
    /// error.
    pub fn submit(
        &mut self,
        account_external_id: &str,
        meta: &AccountMeta,
        record: &ParsedRecord,
    ) -> Result<SubmissionResult, SubmissionError> {
        let tx = self.conn.transaction()?;

        let account_id = account_get_or_create(&tx, account_external_id, meta)?;
        let existing = agent_row_by_name(&tx, &record.agent_name)?;

        // Duplicate pre-check; the UNIQUE constraint below remains the
        // authoritative guard against concurrent duplicates.
        if let Some(agent) = &existing {
            if submission_exists(&tx, agent.id, record)? {
                warn!(
                    agent = %record.agent_name,
                    date = %record.date,
                    time = %record.time,
                    "duplicate submission ignored"
                );
                return Ok(duplicate_result(record));
            }
        }

        let (agent_id, new_agent, faction_changed) = match existing {
            None => {
                tx.execute(
                    "INSERT INTO agents (account_id, name, faction, level) VALUES (?1, ?2, ?3, ?4)",
                    params![account_id, record.agent_name, record.faction.to_string(), record.level],
                )?;
                let id = tx.last_insert_rowid();
                info!(agent = %record.agent_name, faction = %record.faction, "created agent");
                (id, true, false)
            }
            Some(agent) => {
                let mut changed = false;
                if agent.faction != record.faction {
                    let before = submission_count(&tx, agent.id)?;
                    tx.execute(
                        "INSERT INTO faction_changes
                             (agent_id, old_faction, new_faction, changed_at, submissions_before)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            agent.id,
                            agent.faction.to_string(),
                            record.faction.to_string(),
                            Utc::now(),
                            before,
                        ],
                    )?;
                    tx.execute(
                        "UPDATE agents SET faction = ?1, updated_at = datetime('now') WHERE id = ?2",
                        params![record.faction.to_string(), agent.id],
                    )?;
                    changed = true;
                    warn!(
                        agent = %record.agent_name,
                        old = %agent.faction,
                        new = %record.faction,
                        "agent changed faction"
                    );
                }
                if record.level.is_some() && agent.level != record.level {
                    tx.execute(
                        "UPDATE agents SET level = ?1, updated_at = datetime('now') WHERE id = ?2",
                        params![record.level, agent.id],
                    )?;
                }
                (agent.id, false, changed)
            }
        };

        let insert = tx.execute(
            "INSERT INTO submissions
                 (agent_id, submission_date, submission_time, source_format,
                  field_count, level, lifetime_ap, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                agent_id,
                record.date,
                record.time,
                record.format.to_string(),
                record.field_count() as i64,
                record.level,
                record.num(IDX_LIFETIME_AP),
                Utc::now(),
            ],
        );
        match insert {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                warn!(agent = %record.agent_name, "duplicate submission lost the insert race");
                return Ok(duplicate_result(record));
            }
            Err(err) => return Err(err.into()),
        }
        let submission_id = tx.last_insert_rowid();

        for (idx, field) in &record.fields {
            let (value_num, value_text, kind) = match &field.value {
                TypedValue::Num(n) => (Some(*n), None, "numeric"),
                TypedValue::Text(s) => (None, Some(s.as_str()), "text"),
            };
            tx.execute(
                "INSERT INTO field_values
                     (submission_id, stat_idx, stat_name, value_num, value_text, kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![submission_id, idx, field.name, value_num, value_text, kind],
            )?;
        }

        // Snapshots are append-only per (agent, date, stat); a later
        // same-day submission keeps the day's first value.
        for idx in TRACKED_STATS {
            if let Some(value) = record.num(idx) {
                tx.execute(
                    "INSERT OR IGNORE INTO progress_snapshots
                         (agent_id, snapshot_date, stat_idx, value)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![agent_id, record.date, idx, value],
                )?;
            }
        }

        tx.commit()?;

        info!(
            agent = %record.agent_name,
            submission_id,
            fields = record.field_count(),
            "stored submission"
        );

        Ok(SubmissionResult {
            accepted: true,
            duplicate: false,
            submission_id: Some(submission_id),
            agent_name: record.agent_name.clone(),
            faction: record.faction,
            faction_changed,
            new_agent,
            field_count: record.field_count(),
            warnings: record.warnings.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Look an agent up by its (case-preserving) name.
    pub fn agent_by_name(&self, name: &str) -> rusqlite::Result<Option<AgentRow>> {
        agent_row_by_name(&self.conn, name)
    }

    /// Flip the soft-deactivation flag. Returns false if the agent is
    /// unknown. Deactivated agents drop out of rankings but keep their
    /// history.
    pub fn set_agent_active(&self, name: &str, active: bool) -> rusqlite::Result<bool> {
        let updated = self.conn.execute(
            "UPDATE agents SET active = ?1, updated_at = datetime('now') WHERE name = ?2",
            params![active as i64, name],
        )?;
        Ok(updated > 0)
    }

    /// Faction transitions recorded for an agent, oldest first.
    pub fn faction_changes(&self, agent_id: i64) -> rusqlite::Result<Vec<(Faction, Faction, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT old_faction, new_faction, submissions_before
             FROM faction_changes WHERE agent_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            let old: String = row.get(0)?;
            let new: String = row.get(1)?;
            Ok((
                parse_faction_column(0, &old)?,
                parse_faction_column(1, &new)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut changes = Vec::new();
        for row in rows {
            changes.push(row?);
        }
        Ok(changes)
    }

    // -----------------------------------------------------------------------
    // Ranking source
    // -----------------------------------------------------------------------

    /// Latest eligible value per active agent for one stat, restricted to
    /// submissions dated inside [start, end] (either side optional).
    pub fn rank_rows(
        &self,
        stat_idx: u16,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        faction: Option<Faction>,
    ) -> rusqlite::Result<Vec<RankSourceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.name, a.faction, a.level, f.value_num, s.submission_date
             FROM submissions s
             JOIN agents a ON a.id = s.agent_id
             JOIN field_values f ON f.submission_id = s.id AND f.stat_idx = ?1
             JOIN (
                 SELECT agent_id, MAX(submission_date || 'T' || submission_time) AS latest
                 FROM submissions
                 WHERE (?2 IS NULL OR submission_date >= ?2)
                   AND (?3 IS NULL OR submission_date <= ?3)
                 GROUP BY agent_id
             ) ls ON ls.agent_id = s.agent_id
                 AND (s.submission_date || 'T' || s.submission_time) = ls.latest
             WHERE a.active = 1
               AND f.value_num IS NOT NULL
               AND (?4 IS NULL OR a.faction = ?4)",
        )?;

        let rows = stmt.query_map(
            params![stat_idx, start, end, faction.map(|f| f.to_string())],
            |row| {
                let faction_str: String = row.get(1)?;
                Ok(RankSourceRow {
                    agent_name: row.get(0)?,
                    faction: parse_faction_column(1, &faction_str)?,
                    level: row.get(2)?,
                    value: row.get(3)?,
                    submission_date: row.get(4)?,
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// All snapshots for one agent inside the window, ordered by stat then
    /// date.
    pub fn snapshots_for_agent(
        &self,
        agent_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> rusqlite::Result<Vec<SnapshotRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT stat_idx, snapshot_date, value
             FROM progress_snapshots
             WHERE agent_id = ?1 AND snapshot_date >= ?2 AND snapshot_date <= ?3
             ORDER BY stat_idx, snapshot_date",
        )?;
        let rows = stmt.query_map(params![agent_id, start, end], |row| {
            Ok(SnapshotRow {
                stat_idx: row.get(0)?,
                snapshot_date: row.get(1)?,
                value: row.get(2)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Snapshots for a set of stats across all active agents inside the
    /// window, ordered by agent, stat, date.
    pub fn snapshots_for_stats(
        &self,
        stat_idxs: &[u16],
        start: NaiveDate,
        end: NaiveDate,
        faction: Option<Faction>,
    ) -> rusqlite::Result<Vec<AgentSnapshotRow>> {
        if stat_idxs.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; stat_idxs.len()].join(", ");
        let sql = format!(
            "SELECT p.agent_id, a.name, a.faction, p.stat_idx, p.snapshot_date, p.value
             FROM progress_snapshots p
             JOIN agents a ON a.id = p.agent_id
             WHERE a.active = 1
               AND p.snapshot_date >= ? AND p.snapshot_date <= ?
               AND (? IS NULL OR a.faction = ?)
               AND p.stat_idx IN ({placeholders})
             ORDER BY p.agent_id, p.stat_idx, p.snapshot_date"
        );

        let faction_param = match faction {
            Some(f) => rusqlite::types::Value::Text(f.to_string()),
            None => rusqlite::types::Value::Null,
        };
        let mut params_vec: Vec<rusqlite::types::Value> = vec![
            rusqlite::types::Value::Text(start.to_string()),
            rusqlite::types::Value::Text(end.to_string()),
            faction_param.clone(),
            faction_param,
        ];
        for idx in stat_idxs {
            params_vec.push(rusqlite::types::Value::Integer(i64::from(*idx)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec),
            |row| {
                let faction_str: String = row.get(2)?;
                Ok(AgentSnapshotRow {
                    agent_id: row.get(0)?,
                    agent_name: row.get(1)?,
                    faction: parse_faction_column(2, &faction_str)?,
                    stat_idx: row.get(3)?,
                    snapshot_date: row.get(4)?,
                    value: row.get(5)?,
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // History and status
    // -----------------------------------------------------------------------

    /// Recent submissions for an agent, newest first. None when the agent is
    /// unknown.
    pub fn agent_history(
        &self,
        name: &str,
        limit: usize,
    ) -> rusqlite::Result<Option<Vec<SubmissionSummary>>> {
        let Some(agent) = agent_row_by_name(&self.conn, name)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, submission_date, submission_time, level, lifetime_ap,
                    field_count, processed_at
             FROM submissions
             WHERE agent_id = ?1
             ORDER BY submission_date DESC, submission_time DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![agent.id, limit as i64], |row| {
            Ok(SubmissionSummary {
                submission_id: row.get(0)?,
                submission_date: row.get(1)?,
                submission_time: row.get(2)?,
                level: row.get(3)?,
                lifetime_ap: row.get(4)?,
                field_count: row.get::<_, i64>(5)? as usize,
                processed_at: row.get(6)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(Some(out))
    }

    /// The agent's newest submission with its full field set. None when the
    /// agent is unknown or has no submissions.
    pub fn agent_latest(&self, name: &str) -> rusqlite::Result<Option<AgentLatest>> {
        let Some(agent) = agent_row_by_name(&self.conn, name)? else {
            return Ok(None);
        };

        let summary = self
            .conn
            .query_row(
                "SELECT id, submission_date, submission_time, level, lifetime_ap,
                        field_count, processed_at
                 FROM submissions
                 WHERE agent_id = ?1
                 ORDER BY submission_date DESC, submission_time DESC
                 LIMIT 1",
                params![agent.id],
                |row| {
                    Ok(SubmissionSummary {
                        submission_id: row.get(0)?,
                        submission_date: row.get(1)?,
                        submission_time: row.get(2)?,
                        level: row.get(3)?,
                        lifetime_ap: row.get(4)?,
                        field_count: row.get::<_, i64>(5)? as usize,
                        processed_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        let Some(summary) = summary else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT stat_idx, stat_name, value_num, value_text, kind
             FROM field_values WHERE submission_id = ?1 ORDER BY stat_idx",
        )?;
        let rows = stmt.query_map(params![summary.submission_id], |row| {
            let value_num: Option<i64> = row.get(2)?;
            let value_text: Option<String> = row.get(3)?;
            let value = match value_num {
                Some(n) => TypedValue::Num(n),
                None => TypedValue::Text(value_text.unwrap_or_default()),
            };
            Ok(FieldRow {
                stat_idx: row.get(0)?,
                stat_name: row.get(1)?,
                value,
            })
        })?;

        let mut fields = Vec::new();
        for row in rows {
            fields.push(row?);
        }

        Ok(Some(AgentLatest {
            agent_name: agent.name,
            faction: agent.faction,
            level: agent.level,
            submission: summary,
            fields,
        }))
    }

    /// Whole-store counters.
    pub fn store_stats(&self) -> rusqlite::Result<StoreStats> {
        let count = |sql: &str| -> rusqlite::Result<u64> {
            self.conn.query_row(sql, [], |row| row.get(0))
        };

        Ok(StoreStats {
            accounts: count("SELECT COUNT(*) FROM accounts")?,
            agents: count("SELECT COUNT(*) FROM agents WHERE active = 1")?,
            submissions: count("SELECT COUNT(*) FROM submissions")?,
            field_values: count("SELECT COUNT(*) FROM field_values")?,
            snapshots: count("SELECT COUNT(*) FROM progress_snapshots")?,
            enlightened: count(
                "SELECT COUNT(*) FROM agents WHERE active = 1 AND faction = 'Enlightened'",
            )?,
            resistance: count(
                "SELECT COUNT(*) FROM agents WHERE active = 1 AND faction = 'Resistance'",
            )?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn account_get_or_create(
    tx: &Transaction<'_>,
    external_id: &str,
    meta: &AccountMeta,
) -> rusqlite::Result<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM accounts WHERE external_id = ?1",
            params![external_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    tx.execute(
        "INSERT INTO accounts (external_id, display_name) VALUES (?1, ?2)",
        params![external_id, meta.display_name],
    )?;
    info!(external_id, "created account");
    Ok(tx.last_insert_rowid())
}

fn agent_row_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<AgentRow>> {
    conn.query_row(
        "SELECT id, name, faction, level, active FROM agents WHERE name = ?1",
        params![name],
        |row| {
            let faction_str: String = row.get(2)?;
            Ok(AgentRow {
                id: row.get(0)?,
                name: row.get(1)?,
                faction: parse_faction_column(2, &faction_str)?,
                level: row.get(3)?,
                active: row.get::<_, i64>(4)? != 0,
            })
        },
    )
    .optional()
}

fn submission_exists(
    tx: &Transaction<'_>,
    agent_id: i64,
    record: &ParsedRecord,
) -> rusqlite::Result<bool> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT id FROM submissions
             WHERE agent_id = ?1 AND submission_date = ?2 AND submission_time = ?3",
            params![agent_id, record.date, record.time],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn submission_count(tx: &Transaction<'_>, agent_id: i64) -> rusqlite::Result<i64> {
    tx.query_row(
        "SELECT COUNT(*) FROM submissions WHERE agent_id = ?1",
        params![agent_id],
        |row| row.get(0),
    )
}

fn duplicate_result(record: &ParsedRecord) -> SubmissionResult {
    SubmissionResult {
        accepted: false,
        duplicate: true,
        submission_id: None,
        agent_name: record.agent_name.clone(),
        faction: record.faction,
        faction_changed: false,
        new_agent: false,
        field_count: record.field_count(),
        warnings: record.warnings.clone(),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_faction_column(column: usize, raw: &str) -> rusqlite::Result<Faction> {
    Faction::parse_literal(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("invalid faction '{raw}'").into(),
        )
    })
}
