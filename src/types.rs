//! Shared types used across the stats engine.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Faction
// ---------------------------------------------------------------------------

/// One of the two mutually exclusive team affiliations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    Enlightened,
    Resistance,
}

impl Faction {
    /// Strict parse of the on-the-wire literal (case-sensitive).
    pub fn parse_literal(s: &str) -> Option<Self> {
        match s {
            "Enlightened" => Some(Self::Enlightened),
            "Resistance" => Some(Self::Resistance),
            _ => None,
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enlightened => write!(f, "Enlightened"),
            Self::Resistance => write!(f, "Resistance"),
        }
    }
}

impl FromStr for Faction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_literal(s).ok_or_else(|| format!("invalid faction '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Leaderboard period
// ---------------------------------------------------------------------------

/// Recency window selecting which submissions count toward a leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Every submission ever recorded.
    #[value(name = "all")]
    AllTime,
    /// Submissions dated within the last 30 days.
    Monthly,
    /// Submissions dated within the last 7 days.
    Weekly,
    /// Submissions dated today.
    Daily,
}

impl Period {
    /// Inclusive (start, end) date bounds relative to `today`; None means
    /// unbounded on that side.
    pub fn date_bounds(self, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self {
            Self::AllTime => (None, None),
            Self::Monthly => (Some(today - chrono::Duration::days(30)), None),
            Self::Weekly => (Some(today - chrono::Duration::days(7)), None),
            Self::Daily => (Some(today), Some(today)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllTime => write!(f, "all_time"),
            Self::Monthly => write!(f, "monthly"),
            Self::Weekly => write!(f, "weekly"),
            Self::Daily => write!(f, "daily"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsed record
// ---------------------------------------------------------------------------

/// Which wire shape a submission arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Tab-separated columns.
    Delimited,
    /// Whitespace-only separation, multi-token fields reconstructed by
    /// anchoring.
    Spaced,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delimited => write!(f, "delimited"),
            Self::Spaced => write!(f, "spaced"),
        }
    }
}

/// A single typed stat value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Num(i64),
    Text(String),
}

impl TypedValue {
    pub fn as_num(&self) -> Option<i64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Num(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

/// One parsed stat field, keyed by catalog (or dynamic) index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedField {
    pub name: String,
    pub value: TypedValue,
}

/// Advisory issue attached to an otherwise accepted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Level does not sit inside the expected lifetime-AP band.
    LevelProgression,
    /// Current AP unusually low relative to lifetime AP.
    LowCurrentAp,
    /// Submission date far in the past.
    OldDate,
    /// Dependent stats in an implausible ratio.
    UnusualRatio,
    /// Header resolved to no catalog entry; stored under a dynamic index.
    UnknownStat,
}

/// Canonical output of the parser: promoted header fields plus the per-stat
/// field map. `fields` holds only stat fields (level and up), so its size
/// equals the number of stored field rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub agent_name: String,
    pub faction: Faction,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub level: Option<i64>,
    pub fields: BTreeMap<u16, ParsedField>,
    pub warnings: Vec<Warning>,
    pub format: WireFormat,
}

impl ParsedRecord {
    /// Numeric value of a stat field, if present and numeric.
    pub fn num(&self, idx: u16) -> Option<i64> {
        self.fields.get(&idx).and_then(|f| f.value.as_num())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

// ---------------------------------------------------------------------------
// Submission results
// ---------------------------------------------------------------------------

/// Platform-side metadata about the submitting account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountMeta {
    pub display_name: Option<String>,
}

/// Outcome of a submission attempt. `accepted: false` with `duplicate: true`
/// is the normal idempotent-replay outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub accepted: bool,
    pub duplicate: bool,
    pub submission_id: Option<i64>,
    pub agent_name: String,
    pub faction: Faction,
    pub faction_changed: bool,
    pub new_agent: bool,
    pub field_count: usize,
    pub warnings: Vec<Warning>,
}

// ---------------------------------------------------------------------------
// Leaderboards
// ---------------------------------------------------------------------------

/// One ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: u32,
    pub agent_name: String,
    pub faction: Faction,
    pub level: Option<i64>,
    pub value: i64,
    pub submission_date: NaiveDate,
    /// Highest achievement threshold the value clears.
    pub badge_threshold: Option<i64>,
    /// Tier name for stats with a five-step badge track.
    pub badge_tier: Option<String>,
}

/// A complete computed ranking for one (stat, period, faction) combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedList {
    pub stat_idx: u16,
    pub stat_name: String,
    pub period: Period,
    pub faction: Option<Faction>,
    pub entries: Vec<RankedEntry>,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub generated_at: DateTime<Utc>,
}

impl RankedList {
    /// Copy with entries truncated to `limit`; min/max still describe the
    /// full population.
    pub fn truncated(&self, limit: usize) -> Self {
        let mut out = self.clone();
        out.entries.truncate(limit);
        out
    }
}

/// An agent's position inside a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankOf {
    pub rank: u32,
    pub value: i64,
    pub population: usize,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Delta for one stat over a lookback window (requires >= 2 snapshots).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatProgress {
    pub stat_idx: u16,
    pub stat_name: String,
    pub first_value: i64,
    pub last_value: i64,
    pub delta: i64,
    pub rate_per_day: f64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub snapshot_count: usize,
}

/// Per-agent progress report over a lookback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub agent_name: String,
    pub faction: Faction,
    pub level: Option<i64>,
    pub lookback_days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Ordered by delta, largest first.
    pub stats: Vec<StatProgress>,
    pub snapshot_count: usize,
}

/// One row of a progress leaderboard (ranked by delta, not absolute value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub rank: u32,
    pub agent_name: String,
    pub faction: Faction,
    pub delta: i64,
    pub first_value: i64,
    pub last_value: i64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub rate_per_day: f64,
}

/// One row of a combined multi-stat progress leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStatEntry {
    pub rank: u32,
    pub agent_name: String,
    pub faction: Faction,
    /// Sum of per-stat deltas, each normalized by the population maximum for
    /// that stat.
    pub score: f64,
    pub improving_stats: usize,
    pub total_stats: usize,
    pub deltas: BTreeMap<u16, i64>,
}

// ---------------------------------------------------------------------------
// Store views
// ---------------------------------------------------------------------------

/// Summary row for an agent's submission history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub submission_id: i64,
    pub submission_date: NaiveDate,
    pub submission_time: NaiveTime,
    pub level: Option<i64>,
    pub lifetime_ap: Option<i64>,
    pub field_count: usize,
    pub processed_at: DateTime<Utc>,
}

/// A stored field row as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRow {
    pub stat_idx: u16,
    pub stat_name: String,
    pub value: TypedValue,
}

/// An agent's most recent submission with its full field set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLatest {
    pub agent_name: String,
    pub faction: Faction,
    pub level: Option<i64>,
    pub submission: SubmissionSummary,
    pub fields: Vec<FieldRow>,
}

/// Whole-store counters for the status command and maintenance logging.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub accounts: u64,
    pub agents: u64,
    pub submissions: u64,
    pub field_values: u64,
    pub snapshots: u64,
    pub enlightened: u64,
    pub resistance: u64,
}
