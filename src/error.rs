//! Typed error taxonomy for the ingestion and query paths.
//!
//! Duplicate submissions are deliberately NOT errors — they are a normal
//! outcome reported through `SubmissionResult`.

use thiserror::Error;

/// Failures turning raw pasted text into a `ParsedRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The text does not structurally look like an agent stats export.
    #[error("input does not look like an agent stats export")]
    NotStatsFormat,

    /// A recognizable export, but for a period other than the lifetime
    /// aggregate.
    #[error("only ALL TIME stats are accepted, got '{0}'")]
    WrongPeriod(String),

    /// Faction literal is not one of the two recognized values.
    #[error("invalid faction '{0}', expected 'Enlightened' or 'Resistance'")]
    InvalidFaction(String),

    /// A numeric stat failed to parse as a non-negative integer.
    #[error("stat {stat_idx} ('{name}') has invalid numeric value '{value}'")]
    InvalidNumeric { stat_idx: u16, name: String, value: String },

    /// A required header field is absent or malformed.
    #[error("missing or malformed required field: {0}")]
    MissingRequiredField(&'static str),

    /// A blocking cross-field business rule was violated.
    #[error("{0}")]
    RuleViolation(String),
}

/// Failures persisting an accepted record.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The storage transaction failed; nothing was written.
    #[error("submission transaction failed: {0}")]
    TransactionFailure(#[from] rusqlite::Error),
}

/// Failures on the read side (leaderboards, progress).
#[derive(Debug, Error)]
pub enum QueryError {
    /// Stat index not present in the catalog.
    #[error("unknown stat index {0}")]
    UnknownStat(u16),

    /// No agent with that name has ever submitted.
    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Umbrella error at the service boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Query(#[from] QueryError),
}
