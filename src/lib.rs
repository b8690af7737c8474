//! Agentstats — stats ingestion and leaderboard aggregation engine.
//!
//! Parses free-text game-statistics exports into canonical records, stores
//! them with idempotency guarantees, and serves ranked leaderboards and
//! progress-over-time reports computed from that history.

pub mod catalog;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod parser;
pub mod progress;
pub mod rank;
pub mod service;
pub mod state;
pub mod types;
