pub mod database;
pub mod schema;

pub use database::{AgentRow, AgentSnapshotRow, Database, RankSourceRow, SnapshotRow};
