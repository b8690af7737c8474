//! The stats service: the one entry point the front-end calls.
//!
//! Sequences parsing and persistence on the write side, and wraps the
//! ranking engine's cache policy on the read side. Clone-cheap and safe to
//! share across concurrent tasks; the database handle lives behind an async
//! mutex and the cache behind its own lock.

use crate::error::{Error, QueryError};
use crate::parser;
use crate::progress;
use crate::rank::{self, CacheKey, RankCache};
use crate::state::Database;
use crate::types::{
    AccountMeta, AgentLatest, Faction, MultiStatEntry, Period, ProgressEntry, ProgressReport,
    RankOf, RankedList, StoreStats, SubmissionResult, SubmissionSummary,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to the ingestion and query engines.
#[derive(Clone)]
pub struct StatsService {
    db: Arc<Mutex<Database>>,
    cache: Arc<RankCache>,
}

impl StatsService {
    pub fn new(db: Database, cache: RankCache) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            cache: Arc::new(cache),
        }
    }

    /// The injected leaderboard cache (tests supply isolated instances).
    pub fn cache(&self) -> &RankCache {
        &self.cache
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Parse raw pasted text and, if valid, store it. The single ingestion
    /// entry point: parse errors surface to the caller, duplicates come back
    /// as a normal result.
    pub async fn submit_stats_text(
        &self,
        account_external_id: &str,
        raw_text: &str,
        meta: &AccountMeta,
    ) -> Result<SubmissionResult, Error> {
        let record = parser::parse(raw_text)?;

        let result = {
            let mut db = self.db.lock().await;
            db.submit(account_external_id, meta, &record)?
        };

        if result.accepted {
            // Fresh values may reorder any leaderboard they feed.
            for idx in record.fields.keys() {
                self.cache.invalidate_stat(*idx);
            }
        }

        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Read side: rankings (cache-or-compute)
    // -----------------------------------------------------------------------

    /// Top agents for a stat over a period, optionally per faction.
    pub async fn rank(
        &self,
        stat_idx: u16,
        period: Period,
        faction: Option<Faction>,
        limit: usize,
    ) -> Result<RankedList, Error> {
        let full = self.full_ranking(stat_idx, period, faction).await?;
        Ok(full.truncated(limit))
    }

    /// An agent's position inside the full ranking for a stat and period.
    pub async fn rank_of(
        &self,
        agent_name: &str,
        stat_idx: u16,
        period: Period,
    ) -> Result<RankOf, Error> {
        let full = self.full_ranking(stat_idx, period, None).await?;
        rank::find_agent(&full, agent_name)
            .ok_or_else(|| QueryError::AgentNotFound(agent_name.to_string()).into())
    }

    /// Cache-or-compute for the full (untruncated) ranking of a key.
    async fn full_ranking(
        &self,
        stat_idx: u16,
        period: Period,
        faction: Option<Faction>,
    ) -> Result<RankedList, Error> {
        let key = CacheKey { stat_idx, period, faction };
        let now = Utc::now();

        if let Some(hit) = self.cache.get(&key, now) {
            return Ok(hit);
        }

        // Computing under the db lock keeps concurrent misses for the same
        // key mostly coalesced behind one computation; any overlap is
        // harmless since writes are last-writer-wins.
        let list = {
            let db = self.db.lock().await;
            rank::compute(&db, stat_idx, period, faction, now.date_naive(), now)?
        };
        self.cache.put(key, list.clone(), now);
        Ok(list)
    }

    // -----------------------------------------------------------------------
    // Read side: progress (always computed fresh)
    // -----------------------------------------------------------------------

    pub async fn progress(
        &self,
        agent_name: &str,
        lookback_days: u32,
    ) -> Result<ProgressReport, Error> {
        let db = self.db.lock().await;
        Ok(progress::report(&db, agent_name, lookback_days, Utc::now().date_naive())?)
    }

    pub async fn progress_leaderboard(
        &self,
        stat_idx: u16,
        lookback_days: u32,
        faction: Option<Faction>,
        limit: usize,
    ) -> Result<Vec<ProgressEntry>, Error> {
        let db = self.db.lock().await;
        Ok(progress::leaderboard(
            &db,
            stat_idx,
            lookback_days,
            faction,
            limit,
            Utc::now().date_naive(),
        )?)
    }

    pub async fn multi_stat_progress(
        &self,
        stat_idxs: &[u16],
        lookback_days: u32,
        limit: usize,
    ) -> Result<Vec<MultiStatEntry>, Error> {
        let db = self.db.lock().await;
        Ok(progress::multi_stat(&db, stat_idxs, lookback_days, limit, Utc::now().date_naive())?)
    }

    // -----------------------------------------------------------------------
    // Read side: history and status
    // -----------------------------------------------------------------------

    pub async fn agent_history(
        &self,
        agent_name: &str,
        limit: usize,
    ) -> Result<Vec<SubmissionSummary>, Error> {
        let db = self.db.lock().await;
        db.agent_history(agent_name, limit)
            .map_err(QueryError::from)?
            .ok_or_else(|| QueryError::AgentNotFound(agent_name.to_string()).into())
    }

    pub async fn agent_latest(&self, agent_name: &str) -> Result<AgentLatest, Error> {
        let db = self.db.lock().await;
        db.agent_latest(agent_name)
            .map_err(QueryError::from)?
            .ok_or_else(|| QueryError::AgentNotFound(agent_name.to_string()).into())
    }

    pub async fn store_stats(&self) -> Result<StoreStats, Error> {
        let db = self.db.lock().await;
        Ok(db.store_stats().map_err(QueryError::from)?)
    }

    /// Evict expired cache entries; used by the maintenance daemon.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IDX_LIFETIME_AP;
    use crate::error::ParseError;
    use crate::types::RankedEntry;

    fn export(agent: &str, faction: &str, date: &str, time: &str, ap: i64) -> String {
        let header = [
            "Time Span",
            "Agent Name",
            "Agent Faction",
            "Date (yyyy-mm-dd)",
            "Time (hh:mm:ss)",
            "Level",
            "Lifetime AP",
            "Unique Portals Visited",
            "Resonators Deployed",
            "Links Created",
            "Hacks",
        ]
        .join("\t");
        let ap_formatted = format_thousands(ap);
        let values = [
            "ALL TIME".to_string(),
            agent.to_string(),
            faction.to_string(),
            date.to_string(),
            time.to_string(),
            "8".to_string(),
            ap_formatted,
            "500".to_string(),
            "2,000".to_string(),
            "300".to_string(),
            "4,000".to_string(),
        ]
        .join("\t");
        format!("{header}\n{values}")
    }

    fn format_thousands(n: i64) -> String {
        let digits = n.to_string();
        let mut out = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
        out
    }

    fn service() -> StatsService {
        StatsService::new(Database::open_memory().unwrap(), RankCache::new(300))
    }

    fn recent_date(days_ago: i64) -> String {
        (Utc::now().date_naive() - chrono::Duration::days(days_ago))
            .format("%Y-%m-%d")
            .to_string()
    }

    #[tokio::test]
    async fn byte_identical_resubmission_is_a_duplicate() {
        let svc = service();
        let text = export("Alpha", "Enlightened", &recent_date(3), "08:30:12", 1_000_000);

        let first = svc
            .submit_stats_text("acct-1", &text, &AccountMeta::default())
            .await
            .unwrap();
        assert!(first.accepted);

        let second = svc
            .submit_stats_text("acct-1", &text, &AccountMeta::default())
            .await
            .unwrap();
        assert!(!second.accepted);
        assert!(second.duplicate);

        let stats = svc.store_stats().await.unwrap();
        assert_eq!(stats.submissions, 1);
    }

    #[tokio::test]
    async fn stored_field_count_matches_the_parsed_record() {
        let svc = service();
        let text = export("Alpha", "Enlightened", &recent_date(3), "08:30:12", 1_000_000);
        let result = svc
            .submit_stats_text("acct-1", &text, &AccountMeta::default())
            .await
            .unwrap();

        // Level, Lifetime AP, Unique Portals, Resonators, Links, Hacks.
        assert_eq!(result.field_count, 6);
        let stats = svc.store_stats().await.unwrap();
        assert_eq!(stats.field_values, 6);
    }

    #[tokio::test]
    async fn comma_separated_values_come_back_as_integers() {
        let svc = service();
        let text = export("Alpha", "Enlightened", &recent_date(3), "08:30:12", 1_234_567);
        svc.submit_stats_text("acct-1", &text, &AccountMeta::default())
            .await
            .unwrap();

        let list = svc.rank(IDX_LIFETIME_AP, Period::AllTime, None, 10).await.unwrap();
        assert_eq!(list.entries[0].value, 1_234_567);
    }

    #[tokio::test]
    async fn parse_errors_surface_to_the_caller() {
        let svc = service();
        let err = svc
            .submit_stats_text("acct-1", "not a stats export", &AccountMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::NotStatsFormat)));
    }

    #[tokio::test]
    async fn ranking_scenario_top_two_of_three() {
        let svc = service();
        for (agent, ap) in [("Aster", 500), ("Borealis", 900), ("Cinder", 700)] {
            let text = export(agent, "Enlightened", &recent_date(3), "08:30:12", ap);
            svc.submit_stats_text(agent, &text, &AccountMeta::default()).await.unwrap();
        }

        let list = svc.rank(IDX_LIFETIME_AP, Period::AllTime, None, 2).await.unwrap();
        let names: Vec<&str> = list.entries.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Borealis", "Cinder"]);
        assert_eq!(list.entries[0].value, 900);
        assert_eq!(list.entries[1].value, 700);
    }

    #[tokio::test]
    async fn faction_switch_produces_one_change_record() {
        let svc = service();
        let first = export("Turncoat", "Enlightened", &recent_date(5), "08:00:00", 1_000_000);
        let second = export("Turncoat", "Resistance", &recent_date(2), "09:00:00", 1_200_000);

        svc.submit_stats_text("acct-1", &first, &AccountMeta::default()).await.unwrap();
        let result = svc
            .submit_stats_text("acct-1", &second, &AccountMeta::default())
            .await
            .unwrap();
        assert!(result.faction_changed);

        let latest = svc.agent_latest("Turncoat").await.unwrap();
        assert_eq!(latest.faction, Faction::Resistance);
    }

    #[tokio::test]
    async fn rank_serves_the_cached_payload_until_invalidated() {
        let svc = service();
        let text = export("Alpha", "Enlightened", &recent_date(3), "08:30:12", 1_000_000);
        svc.submit_stats_text("acct-1", &text, &AccountMeta::default()).await.unwrap();

        let first = svc.rank(IDX_LIFETIME_AP, Period::AllTime, None, 10).await.unwrap();
        assert_eq!(first.entries.len(), 1);

        // Doctor the cached payload; a hit must return it unchanged.
        let key = CacheKey { stat_idx: IDX_LIFETIME_AP, period: Period::AllTime, faction: None };
        let now = Utc::now();
        let mut doctored = svc.cache().get(&key, now).unwrap();
        doctored.entries.push(RankedEntry {
            rank: 2,
            agent_name: "Phantom".into(),
            faction: Faction::Resistance,
            level: None,
            value: 1,
            submission_date: now.date_naive(),
            badge_threshold: None,
            badge_tier: None,
        });
        svc.cache().put(key, doctored, now);

        let second = svc.rank(IDX_LIFETIME_AP, Period::AllTime, None, 10).await.unwrap();
        assert_eq!(second.entries.len(), 2);

        // A new accepted submission touching the stat invalidates the key.
        let other = export("Beta", "Resistance", &recent_date(2), "10:00:00", 2_000_000);
        svc.submit_stats_text("acct-2", &other, &AccountMeta::default()).await.unwrap();

        let third = svc.rank(IDX_LIFETIME_AP, Period::AllTime, None, 10).await.unwrap();
        let names: Vec<&str> = third.entries.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Alpha"]);
    }

    #[tokio::test]
    async fn expired_cache_entries_are_recomputed_not_served() {
        // TTL of zero: every entry is already expired when read back.
        let svc = StatsService::new(Database::open_memory().unwrap(), RankCache::new(0));
        let text = export("Alpha", "Enlightened", &recent_date(3), "08:30:12", 1_000_000);
        svc.submit_stats_text("acct-1", &text, &AccountMeta::default()).await.unwrap();

        svc.rank(IDX_LIFETIME_AP, Period::AllTime, None, 10).await.unwrap();

        // Doctor the (expired) cache entry; the next call must recompute.
        let key = CacheKey { stat_idx: IDX_LIFETIME_AP, period: Period::AllTime, faction: None };
        let now = Utc::now();
        let mut doctored = svc
            .rank(IDX_LIFETIME_AP, Period::AllTime, None, 10)
            .await
            .unwrap();
        doctored.entries.clear();
        svc.cache().put(key, doctored, now - chrono::Duration::seconds(1));

        let fresh = svc.rank(IDX_LIFETIME_AP, Period::AllTime, None, 10).await.unwrap();
        assert_eq!(fresh.entries.len(), 1);
        assert_eq!(fresh.entries[0].agent_name, "Alpha");
    }

    #[tokio::test]
    async fn rank_of_finds_the_agent_or_reports_not_found() {
        let svc = service();
        for (agent, ap) in [("Aster", 500), ("Borealis", 900)] {
            let text = export(agent, "Enlightened", &recent_date(3), "08:30:12", ap);
            svc.submit_stats_text(agent, &text, &AccountMeta::default()).await.unwrap();
        }

        let hit = svc.rank_of("Aster", IDX_LIFETIME_AP, Period::AllTime).await.unwrap();
        assert_eq!(hit.rank, 2);
        assert_eq!(hit.value, 500);

        let err = svc.rank_of("Nobody", IDX_LIFETIME_AP, Period::AllTime).await.unwrap_err();
        assert!(matches!(err, Error::Query(QueryError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn progress_flows_from_snapshots_to_the_report() {
        let svc = service();
        let first = export("Alpha", "Enlightened", &recent_date(10), "08:00:00", 1_000_000);
        let second = export("Alpha", "Enlightened", &recent_date(2), "08:00:00", 1_800_000);
        svc.submit_stats_text("acct-1", &first, &AccountMeta::default()).await.unwrap();
        svc.submit_stats_text("acct-1", &second, &AccountMeta::default()).await.unwrap();

        let report = svc.progress("Alpha", 30).await.unwrap();
        let ap = report
            .stats
            .iter()
            .find(|s| s.stat_idx == IDX_LIFETIME_AP)
            .expect("AP progress");
        assert_eq!(ap.delta, 800_000);

        let board = svc.progress_leaderboard(IDX_LIFETIME_AP, 30, None, 10).await.unwrap();
        assert_eq!(board[0].agent_name, "Alpha");
        assert_eq!(board[0].delta, 800_000);
    }
}
