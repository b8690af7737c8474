//! Ranking engine: top-N agents for a stat over a recency window.
//!
//! Rankings are computed from current field values (one submission per
//! agent, the latest eligible one) and annotated with badge thresholds.
//! Caching sits above this module in the service layer.

pub mod cache;

pub use cache::{CacheKey, RankCache};

use crate::catalog::{self, ValueKind};
use crate::error::QueryError;
use crate::state::Database;
use crate::types::{Faction, Period, RankOf, RankedEntry, RankedList};
use chrono::{DateTime, NaiveDate, Utc};

/// Compute the full ranking for (stat, period, faction).
///
/// Order: value descending, then earliest submission date (rewards agents
/// whose value stood earliest), then agent name for a total order.
pub fn compute(
    db: &Database,
    stat_idx: u16,
    period: Period,
    faction: Option<Faction>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<RankedList, QueryError> {
    let def = catalog::by_idx(stat_idx).ok_or(QueryError::UnknownStat(stat_idx))?;
    if def.kind != ValueKind::Numeric {
        return Err(QueryError::UnknownStat(stat_idx));
    }

    let (start, end) = period.date_bounds(today);
    let mut rows = db.rank_rows(stat_idx, start, end, faction)?;

    rows.sort_by(|a, b| {
        b.value
            .cmp(&a.value)
            .then(a.submission_date.cmp(&b.submission_date))
            .then(a.agent_name.cmp(&b.agent_name))
    });

    let entries: Vec<RankedEntry> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| RankedEntry {
            rank: (i + 1) as u32,
            badge_threshold: catalog::badge_threshold(stat_idx, row.value),
            badge_tier: catalog::badge_tier(stat_idx, row.value).map(str::to_string),
            agent_name: row.agent_name,
            faction: row.faction,
            level: row.level,
            value: row.value,
            submission_date: row.submission_date,
        })
        .collect();

    let min_value = entries.iter().map(|e| e.value).min();
    let max_value = entries.iter().map(|e| e.value).max();

    Ok(RankedList {
        stat_idx,
        stat_name: def.name.to_string(),
        period,
        faction,
        entries,
        min_value,
        max_value,
        generated_at: now,
    })
}

/// Locate an agent inside a computed ranking.
pub fn find_agent(list: &RankedList, agent_name: &str) -> Option<RankOf> {
    list.entries.iter().find(|e| e.agent_name == agent_name).map(|e| RankOf {
        rank: e.rank,
        value: e.value,
        population: list.entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IDX_LEVEL, IDX_LIFETIME_AP, IDX_UNIQUE_PORTALS};
    use crate::types::{AccountMeta, ParsedField, ParsedRecord, TypedValue, WireFormat};
    use std::collections::BTreeMap;

    fn record(agent: &str, faction: Faction, date: &str, stats: &[(u16, i64)]) -> ParsedRecord {
        record_at(agent, faction, date, "08:00:00", stats)
    }

    fn record_at(
        agent: &str,
        faction: Faction,
        date: &str,
        time: &str,
        stats: &[(u16, i64)],
    ) -> ParsedRecord {
        let mut fields = BTreeMap::new();
        let mut level = None;
        for &(idx, value) in stats {
            if idx == IDX_LEVEL {
                level = Some(value);
            }
            let name = catalog::by_idx(idx)
                .map(|d| d.name.to_string())
                .unwrap_or_else(|| format!("Stat {idx}"));
            fields.insert(idx, ParsedField { name, value: TypedValue::Num(value) });
        }
        ParsedRecord {
            agent_name: agent.into(),
            faction,
            date: date.parse().unwrap(),
            time: time.parse().unwrap(),
            level,
            fields,
            warnings: Vec::new(),
            format: WireFormat::Delimited,
        }
    }

    fn seeded_db() -> Database {
        let mut db = Database::open_memory().unwrap();
        let stats = |ap: i64| {
            vec![
                (IDX_LEVEL, 8),
                (IDX_LIFETIME_AP, ap),
                (IDX_UNIQUE_PORTALS, ap / 1_000),
                (catalog::IDX_RESONATORS_DEPLOYED, 100),
                (catalog::IDX_HACKS, 100),
            ]
        };
        db.submit("u1", &AccountMeta::default(), &record("Aster", Faction::Enlightened, "2026-07-10", &stats(500)))
            .unwrap();
        db.submit("u2", &AccountMeta::default(), &record("Borealis", Faction::Resistance, "2026-07-12", &stats(900)))
            .unwrap();
        db.submit("u3", &AccountMeta::default(), &record("Cinder", Faction::Enlightened, "2026-07-11", &stats(700)))
            .unwrap();
        db
    }

    fn today() -> NaiveDate {
        "2026-07-20".parse().unwrap()
    }

    #[test]
    fn orders_by_value_descending_and_limits_apply_upstream() {
        let db = seeded_db();
        let list = compute(&db, IDX_LIFETIME_AP, Period::AllTime, None, today(), Utc::now()).unwrap();

        let names: Vec<&str> = list.entries.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Borealis", "Cinder", "Aster"]);
        assert_eq!(list.entries[0].rank, 1);
        assert_eq!(list.entries[0].value, 900);
        assert_eq!(list.min_value, Some(500));
        assert_eq!(list.max_value, Some(900));

        let top2 = list.truncated(2);
        assert_eq!(top2.entries.len(), 2);
        assert_eq!(top2.entries[1].agent_name, "Cinder");
        assert_eq!(top2.min_value, Some(500));
    }

    #[test]
    fn ranking_is_deterministic() {
        let db = seeded_db();
        let first = compute(&db, IDX_LIFETIME_AP, Period::AllTime, None, today(), Utc::now()).unwrap();
        let second = compute(&db, IDX_LIFETIME_AP, Period::AllTime, None, today(), Utc::now()).unwrap();
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn ties_break_on_earliest_date_then_name() {
        let mut db = Database::open_memory().unwrap();
        let stats = vec![
            (IDX_LEVEL, 8),
            (IDX_LIFETIME_AP, 1_000),
            (IDX_UNIQUE_PORTALS, 10),
            (catalog::IDX_RESONATORS_DEPLOYED, 10),
            (catalog::IDX_HACKS, 10),
        ];
        db.submit("u1", &AccountMeta::default(), &record("Zeta", Faction::Enlightened, "2026-07-05", &stats))
            .unwrap();
        db.submit("u2", &AccountMeta::default(), &record("Echo", Faction::Resistance, "2026-07-09", &stats))
            .unwrap();
        db.submit("u3", &AccountMeta::default(), &record("Able", Faction::Resistance, "2026-07-09", &stats))
            .unwrap();

        let list = compute(&db, IDX_LIFETIME_AP, Period::AllTime, None, today(), Utc::now()).unwrap();
        let names: Vec<&str> = list.entries.iter().map(|e| e.agent_name.as_str()).collect();
        // Same value everywhere: earliest date wins, then name order.
        assert_eq!(names, vec!["Zeta", "Able", "Echo"]);
    }

    #[test]
    fn only_the_latest_submission_per_agent_counts() {
        let mut db = seeded_db();
        let newer = vec![
            (IDX_LEVEL, 9),
            (IDX_LIFETIME_AP, 2_000),
            (IDX_UNIQUE_PORTALS, 2),
            (catalog::IDX_RESONATORS_DEPLOYED, 100),
            (catalog::IDX_HACKS, 100),
        ];
        db.submit("u1", &AccountMeta::default(), &record("Aster", Faction::Enlightened, "2026-07-15", &newer))
            .unwrap();

        let list = compute(&db, IDX_LIFETIME_AP, Period::AllTime, None, today(), Utc::now()).unwrap();
        assert_eq!(list.entries[0].agent_name, "Aster");
        assert_eq!(list.entries[0].value, 2_000);
        assert_eq!(list.entries.len(), 3);
    }

    #[test]
    fn period_windows_restrict_eligibility() {
        let db = seeded_db();
        // Weekly window ending 2026-07-20 starts 2026-07-13: nothing is
        // eligible; daily on a submission date sees just that agent.
        let weekly = compute(&db, IDX_LIFETIME_AP, Period::Weekly, None, today(), Utc::now()).unwrap();
        assert!(weekly.entries.is_empty());

        let daily_today: NaiveDate = "2026-07-12".parse().unwrap();
        let daily = compute(&db, IDX_LIFETIME_AP, Period::Daily, None, daily_today, Utc::now()).unwrap();
        let names: Vec<&str> = daily.entries.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Borealis"]);
    }

    #[test]
    fn faction_filter_restricts_population() {
        let db = seeded_db();
        let list = compute(
            &db,
            IDX_LIFETIME_AP,
            Period::AllTime,
            Some(Faction::Enlightened),
            today(),
            Utc::now(),
        )
        .unwrap();
        let names: Vec<&str> = list.entries.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Cinder", "Aster"]);
    }

    #[test]
    fn deactivated_agents_drop_out() {
        let db = seeded_db();
        assert!(db.set_agent_active("Borealis", false).unwrap());

        let list = compute(&db, IDX_LIFETIME_AP, Period::AllTime, None, today(), Utc::now()).unwrap();
        let names: Vec<&str> = list.entries.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Cinder", "Aster"]);
    }

    #[test]
    fn badge_annotation_attaches_highest_cleared_threshold() {
        let mut db = Database::open_memory().unwrap();
        let stats = vec![
            (IDX_LEVEL, 10),
            (IDX_LIFETIME_AP, 6_000_000),
            (IDX_UNIQUE_PORTALS, 2_500),
            (catalog::IDX_RESONATORS_DEPLOYED, 100),
            (catalog::IDX_HACKS, 100),
        ];
        db.submit("u1", &AccountMeta::default(), &record("Aster", Faction::Enlightened, "2026-07-10", &stats))
            .unwrap();

        let list = compute(&db, IDX_UNIQUE_PORTALS, Period::AllTime, None, today(), Utc::now()).unwrap();
        assert_eq!(list.entries[0].badge_threshold, Some(2_000));
        assert_eq!(list.entries[0].badge_tier.as_deref(), Some("Gold"));
    }

    #[test]
    fn unknown_or_text_stats_fail_fast() {
        let db = seeded_db();
        assert!(matches!(
            compute(&db, 999, Period::AllTime, None, today(), Utc::now()),
            Err(QueryError::UnknownStat(999))
        ));
        assert!(matches!(
            compute(&db, catalog::IDX_AGENT_NAME, Period::AllTime, None, today(), Utc::now()),
            Err(QueryError::UnknownStat(_))
        ));
    }

    #[test]
    fn find_agent_reports_rank_and_population() {
        let db = seeded_db();
        let list = compute(&db, IDX_LIFETIME_AP, Period::AllTime, None, today(), Utc::now()).unwrap();

        let hit = find_agent(&list, "Cinder").unwrap();
        assert_eq!(hit.rank, 2);
        assert_eq!(hit.value, 700);
        assert_eq!(hit.population, 3);
        assert!(find_agent(&list, "Nobody").is_none());
    }
}
