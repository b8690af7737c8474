//! Progress engine: deltas and rates computed from append-only snapshots.
//!
//! Progress is always computed fresh; it is cheap relative to population
//! ranking and must reflect the newest snapshots.

use crate::catalog;
use crate::error::QueryError;
use crate::state::{AgentSnapshotRow, Database};
use crate::types::{Faction, MultiStatEntry, ProgressEntry, ProgressReport, StatProgress};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Per-agent progress over the lookback window.
///
/// Stats with fewer than two snapshots in the window are omitted, not
/// reported as zero. Elapsed days are floored at one; snapshot uniqueness
/// per (agent, date, stat) means two in-window snapshots always sit on
/// different dates, so the floor is a guard rather than a policy fork.
pub fn report(
    db: &Database,
    agent_name: &str,
    lookback_days: u32,
    today: NaiveDate,
) -> Result<ProgressReport, QueryError> {
    let agent = db
        .agent_by_name(agent_name)?
        .ok_or_else(|| QueryError::AgentNotFound(agent_name.to_string()))?;

    let start = today - Duration::days(i64::from(lookback_days));
    let snapshots = db.snapshots_for_agent(agent.id, start, today)?;
    let snapshot_count = snapshots.len();

    // Rows arrive ordered by (stat, date); fold them into per-stat series.
    let mut series: BTreeMap<u16, Vec<(NaiveDate, i64)>> = BTreeMap::new();
    for snap in snapshots {
        series
            .entry(snap.stat_idx)
            .or_default()
            .push((snap.snapshot_date, snap.value));
    }

    let mut stats: Vec<StatProgress> = series
        .into_iter()
        .filter(|(_, points)| points.len() >= 2)
        .map(|(stat_idx, points)| {
            let (first_date, first_value) = points[0];
            let (last_date, last_value) = points[points.len() - 1];
            let delta = last_value - first_value;
            StatProgress {
                stat_idx,
                stat_name: catalog::by_idx(stat_idx)
                    .map(|d| d.name.to_string())
                    .unwrap_or_else(|| format!("Stat {stat_idx}")),
                first_value,
                last_value,
                delta,
                rate_per_day: rate(delta, first_date, last_date),
                first_date,
                last_date,
                snapshot_count: points.len(),
            }
        })
        .collect();

    stats.sort_by(|a, b| b.delta.cmp(&a.delta).then(a.stat_idx.cmp(&b.stat_idx)));

    Ok(ProgressReport {
        agent_name: agent.name,
        faction: agent.faction,
        level: agent.level,
        lookback_days,
        start_date: start,
        end_date: today,
        stats,
        snapshot_count,
    })
}

/// Population-wide progress ranking for one stat: agents ordered by delta
/// over the window, positive improvement only.
pub fn leaderboard(
    db: &Database,
    stat_idx: u16,
    lookback_days: u32,
    faction: Option<Faction>,
    limit: usize,
    today: NaiveDate,
) -> Result<Vec<ProgressEntry>, QueryError> {
    catalog::by_idx(stat_idx).ok_or(QueryError::UnknownStat(stat_idx))?;

    let start = today - Duration::days(i64::from(lookback_days));
    let rows = db.snapshots_for_stats(&[stat_idx], start, today, faction)?;

    let mut entries: Vec<ProgressEntry> = fold_agent_series(&rows)
        .into_values()
        .filter_map(|series| {
            let points = &series.points;
            if points.len() < 2 {
                return None;
            }
            let (first_date, first_value) = points[0];
            let (last_date, last_value) = points[points.len() - 1];
            let delta = last_value - first_value;
            if delta <= 0 {
                return None;
            }
            Some(ProgressEntry {
                rank: 0,
                agent_name: series.agent_name,
                faction: series.faction,
                delta,
                first_value,
                last_value,
                first_date,
                last_date,
                rate_per_day: rate(delta, first_date, last_date),
            })
        })
        .collect();

    // Same tie-break shape as the value rankings: biggest delta first, then
    // the earliest starting point, then the name.
    entries.sort_by(|a, b| {
        b.delta
            .cmp(&a.delta)
            .then(a.first_date.cmp(&b.first_date))
            .then(a.agent_name.cmp(&b.agent_name))
    });
    entries.truncate(limit);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = (i + 1) as u32;
    }

    Ok(entries)
}

/// Combined progress over a stat set. An agent qualifies with positive
/// improvement in at least half the supplied stats; the score sums each
/// improving stat's delta normalized by the population maximum for that
/// stat, so no single high-magnitude stat dominates.
pub fn multi_stat(
    db: &Database,
    stat_idxs: &[u16],
    lookback_days: u32,
    limit: usize,
    today: NaiveDate,
) -> Result<Vec<MultiStatEntry>, QueryError> {
    for &idx in stat_idxs {
        catalog::by_idx(idx).ok_or(QueryError::UnknownStat(idx))?;
    }
    if stat_idxs.is_empty() {
        return Ok(Vec::new());
    }

    let start = today - Duration::days(i64::from(lookback_days));
    let rows = db.snapshots_for_stats(stat_idxs, start, today, None)?;

    // (agent, stat) -> positive delta
    struct AgentDeltas {
        agent_name: String,
        faction: Faction,
        deltas: BTreeMap<u16, i64>,
    }
    let mut per_agent: BTreeMap<i64, AgentDeltas> = BTreeMap::new();
    let mut max_delta: BTreeMap<u16, i64> = BTreeMap::new();

    for (agent_id, series) in fold_agent_stat_series(&rows) {
        for (stat_idx, points) in series.series {
            if points.len() < 2 {
                continue;
            }
            let delta = points[points.len() - 1].1 - points[0].1;
            if delta <= 0 {
                continue;
            }
            let entry = per_agent.entry(agent_id).or_insert_with(|| AgentDeltas {
                agent_name: series.agent_name.clone(),
                faction: series.faction,
                deltas: BTreeMap::new(),
            });
            entry.deltas.insert(stat_idx, delta);
            let current_max = max_delta.entry(stat_idx).or_insert(0);
            *current_max = (*current_max).max(delta);
        }
    }

    let total_stats = stat_idxs.len();
    let mut entries: Vec<MultiStatEntry> = per_agent
        .into_values()
        .filter(|agent| agent.deltas.len() * 2 >= total_stats)
        .map(|agent| {
            let score = agent
                .deltas
                .iter()
                .map(|(stat_idx, delta)| {
                    let max = max_delta.get(stat_idx).copied().unwrap_or(0);
                    if max > 0 {
                        *delta as f64 / max as f64
                    } else {
                        0.0
                    }
                })
                .sum();
            MultiStatEntry {
                rank: 0,
                agent_name: agent.agent_name,
                faction: agent.faction,
                score,
                improving_stats: agent.deltas.len(),
                total_stats,
                deltas: agent.deltas,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.agent_name.cmp(&b.agent_name))
    });
    entries.truncate(limit);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = (i + 1) as u32;
    }

    Ok(entries)
}

fn rate(delta: i64, first_date: NaiveDate, last_date: NaiveDate) -> f64 {
    let elapsed = (last_date - first_date).num_days().max(1);
    delta as f64 / elapsed as f64
}

struct AgentSeries {
    agent_name: String,
    faction: Faction,
    points: Vec<(NaiveDate, i64)>,
}

/// Fold single-stat rows (ordered by agent, date) into per-agent series.
fn fold_agent_series(rows: &[AgentSnapshotRow]) -> BTreeMap<i64, AgentSeries> {
    let mut out: BTreeMap<i64, AgentSeries> = BTreeMap::new();
    for row in rows {
        out.entry(row.agent_id)
            .or_insert_with(|| AgentSeries {
                agent_name: row.agent_name.clone(),
                faction: row.faction,
                points: Vec::new(),
            })
            .points
            .push((row.snapshot_date, row.value));
    }
    out
}

struct AgentStatSeries {
    agent_name: String,
    faction: Faction,
    series: BTreeMap<u16, Vec<(NaiveDate, i64)>>,
}

/// Fold multi-stat rows (ordered by agent, stat, date) into per-agent,
/// per-stat series.
fn fold_agent_stat_series(rows: &[AgentSnapshotRow]) -> BTreeMap<i64, AgentStatSeries> {
    let mut out: BTreeMap<i64, AgentStatSeries> = BTreeMap::new();
    for row in rows {
        out.entry(row.agent_id)
            .or_insert_with(|| AgentStatSeries {
                agent_name: row.agent_name.clone(),
                faction: row.faction,
                series: BTreeMap::new(),
            })
            .series
            .entry(row.stat_idx)
            .or_default()
            .push((row.snapshot_date, row.value));
    }
    out
}
