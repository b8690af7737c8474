//! Static stat catalog — the registry of every tracked game statistic.
//!
//! Each stat has a stable numeric index used everywhere else (field values,
//! snapshots, leaderboards). The catalog is immutable and loaded once.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Well-known indices
// ---------------------------------------------------------------------------

pub const IDX_TIME_SPAN: u16 = 0;
pub const IDX_AGENT_NAME: u16 = 1;
pub const IDX_FACTION: u16 = 2;
pub const IDX_DATE: u16 = 3;
pub const IDX_TIME: u16 = 4;
pub const IDX_LEVEL: u16 = 5;
pub const IDX_LIFETIME_AP: u16 = 6;
pub const IDX_CURRENT_AP: u16 = 7;
pub const IDX_UNIQUE_PORTALS: u16 = 8;
pub const IDX_XM_COLLECTED: u16 = 11;
pub const IDX_DISTANCE_WALKED: u16 = 13;
pub const IDX_RESONATORS_DEPLOYED: u16 = 14;
pub const IDX_LINKS_CREATED: u16 = 15;
pub const IDX_FIELDS_CREATED: u16 = 16;
pub const IDX_MU_CAPTURED: u16 = 17;
pub const IDX_RESONATORS_DESTROYED: u16 = 23;
pub const IDX_PORTALS_NEUTRALIZED: u16 = 24;
pub const IDX_HACKS: u16 = 28;

/// Headers that resolve to no catalog entry get a dynamic index at or above
/// this base, so they never collide with canonical stats.
pub const DYNAMIC_IDX_BASE: u16 = 1000;

/// Stat indices snapshotted on every accepted submission for progress
/// tracking.
pub const TRACKED_STATS: [u16; 10] = [6, 8, 11, 13, 14, 15, 16, 17, 20, 28];

/// Badge tier names, in ascending threshold order.
pub const BADGE_TIERS: [&str; 5] = ["Bronze", "Silver", "Gold", "Platinum", "Onyx"];

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// How a stat's value is typed on the wire and in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Numeric,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Category a stat belongs to in the game's own grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatGroup {
    Head,
    Discovery,
    Building,
    Collaboration,
    Combat,
    Special,
}

/// One entry in the stat catalog.
#[derive(Debug, Clone, Copy)]
pub struct StatDefinition {
    pub idx: u16,
    pub group: StatGroup,
    pub kind: ValueKind,
    pub name: &'static str,
    /// Achievement thresholds in ascending order; empty when the stat has no
    /// badge track.
    pub thresholds: &'static [i64],
}

macro_rules! stat {
    ($idx:expr, $group:ident, $kind:ident, $name:expr) => {
        StatDefinition {
            idx: $idx,
            group: StatGroup::$group,
            kind: ValueKind::$kind,
            name: $name,
            thresholds: &[],
        }
    };
    ($idx:expr, $group:ident, $kind:ident, $name:expr, $thresholds:expr) => {
        StatDefinition {
            idx: $idx,
            group: StatGroup::$group,
            kind: ValueKind::$kind,
            name: $name,
            thresholds: $thresholds,
        }
    };
}

static STATS: &[StatDefinition] = &[
    stat!(0, Head, Text, "Time Span"),
    stat!(1, Head, Text, "Agent Name"),
    stat!(2, Head, Text, "Agent Faction"),
    stat!(3, Head, Text, "Date (yyyy-mm-dd)"),
    stat!(4, Head, Text, "Time (hh:mm:ss)"),
    stat!(5, Head, Numeric, "Level", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]),
    stat!(
        6,
        Head,
        Numeric,
        "Lifetime AP",
        &[
            100_000,
            500_000,
            1_000_000,
            2_500_000,
            5_000_000,
            10_000_000,
            20_000_000,
            40_000_000,
            80_000_000,
            160_000_000,
            320_000_000,
            640_000_000,
            1_280_000_000,
            2_560_000_000,
            5_120_000_000,
            10_000_000_000,
        ]
    ),
    stat!(7, Head, Numeric, "Current AP"),
    stat!(8, Discovery, Numeric, "Unique Portals Visited", &[100, 1_000, 2_000, 10_000, 30_000]),
    stat!(9, Discovery, Numeric, "Portals Discovered", &[100, 1_000, 2_000, 10_000, 30_000]),
    stat!(10, Discovery, Numeric, "Drone Hacks", &[50, 500, 2_000, 10_000, 40_000]),
    stat!(
        11,
        Discovery,
        Numeric,
        "XM Collected",
        &[100_000, 1_000_000, 5_000_000, 20_000_000, 100_000_000]
    ),
    stat!(12, Discovery, Numeric, "Keys Hacked", &[500, 5_000, 20_000, 100_000, 500_000]),
    stat!(13, Discovery, Numeric, "Distance Walked", &[100, 500, 2_000, 10_000, 40_000]),
    stat!(14, Building, Numeric, "Resonators Deployed", &[500, 5_000, 20_000, 100_000, 400_000]),
    stat!(15, Building, Numeric, "Links Created", &[100, 1_000, 4_000, 20_000, 100_000]),
    stat!(16, Building, Numeric, "Control Fields Created", &[50, 500, 2_000, 10_000, 50_000]),
    stat!(
        17,
        Building,
        Numeric,
        "MU Captured",
        &[100_000, 1_000_000, 10_000_000, 100_000_000, 1_000_000_000]
    ),
    stat!(18, Building, Numeric, "Mods Deployed", &[100, 1_000, 4_000, 20_000, 100_000]),
    stat!(19, Collaboration, Numeric, "Unique Missions Completed", &[10, 100, 500, 2_000, 5_000]),
    stat!(
        20,
        Collaboration,
        Numeric,
        "XM Recharged",
        &[100_000, 1_000_000, 5_000_000, 20_000_000, 100_000_000]
    ),
    stat!(21, Collaboration, Numeric, "Portals Captured", &[100, 1_000, 4_000, 20_000, 100_000]),
    stat!(22, Collaboration, Numeric, "Min Times Hacked", &[500, 5_000, 20_000, 100_000, 500_000]),
    stat!(23, Combat, Numeric, "Resonators Destroyed", &[500, 5_000, 20_000, 100_000, 400_000]),
    stat!(24, Combat, Numeric, "Portals Neutralized", &[100, 1_000, 4_000, 20_000, 100_000]),
    stat!(25, Combat, Numeric, "Enemy Links Destroyed", &[100, 1_000, 4_000, 20_000, 100_000]),
    stat!(
        26,
        Combat,
        Numeric,
        "Enemy Control Fields Destroyed",
        &[50, 500, 2_000, 10_000, 50_000]
    ),
    stat!(
        27,
        Combat,
        Numeric,
        "XM Collected by Enemy",
        &[100_000, 1_000_000, 5_000_000, 20_000_000, 100_000_000]
    ),
    stat!(28, Special, Numeric, "Hacks", &[500, 5_000, 20_000, 100_000, 500_000]),
    stat!(29, Special, Numeric, "Max Link Length", &[1, 5, 10, 20, 50]),
    stat!(30, Special, Numeric, "Max Time Portal Held", &[3, 10, 20, 90, 150]),
    stat!(31, Special, Numeric, "Max Time Field Held", &[1, 3, 7, 20, 30]),
    stat!(32, Special, Numeric, "Longest Link", &[1, 5, 10, 20, 50]),
    stat!(33, Special, Numeric, "Largest Field", &[5_000, 10_000, 25_000, 100_000, 250_000]),
];

static BY_IDX: Lazy<HashMap<u16, &'static StatDefinition>> =
    Lazy::new(|| STATS.iter().map(|s| (s.idx, s)).collect());

static BY_NAME: Lazy<HashMap<String, &'static StatDefinition>> =
    Lazy::new(|| STATS.iter().map(|s| (s.name.to_lowercase(), s)).collect());

/// Short references users type instead of full stat names.
static ALIASES: Lazy<HashMap<&'static str, u16>> = Lazy::new(|| {
    HashMap::from([
        ("ap", 6),
        ("explorer", 8),
        ("xm", 11),
        ("trekker", 13),
        ("builder", 14),
        ("connector", 15),
        ("mindcontroller", 16),
        ("liberator", 17),
        ("recharger", 20),
        ("hacker", 28),
    ])
});

/// Minimum lifetime AP expected at each agent level (1-16), used by the
/// plausibility rules.
static LEVEL_AP_MINIMUMS: &[i64] = &[
    0,
    10_000,
    30_000,
    70_000,
    150_000,
    300_000,
    600_000,
    1_200_000,
    2_500_000,
    4_000_000,
    6_000_000,
    8_400_000,
    12_000_000,
    17_000_000,
    24_000_000,
    40_000_000,
];

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// All catalog entries in index order.
pub fn all() -> &'static [StatDefinition] {
    STATS
}

/// Look up a stat by its index.
pub fn by_idx(idx: u16) -> Option<&'static StatDefinition> {
    BY_IDX.get(&idx).copied()
}

/// Look up a stat by its canonical name (case-insensitive).
pub fn by_name(name: &str) -> Option<&'static StatDefinition> {
    BY_NAME.get(&name.trim().to_lowercase()).copied()
}

/// Resolve a user-supplied stat reference: a short alias, a numeric index,
/// or a full name.
pub fn resolve_stat_ref(reference: &str) -> Option<u16> {
    let trimmed = reference.trim();
    if let Some(idx) = ALIASES.get(trimmed.to_lowercase().as_str()) {
        return Some(*idx);
    }
    if let Ok(idx) = trimmed.parse::<u16>() {
        if by_idx(idx).is_some() {
            return Some(idx);
        }
        return None;
    }
    by_name(trimmed).map(|s| s.idx)
}

/// Highest achievement threshold the value clears, if any.
pub fn badge_threshold(idx: u16, value: i64) -> Option<i64> {
    let def = by_idx(idx)?;
    def.thresholds.iter().rev().find(|&&t| value >= t).copied()
}

/// Badge tier name for the value. Only stats with a five-step badge track
/// map onto the named tiers.
pub fn badge_tier(idx: u16, value: i64) -> Option<&'static str> {
    let def = by_idx(idx)?;
    if def.thresholds.len() != BADGE_TIERS.len() {
        return None;
    }
    let cleared = def.thresholds.iter().filter(|&&t| value >= t).count();
    cleared.checked_sub(1).map(|i| BADGE_TIERS[i])
}

/// Minimum lifetime AP expected for a level, or None outside 1-16.
pub fn level_ap_minimum(level: i64) -> Option<i64> {
    if (1..=16).contains(&level) {
        Some(LEVEL_AP_MINIMUMS[(level - 1) as usize])
    } else {
        None
    }
}

/// Infer the value kind of an unknown stat from its raw value.
pub fn infer_kind(value: &str) -> ValueKind {
    let stripped = value.replace(',', "");
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        ValueKind::Numeric
    } else {
        ValueKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_indices_are_unique_and_dense() {
        assert_eq!(STATS.len(), 34);
        for (i, def) in STATS.iter().enumerate() {
            assert_eq!(def.idx as usize, i);
        }
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        assert_eq!(by_name("lifetime ap").unwrap().idx, IDX_LIFETIME_AP);
        assert_eq!(by_name("LIFETIME AP").unwrap().idx, IDX_LIFETIME_AP);
        assert!(by_name("No Such Stat").is_none());
    }

    #[test]
    fn tracked_stats_are_all_numeric_catalog_entries() {
        for idx in TRACKED_STATS {
            let def = by_idx(idx).expect("tracked stat must be in catalog");
            assert_eq!(def.kind, ValueKind::Numeric);
        }
    }

    #[test]
    fn badge_threshold_picks_highest_cleared() {
        // Explorer: 100, 1000, 2000, 10000, 30000
        assert_eq!(badge_threshold(IDX_UNIQUE_PORTALS, 99), None);
        assert_eq!(badge_threshold(IDX_UNIQUE_PORTALS, 100), Some(100));
        assert_eq!(badge_threshold(IDX_UNIQUE_PORTALS, 2_500), Some(2_000));
        assert_eq!(badge_threshold(IDX_UNIQUE_PORTALS, 1_000_000), Some(30_000));
    }

    #[test]
    fn badge_tier_only_for_five_step_tracks() {
        assert_eq!(badge_tier(IDX_UNIQUE_PORTALS, 2_500), Some("Gold"));
        assert_eq!(badge_tier(IDX_UNIQUE_PORTALS, 50), None);
        // Lifetime AP has sixteen thresholds, so no named tier.
        assert_eq!(badge_tier(IDX_LIFETIME_AP, 10_000_000_000), None);
        assert_eq!(badge_threshold(IDX_LIFETIME_AP, 1_500_000), Some(1_000_000));
    }

    #[test]
    fn stat_refs_resolve_aliases_indices_and_names() {
        assert_eq!(resolve_stat_ref("ap"), Some(6));
        assert_eq!(resolve_stat_ref("6"), Some(6));
        assert_eq!(resolve_stat_ref("Hacks"), Some(28));
        assert_eq!(resolve_stat_ref("999"), None);
        assert_eq!(resolve_stat_ref("nonsense"), None);
    }

    #[test]
    fn level_ap_minimums_cover_all_levels() {
        assert_eq!(level_ap_minimum(1), Some(0));
        assert_eq!(level_ap_minimum(8), Some(1_200_000));
        assert_eq!(level_ap_minimum(16), Some(40_000_000));
        assert_eq!(level_ap_minimum(0), None);
        assert_eq!(level_ap_minimum(17), None);
    }

    #[test]
    fn infer_kind_detects_numbers_with_separators() {
        assert_eq!(infer_kind("1,234,567"), ValueKind::Numeric);
        assert_eq!(infer_kind("42"), ValueKind::Numeric);
        assert_eq!(infer_kind("Enlightened"), ValueKind::Text);
        assert_eq!(infer_kind(""), ValueKind::Text);
    }
}
