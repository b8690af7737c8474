//! Cross-field business rules applied after structural validation.
//!
//! Blocking rules reject the record outright; the rest attach advisory
//! warnings that ride along with the accepted record.

use crate::catalog::{
    self, IDX_CURRENT_AP, IDX_DISTANCE_WALKED, IDX_FIELDS_CREATED, IDX_HACKS, IDX_LIFETIME_AP,
    IDX_LINKS_CREATED, IDX_MU_CAPTURED, IDX_PORTALS_NEUTRALIZED, IDX_RESONATORS_DEPLOYED,
    IDX_RESONATORS_DESTROYED, IDX_UNIQUE_PORTALS, IDX_XM_COLLECTED,
};
use crate::error::ParseError;
use crate::types::{ParsedRecord, Warning, WarningKind};
use chrono::NaiveDate;

/// Submissions older than this many days draw an advisory warning.
const OLD_DATE_DAYS: i64 = 730;

/// Lifetime AP above which a depleted current-AP balance looks suspicious.
const LOW_CURRENT_AP_FLOOR: i64 = 5_000_000;

pub fn apply(record: &mut ParsedRecord, today: NaiveDate) -> Result<(), ParseError> {
    check_blocking(record, today)?;

    let mut warnings = Vec::new();
    check_date_age(record, today, &mut warnings);
    check_ap_balance(record, &mut warnings);
    check_level_band(record, &mut warnings);
    check_ratios(record, &mut warnings);
    record.warnings.extend(warnings);
    Ok(())
}

fn check_blocking(record: &ParsedRecord, today: NaiveDate) -> Result<(), ParseError> {
    if record.date > today {
        return Err(ParseError::RuleViolation(format!(
            "submission date {} is in the future",
            record.date
        )));
    }

    if let (Some(current), Some(lifetime)) =
        (record.num(IDX_CURRENT_AP), record.num(IDX_LIFETIME_AP))
    {
        if current > lifetime {
            return Err(ParseError::RuleViolation(format!(
                "current AP ({current}) exceeds lifetime AP ({lifetime})"
            )));
        }
    }

    if let Some(level) = record.level {
        if !(1..=16).contains(&level) {
            return Err(ParseError::RuleViolation(format!(
                "level {level} outside the valid range 1-16"
            )));
        }
    }

    Ok(())
}

fn check_date_age(record: &ParsedRecord, today: NaiveDate, warnings: &mut Vec<Warning>) {
    let age = (today - record.date).num_days();
    if age > OLD_DATE_DAYS {
        warnings.push(Warning {
            kind: WarningKind::OldDate,
            message: format!("submission date {} is {age} days old", record.date),
        });
    }
}

fn check_ap_balance(record: &ParsedRecord, warnings: &mut Vec<Warning>) {
    if let (Some(current), Some(lifetime)) =
        (record.num(IDX_CURRENT_AP), record.num(IDX_LIFETIME_AP))
    {
        if lifetime > LOW_CURRENT_AP_FLOOR && current * 5 < lifetime * 4 {
            warnings.push(Warning {
                kind: WarningKind::LowCurrentAp,
                message: format!(
                    "current AP ({current}) is unusually low against lifetime AP ({lifetime})"
                ),
            });
        }
    }
}

fn check_level_band(record: &ParsedRecord, warnings: &mut Vec<Warning>) {
    let (Some(level), Some(lifetime)) = (record.level, record.num(IDX_LIFETIME_AP)) else {
        return;
    };

    if let Some(minimum) = catalog::level_ap_minimum(level) {
        if lifetime < minimum {
            warnings.push(Warning {
                kind: WarningKind::LevelProgression,
                message: format!(
                    "level {level} usually requires at least {minimum} lifetime AP, got {lifetime}"
                ),
            });
        } else if let Some(next_minimum) = catalog::level_ap_minimum(level + 1) {
            if lifetime > next_minimum * 3 / 2 {
                warnings.push(Warning {
                    kind: WarningKind::LevelProgression,
                    message: format!(
                        "lifetime AP ({lifetime}) is unusually high for level {level}"
                    ),
                });
            }
        }
    }
}

fn check_ratios(record: &ParsedRecord, warnings: &mut Vec<Warning>) {
    let mut ratio = |message: String| {
        warnings.push(Warning {
            kind: WarningKind::UnusualRatio,
            message,
        });
    };

    let resonators = record.num(IDX_RESONATORS_DEPLOYED);
    let links = record.num(IDX_LINKS_CREATED);
    let fields = record.num(IDX_FIELDS_CREATED);
    let mu = record.num(IDX_MU_CAPTURED);

    if let (Some(r), Some(l)) = (resonators, links) {
        if r > 0 && l > r * 2 {
            ratio(format!("links created ({l}) is high against resonators deployed ({r})"));
        }
    }
    if let (Some(l), Some(f)) = (links, fields) {
        if l > 0 && f > l * 3 {
            ratio(format!("control fields ({f}) is high against links created ({l})"));
        }
    }
    if let (Some(f), Some(m)) = (fields, mu) {
        if f > 100 && m < f * 1_000 {
            ratio(format!("MU captured ({m}) is low for {f} control fields"));
        }
    }

    if let (Some(portals), Some(distance)) =
        (record.num(IDX_UNIQUE_PORTALS), record.num(IDX_DISTANCE_WALKED))
    {
        if portals > 100 && distance * 10 < portals * 3 {
            ratio(format!(
                "distance walked ({distance} km) is low for {portals} unique portals"
            ));
        }
    }

    if let (Some(hacks), Some(xm)) = (record.num(IDX_HACKS), record.num(IDX_XM_COLLECTED)) {
        if hacks > 1_000 && xm < hacks * 50 {
            ratio(format!("XM collected ({xm}) is low for {hacks} hacks"));
        }
    }

    if let (Some(destroyed), Some(neutralized)) = (
        record.num(IDX_RESONATORS_DESTROYED),
        record.num(IDX_PORTALS_NEUTRALIZED),
    ) {
        if destroyed > 0 && neutralized > destroyed * 4 {
            ratio(format!(
                "portals neutralized ({neutralized}) is high against resonators destroyed ({destroyed})"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Faction, ParsedField, TypedValue, WireFormat};
    use std::collections::BTreeMap;

    fn record_with(fields: &[(u16, i64)], level: Option<i64>, date: NaiveDate) -> ParsedRecord {
        let mut map = BTreeMap::new();
        for &(idx, value) in fields {
            let name = catalog::by_idx(idx).map(|d| d.name.to_string()).unwrap_or_default();
            map.insert(idx, ParsedField { name, value: TypedValue::Num(value) });
        }
        ParsedRecord {
            agent_name: "Alpha".into(),
            faction: Faction::Enlightened,
            date,
            time: "08:00:00".parse().unwrap(),
            level,
            fields: map,
            warnings: Vec::new(),
            format: WireFormat::Delimited,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn current_ap_above_lifetime_blocks() {
        let mut rec = record_with(
            &[(IDX_LIFETIME_AP, 1_000), (IDX_CURRENT_AP, 2_000)],
            Some(2),
            day("2026-07-01"),
        );
        let err = apply(&mut rec, day("2026-08-01")).unwrap_err();
        assert!(matches!(err, ParseError::RuleViolation(_)));
    }

    #[test]
    fn future_date_blocks() {
        let mut rec = record_with(&[(IDX_LIFETIME_AP, 50_000)], Some(3), day("2026-09-01"));
        let err = apply(&mut rec, day("2026-08-01")).unwrap_err();
        assert!(matches!(err, ParseError::RuleViolation(_)));
    }

    #[test]
    fn out_of_range_level_blocks() {
        let mut rec = record_with(&[(IDX_LIFETIME_AP, 50_000)], Some(17), day("2026-07-01"));
        assert!(apply(&mut rec, day("2026-08-01")).is_err());
    }

    #[test]
    fn old_date_only_warns() {
        let mut rec = record_with(&[(IDX_LIFETIME_AP, 50_000)], Some(3), day("2020-01-01"));
        apply(&mut rec, day("2026-08-01")).unwrap();
        assert!(rec.warnings.iter().any(|w| w.kind == WarningKind::OldDate));
    }

    #[test]
    fn implausible_level_band_only_warns() {
        // Level 10 wants at least 4,000,000 AP.
        let mut rec = record_with(&[(IDX_LIFETIME_AP, 100_000)], Some(10), day("2026-07-01"));
        apply(&mut rec, day("2026-08-01")).unwrap();
        assert!(rec.warnings.iter().any(|w| w.kind == WarningKind::LevelProgression));
    }

    #[test]
    fn link_to_resonator_ratio_warns() {
        let mut rec = record_with(
            &[(IDX_RESONATORS_DEPLOYED, 100), (IDX_LINKS_CREATED, 500)],
            Some(8),
            day("2026-07-01"),
        );
        apply(&mut rec, day("2026-08-01")).unwrap();
        assert!(rec.warnings.iter().any(|w| w.kind == WarningKind::UnusualRatio));
    }

    #[test]
    fn plausible_record_passes_clean() {
        let mut rec = record_with(
            &[
                (IDX_LIFETIME_AP, 9_500_000),
                (IDX_CURRENT_AP, 9_000_000),
                (IDX_RESONATORS_DEPLOYED, 8_400),
                (IDX_LINKS_CREATED, 1_200),
                (IDX_FIELDS_CREATED, 350),
                (IDX_MU_CAPTURED, 2_000_000),
            ],
            Some(12),
            day("2026-07-15"),
        );
        apply(&mut rec, day("2026-08-01")).unwrap();
        assert!(rec.warnings.is_empty(), "unexpected warnings: {:?}", rec.warnings);
    }
}
