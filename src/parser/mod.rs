//! Dual-format stats parser/validator.
//!
//! Turns a raw pasted export into a typed `ParsedRecord` or a `ParseError`.
//! Both wire shapes (tab-delimited and whitespace-only) funnel into the same
//! header-driven pairing: each header resolves to a catalog stat and takes
//! the value at its position.

pub mod rules;
pub mod split;

use crate::catalog::{self, ValueKind, DYNAMIC_IDX_BASE, IDX_AGENT_NAME, IDX_DATE, IDX_FACTION,
    IDX_LEVEL, IDX_TIME, IDX_TIME_SPAN};
use crate::error::ParseError;
use crate::types::{Faction, ParsedField, ParsedRecord, TypedValue, Warning, WarningKind,
    WireFormat};
use chrono::{NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Fewest stat fields (level and up) a plausible export carries.
const MIN_STAT_FIELDS: usize = 5;

/// Header prefixes that identify a stats export.
const HEADER_PREFIXES: [&str; 1] = ["time span"];

/// Period labels accepted as the lifetime aggregate.
const LIFETIME_LABELS: [&str; 3] = ["ALL TIME", "ALLTIME", "ALL"];

/// Parse a raw stats export against today's date.
pub fn parse(raw_text: &str) -> Result<ParsedRecord, ParseError> {
    parse_as_of(raw_text, Utc::now().date_naive())
}

/// Parse with an explicit "today", so date rules stay deterministic in tests.
pub fn parse_as_of(raw_text: &str, today: NaiveDate) -> Result<ParsedRecord, ParseError> {
    let text = split::clean_input(raw_text);
    let (header_line, values_line) =
        split::split_sections(&text).ok_or(ParseError::NotStatsFormat)?;

    if !is_known_header(&header_line) {
        return Err(ParseError::NotStatsFormat);
    }

    let format = split::detect_format(&header_line);
    let (headers, values) = match format {
        WireFormat::Delimited => (
            split::split_delimited(&header_line),
            split::split_delimited(&values_line),
        ),
        WireFormat::Spaced => (
            split::split_spaced_header(&header_line).ok_or(ParseError::NotStatsFormat)?,
            split::split_spaced_values(&values_line)?,
        ),
    };

    if headers.len() != values.len() {
        debug!(
            headers = headers.len(),
            values = values.len(),
            "header/value count mismatch"
        );
        return Err(ParseError::NotStatsFormat);
    }

    let mut record = pair_fields(&headers, &values, format)?;
    if record.field_count() < MIN_STAT_FIELDS {
        return Err(ParseError::NotStatsFormat);
    }

    rules::apply(&mut record, today)?;
    Ok(record)
}

fn is_known_header(header_line: &str) -> bool {
    let lower = header_line.trim().to_lowercase();
    HEADER_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Pair each header with its value, promote the required head fields, and
/// type-convert the rest.
fn pair_fields(
    headers: &[String],
    values: &[String],
    format: WireFormat,
) -> Result<ParsedRecord, ParseError> {
    let mut fields: BTreeMap<u16, ParsedField> = BTreeMap::new();
    let mut warnings: Vec<Warning> = Vec::new();
    let mut next_dynamic_idx = DYNAMIC_IDX_BASE;

    let mut period_label: Option<String> = None;
    let mut agent_name: Option<String> = None;
    let mut faction_raw: Option<String> = None;
    let mut date_raw: Option<String> = None;
    let mut time_raw: Option<String> = None;
    let mut level: Option<i64> = None;

    for (header, value) in headers.iter().zip(values.iter()) {
        let value = value.trim();

        let Some(def) = catalog::by_name(header) else {
            // Only the delimited shape can carry trustworthy unknown columns;
            // the spaced splitter already rejected unknown header text.
            let idx = next_dynamic_idx;
            next_dynamic_idx += 1;
            let typed = match catalog::infer_kind(value) {
                ValueKind::Numeric => TypedValue::Num(parse_numeric(value).unwrap_or(0)),
                ValueKind::Text => TypedValue::Text(value.to_string()),
            };
            warnings.push(Warning {
                kind: WarningKind::UnknownStat,
                message: format!("unknown stat '{header}' stored under index {idx}"),
            });
            fields.insert(idx, ParsedField { name: header.clone(), value: typed });
            continue;
        };

        match def.idx {
            IDX_TIME_SPAN => period_label = Some(value.to_string()),
            IDX_AGENT_NAME => agent_name = Some(value.to_string()),
            IDX_FACTION => faction_raw = Some(value.to_string()),
            IDX_DATE => date_raw = Some(value.to_string()),
            IDX_TIME => time_raw = Some(value.to_string()),
            idx => {
                let typed = match def.kind {
                    ValueKind::Numeric => {
                        let n = parse_numeric(value).ok_or_else(|| ParseError::InvalidNumeric {
                            stat_idx: idx,
                            name: def.name.to_string(),
                            value: value.to_string(),
                        })?;
                        if idx == IDX_LEVEL {
                            level = Some(n);
                        }
                        TypedValue::Num(n)
                    }
                    ValueKind::Text => TypedValue::Text(value.to_string()),
                };
                fields.insert(idx, ParsedField { name: def.name.to_string(), value: typed });
            }
        }
    }

    let period_label = period_label.ok_or(ParseError::MissingRequiredField("time span"))?;
    if !LIFETIME_LABELS.contains(&period_label.to_uppercase().as_str()) {
        return Err(ParseError::WrongPeriod(period_label));
    }

    let agent_name = agent_name
        .filter(|n| !n.is_empty())
        .ok_or(ParseError::MissingRequiredField("agent name"))?;

    let faction_raw = faction_raw
        .filter(|f| !f.is_empty())
        .ok_or(ParseError::MissingRequiredField("faction"))?;
    let faction = Faction::parse_literal(&faction_raw)
        .ok_or(ParseError::InvalidFaction(faction_raw))?;

    let date = date_raw
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or(ParseError::MissingRequiredField("date"))?;
    let time = time_raw
        .as_deref()
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
        .ok_or(ParseError::MissingRequiredField("time"))?;

    Ok(ParsedRecord {
        agent_name,
        faction,
        date,
        time,
        level,
        fields,
        warnings,
        format,
    })
}

/// Parse a numeric stat value: thousands separators stripped, non-negative.
fn parse_numeric(raw: &str) -> Option<i64> {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<u64>().ok().and_then(|v| i64::try_from(v).ok())
}
