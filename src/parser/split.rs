//! Wire-shape detection and line splitting for the two accepted formats.
//!
//! Exports arrive either tab-delimited or whitespace-only. The whitespace
//! variant is ambiguous on field count alone (agent names and stat labels
//! contain spaces), so field boundaries are reconstructed by anchoring on
//! the fixed-format date and time tokens.

use crate::catalog;
use crate::error::ParseError;
use crate::types::WireFormat;
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex"));
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}:\d{2}$").expect("time regex"));
static PERIOD_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bALL\s?TIME\b").expect("period regex"));

/// Catalog names sorted longest-first so greedy header matching never stops
/// at a shorter prefix of a longer label.
static NAMES_BY_LEN: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut names: Vec<&'static str> = catalog::all().iter().map(|s| s.name).collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    names
});

/// Normalize pasted input: strip wrapping quotes, collapse runs of spaces
/// and blank lines.
pub fn clean_input(text: &str) -> String {
    let trimmed = text.trim().trim_matches(|c| c == '\'' || c == '"');
    let mut out = String::with_capacity(trimmed.len());
    let mut prev_space = false;
    let mut prev_newline = false;
    for c in trimmed.chars() {
        match c {
            ' ' => {
                if !prev_space {
                    out.push(' ');
                }
                prev_space = true;
                prev_newline = false;
            }
            '\n' => {
                if !prev_newline {
                    out.push('\n');
                }
                prev_newline = true;
                prev_space = false;
            }
            '\r' => {}
            _ => {
                out.push(c);
                prev_space = false;
                prev_newline = false;
            }
        }
    }
    out.trim().to_string()
}

/// Separate the header line from the values line.
///
/// Two-line input is taken as-is; single-line input is split at the period
/// label, which always starts the values section.
pub fn split_sections(text: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    if lines.len() >= 2 {
        return Some((lines[0].trim().to_string(), lines[1].trim().to_string()));
    }

    let single = *lines.first()?;
    let m = PERIOD_SPLIT_RE.find(single)?;
    if m.start() == 0 {
        return None;
    }
    Some((
        single[..m.start()].trim().to_string(),
        single[m.start()..].trim().to_string(),
    ))
}

/// Pick the parse strategy by structural inspection of the header line.
pub fn detect_format(header_line: &str) -> WireFormat {
    if header_line.contains('\t') {
        WireFormat::Delimited
    } else {
        WireFormat::Spaced
    }
}

/// Split a tab-delimited line into trimmed, non-empty fields.
pub fn split_delimited(line: &str) -> Vec<String> {
    line.split('\t')
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(|f| f.to_string())
        .collect()
}

/// Reconstruct stat names from a whitespace-only header line by greedy
/// longest-first matching against the catalog.
///
/// Returns None when any stretch of the line resolves to no known name;
/// ambiguity here is a validation failure, not a guess.
pub fn split_spaced_header(line: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let matched = NAMES_BY_LEN.iter().find(|name| {
            let n = name.len();
            rest.len() >= n
                && rest.is_char_boundary(n)
                && rest[..n].eq_ignore_ascii_case(name)
                && (rest.len() == n || rest.as_bytes()[n].is_ascii_whitespace())
        })?;
        out.push((*matched).to_string());
        rest = rest[matched.len()..].trim_start();
    }

    Some(out)
}

/// Reconstruct field values from a whitespace-only values line.
///
/// The date and time tokens are the anchors: the faction sits immediately
/// before the date, the agent name is everything between the period label
/// and the faction, and the numeric tail follows the time.
pub fn split_spaced_values(line: &str) -> Result<Vec<String>, ParseError> {
    let tokens: Vec<String> = line
        .split_whitespace()
        .map(|t| t.trim_matches('"').to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return Err(ParseError::NotStatsFormat);
    }

    // Period label: "ALL TIME" spans two tokens, "LAST n DAYS" three, the
    // rest are single tokens.
    let consumed = if tokens.len() >= 2
        && tokens[0].eq_ignore_ascii_case("all")
        && tokens[1].eq_ignore_ascii_case("time")
    {
        2
    } else if tokens.len() >= 3
        && tokens[0].eq_ignore_ascii_case("last")
        && (tokens[2].eq_ignore_ascii_case("days") || tokens[2].eq_ignore_ascii_case("day"))
    {
        3
    } else {
        1
    };
    let label = tokens[..consumed].join(" ");

    let date_idx = tokens
        .iter()
        .enumerate()
        .skip(consumed)
        .find(|(_, t)| DATE_RE.is_match(t))
        .map(|(i, _)| i)
        .ok_or(ParseError::MissingRequiredField("date"))?;

    if date_idx + 1 >= tokens.len() || !TIME_RE.is_match(&tokens[date_idx + 1]) {
        return Err(ParseError::MissingRequiredField("time"));
    }

    // At least one agent-name token plus the faction token must sit between
    // the period label and the date anchor.
    if date_idx < consumed + 2 {
        return Err(ParseError::MissingRequiredField("agent name"));
    }

    let faction = tokens[date_idx - 1].clone();
    let agent_name = tokens[consumed..date_idx - 1].join(" ");

    let mut values = vec![
        label,
        agent_name,
        faction,
        tokens[date_idx].clone(),
        tokens[date_idx + 1].clone(),
    ];
    values.extend(tokens[date_idx + 2..].iter().cloned());
    Ok(values)
}
