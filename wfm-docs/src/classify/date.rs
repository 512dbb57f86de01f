//! Month / year extraction
//!
//! The year is looked up first: a 4-digit token (or a compact `YYYYMM` /
//! `MMYYYY` token), falling back to the current year. Months are matched
//! against whole tokens only, in Spanish and English, full or abbreviated.
//! A bare number is read as a month only when it sits right next to an
//! explicit year token (`03_2025`, `2025-3`), and tokens that belong to the
//! detected employee name are never considered, so "Mar" in a surname stays
//! a surname.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const MIN_YEAR: i32 = 1990;
const MAX_YEAR: i32 = 2099;

/// Spanish month names for display, January first
pub const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

const MONTH_WORDS: [&[&str]; 12] = [
    &["enero", "ene", "january", "jan"],
    &["febrero", "feb", "february"],
    &["marzo", "mar", "march"],
    &["abril", "abr", "april", "apr"],
    &["mayo", "may"],
    &["junio", "jun", "june"],
    &["julio", "jul", "july"],
    &["agosto", "ago", "august", "aug"],
    &["septiembre", "setiembre", "sep", "sept", "september"],
    &["octubre", "oct", "october"],
    &["noviembre", "nov", "november"],
    &["diciembre", "dic", "december", "dec"],
];

/// Extracted period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedDate {
    /// 1-based month
    pub month: Option<u32>,
    pub year: i32,
    /// No year token; `year` is the current year
    pub year_inferred: bool,
}

impl DetectedDate {
    pub fn month_name(&self) -> Option<&'static str> {
        self.month.and_then(month_name)
    }
}

/// Spanish display name for a 1-based month
pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

fn parse_year(token: &str) -> Option<i32> {
    if token.len() != 4 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token
        .parse()
        .ok()
        .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
}

fn parse_numeric_month(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 2 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok().filter(|m| (1..=12).contains(m))
}

/// `202503` or `032025`
fn parse_compact(token: &str) -> Option<(i32, u32)> {
    if token.len() != 6 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if let (Some(year), Some(month)) = (parse_year(&token[..4]), parse_numeric_month(&token[4..])) {
        return Some((year, month));
    }
    match (parse_numeric_month(&token[..2]), parse_year(&token[2..])) {
        (Some(month), Some(year)) => Some((year, month)),
        _ => None,
    }
}

fn month_word(token: &str) -> Option<u32> {
    MONTH_WORDS
        .iter()
        .position(|words| words.contains(&token))
        .map(|idx| idx as u32 + 1)
}

fn unclaimed<'a>(
    tokens: &'a [String],
    excluded: &'a BTreeSet<usize>,
) -> impl Iterator<Item = (usize, &'a String)> + 'a {
    tokens
        .iter()
        .enumerate()
        .filter(move |(idx, _)| !excluded.contains(idx))
}

/// Extract month and year, skipping `excluded` token positions
pub fn extract_date(
    tokens: &[String],
    excluded: &BTreeSet<usize>,
    current_year: i32,
) -> DetectedDate {
    let mut year_at = None;
    let mut compact_month = None;
    for (idx, token) in unclaimed(tokens, excluded) {
        if let Some(year) = parse_year(token) {
            year_at = Some((idx, year));
            break;
        }
        if let Some((year, month)) = parse_compact(token) {
            year_at = Some((idx, year));
            compact_month = Some(month);
            break;
        }
    }

    let word_month = unclaimed(tokens, excluded).find_map(|(_, token)| month_word(token));

    let numeric_month = year_at.and_then(|(year_idx, _)| {
        [year_idx.checked_sub(1), year_idx.checked_add(1)]
            .into_iter()
            .flatten()
            .filter(|idx| !excluded.contains(idx))
            .find_map(|idx| tokens.get(idx).and_then(|t| parse_numeric_month(t)))
    });

    DetectedDate {
        month: word_month.or(compact_month).or(numeric_month),
        year: year_at.map_or(current_year, |(_, year)| year),
        year_inferred: year_at.is_none(),
    }
}
