//! Date normalization and meeting calendar helpers
//!
//! Sheet dates are typed by hand, so the same table mixes `07/02/2026`,
//! `2026-02-07` and exported timestamps such as `2026-02-07 00:00:00`.
//! Everything is reduced to a [`DateKey`] before it reaches a ledger; grouping
//! and alerting rely on key equality, so two spellings of one calendar day
//! must always produce the same key.
//!
//! Parsing tries the day-first (Brazilian) convention before falling back to
//! locale-neutral ISO forms. A string that matches neither is rejected.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Day-first formats, tried first
const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];
/// Two-digit years only make sense day-first (`07/02/26`)
const DAY_FIRST_SHORT_YEAR_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];

/// Locale-neutral fallback formats
const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Years outside this window are treated as a misparse (`%Y` happily reads `26`)
const MIN_PLAUSIBLE_YEAR: i32 = 1900;
const MAX_PLAUSIBLE_YEAR: i32 = 2999;

/// Portuguese month names as shown in the month selector
pub const MONTH_NAMES_PT: [&str; 12] = [
    "Janeiro", "Fevereiro", "Março", "Abril", "Maio", "Junho", "Julho", "Agosto",
    "Setembro", "Outubro", "Novembro", "Dezembro",
];

const MONTH_NAMES_EN: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december",
];

/// Canonical calendar-day key shared by every ledger row
///
/// Displays and serializes as an ISO date (`YYYY-MM-DD`). Deserialization
/// accepts any format [`normalize`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build a key from numeric parts, `None` for an impossible date
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Month this key falls in
    pub fn month(&self) -> YearMonth {
        YearMonth {
            year: self.0.year(),
            month: self.0.month(),
        }
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        normalize(s)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        normalize(&raw).map_err(serde::de::Error::custom)
    }
}

/// Normalize raw date text into a [`DateKey`]
///
/// Day-first parsing is attempted before the ISO fallback, so `07/02/2026`
/// is the 7th of February. Any time-of-day component is discarded.
///
/// # Examples
///
/// ```
/// use distrito_common::dates::normalize;
///
/// let a = normalize("07/02/2026").unwrap();
/// let b = normalize("2026-02-07").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "2026-02-07");
/// assert!(normalize("sábado passado").is_err());
/// ```
pub fn normalize(raw: &str) -> Result<DateKey> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::DateParse(raw.to_string()));
    }

    parse_day_first(text)
        .or_else(|| parse_fallback(text))
        .map(DateKey)
        .ok_or_else(|| Error::DateParse(raw.to_string()))
}

fn parse_day_first(text: &str) -> Option<NaiveDate> {
    parse_date_formats(text, DAY_FIRST_DATE_FORMATS)
        .or_else(|| parse_datetime_formats(text, DAY_FIRST_DATETIME_FORMATS))
        .or_else(|| parse_date_formats(text, DAY_FIRST_SHORT_YEAR_FORMATS))
}

fn parse_fallback(text: &str) -> Option<NaiveDate> {
    parse_date_formats(text, FALLBACK_DATE_FORMATS)
        .or_else(|| parse_datetime_formats(text, FALLBACK_DATETIME_FORMATS))
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.date_naive())
                .filter(is_plausible)
        })
}

fn parse_date_formats(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .find(is_plausible)
}

fn parse_datetime_formats(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .filter_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
        .find(is_plausible)
}

fn is_plausible(date: &NaiveDate) -> bool {
    (MIN_PLAUSIBLE_YEAR..=MAX_PLAUSIBLE_YEAR).contains(&date.year())
}

/// A calendar month, the unit of the monthly series and rollups
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Fails for a month outside 1..=12 or a year outside 1900..=2999
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidInput(format!("month out of range: {}", month)));
        }
        if !(MIN_PLAUSIBLE_YEAR..=MAX_PLAUSIBLE_YEAR).contains(&year) {
            return Err(Error::InvalidInput(format!("year out of range: {}", year)));
        }
        Ok(Self { year, month })
    }

    /// Month containing the given key
    pub fn of(date: DateKey) -> Self {
        date.month()
    }

    /// Month of the local clock
    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> DateKey {
        // Month is validated on construction, day 1 always exists
        DateKey(NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN))
    }

    pub fn contains(&self, date: DateKey) -> bool {
        date.month() == *self
    }

    pub fn prev(&self) -> Option<Self> {
        self.minus_months(1)
    }

    /// Step back `n` months, crossing year boundaries
    ///
    /// `None` when the result falls outside the years [`YearMonth::new`]
    /// accepts.
    pub fn minus_months(&self, n: u32) -> Option<Self> {
        let index = i64::from(self.year) * 12 + i64::from(self.month) - 1 - i64::from(n);
        let year = i32::try_from(index.div_euclid(12)).ok()?;
        let month = index.rem_euclid(12) as u32 + 1;
        Self::new(year, month).ok()
    }

    /// Portuguese display name (`"Fevereiro"`)
    pub fn name_pt(&self) -> &'static str {
        MONTH_NAMES_PT[(self.month - 1) as usize]
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for YearMonth {
    type Err = Error;

    /// Parses `YYYY-MM`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("expected YYYY-MM, got {:?}", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

/// Month number for a Portuguese or English month name
///
/// Case and the cedilla in "Março" are ignored.
pub fn month_from_name(name: &str) -> Option<u32> {
    let folded = fold_text(name);
    MONTH_NAMES_PT
        .iter()
        .position(|pt| fold_text(pt) == folded)
        .or_else(|| MONTH_NAMES_EN.iter().position(|en| *en == folded))
        .map(|idx| idx as u32 + 1)
}

/// Lowercase and strip Portuguese diacritics for lenient label matching
pub(crate) fn fold_text(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'ç' => 'c',
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            other => other,
        })
        .collect()
}

/// Every Saturday of the month, the selectable chamada dates
pub fn saturdays(month: YearMonth) -> Vec<DateKey> {
    let first = month.first_day().date();
    let offset = (Weekday::Sat.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;

    let mut day = first + Duration::days(offset as i64);
    let mut result = Vec::new();
    while day.month() == month.month {
        result.push(DateKey(day));
        day += Duration::days(7);
    }
    result
}
