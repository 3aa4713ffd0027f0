//! Attendance and visitor ledgers
//!
//! A ledger is an insertion-ordered list of rows keyed by `(date, leader)`
//! slices. The only mutation is [`Ledger::upsert`], which swaps a whole slice:
//! submitting the same chamada twice leaves the ledger exactly as one
//! submission would.
//!
//! At most one attendance record exists per `(date, leader, person)` and at
//! most one visitor count per `(date, leader)`. Both `upsert` and the loaders
//! enforce this, so "two most recent records" never has to break a tie.

use crate::dates::{normalize, DateKey};
use crate::diagnostics::{Diagnostic, Table};
use crate::roster::PersonType;
use crate::{Error, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// Row stored in a [`Ledger`]
pub trait LedgerEntry {
    fn date(&self) -> DateKey;
    fn leader(&self) -> &str;
    /// Person within the slice; `None` for tables holding one row per slice
    fn person(&self) -> Option<&str>;
}

/// Presence of one person at one week's cell meeting and service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: DateKey,
    pub leader: String,
    pub person: String,
    pub person_type: PersonType,
    pub cell_present: bool,
    pub service_present: bool,
}

impl LedgerEntry for AttendanceRecord {
    fn date(&self) -> DateKey {
        self.date
    }

    fn leader(&self) -> &str {
        &self.leader
    }

    fn person(&self) -> Option<&str> {
        Some(&self.person)
    }
}

/// First-time visitors brought by one leader in one week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorCount {
    pub date: DateKey,
    pub leader: String,
    pub cell_visitors: u32,
    pub service_visitors: u32,
}

impl LedgerEntry for VisitorCount {
    fn date(&self) -> DateKey {
        self.date
    }

    fn leader(&self) -> &str {
        &self.leader
    }

    fn person(&self) -> Option<&str> {
        None
    }
}

/// Attendance row as persisted in the `Presencas` table
///
/// Flags are `None` when the stored cell held a number that is not whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttendanceRow {
    #[serde(rename = "Data")]
    pub date: String,
    #[serde(rename = "Líder")]
    pub leader: String,
    #[serde(rename = "Nome")]
    pub name: String,
    #[serde(rename = "Tipo")]
    pub person_type: String,
    /// 1 = present at the cell meeting
    #[serde(rename = "Célula", deserialize_with = "sheet_integer")]
    pub cell: Option<i64>,
    /// 1 = present at the service
    #[serde(rename = "Culto", deserialize_with = "sheet_integer")]
    pub service: Option<i64>,
}

/// Visitor row as persisted in the `Visitantes` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVisitorRow {
    #[serde(rename = "Data")]
    pub date: String,
    #[serde(rename = "Líder")]
    pub leader: String,
    #[serde(rename = "Célula", deserialize_with = "sheet_integer")]
    pub cell: Option<i64>,
    #[serde(rename = "Culto", deserialize_with = "sheet_integer")]
    pub service: Option<i64>,
}

/// Numeric sheet cell: integer, integral float, boolean or numeric text
///
/// Blank cells read as 0. A value that is numeric but not whole reads as
/// `None` so only its row is rejected.
fn sheet_integer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SheetInteger;

    impl<'de> Visitor<'de> for SheetInteger {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a whole number, a boolean or numeric text")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<Self::Value, E> {
            Ok(Some(i64::from(value)))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Self::Value, E> {
            Ok(Some(value))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Self::Value, E> {
            Ok(i64::try_from(value).ok())
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Self::Value, E> {
            Ok(whole_number(value))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Self::Value, E> {
            let value = value.trim();
            if value.is_empty() {
                return Ok(Some(0));
            }
            if let Ok(n) = value.parse::<i64>() {
                return Ok(Some(n));
            }
            Ok(value.parse::<f64>().ok().and_then(whole_number))
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(Some(0))
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(Some(0))
        }

        fn visit_some<D2: Deserializer<'de>>(self, deserializer: D2) -> std::result::Result<Self::Value, D2::Error> {
            sheet_integer(deserializer)
        }
    }

    deserializer.deserialize_any(SheetInteger)
}

fn whole_number(value: f64) -> Option<i64> {
    // i64::MAX is not representable as f64; the bound is exclusive
    if value.is_finite() && value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// Result of a slice replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub removed: usize,
    pub inserted: usize,
}

/// Insertion-ordered rows with whole-slice replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger<R> {
    records: Vec<R>,
}

impl<R> Default for Ledger<R> {
    fn default() -> Self {
        Self { records: Vec::new() }
    }
}

pub type AttendanceLedger = Ledger<AttendanceRecord>;
pub type VisitorLedger = Ledger<VisitorCount>;

impl<R: LedgerEntry> Ledger<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the `(date, leader)` slice with `rows`
    ///
    /// Rows are validated before anything is removed: each must belong to the
    /// given pair and no person may appear twice (a visitor slice holds at most
    /// one row). On error the ledger is left untouched.
    pub fn upsert(&mut self, date: DateKey, leader: &str, rows: Vec<R>) -> Result<UpsertOutcome> {
        validate_slice(date, leader, &rows)?;

        let before = self.records.len();
        self.records
            .retain(|r| !(r.date() == date && r.leader() == leader));
        let removed = before - self.records.len();
        let inserted = rows.len();
        self.records.extend(rows);

        debug!(
            "Upserted slice {} / {}: removed {}, inserted {}",
            date, leader, removed, inserted
        );
        Ok(UpsertOutcome { removed, inserted })
    }

    /// Every record matching `predicate`, in insertion order
    pub fn records_for<P>(&self, predicate: P) -> Vec<&R>
    where
        P: Fn(&R) -> bool,
    {
        self.records.iter().filter(|r| predicate(*r)).collect()
    }

    /// Records of one `(date, leader)` slice
    pub fn slice(&self, date: DateKey, leader: &str) -> Vec<&R> {
        self.records_for(|r| r.date() == date && r.leader() == leader)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct date keys, ascending
    pub fn dates(&self) -> Vec<DateKey> {
        self.records
            .iter()
            .map(|r| r.date())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Build a ledger from loaded rows, keeping the later row on duplicate keys
    fn collect_last_wins<I>(rows: I, table: Table, diagnostics: &mut Vec<Diagnostic>) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        let mut records: Vec<R> = Vec::new();
        let mut index: HashMap<(DateKey, String, Option<String>), usize> = HashMap::new();

        for row in rows {
            let key = (
                row.date(),
                row.leader().to_string(),
                row.person().map(str::to_string),
            );
            match index.get(&key) {
                Some(&pos) => {
                    warn!(
                        "{}: duplicate row for {} / {}, keeping the later one",
                        table, key.0, key.1
                    );
                    diagnostics.push(Diagnostic::DuplicateRow {
                        table,
                        date: key.0,
                        leader: key.1,
                        person: key.2,
                    });
                    records[pos] = row;
                }
                None => {
                    index.insert(key, records.len());
                    records.push(row);
                }
            }
        }

        Self { records }
    }
}

impl<'a, R> IntoIterator for &'a Ledger<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn validate_slice<R: LedgerEntry>(date: DateKey, leader: &str, rows: &[R]) -> Result<()> {
    let mut seen = HashSet::new();
    for row in rows {
        if row.date() != date || row.leader() != leader {
            return Err(Error::InvalidInput(format!(
                "row for {} / {} submitted in slice {} / {}",
                row.date(),
                row.leader(),
                date,
                leader
            )));
        }
        if !seen.insert(row.person()) {
            return Err(Error::InvalidInput(match row.person() {
                Some(person) => format!("{} appears twice in slice {} / {}", person, date, leader),
                None => format!("more than one row in slice {} / {}", date, leader),
            }));
        }
    }
    Ok(())
}

impl AttendanceLedger {
    /// Normalize loaded rows into a ledger
    ///
    /// Rows with an unparseable date, a blank leader/name or an unknown type
    /// are dropped and reported.
    pub fn from_raw(rows: Vec<RawAttendanceRow>) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let records: Vec<AttendanceRecord> = rows
            .into_iter()
            .filter_map(|row| match AttendanceRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(diagnostic) => {
                    warn!("{}", diagnostic);
                    diagnostics.push(diagnostic);
                    None
                }
            })
            .collect();

        let ledger = Self::collect_last_wins(records, Table::Attendance, &mut diagnostics);
        (ledger, diagnostics)
    }

    /// Rows for a full-table replacement, dates in ISO form
    pub fn to_raw(&self) -> Vec<RawAttendanceRow> {
        self.records
            .iter()
            .map(|r| RawAttendanceRow {
                date: r.date.to_string(),
                leader: r.leader.clone(),
                name: r.person.clone(),
                person_type: r.person_type.label().to_string(),
                cell: Some(i64::from(r.cell_present)),
                service: Some(i64::from(r.service_present)),
            })
            .collect()
    }
}

impl VisitorLedger {
    /// Normalize loaded rows into a ledger
    pub fn from_raw(rows: Vec<RawVisitorRow>) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let records: Vec<VisitorCount> = rows
            .into_iter()
            .filter_map(|row| match VisitorCount::try_from(row) {
                Ok(count) => Some(count),
                Err(diagnostic) => {
                    warn!("{}", diagnostic);
                    diagnostics.push(diagnostic);
                    None
                }
            })
            .collect();

        let ledger = Self::collect_last_wins(records, Table::Visitors, &mut diagnostics);
        (ledger, diagnostics)
    }

    pub fn to_raw(&self) -> Vec<RawVisitorRow> {
        self.records
            .iter()
            .map(|v| RawVisitorRow {
                date: v.date.to_string(),
                leader: v.leader.clone(),
                cell: Some(i64::from(v.cell_visitors)),
                service: Some(i64::from(v.service_visitors)),
            })
            .collect()
    }
}

impl TryFrom<RawAttendanceRow> for AttendanceRecord {
    type Error = Diagnostic;

    fn try_from(row: RawAttendanceRow) -> std::result::Result<Self, Diagnostic> {
        let table = Table::Attendance;
        let date = normalize(&row.date).map_err(|_| Diagnostic::UnparseableDate {
            table,
            raw: row.date.clone(),
        })?;
        let leader = non_blank(&row.leader, table, "leader")?;
        let person = non_blank(&row.name, table, "name")?;
        let person_type = row
            .person_type
            .parse::<PersonType>()
            .map_err(|e| Diagnostic::MalformedRow {
                table,
                reason: e.to_string(),
            })?;

        let flag = |value: Option<i64>, field: &str| match value {
            Some(0) => Ok(false),
            Some(n) if n > 0 => Ok(true),
            other => Err(Diagnostic::MalformedRow {
                table,
                reason: format!("{} flag {:?} for {} on {}", field, other, person, date),
            }),
        };
        let cell_present = flag(row.cell, "cell")?;
        let service_present = flag(row.service, "service")?;

        Ok(Self {
            date,
            leader,
            person,
            person_type,
            cell_present,
            service_present,
        })
    }
}

impl TryFrom<RawVisitorRow> for VisitorCount {
    type Error = Diagnostic;

    fn try_from(row: RawVisitorRow) -> std::result::Result<Self, Diagnostic> {
        let table = Table::Visitors;
        let date = normalize(&row.date).map_err(|_| Diagnostic::UnparseableDate {
            table,
            raw: row.date.clone(),
        })?;
        let leader = non_blank(&row.leader, table, "leader")?;
        let count = |value: Option<i64>| {
            value
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| Diagnostic::MalformedRow {
                    table,
                    reason: format!("visitor count {:?} for {} on {}", value, leader, date),
                })
        };

        let cell_visitors = count(row.cell)?;
        let service_visitors = count(row.service)?;

        Ok(Self {
            date,
            leader,
            cell_visitors,
            service_visitors,
        })
    }
}

fn non_blank(value: &str, table: Table, field: &str) -> std::result::Result<String, Diagnostic> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Diagnostic::MalformedRow {
            table,
            reason: format!("blank {}", field),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(d: u32) -> DateKey {
        DateKey::from_ymd(2026, 2, d).unwrap()
    }

    fn record(d: u32, leader: &str, person: &str, cell: bool) -> AttendanceRecord {
        AttendanceRecord {
            date: key(d),
            leader: leader.to_string(),
            person: person.to_string(),
            person_type: PersonType::Member,
            cell_present: cell,
            service_present: false,
        }
    }

    fn visitors(d: u32, leader: &str, cell: u32) -> VisitorCount {
        VisitorCount {
            date: key(d),
            leader: leader.to_string(),
            cell_visitors: cell,
            service_visitors: 0,
        }
    }

    fn raw(date: &str, leader: &str, name: &str, cell: i64) -> RawAttendanceRow {
        RawAttendanceRow {
            date: date.to_string(),
            leader: leader.to_string(),
            name: name.to_string(),
            person_type: "Membro".to_string(),
            cell: Some(cell),
            service: Some(0),
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let rows = vec![record(7, "Ana", "Beto", true), record(7, "Ana", "Carla", false)];

        let mut once = AttendanceLedger::new();
        once.upsert(key(7), "Ana", rows.clone()).unwrap();

        let mut twice = once.clone();
        let outcome = twice.upsert(key(7), "Ana", rows).unwrap();

        assert_eq!(outcome, UpsertOutcome { removed: 2, inserted: 2 });
        assert_eq!(once, twice);
    }

    #[test]
    fn test_upsert_replaces_whole_slice_only() {
        let mut ledger = AttendanceLedger::new();
        ledger
            .upsert(key(7), "Ana", vec![record(7, "Ana", "Beto", true), record(7, "Ana", "Carla", true)])
            .unwrap();
        ledger.upsert(key(7), "Davi", vec![record(7, "Davi", "Eva", true)]).unwrap();
        ledger.upsert(key(14), "Ana", vec![record(14, "Ana", "Beto", true)]).unwrap();

        ledger.upsert(key(7), "Ana", vec![record(7, "Ana", "Beto", false)]).unwrap();

        assert_eq!(ledger.len(), 3);
        let slice = ledger.slice(key(7), "Ana");
        assert_eq!(slice.len(), 1);
        assert!(!slice[0].cell_present);
        assert_eq!(ledger.slice(key(7), "Davi").len(), 1);
        assert_eq!(ledger.slice(key(14), "Ana").len(), 1);
    }

    #[test]
    fn test_upsert_rejects_foreign_rows_without_mutating() {
        let mut ledger = AttendanceLedger::new();
        ledger.upsert(key(7), "Ana", vec![record(7, "Ana", "Beto", true)]).unwrap();
        let before = ledger.clone();

        let wrong_leader = ledger.upsert(key(7), "Ana", vec![record(7, "Davi", "Eva", true)]);
        assert!(matches!(wrong_leader, Err(Error::InvalidInput(_))));

        let wrong_date = ledger.upsert(key(7), "Ana", vec![record(14, "Ana", "Beto", true)]);
        assert!(matches!(wrong_date, Err(Error::InvalidInput(_))));

        assert_eq!(ledger, before);
    }

    #[test]
    fn test_upsert_rejects_duplicate_person() {
        let mut ledger = AttendanceLedger::new();
        let result = ledger.upsert(
            key(7),
            "Ana",
            vec![record(7, "Ana", "Beto", true), record(7, "Ana", "Beto", false)],
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_visitor_slice_holds_one_row() {
        let mut ledger = VisitorLedger::new();
        ledger.upsert(key(7), "Ana", vec![visitors(7, "Ana", 2)]).unwrap();
        ledger.upsert(key(7), "Ana", vec![visitors(7, "Ana", 3)]).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.iter().next().unwrap().cell_visitors, 3);

        let result = ledger.upsert(key(7), "Ana", vec![visitors(7, "Ana", 1), visitors(7, "Ana", 1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_records_for_and_dates() {
        let mut ledger = AttendanceLedger::new();
        ledger.upsert(key(14), "Ana", vec![record(14, "Ana", "Beto", true)]).unwrap();
        ledger.upsert(key(7), "Ana", vec![record(7, "Ana", "Beto", false)]).unwrap();

        let present = ledger.records_for(|r| r.cell_present);
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].date, key(14));
        assert_eq!(ledger.dates(), vec![key(7), key(14)]);
    }

    #[test]
    fn test_from_raw_drops_bad_dates_with_diagnostic() {
        let rows = vec![
            raw("07/02/2026", "Ana", "Beto", 1),
            raw("sábado", "Ana", "Carla", 1),
            raw("2026-02-14", "Ana", "Beto", 0),
        ];
        let (ledger, diagnostics) = AttendanceLedger::from_raw(rows);

        assert_eq!(ledger.len(), 2);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnparseableDate {
                table: Table::Attendance,
                raw: "sábado".to_string()
            }]
        );
    }

    #[test]
    fn test_from_raw_collapses_duplicates_keeping_later() {
        // Same week written twice with different spellings of the date
        let rows = vec![
            raw("07/02/2026", "Ana", "Beto", 0),
            raw("2026-02-07 00:00:00", "Ana", "Beto", 1),
        ];
        let (ledger, diagnostics) = AttendanceLedger::from_raw(rows);

        assert_eq!(ledger.len(), 1);
        assert!(ledger.iter().next().unwrap().cell_present);
        assert!(matches!(diagnostics[0], Diagnostic::DuplicateRow { .. }));
    }

    #[test]
    fn test_from_raw_rejects_unknown_type_and_blank_names() {
        let mut unknown = raw("07/02/2026", "Ana", "Beto", 1);
        unknown.person_type = "Visitante".to_string();
        let blank = raw("07/02/2026", " ", "Carla", 1);

        let (ledger, diagnostics) = AttendanceLedger::from_raw(vec![unknown, blank]);
        assert!(ledger.is_empty());
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| matches!(d, Diagnostic::MalformedRow { .. })));
    }

    #[test]
    fn test_raw_round_trip_uses_iso_dates() {
        let (ledger, _) = AttendanceLedger::from_raw(vec![raw("07/02/2026", "Ana", "Beto", 1)]);
        let rows = ledger.to_raw();
        assert_eq!(rows[0].date, "2026-02-07");
        assert_eq!(rows[0].cell, Some(1));
        assert_eq!(AttendanceLedger::from_raw(rows).0, ledger);
    }

    #[test]
    fn test_visitor_from_raw_rejects_negative_counts() {
        let rows = vec![
            RawVisitorRow { date: "07/02/2026".into(), leader: "Ana".into(), cell: Some(-1), service: Some(0) },
            RawVisitorRow { date: "14/02/2026".into(), leader: "Ana".into(), cell: Some(2), service: Some(1) },
        ];
        let (ledger, diagnostics) = VisitorLedger::from_raw(rows);
        assert_eq!(ledger.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(ledger.to_raw()[0].date, "2026-02-14");
    }

    #[test]
    fn test_sheet_numbers_accept_floats_booleans_and_text() {
        let json = r#"[
            {"Data": "07/02/2026", "Líder": "Ana", "Nome": "Ana", "Tipo": "Membro", "Célula": 1.0, "Culto": 0.0},
            {"Data": "07/02/2026", "Líder": "Ana", "Nome": "Beto", "Tipo": "Membro", "Célula": true, "Culto": "1"},
            {"Data": "07/02/2026", "Líder": "Ana", "Nome": "Carla", "Tipo": "Membro", "Célula": null, "Culto": ""}
        ]"#;
        let rows: Vec<RawAttendanceRow> = serde_json::from_str(json).unwrap();
        let (ledger, diagnostics) = AttendanceLedger::from_raw(rows);

        assert!(diagnostics.is_empty());
        let flags: Vec<(bool, bool)> = ledger.iter().map(|r| (r.cell_present, r.service_present)).collect();
        assert_eq!(flags, vec![(true, false), (true, true), (false, false)]);
    }

    #[test]
    fn test_fractional_or_negative_numbers_reject_only_their_row() {
        let json = r#"[
            {"Data": "07/02/2026", "Líder": "Ana", "Nome": "Ana", "Tipo": "Membro", "Célula": 0.5, "Culto": 0},
            {"Data": "07/02/2026", "Líder": "Ana", "Nome": "Beto", "Tipo": "Membro", "Célula": -1, "Culto": 0},
            {"Data": "07/02/2026", "Líder": "Ana", "Nome": "Carla", "Tipo": "Membro", "Célula": 1, "Culto": 1}
        ]"#;
        let rows: Vec<RawAttendanceRow> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].cell, None);

        let (ledger, diagnostics) = AttendanceLedger::from_raw(rows);
        assert_eq!(ledger.len(), 1);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| matches!(d, Diagnostic::MalformedRow { table: Table::Attendance, .. })));

        let visitors: Vec<RawVisitorRow> = serde_json::from_str(
            r#"[{"Data": "07/02/2026", "Líder": "Ana", "Célula": 2.0, "Culto": 1.5}]"#,
        )
        .unwrap();
        let (ledger, diagnostics) = VisitorLedger::from_raw(visitors);
        assert!(ledger.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }
}
