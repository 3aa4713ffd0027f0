//! Non-fatal load diagnostics
//!
//! Loading never fails because of a bad row or an unreachable table. What was
//! dropped or degraded is reported back to the caller as a [`Diagnostic`].

use crate::dates::DateKey;
use std::fmt;

/// The three persisted tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Attendance,
    Visitors,
    Roster,
}

impl Table {
    /// Sheet name in the remote store
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Table::Attendance => "Presencas",
            Table::Visitors => "Visitantes",
            Table::Roster => "Membros",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sheet_name())
    }
}

/// Something the loader dropped or degraded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Row whose date matched no known format; the row was dropped
    UnparseableDate { table: Table, raw: String },
    /// Row with a blank leader/name, unknown person type or negative count
    MalformedRow { table: Table, reason: String },
    /// Two rows for the same key; the later one was kept
    DuplicateRow {
        table: Table,
        date: DateKey,
        leader: String,
        person: Option<String>,
    },
    /// Table could not be read; an empty table was used instead
    TableUnavailable { table: Table, reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnparseableDate { table, raw } => {
                write!(f, "{}: dropped row with unrecognized date {:?}", table, raw)
            }
            Diagnostic::MalformedRow { table, reason } => {
                write!(f, "{}: dropped malformed row ({})", table, reason)
            }
            Diagnostic::DuplicateRow { table, date, leader, person } => match person {
                Some(person) => write!(
                    f,
                    "{}: duplicate row for {} / {} / {}, kept the later one",
                    table, date, leader, person
                ),
                None => write!(
                    f,
                    "{}: duplicate row for {} / {}, kept the later one",
                    table, date, leader
                ),
            },
            Diagnostic::TableUnavailable { table, reason } => {
                write!(f, "{}: unavailable, using empty table ({})", table, reason)
            }
        }
    }
}
