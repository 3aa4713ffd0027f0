//! Weekly attendance submission ("chamada") for one cell
//!
//! A chamada is what a leader fills in for one Saturday: a presence toggle for
//! the cell meeting and the service per person, plus visitor counts. It is
//! resolved against the roster into one full ledger slice, so resubmitting it
//! always replaces the previous week's answer.

use crate::dates::DateKey;
use crate::ledger::{AttendanceRecord, VisitorCount};
use crate::roster::{PersonType, RosterStore};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Presence toggles for one person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMark {
    pub person: String,
    pub cell: bool,
    pub service: bool,
}

/// First-time visitor counts for the week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisitorTally {
    pub cell: u32,
    pub service: u32,
}

/// One leader's submission for one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chamada {
    pub date: DateKey,
    pub leader: String,
    pub marks: Vec<PresenceMark>,
    pub visitors: VisitorTally,
}

impl Chamada {
    /// Empty submission; anyone left unmarked is recorded absent
    pub fn new(date: DateKey, leader: impl Into<String>) -> Self {
        Self {
            date,
            leader: leader.into(),
            marks: Vec::new(),
            visitors: VisitorTally::default(),
        }
    }

    /// Pre-filled form: the leader followed by every member, all absent
    pub fn template(roster: &RosterStore, leader: &str, date: DateKey) -> Result<Self> {
        let members = roster
            .members(leader)
            .ok_or_else(|| Error::UnknownLeader(leader.to_string()))?;

        let mut chamada = Self::new(date, leader);
        chamada.marks = std::iter::once(leader)
            .chain(members.keys().map(String::as_str))
            .map(|person| PresenceMark {
                person: person.to_string(),
                cell: false,
                service: false,
            })
            .collect();
        Ok(chamada)
    }

    /// Set (or overwrite) one person's toggles
    pub fn mark(&mut self, person: &str, cell: bool, service: bool) -> &mut Self {
        match self.marks.iter_mut().find(|m| m.person == person) {
            Some(existing) => {
                existing.cell = cell;
                existing.service = service;
            }
            None => self.marks.push(PresenceMark {
                person: person.to_string(),
                cell,
                service,
            }),
        }
        self
    }

    pub fn with_visitors(&mut self, cell: u32, service: u32) -> &mut Self {
        self.visitors = VisitorTally { cell, service };
        self
    }

    /// Resolve into the attendance slice and visitor row for `(date, leader)`
    ///
    /// Types come from the roster, the leader being `Leader`. Every roster
    /// member appears exactly once. Marks for people outside the cell, and
    /// repeated marks, are rejected.
    pub fn to_records(&self, roster: &RosterStore) -> Result<(Vec<AttendanceRecord>, VisitorCount)> {
        let leader = self.leader.as_str();
        let members = roster
            .members(leader)
            .ok_or_else(|| Error::UnknownLeader(leader.to_string()))?;

        let mut seen = HashSet::new();
        for mark in &self.marks {
            if roster.person_type(leader, &mark.person).is_none() {
                return Err(Error::InvalidInput(format!(
                    "{} is not on {}'s roster",
                    mark.person, leader
                )));
            }
            if !seen.insert(mark.person.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "{} is marked twice in the chamada for {}",
                    mark.person, self.date
                )));
            }
        }

        let everyone = std::iter::once((leader, PersonType::Leader))
            .chain(members.iter().map(|(name, t)| (name.as_str(), *t)));
        let records = everyone
            .map(|(person, person_type)| {
                let mark = self.marks.iter().find(|m| m.person == person);
                AttendanceRecord {
                    date: self.date,
                    leader: leader.to_string(),
                    person: person.to_string(),
                    person_type,
                    cell_present: mark.map_or(false, |m| m.cell),
                    service_present: mark.map_or(false, |m| m.service),
                }
            })
            .collect();

        let visitors = VisitorCount {
            date: self.date,
            leader: leader.to_string(),
            cell_visitors: self.visitors.cell,
            service_visitors: self.visitors.service,
        };
        Ok((records, visitors))
    }
}
