//! Absence and visitor alerts
//!
//! Both alerts use the same strict rule: look at the two most recent records
//! and fire only if both exist and both match. One record is not enough
//! history to call anything an absence.

use crate::ledger::{AttendanceLedger, LedgerEntry, VisitorLedger};
use crate::roster::{LeaderSet, PersonType, RosterStore};
use serde::Serialize;
use std::collections::BTreeMap;

/// Person absent from the cell meeting in their last two recorded weeks
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AbsenceAlert {
    pub leader: String,
    pub person: String,
    /// Current roster type; `None` once the person has left the roster
    pub person_type: Option<PersonType>,
}

/// Read-only alert computation over the roster and ledgers
pub struct AlertDetector<'a> {
    roster: &'a RosterStore,
    attendance: &'a AttendanceLedger,
    visitors: &'a VisitorLedger,
}

impl<'a> AlertDetector<'a> {
    pub fn new(
        roster: &'a RosterStore,
        attendance: &'a AttendanceLedger,
        visitors: &'a VisitorLedger,
    ) -> Self {
        Self {
            roster,
            attendance,
            visitors,
        }
    }

    /// People whose two most recent records both show `cell_present == false`
    ///
    /// Sorted by leader, then person.
    pub fn person_absence_alerts(&self, leaders: &LeaderSet) -> Vec<AbsenceAlert> {
        let mut history: BTreeMap<(&str, &str), Vec<_>> = BTreeMap::new();
        for record in self.attendance.records_for(|r| leaders.contains(&r.leader)) {
            history
                .entry((record.leader.as_str(), record.person.as_str()))
                .or_default()
                .push(record);
        }

        history
            .into_iter()
            .filter(|(_, records)| last_two_match(records, |r| !r.cell_present))
            .map(|((leader, person), _)| AbsenceAlert {
                leader: leader.to_string(),
                person: person.to_string(),
                person_type: self.roster.person_type(leader, person),
            })
            .collect()
    }

    /// Leaders whose two most recent visitor records both have zero cell visitors
    pub fn no_visitor_alerts(&self, leaders: &LeaderSet) -> Vec<String> {
        let mut history: BTreeMap<&str, Vec<_>> = BTreeMap::new();
        for count in self.visitors.records_for(|v| leaders.contains(&v.leader)) {
            history.entry(count.leader.as_str()).or_default().push(count);
        }

        history
            .into_iter()
            .filter(|(_, counts)| last_two_match(counts, |v| v.cell_visitors == 0))
            .map(|(leader, _)| leader.to_string())
            .collect()
    }
}

/// True iff there are at least two records and the two latest both match
///
/// The sort is stable, so equal dates keep insertion order.
fn last_two_match<R, P>(records: &[&R], predicate: P) -> bool
where
    R: LedgerEntry,
    P: Fn(&R) -> bool,
{
    if records.len() < 2 {
        return false;
    }
    let mut latest: Vec<&R> = records.to_vec();
    latest.sort_by(|a, b| b.date().cmp(&a.date()));
    latest.iter().take(2).all(|r| predicate(*r))
}
