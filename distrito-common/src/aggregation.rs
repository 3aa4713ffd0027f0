//! Weekly, monthly and month-over-month attendance rollups
//!
//! Everything here is a pure read over the roster and the two ledgers, so
//! results can be memoized by the caller and computed without any UI.
//!
//! Denominators follow the cell convention: a leader is an eligible
//! member-equivalent of their own cell, FA attendees are counted separately,
//! and visitors have no denominator at all.

use crate::dates::{DateKey, YearMonth};
use crate::ledger::{AttendanceLedger, AttendanceRecord, VisitorLedger};
use crate::roster::{LeaderSet, PersonType, RosterStore};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Present count against an eligible population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    pub present: u32,
    /// `None` for visitors, whose population is unbounded
    pub eligible: Option<u32>,
}

impl Tally {
    /// Fraction present, `None` without a (non-zero) denominator
    pub fn ratio(&self) -> Option<f64> {
        match self.eligible {
            Some(eligible) if eligible > 0 => Some(self.present as f64 / eligible as f64),
            _ => None,
        }
    }
}

/// Tallies for the cell meeting and the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EventTally {
    pub cell: Tally,
    pub service: Tally,
}

/// One week's attendance for a set of cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub date: DateKey,
    /// Members plus leaders
    pub members: EventTally,
    pub fa: EventTally,
    pub visitors: EventTally,
}

/// Point of a date-indexed series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub date: DateKey,
    pub cell_total: u32,
    pub service_total: u32,
}

/// Totals for one month of a comparative rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthTotal {
    pub month: YearMonth,
    pub cell_total: u32,
    pub service_total: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    cell: u32,
    service: u32,
}

impl Totals {
    fn add_presence(&mut self, record: &AttendanceRecord) {
        self.cell += record.cell_present as u32;
        self.service += record.service_present as u32;
    }

    fn add_visitors(&mut self, cell: u32, service: u32) {
        self.cell += cell;
        self.service += service;
    }
}

/// Read-only view over the roster and ledgers
pub struct AggregationEngine<'a> {
    roster: &'a RosterStore,
    attendance: &'a AttendanceLedger,
    visitors: &'a VisitorLedger,
}

impl<'a> AggregationEngine<'a> {
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

    /// Attendance of the given cells on one date
    ///
    /// Member eligibility is the roster's members plus one per filtered
    /// leader; member presence counts records typed `Member` or `Leader`.
    pub fn weekly_summary(&self, leaders: &LeaderSet, date: DateKey) -> Summary {
        let records = self
            .attendance
            .records_for(|r| r.date == date && leaders.contains(&r.leader));

        let mut members = Totals::default();
        let mut fa = Totals::default();
        for record in &records {
            match record.person_type {
                PersonType::Leader | PersonType::Member => members.add_presence(record),
                PersonType::Fa => fa.add_presence(record),
            }
        }

        let mut visitors = Totals::default();
        for count in self
            .visitors
            .records_for(|v| v.date == date && leaders.contains(&v.leader))
        {
            visitors.add_visitors(count.cell_visitors, count.service_visitors);
        }

        let member_eligible = self.roster.count_of(leaders, PersonType::Member) + leaders.len() as u32;
        let fa_eligible = self.roster.count_of(leaders, PersonType::Fa);

        Summary {
            date,
            members: tallies(members, Some(member_eligible)),
            fa: tallies(fa, Some(fa_eligible)),
            visitors: tallies(visitors, None),
        }
    }

    /// One point per date seen in `month`, ascending
    ///
    /// Totals combine member/leader presence with visitor counts. A date seen
    /// only through FA records still gets a (possibly zero) point.
    pub fn monthly_series(&self, leaders: &LeaderSet, month: YearMonth) -> Vec<SeriesPoint> {
        let mut by_date: BTreeMap<DateKey, Totals> = BTreeMap::new();

        for record in self
            .attendance
            .records_for(|r| month.contains(r.date) && leaders.contains(&r.leader))
        {
            let totals = by_date.entry(record.date).or_default();
            if record.person_type.is_member_equivalent() {
                totals.add_presence(record);
            }
        }
        for count in self
            .visitors
            .records_for(|v| month.contains(v.date) && leaders.contains(&v.leader))
        {
            by_date
                .entry(count.date)
                .or_default()
                .add_visitors(count.cell_visitors, count.service_visitors);
        }

        into_series(by_date)
    }

    /// Monthly totals for the `months_back + 1` months ending at `through`
    ///
    /// Months without data are reported as zero so gaps stay visible. Fails
    /// with [`Error::InvalidInput`] when the window reaches before the
    /// earliest supported month.
    pub fn comparative_rollup(
        &self,
        leaders: &LeaderSet,
        months_back: u32,
        through: YearMonth,
    ) -> Result<Vec<MonthTotal>> {
        let earliest = through.minus_months(months_back).ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} months before {} is out of range",
                months_back, through
            ))
        })?;

        let mut by_month: BTreeMap<YearMonth, Totals> = BTreeMap::new();
        let mut month = through;
        while month >= earliest {
            by_month.insert(month, Totals::default());
            match month.prev() {
                Some(prev) => month = prev,
                None => break,
            }
        }

        for record in self
            .attendance
            .records_for(|r| r.person_type.is_member_equivalent() && leaders.contains(&r.leader))
        {
            if let Some(totals) = by_month.get_mut(&record.date.month()) {
                totals.add_presence(record);
            }
        }
        for count in self.visitors.records_for(|v| leaders.contains(&v.leader)) {
            if let Some(totals) = by_month.get_mut(&count.date.month()) {
                totals.add_visitors(count.cell_visitors, count.service_visitors);
            }
        }

        Ok(by_month
            .into_iter()
            .map(|(month, totals)| MonthTotal {
                month,
                cell_total: totals.cell,
                service_total: totals.service,
            })
            .collect())
    }

    /// Overall presence per date across all person types, visitors excluded
    pub fn evolution(&self, leaders: &LeaderSet) -> Vec<SeriesPoint> {
        let mut by_date: BTreeMap<DateKey, Totals> = BTreeMap::new();
        for record in self.attendance.records_for(|r| leaders.contains(&r.leader)) {
            by_date.entry(record.date).or_default().add_presence(record);
        }
        into_series(by_date)
    }
}

fn tallies(totals: Totals, eligible: Option<u32>) -> EventTally {
    EventTally {
        cell: Tally {
            present: totals.cell,
            eligible,
        },
        service: Tally {
            present: totals.service,
            eligible,
        },
    }
}

fn into_series(by_date: BTreeMap<DateKey, Totals>) -> Vec<SeriesPoint> {
    by_date
        .into_iter()
        .map(|(date, totals)| SeriesPoint {
            date,
            cell_total: totals.cell,
            service_total: totals.service,
        })
        .collect()
}
