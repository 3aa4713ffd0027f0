//! Session over one district's data
//!
//! [`Distrito`] owns the roster, both ledgers and the store handle. Every
//! write mutates local state first, then replaces the affected tables in the
//! store. A failed write is reported but never rolled back: the session keeps
//! the attempted state, remembers which tables are out of sync, and
//! [`Distrito::flush`] retries them.
//!
//! A table that could not be read is never written: replacing it would
//! overwrite the stored rows with the empty stand-in.

use crate::aggregation::{AggregationEngine, MonthTotal, SeriesPoint, Summary};
use crate::alerts::{AbsenceAlert, AlertDetector};
use crate::chamada::Chamada;
use crate::dates::{DateKey, YearMonth};
use crate::diagnostics::{Diagnostic, Table};
use crate::ledger::{AttendanceLedger, VisitorLedger};
use crate::roster::{LeaderSet, PersonType, RosterStore};
use crate::store::RemoteStore;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Loaded district state plus its backing store
pub struct Distrito<S> {
    store: S,
    roster: RosterStore,
    attendance: AttendanceLedger,
    visitors: VisitorLedger,
    diagnostics: Vec<Diagnostic>,
    summaries: HashMap<(LeaderSet, DateKey), Summary>,
    pending: BTreeSet<PendingTable>,
    unavailable: HashSet<Table>,
}

/// Ordered so pending tables flush attendance, visitors, then roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PendingTable {
    Attendance,
    Visitors,
    Roster,
}

impl From<PendingTable> for Table {
    fn from(pending: PendingTable) -> Self {
        match pending {
            PendingTable::Attendance => Table::Attendance,
            PendingTable::Visitors => Table::Visitors,
            PendingTable::Roster => Table::Roster,
        }
    }
}

impl<S: RemoteStore> Distrito<S> {
    /// Session with empty state that has not read the store yet
    pub fn new(store: S) -> Self {
        Self {
            store,
            roster: RosterStore::new(),
            attendance: AttendanceLedger::new(),
            visitors: VisitorLedger::new(),
            diagnostics: Vec::new(),
            summaries: HashMap::new(),
            pending: BTreeSet::new(),
            unavailable: HashSet::new(),
        }
    }

    /// Read all three tables
    ///
    /// Never fails: an unreadable table becomes an empty one and a
    /// [`Diagnostic`] explains what happened. Writes to that table then fail
    /// with [`Error::Store`] until a [`Distrito::reload`] reads it.
    pub async fn load(store: S) -> Self {
        let mut session = Self::new(store);
        session.reload().await;
        session
    }

    /// Replace local state with a fresh snapshot of the store
    ///
    /// Unflushed local changes are discarded.
    pub async fn reload(&mut self) {
        if !self.pending.is_empty() {
            warn!("Reloading with {} unsynced table(s); local changes are discarded", self.pending.len());
        }

        let mut diagnostics = Vec::new();

        let attendance_rows = degrade(self.store.read_attendance().await, Table::Attendance, &mut diagnostics);
        let visitor_rows = degrade(self.store.read_visitors().await, Table::Visitors, &mut diagnostics);
        let roster_rows = degrade(self.store.read_roster().await, Table::Roster, &mut diagnostics);

        self.unavailable = diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::TableUnavailable { table, .. } => Some(*table),
                _ => None,
            })
            .collect();

        let (attendance, attendance_diagnostics) = AttendanceLedger::from_raw(attendance_rows);
        let (visitors, visitor_diagnostics) = VisitorLedger::from_raw(visitor_rows);
        let (roster, roster_diagnostics) = RosterStore::from_raw(roster_rows);
        diagnostics.extend(attendance_diagnostics);
        diagnostics.extend(visitor_diagnostics);
        diagnostics.extend(roster_diagnostics);

        self.roster = roster;
        self.attendance = attendance;
        self.visitors = visitors;
        self.summaries.clear();
        self.pending.clear();

        info!(
            "Loaded {} cells, {} attendance records, {} visitor records ({} diagnostics)",
            self.roster.len(),
            self.attendance.len(),
            self.visitors.len(),
            diagnostics.len()
        );
        self.diagnostics = diagnostics;
    }

    // ========================================
    // Writes
    // ========================================

    /// Form for `leader`'s cell on `date`, everyone absent
    pub fn chamada_template(&self, leader: &str, date: DateKey) -> Result<Chamada> {
        Chamada::template(&self.roster, leader, date)
    }

    /// Record a chamada, replacing any earlier one for the same date and leader
    pub async fn submit(&mut self, chamada: &Chamada) -> Result<()> {
        let (records, visitor_count) = chamada.to_records(&self.roster)?;

        let outcome = self.attendance.upsert(chamada.date, &chamada.leader, records)?;
        self.visitors.upsert(chamada.date, &chamada.leader, vec![visitor_count])?;
        self.summaries.clear();

        info!(
            "Chamada {} / {}: {} records (replaced {})",
            chamada.date, chamada.leader, outcome.inserted, outcome.removed
        );

        self.pending.insert(PendingTable::Attendance);
        self.pending.insert(PendingTable::Visitors);
        self.flush().await
    }

    pub async fn create_cell(&mut self, leader: &str) -> Result<()> {
        self.roster.create_cell(leader)?;
        info!("Created cell for {}", leader);
        self.roster_changed().await
    }

    pub async fn add_person(&mut self, leader: &str, name: &str, person_type: PersonType) -> Result<()> {
        self.roster.add_person(leader, name, person_type)?;
        info!("Added {} ({}) to {}'s cell", name, person_type, leader);
        self.roster_changed().await
    }

    /// Returns the removed person's type, or `None` if they were not listed
    pub async fn remove_person(&mut self, leader: &str, name: &str) -> Result<Option<PersonType>> {
        let removed = self.roster.remove_person(leader, name)?;
        if removed.is_none() {
            debug!("{} not on {}'s roster, nothing to remove", name, leader);
            return Ok(None);
        }
        info!("Removed {} from {}'s cell", name, leader);
        self.roster_changed().await?;
        Ok(removed)
    }

    /// Returns the members the cell had; recorded history is kept
    pub async fn delete_cell(&mut self, leader: &str) -> Result<BTreeMap<String, PersonType>> {
        let members = self.roster.delete_cell(leader)?;
        info!("Deleted cell of {} ({} members)", leader, members.len());
        self.roster_changed().await?;
        Ok(members)
    }

    /// Write every table that is out of sync with the store
    ///
    /// Stops at the first failure; that table and the ones after it stay
    /// pending.
    pub async fn flush(&mut self) -> Result<()> {
        while let Some(table) = self.pending.first().copied() {
            self.write_table(table).await?;
            self.pending.remove(&table);
        }
        Ok(())
    }

    async fn roster_changed(&mut self) -> Result<()> {
        self.summaries.clear();
        self.pending.insert(PendingTable::Roster);
        self.flush().await
    }

    async fn write_table(&self, table: PendingTable) -> Result<()> {
        let target = Table::from(table);
        if self.unavailable.contains(&target) {
            warn!("Not writing {}: it was unreadable at the last load", target);
            return Err(Error::Store(format!(
                "{} was not loaded; reload before writing it",
                target
            )));
        }

        let result = match table {
            PendingTable::Attendance => self.store.replace_attendance(&self.attendance.to_raw()).await,
            PendingTable::Visitors => self.store.replace_visitors(&self.visitors.to_raw()).await,
            PendingTable::Roster => self.store.replace_roster(&self.roster.to_raw()).await,
        };

        result.map_err(|e| {
            warn!("Failed to write {}: {}", target, e);
            match e {
                Error::Store(_) => e,
                other => Error::Store(format!("writing {} failed: {}", target, other)),
            }
        })
    }

    // ========================================
    // Reads
    // ========================================

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    pub fn attendance(&self) -> &AttendanceLedger {
        &self.attendance
    }

    pub fn visitors(&self) -> &VisitorLedger {
        &self.visitors
    }

    /// Problems found by the last load
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// False while some local change has not reached the store
    pub fn is_synced(&self) -> bool {
        self.pending.is_empty()
    }

    /// Every leader with a cell, sorted
    pub fn leaders(&self) -> LeaderSet {
        self.roster.leaders().map(str::to_string).collect()
    }

    pub fn aggregation(&self) -> AggregationEngine<'_> {
        AggregationEngine::new(&self.roster, &self.attendance, &self.visitors)
    }

    pub fn alert_detector(&self) -> AlertDetector<'_> {
        AlertDetector::new(&self.roster, &self.attendance, &self.visitors)
    }

    /// Cached until the next write or reload
    pub fn weekly_summary(&mut self, leaders: &LeaderSet, date: DateKey) -> Summary {
        let key = (leaders.clone(), date);
        if let Some(summary) = self.summaries.get(&key) {
            return summary.clone();
        }
        let summary = self.aggregation().weekly_summary(leaders, date);
        self.summaries.insert(key, summary.clone());
        summary
    }

    pub fn monthly_series(&self, leaders: &LeaderSet, month: YearMonth) -> Vec<SeriesPoint> {
        self.aggregation().monthly_series(leaders, month)
    }

    pub fn comparative_rollup(
        &self,
        leaders: &LeaderSet,
        months_back: u32,
        through: YearMonth,
    ) -> Result<Vec<MonthTotal>> {
        self.aggregation().comparative_rollup(leaders, months_back, through)
    }

    pub fn evolution(&self, leaders: &LeaderSet) -> Vec<SeriesPoint> {
        self.aggregation().evolution(leaders)
    }

    pub fn person_absence_alerts(&self, leaders: &LeaderSet) -> Vec<AbsenceAlert> {
        self.alert_detector().person_absence_alerts(leaders)
    }

    pub fn no_visitor_alerts(&self, leaders: &LeaderSet) -> Vec<String> {
        self.alert_detector().no_visitor_alerts(leaders)
    }
}

fn degrade<T>(result: Result<Vec<T>>, table: Table, diagnostics: &mut Vec<Diagnostic>) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Could not read {}, using an empty table: {}", table, e);
            diagnostics.push(Diagnostic::TableUnavailable {
                table,
                reason: e.to_string(),
            });
            Vec::new()
        }
    }
}
