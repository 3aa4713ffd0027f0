//! Cell rosters
//!
//! In memory a roster is `leader -> (name -> PersonType)`. The leader is
//! implicit in their own cell and never appears in the member map.
//!
//! The persisted form is a flat row list. A cell without members would vanish
//! from that list, so it is written as a single placeholder row named
//! [`LEADER_PLACEHOLDER`]. The placeholder only exists inside
//! [`RosterStore::flatten`] and [`RosterStore::unflatten`].

use crate::dates::fold_text;
use crate::diagnostics::{Diagnostic, Table};
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Name of the placeholder row that keeps an empty cell alive on reload
pub const LEADER_PLACEHOLDER: &str = "LIDER_INICIAL";

/// Set of leader names used as an aggregation/alert filter
pub type LeaderSet = BTreeSet<String>;

/// Build a [`LeaderSet`] from anything yielding names
pub fn leader_set<I, S>(leaders: I) -> LeaderSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    leaders.into_iter().map(Into::into).collect()
}

/// Attendance category of a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PersonType {
    /// Cell leader; counted as a member-equivalent of their own cell
    Leader,
    Member,
    /// Associate attendee ("FA"), tracked with its own denominators
    Fa,
}

impl PersonType {
    /// Label used in the persisted tables
    pub fn label(&self) -> &'static str {
        match self {
            PersonType::Leader => "Liderança",
            PersonType::Member => "Membro",
            PersonType::Fa => "FA",
        }
    }

    /// Members and leaders share the member denominators
    pub fn is_member_equivalent(&self) -> bool {
        matches!(self, PersonType::Leader | PersonType::Member)
    }
}

impl fmt::Display for PersonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PersonType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match fold_text(s).as_str() {
            "lideranca" | "lider" | "leader" | "leadership" => Ok(PersonType::Leader),
            "membro" | "member" => Ok(PersonType::Member),
            "fa" => Ok(PersonType::Fa),
            _ => Err(Error::InvalidInput(format!("unknown person type: {:?}", s))),
        }
    }
}

impl Serialize for PersonType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for PersonType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One roster entry in flattened form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub leader: String,
    pub name: String,
    pub person_type: PersonType,
}

impl RosterRow {
    pub fn new(leader: impl Into<String>, name: impl Into<String>, person_type: PersonType) -> Self {
        Self {
            leader: leader.into(),
            name: name.into(),
            person_type,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == LEADER_PLACEHOLDER
    }
}

/// Roster row as persisted in the `Membros` table
///
/// `Tipo` stays text so one unknown label drops one row, not the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRosterRow {
    #[serde(rename = "Líder")]
    pub leader: String,
    #[serde(rename = "Nome")]
    pub name: String,
    #[serde(rename = "Tipo")]
    pub person_type: String,
}

impl RawRosterRow {
    pub fn new(leader: impl Into<String>, name: impl Into<String>, person_type: impl Into<String>) -> Self {
        Self {
            leader: leader.into(),
            name: name.into(),
            person_type: person_type.into(),
        }
    }
}

impl From<&RosterRow> for RawRosterRow {
    fn from(row: &RosterRow) -> Self {
        Self::new(row.leader.as_str(), row.name.as_str(), row.person_type.label())
    }
}

impl TryFrom<RawRosterRow> for RosterRow {
    type Error = Diagnostic;

    fn try_from(raw: RawRosterRow) -> std::result::Result<Self, Diagnostic> {
        let leader = raw.leader.trim();
        let name = raw.name.trim();
        if leader.is_empty() || name.is_empty() {
            return Err(malformed(format!(
                "blank leader or name in {:?} / {:?}",
                raw.leader, raw.name
            )));
        }
        let person_type = raw
            .person_type
            .parse::<PersonType>()
            .map_err(|e| malformed(format!("{} / {}: {}", leader, name, e)))?;
        Ok(Self::new(leader, name, person_type))
    }
}

/// Leader → roster mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterStore {
    cells: BTreeMap<String, BTreeMap<String, PersonType>>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cell
    ///
    /// Fails with [`Error::DuplicateLeader`] if the leader already has a cell.
    pub fn create_cell(&mut self, leader: &str) -> Result<()> {
        let leader = clean_name(leader, "leader")?;
        if self.cells.contains_key(&leader) {
            return Err(Error::DuplicateLeader(leader));
        }
        self.cells.insert(leader, BTreeMap::new());
        Ok(())
    }

    /// Add a person to a cell, or change the type of one already there
    ///
    /// Only `Member` and `Fa` can be added; the leader is implicit.
    pub fn add_person(&mut self, leader: &str, name: &str, person_type: PersonType) -> Result<()> {
        if person_type == PersonType::Leader {
            return Err(Error::InvalidInput(format!(
                "{} cannot be added with type {}",
                name, person_type
            )));
        }
        let name = clean_name(name, "person")?;
        if name == LEADER_PLACEHOLDER {
            return Err(Error::InvalidInput(format!("{} is a reserved name", name)));
        }
        if name == leader.trim() {
            return Err(Error::InvalidInput(format!(
                "{} already leads this cell and cannot also be a member",
                name
            )));
        }
        let members = self.cell_mut(leader)?;
        members.insert(name, person_type);
        Ok(())
    }

    /// Remove a person from a cell, returning their type if they were listed
    pub fn remove_person(&mut self, leader: &str, name: &str) -> Result<Option<PersonType>> {
        let members = self.cell_mut(leader)?;
        Ok(members.remove(name.trim()))
    }

    /// Delete a cell and return its former members
    pub fn delete_cell(&mut self, leader: &str) -> Result<BTreeMap<String, PersonType>> {
        self.cells
            .remove(leader.trim())
            .ok_or_else(|| Error::UnknownLeader(leader.trim().to_string()))
    }

    /// Leaders in sorted order
    pub fn leaders(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn contains_leader(&self, leader: &str) -> bool {
        self.cells.contains_key(leader)
    }

    pub fn members(&self, leader: &str) -> Option<&BTreeMap<String, PersonType>> {
        self.cells.get(leader)
    }

    /// Type of `name` within `leader`'s cell; the leader themself is `Leader`
    pub fn person_type(&self, leader: &str, name: &str) -> Option<PersonType> {
        let members = self.cells.get(leader)?;
        if name == leader {
            return Some(PersonType::Leader);
        }
        members.get(name).copied()
    }

    /// Number of people of `person_type` across the given cells
    ///
    /// Leaders missing from the roster contribute nothing.
    pub fn count_of(&self, leaders: &LeaderSet, person_type: PersonType) -> u32 {
        leaders
            .iter()
            .filter_map(|leader| self.cells.get(leader))
            .flat_map(|members| members.values())
            .filter(|t| **t == person_type)
            .count() as u32
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Flatten into persisted rows, one per person plus a placeholder per empty cell
    pub fn flatten(&self) -> Vec<RosterRow> {
        let mut rows = Vec::new();
        for (leader, members) in &self.cells {
            if members.is_empty() {
                rows.push(RosterRow::new(leader.as_str(), LEADER_PLACEHOLDER, PersonType::Leader));
                continue;
            }
            for (name, person_type) in members {
                rows.push(RosterRow::new(leader.as_str(), name.as_str(), *person_type));
            }
        }
        rows
    }

    /// Rebuild a roster from flattened rows
    ///
    /// Placeholder rows create their leader's cell without adding a member.
    /// Rows with a blank leader or name, non-placeholder `Leader` rows and
    /// members named after their own leader are skipped. A person listed
    /// twice keeps the later type.
    pub fn unflatten<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = RosterRow>,
    {
        let mut diagnostics = Vec::new();
        let store = Self::collect_rows(rows, &mut diagnostics);
        for diagnostic in &diagnostics {
            warn!("{}", diagnostic);
        }
        store
    }

    /// Rebuild a roster from persisted rows, reporting every dropped row
    ///
    /// A bad row never takes its neighbours down with it.
    pub fn from_raw(rows: Vec<RawRosterRow>) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let typed: Vec<RosterRow> = rows
            .into_iter()
            .filter_map(|raw| match RosterRow::try_from(raw) {
                Ok(row) => Some(row),
                Err(diagnostic) => {
                    diagnostics.push(diagnostic);
                    None
                }
            })
            .collect();

        let store = Self::collect_rows(typed, &mut diagnostics);
        for diagnostic in &diagnostics {
            warn!("{}", diagnostic);
        }
        (store, diagnostics)
    }

    /// Rows for a full `Membros` replacement
    pub fn to_raw(&self) -> Vec<RawRosterRow> {
        self.flatten().iter().map(RawRosterRow::from).collect()
    }

    fn collect_rows<I>(rows: I, diagnostics: &mut Vec<Diagnostic>) -> Self
    where
        I: IntoIterator<Item = RosterRow>,
    {
        let mut store = Self::new();
        for row in rows {
            let leader = row.leader.trim();
            let name = row.name.trim();
            if leader.is_empty() || name.is_empty() {
                diagnostics.push(malformed(format!(
                    "blank leader or name in {:?} / {:?}",
                    row.leader, row.name
                )));
                continue;
            }

            let members = store.cells.entry(leader.to_string()).or_default();
            if name == LEADER_PLACEHOLDER {
                continue;
            }
            if row.person_type == PersonType::Leader {
                diagnostics.push(malformed(format!(
                    "{} / {}: leaders are implicit in their cell",
                    leader, name
                )));
                continue;
            }
            if name == leader {
                diagnostics.push(malformed(format!(
                    "{} is listed as a member of their own cell",
                    name
                )));
                continue;
            }
            members.insert(name.to_string(), row.person_type);
        }
        store
    }

    fn cell_mut(&mut self, leader: &str) -> Result<&mut BTreeMap<String, PersonType>> {
        let leader = leader.trim();
        self.cells
            .get_mut(leader)
            .ok_or_else(|| Error::UnknownLeader(leader.to_string()))
    }
}

fn malformed(reason: String) -> Diagnostic {
    Diagnostic::MalformedRow {
        table: Table::Roster,
        reason,
    }
}

fn clean_name(raw: &str, what: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{} name is blank", what)));
    }
    Ok(name.to_string())
}
