//! Remote table storage
//!
//! The engine persists three tables (Presencas, Visitantes, Membros) and only
//! ever reads or replaces a whole table. Any backend that can do that is a
//! [`RemoteStore`].

use crate::config::{StoreBackend, TomlConfig};
use crate::diagnostics::Table;
use crate::ledger::{RawAttendanceRow, RawVisitorRow};
use crate::roster::RawRosterRow;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[cfg(feature = "sqlx")]
use crate::db::SqliteStore;

/// Whole-table read/replace access to the persisted tables
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    async fn read_attendance(&self) -> Result<Vec<RawAttendanceRow>>;
    async fn read_visitors(&self) -> Result<Vec<RawVisitorRow>>;
    async fn read_roster(&self) -> Result<Vec<RawRosterRow>>;

    async fn replace_attendance(&self, rows: &[RawAttendanceRow]) -> Result<()>;
    async fn replace_visitors(&self, rows: &[RawVisitorRow]) -> Result<()>;
    async fn replace_roster(&self, rows: &[RawRosterRow]) -> Result<()>;
}

// ========================================
// In-memory store
// ========================================

#[derive(Debug, Default)]
struct MemoryTables {
    attendance: Vec<RawAttendanceRow>,
    visitors: Vec<RawVisitorRow>,
    roster: Vec<RawRosterRow>,
    failing_reads: HashSet<Table>,
    failing_writes: HashSet<Table>,
    writes: usize,
}

impl MemoryTables {
    fn check_read(&self, table: Table) -> Result<()> {
        if self.failing_reads.contains(&table) {
            return Err(Error::Store(format!("{} is unreachable", table)));
        }
        Ok(())
    }

    fn check_write(&self, table: Table) -> Result<()> {
        if self.failing_writes.contains(&table) {
            return Err(Error::Store(format!("{} rejected the write", table)));
        }
        Ok(())
    }
}

/// Volatile store, also used to simulate an unreachable backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with raw rows, as if read from a sheet
    pub fn with_rows(
        attendance: Vec<RawAttendanceRow>,
        visitors: Vec<RawVisitorRow>,
        roster: Vec<RawRosterRow>,
    ) -> Self {
        Self {
            tables: Mutex::new(MemoryTables {
                attendance,
                visitors,
                roster,
                ..MemoryTables::default()
            }),
        }
    }

    /// Make reads of `table` fail (or succeed again)
    pub async fn fail_reads(&self, table: Table, failing: bool) {
        let mut tables = self.tables.lock().await;
        if failing {
            tables.failing_reads.insert(table);
        } else {
            tables.failing_reads.remove(&table);
        }
    }

    /// Make writes to `table` fail (or succeed again)
    pub async fn fail_writes(&self, table: Table, failing: bool) {
        let mut tables = self.tables.lock().await;
        if failing {
            tables.failing_writes.insert(table);
        } else {
            tables.failing_writes.remove(&table);
        }
    }

    /// Number of successful table replacements so far
    pub async fn write_count(&self) -> usize {
        self.tables.lock().await.writes
    }
}

impl RemoteStore for MemoryStore {
    async fn read_attendance(&self) -> Result<Vec<RawAttendanceRow>> {
        let tables = self.tables.lock().await;
        tables.check_read(Table::Attendance)?;
        Ok(tables.attendance.clone())
    }

    async fn read_visitors(&self) -> Result<Vec<RawVisitorRow>> {
        let tables = self.tables.lock().await;
        tables.check_read(Table::Visitors)?;
        Ok(tables.visitors.clone())
    }

    async fn read_roster(&self) -> Result<Vec<RawRosterRow>> {
        let tables = self.tables.lock().await;
        tables.check_read(Table::Roster)?;
        Ok(tables.roster.clone())
    }

    async fn replace_attendance(&self, rows: &[RawAttendanceRow]) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.check_write(Table::Attendance)?;
        tables.attendance = rows.to_vec();
        tables.writes += 1;
        Ok(())
    }

    async fn replace_visitors(&self, rows: &[RawVisitorRow]) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.check_write(Table::Visitors)?;
        tables.visitors = rows.to_vec();
        tables.writes += 1;
        Ok(())
    }

    async fn replace_roster(&self, rows: &[RawRosterRow]) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.check_write(Table::Roster)?;
        tables.roster = rows.to_vec();
        tables.writes += 1;
        Ok(())
    }
}

// ========================================
// JSON file store
// ========================================

/// One pretty-printed JSON array per table under a directory
///
/// A missing file reads as an empty table. Writes go to a temporary file that
/// is renamed over the target, so a crash never leaves a half-written table.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `table`
    pub fn table_path(&self, table: Table) -> PathBuf {
        self.dir.join(format!("{}.json", table.sheet_name()))
    }

    async fn read_table<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>> {
        let path = self.table_path(table);
        if !tokio::fs::try_exists(&path).await? {
            debug!("{} not found, treating {} as empty", path.display(), table);
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_table<T: Serialize>(&self, table: Table, rows: &[T]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.table_path(table);
        let tmp_path = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(rows)?;
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}

impl RemoteStore for JsonFileStore {
    async fn read_attendance(&self) -> Result<Vec<RawAttendanceRow>> {
        self.read_table(Table::Attendance).await
    }

    async fn read_visitors(&self) -> Result<Vec<RawVisitorRow>> {
        self.read_table(Table::Visitors).await
    }

    async fn read_roster(&self) -> Result<Vec<RawRosterRow>> {
        self.read_table(Table::Roster).await
    }

    async fn replace_attendance(&self, rows: &[RawAttendanceRow]) -> Result<()> {
        self.write_table(Table::Attendance, rows).await
    }

    async fn replace_visitors(&self, rows: &[RawVisitorRow]) -> Result<()> {
        self.write_table(Table::Visitors, rows).await
    }

    async fn replace_roster(&self, rows: &[RawRosterRow]) -> Result<()> {
        self.write_table(Table::Roster, rows).await
    }
}

// ========================================
// Backend chosen from configuration
// ========================================

/// Any of the built-in backends
#[derive(Debug)]
pub enum AnyStore {
    Memory(MemoryStore),
    Json(JsonFileStore),
    #[cfg(feature = "sqlx")]
    Sqlite(SqliteStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyStore::Memory($store) => $call,
            AnyStore::Json($store) => $call,
            #[cfg(feature = "sqlx")]
            AnyStore::Sqlite($store) => $call,
        }
    };
}

impl AnyStore {
    /// Open the backend named in `config`, with relative paths under `root`
    pub async fn open(config: &TomlConfig, root: &Path) -> Result<Self> {
        let store = match config.store.backend {
            StoreBackend::Memory => AnyStore::Memory(MemoryStore::new()),
            StoreBackend::Json => AnyStore::Json(JsonFileStore::new(root.join(&config.store.data_dir))),
            #[cfg(feature = "sqlx")]
            StoreBackend::Sqlite => {
                AnyStore::Sqlite(SqliteStore::open(&root.join(&config.store.database_file)).await?)
            }
            #[cfg(not(feature = "sqlx"))]
            StoreBackend::Sqlite => {
                return Err(Error::Config(
                    "sqlite backend requires the sqlx feature".to_string(),
                ))
            }
        };
        info!("Using {} store under {}", config.store.backend, root.display());
        Ok(store)
    }
}

impl RemoteStore for AnyStore {
    async fn read_attendance(&self) -> Result<Vec<RawAttendanceRow>> {
        dispatch!(self, s => s.read_attendance().await)
    }

    async fn read_visitors(&self) -> Result<Vec<RawVisitorRow>> {
        dispatch!(self, s => s.read_visitors().await)
    }

    async fn read_roster(&self) -> Result<Vec<RawRosterRow>> {
        dispatch!(self, s => s.read_roster().await)
    }

    async fn replace_attendance(&self, rows: &[RawAttendanceRow]) -> Result<()> {
        dispatch!(self, s => s.replace_attendance(rows).await)
    }

    async fn replace_visitors(&self, rows: &[RawVisitorRow]) -> Result<()> {
        dispatch!(self, s => s.replace_visitors(rows).await)
    }

    async fn replace_roster(&self, rows: &[RawRosterRow]) -> Result<()> {
        dispatch!(self, s => s.replace_roster(rows).await)
    }
}
