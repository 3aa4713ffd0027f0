//! [`RemoteStore`] over a SQLite database

use crate::db::init::init_database;
use crate::ledger::{RawAttendanceRow, RawVisitorRow};
use crate::roster::RawRosterRow;
use crate::store::RemoteStore;
use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

/// Tables kept in SQLite; each replace runs in a single transaction
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database file and its schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            pool: init_database(db_path).await?,
        })
    }

    /// Wrap an existing pool; the schema must already exist
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl RemoteStore for SqliteStore {
    async fn read_attendance(&self) -> Result<Vec<RawAttendanceRow>> {
        let rows: Vec<(String, String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT data, lider, nome, tipo, celula, culto FROM presencas ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(date, leader, name, person_type, cell, service)| RawAttendanceRow {
                date,
                leader,
                name,
                person_type,
                cell: Some(cell),
                service: Some(service),
            })
            .collect())
    }

    async fn read_visitors(&self) -> Result<Vec<RawVisitorRow>> {
        let rows: Vec<(String, String, i64, i64)> =
            sqlx::query_as("SELECT data, lider, celula, culto FROM visitantes ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(date, leader, cell, service)| RawVisitorRow {
                date,
                leader,
                cell: Some(cell),
                service: Some(service),
            })
            .collect())
    }

    async fn read_roster(&self) -> Result<Vec<RawRosterRow>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT lider, nome, tipo FROM membros ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(leader, name, person_type)| RawRosterRow::new(leader, name, person_type))
            .collect())
    }

    async fn replace_attendance(&self, rows: &[RawAttendanceRow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM presencas").execute(&mut *tx).await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO presencas (data, lider, nome, tipo, celula, culto) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.date)
            .bind(&row.leader)
            .bind(&row.name)
            .bind(&row.person_type)
            .bind(row.cell)
            .bind(row.service)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Replaced presencas with {} rows", rows.len());
        Ok(())
    }

    async fn replace_visitors(&self, rows: &[RawVisitorRow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM visitantes").execute(&mut *tx).await?;
        for row in rows {
            sqlx::query("INSERT INTO visitantes (data, lider, celula, culto) VALUES (?, ?, ?, ?)")
                .bind(&row.date)
                .bind(&row.leader)
                .bind(row.cell)
                .bind(row.service)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Replaced visitantes with {} rows", rows.len());
        Ok(())
    }

    async fn replace_roster(&self, rows: &[RawRosterRow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM membros").execute(&mut *tx).await?;
        for row in rows {
            sqlx::query("INSERT INTO membros (lider, nome, tipo) VALUES (?, ?, ?)")
                .bind(&row.leader)
                .bind(&row.name)
                .bind(&row.person_type)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Replaced membros with {} rows", rows.len());
        Ok(())
    }
}
