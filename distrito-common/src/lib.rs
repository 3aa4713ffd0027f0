//! # Distrito Common Library
//!
//! Attendance bookkeeping for a network of cell groups:
//! - Roster of cells (leader plus members) and person types
//! - Attendance and visitor ledgers keyed by (date, leader)
//! - Weekly summaries, monthly series and multi-month rollups
//! - Two-week absence and no-visitor alerts
//! - Table storage backends (memory, JSON files, SQLite)
//! - Configuration loading and tracing setup

pub mod aggregation;
pub mod alerts;
pub mod chamada;
pub mod config;
pub mod dates;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod roster;
pub mod session;
pub mod store;

pub use chamada::Chamada;
pub use dates::{DateKey, YearMonth};
pub use error::{Error, Result};
pub use roster::{LeaderSet, PersonType, RosterStore};
pub use session::Distrito;
pub use store::{AnyStore, RemoteStore};
