//! SQLite-backed table storage

pub mod init;
pub mod store;

pub use init::*;
pub use store::SqliteStore;
