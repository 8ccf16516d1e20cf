//! Storage layer for wardboard
//!
//! A local libSQL database, optionally kept in sync with a hosted Turso
//! replica, accessed through repository traits. All state transitions go
//! through single-transaction supersession: flip the old current row
//! inactive and insert its successor, or roll back entirely.

mod connection;
mod discharge;
mod migrations;
mod patients;
mod progress;
mod snapshots;

pub use connection::{Database, SyncConfig};
pub use discharge::{DischargeRepository, LibSqlDischargeRepository};
pub use patients::{LibSqlPatientRepository, PatientRepository};
pub use progress::{LibSqlProgressRepository, ProgressRepository};
pub use snapshots::{LibSqlSnapshotRepository, SnapshotRepository};
