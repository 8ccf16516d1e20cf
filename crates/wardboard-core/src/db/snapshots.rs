//! Alert snapshot repository
//!
//! Owns the supersession commit: retiring the current snapshot and inserting
//! its successor happen in one transaction, so readers observe exactly one
//! current snapshot per patient at all times.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{AlertSnapshot, PatientId};
use libsql::{params, Connection, Row};

/// Trait for alert snapshot storage
pub trait SnapshotRepository {
    /// The patient's current snapshot, if any
    async fn current(&self, patient_id: &PatientId) -> Result<Option<AlertSnapshot>>;

    /// Snapshot history, newest first
    async fn history(&self, patient_id: &PatientId, limit: usize) -> Result<Vec<AlertSnapshot>>;

    /// Atomically retire the patient's current snapshot and insert `next`
    /// as the new current one
    async fn commit(&self, next: &AlertSnapshot) -> Result<()>;

    /// Retire every snapshot for a patient without a successor; used by
    /// final discharge
    async fn deactivate_all(&self, patient_id: &PatientId) -> Result<u64>;

    /// Number of patients whose current snapshot has at least one asserted
    /// field
    async fn count_alerting_patients(&self) -> Result<u64>;
}

/// libSQL implementation of `SnapshotRepository`
pub struct LibSqlSnapshotRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSnapshotRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_snapshot(row: &Row) -> Result<AlertSnapshot> {
        let id: String = row.get(0)?;
        let patient_id: String = row.get(1)?;
        let fields_json: String = row.get(3)?;
        Ok(AlertSnapshot {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid snapshot id in store: {id}")))?,
            patient_id: patient_id.parse().map_err(|_| {
                Error::Database(format!("invalid patient id in store: {patient_id}"))
            })?,
            submitted_at: row.get(2)?,
            fields: serde_json::from_str(&fields_json)?,
            is_active: row.get::<i32>(4)? != 0,
        })
    }
}

const SNAPSHOT_COLUMNS: &str = "id, patient_id, submitted_at, fields, is_active";

impl SnapshotRepository for LibSqlSnapshotRepository<'_> {
    async fn current(&self, patient_id: &PatientId) -> Result<Option<AlertSnapshot>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM alert_snapshots
                     WHERE patient_id = ? AND is_active = 1
                     ORDER BY submitted_at DESC
                     LIMIT 1"
                ),
                params![patient_id.as_str()],
            )
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        match rows.next().await.map_err(|e| Error::Read(e.to_string()))? {
            Some(row) => Ok(Some(Self::parse_snapshot(&row)?)),
            None => Ok(None),
        }
    }

    async fn history(&self, patient_id: &PatientId, limit: usize) -> Result<Vec<AlertSnapshot>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM alert_snapshots
                     WHERE patient_id = ?
                     ORDER BY submitted_at DESC
                     LIMIT ?"
                ),
                params![patient_id.as_str(), limit as i64],
            )
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        let mut snapshots = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Read(e.to_string()))? {
            snapshots.push(Self::parse_snapshot(&row)?);
        }
        Ok(snapshots)
    }

    async fn commit(&self, next: &AlertSnapshot) -> Result<()> {
        // Serialize outside the transaction; a malformed snapshot must not
        // leave a dangling BEGIN behind.
        let fields_json = serde_json::to_string(&next.fields)?;

        self.conn
            .execute("BEGIN TRANSACTION", ())
            .await
            .map_err(|e| Error::Commit(e.to_string()))?;

        let steps = async {
            self.conn
                .execute(
                    "UPDATE alert_snapshots SET is_active = 0
                     WHERE patient_id = ? AND is_active = 1",
                    params![next.patient_id.as_str()],
                )
                .await?;
            self.conn
                .execute(
                    "INSERT INTO alert_snapshots
                     (id, patient_id, submitted_at, fields, has_alerts, is_active)
                     VALUES (?, ?, ?, ?, ?, 1)",
                    params![
                        next.id.as_str(),
                        next.patient_id.as_str(),
                        next.submitted_at,
                        fields_json,
                        i64::from(next.has_active_alerts())
                    ],
                )
                .await?;
            self.conn.execute("COMMIT", ()).await?;
            Ok::<(), libsql::Error>(())
        };

        if let Err(e) = steps.await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(Error::Commit(e.to_string()));
        }

        tracing::debug!(
            patient = %next.patient_id,
            snapshot = %next.id,
            "Committed alert snapshot"
        );
        Ok(())
    }

    async fn deactivate_all(&self, patient_id: &PatientId) -> Result<u64> {
        let changed = self
            .conn
            .execute(
                "UPDATE alert_snapshots SET is_active = 0 WHERE patient_id = ?",
                params![patient_id.as_str()],
            )
            .await
            .map_err(|e| Error::Commit(e.to_string()))?;
        Ok(changed)
    }

    async fn count_alerting_patients(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(DISTINCT patient_id) FROM alert_snapshots
                 WHERE is_active = 1 AND has_alerts = 1",
                (),
            )
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        let count: i64 = match rows.next().await.map_err(|e| Error::Read(e.to_string()))? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count.unsigned_abs())
    }
}
