//! Therapy progress repository
//!
//! Same supersession discipline as alert snapshots: each submission retires
//! the previous current record in the transaction that inserts it.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{PatientId, ProgressRecord};
use libsql::{params, Connection, Row};

/// Trait for progress record storage
pub trait ProgressRepository {
    /// The patient's current progress record, if any
    async fn current(&self, patient_id: &PatientId) -> Result<Option<ProgressRecord>>;

    /// Record history, newest first
    async fn history(&self, patient_id: &PatientId, limit: usize) -> Result<Vec<ProgressRecord>>;

    /// Atomically retire the current record and insert `next`
    async fn commit(&self, next: &ProgressRecord) -> Result<()>;

    /// Retire every record for a patient; used by final discharge
    async fn deactivate_all(&self, patient_id: &PatientId) -> Result<u64>;
}

/// libSQL implementation of `ProgressRepository`
pub struct LibSqlProgressRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlProgressRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &Row) -> Result<ProgressRecord> {
        let id: String = row.get(0)?;
        let patient_id: String = row.get(1)?;
        let statuses_json: String = row.get(3)?;
        Ok(ProgressRecord {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid record id in store: {id}")))?,
            patient_id: patient_id.parse().map_err(|_| {
                Error::Database(format!("invalid patient id in store: {patient_id}"))
            })?,
            submitted_at: row.get(2)?,
            statuses: serde_json::from_str(&statuses_json)?,
            is_active: row.get::<i32>(4)? != 0,
        })
    }
}

const RECORD_COLUMNS: &str = "id, patient_id, submitted_at, statuses, is_active";

impl ProgressRepository for LibSqlProgressRepository<'_> {
    async fn current(&self, patient_id: &PatientId) -> Result<Option<ProgressRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM progress_records
                     WHERE patient_id = ? AND is_active = 1
                     ORDER BY submitted_at DESC
                     LIMIT 1"
                ),
                params![patient_id.as_str()],
            )
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        match rows.next().await.map_err(|e| Error::Read(e.to_string()))? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn history(&self, patient_id: &PatientId, limit: usize) -> Result<Vec<ProgressRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM progress_records
                     WHERE patient_id = ?
                     ORDER BY submitted_at DESC
                     LIMIT ?"
                ),
                params![patient_id.as_str(), limit as i64],
            )
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Read(e.to_string()))? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn commit(&self, next: &ProgressRecord) -> Result<()> {
        let statuses_json = serde_json::to_string(&next.statuses)?;

        self.conn
            .execute("BEGIN TRANSACTION", ())
            .await
            .map_err(|e| Error::Commit(e.to_string()))?;

        let steps = async {
            self.conn
                .execute(
                    "UPDATE progress_records SET is_active = 0
                     WHERE patient_id = ? AND is_active = 1",
                    params![next.patient_id.as_str()],
                )
                .await?;
            self.conn
                .execute(
                    "INSERT INTO progress_records
                     (id, patient_id, submitted_at, statuses, is_active)
                     VALUES (?, ?, ?, ?, 1)",
                    params![
                        next.id.as_str(),
                        next.patient_id.as_str(),
                        next.submitted_at,
                        statuses_json
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
            record = %next.id,
            "Committed progress record"
        );
        Ok(())
    }

    async fn deactivate_all(&self, patient_id: &PatientId) -> Result<u64> {
        let changed = self
            .conn
            .execute(
                "UPDATE progress_records SET is_active = 0 WHERE patient_id = ?",
                params![patient_id.as_str()],
            )
            .await
            .map_err(|e| Error::Commit(e.to_string()))?;
        Ok(changed)
    }
}
