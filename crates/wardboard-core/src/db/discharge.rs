//! Discharge plan repository
//!
//! Plans supersede each other like alert snapshots. Committing a final plan
//! additionally deactivates the patient and retires their alert snapshots
//! and progress records, all inside the same transaction, so no reader ever
//! sees a discharged patient with live ward state.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{DischargePlan, PatientId};
use libsql::{params, Connection, Row};

/// Trait for discharge plan storage
pub trait DischargeRepository {
    /// The patient's current plan, if any
    async fn current(&self, patient_id: &PatientId) -> Result<Option<DischargePlan>>;

    /// Atomically retire the current plan and insert `next`; a final plan
    /// also deactivates the patient and their ward state
    async fn commit(&self, next: &DischargePlan) -> Result<()>;

    /// Number of active plans with the given option submitted inside
    /// `[from_ms, to_ms)`
    async fn count_option_in_window(
        &self,
        option: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<u64>;
}

/// libSQL implementation of `DischargeRepository`
pub struct LibSqlDischargeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlDischargeRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_plan(row: &Row) -> Result<DischargePlan> {
        let id: String = row.get(0)?;
        let patient_id: String = row.get(1)?;
        let option: Option<String> = row.get(3)?;
        let criteria_json: String = row.get(4)?;
        let equipment_json: String = row.get(5)?;
        Ok(DischargePlan {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid plan id in store: {id}")))?,
            patient_id: patient_id.parse().map_err(|_| {
                Error::Database(format!("invalid patient id in store: {patient_id}"))
            })?,
            submitted_at: row.get(2)?,
            option: option
                .map(|o| {
                    o.parse()
                        .map_err(|_| Error::Database(format!("invalid plan option in store: {o}")))
                })
                .transpose()?,
            criteria: serde_json::from_str(&criteria_json)?,
            equipment: serde_json::from_str(&equipment_json)?,
            equipment_other: row.get(6)?,
            is_active: row.get::<i32>(7)? != 0,
        })
    }
}

const PLAN_COLUMNS: &str =
    "id, patient_id, submitted_at, option, criteria, equipment, equipment_other, is_active";

impl DischargeRepository for LibSqlDischargeRepository<'_> {
    async fn current(&self, patient_id: &PatientId) -> Result<Option<DischargePlan>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {PLAN_COLUMNS} FROM discharge_plans
                     WHERE patient_id = ? AND is_active = 1
                     ORDER BY submitted_at DESC
                     LIMIT 1"
                ),
                params![patient_id.as_str()],
            )
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        match rows.next().await.map_err(|e| Error::Read(e.to_string()))? {
            Some(row) => Ok(Some(Self::parse_plan(&row)?)),
            None => Ok(None),
        }
    }

    async fn commit(&self, next: &DischargePlan) -> Result<()> {
        let criteria_json = serde_json::to_string(&next.criteria)?;
        let equipment_json = serde_json::to_string(&next.equipment)?;
        let finalize = next.is_final();

        self.conn
            .execute("BEGIN TRANSACTION", ())
            .await
            .map_err(|e| Error::Commit(e.to_string()))?;

        let steps = async {
            self.conn
                .execute(
                    "UPDATE discharge_plans SET is_active = 0
                     WHERE patient_id = ? AND is_active = 1",
                    params![next.patient_id.as_str()],
                )
                .await?;
            self.conn
                .execute(
                    "INSERT INTO discharge_plans
                     (id, patient_id, submitted_at, option, criteria, equipment, equipment_other, is_active)
                     VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
                    params![
                        next.id.as_str(),
                        next.patient_id.as_str(),
                        next.submitted_at,
                        next.option.map(|o| o.as_str()),
                        criteria_json,
                        equipment_json,
                        next.equipment_other.clone()
                    ],
                )
                .await?;

            if finalize {
                self.conn
                    .execute(
                        "UPDATE patients SET is_active = 0 WHERE id = ?",
                        params![next.patient_id.as_str()],
                    )
                    .await?;
                self.conn
                    .execute(
                        "UPDATE alert_snapshots SET is_active = 0 WHERE patient_id = ?",
                        params![next.patient_id.as_str()],
                    )
                    .await?;
                self.conn
                    .execute(
                        "UPDATE progress_records SET is_active = 0 WHERE patient_id = ?",
                        params![next.patient_id.as_str()],
                    )
                    .await?;
            }

            self.conn.execute("COMMIT", ()).await?;
            Ok::<(), libsql::Error>(())
        };

        if let Err(e) = steps.await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(Error::Commit(e.to_string()));
        }

        if finalize {
            tracing::info!(patient = %next.patient_id, "Patient permanently discharged");
        } else {
            tracing::debug!(
                patient = %next.patient_id,
                plan = %next.id,
                "Committed discharge plan"
            );
        }
        Ok(())
    }

    async fn count_option_in_window(
        &self,
        option: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM discharge_plans
                 WHERE is_active = 1 AND option = ?
                   AND submitted_at >= ? AND submitted_at < ?",
                params![option, from_ms, to_ms],
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        Database, LibSqlPatientRepository, LibSqlSnapshotRepository, PatientRepository,
        SnapshotRepository,
    };
    use crate::engine;
    use crate::models::{
        AlertIntents, AlertLabel, Criterion, CriterionKind, DischargeOption, EquipmentKind,
        FieldIntent, Patient,
    };

    async fn setup() -> (Database, Patient) {
        let db = Database::open_in_memory().await.unwrap();
        let patient = Patient::new("Somchai P.", "B5", 1_000, 2_000);
        LibSqlPatientRepository::new(db.connection())
            .create(&patient)
            .await
            .unwrap();
        (db, patient)
    }

    fn tomorrow_plan(patient_id: PatientId, at: i64) -> DischargePlan {
        let mut plan = DischargePlan::new(patient_id, at);
        plan.option = Some(DischargeOption::Tomorrow);
        plan.equipment.insert(EquipmentKind::Walker);
        plan
    }

    fn final_plan(patient_id: PatientId, at: i64) -> DischargePlan {
        let mut plan = DischargePlan::new(patient_id, at);
        plan.option = Some(DischargeOption::Final);
        for kind in CriterionKind::ALL {
            plan.criteria.insert(kind, Criterion::signed_at(at - 100));
        }
        plan.equipment.insert(EquipmentKind::Cane);
        plan
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_and_current_roundtrip() {
        let (db, patient) = setup().await;
        let repo = LibSqlDischargeRepository::new(db.connection());

        let plan = tomorrow_plan(patient.id, 5_000);
        repo.commit(&plan).await.unwrap();

        let current = repo.current(&patient.id).await.unwrap().unwrap();
        assert_eq!(current, plan);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_plan_supersedes_previous() {
        let (db, patient) = setup().await;
        let repo = LibSqlDischargeRepository::new(db.connection());

        repo.commit(&tomorrow_plan(patient.id, 5_000)).await.unwrap();
        let second = tomorrow_plan(patient.id, 6_000);
        repo.commit(&second).await.unwrap();

        let current = repo.current(&patient.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_final_plan_deactivates_patient_and_state() {
        let (db, patient) = setup().await;

        // Give the patient live alert state first.
        let snapshots = LibSqlSnapshotRepository::new(db.connection());
        let intents = AlertIntents::new().with(AlertLabel::Pain, FieldIntent::checked());
        let snapshot = engine::reconcile(patient.id, None, &intents, 4_000).unwrap();
        snapshots.commit(&snapshot).await.unwrap();

        let repo = LibSqlDischargeRepository::new(db.connection());
        repo.commit(&final_plan(patient.id, 5_000)).await.unwrap();

        let patients = LibSqlPatientRepository::new(db.connection());
        assert!(!patients.get(&patient.id).await.unwrap().unwrap().is_active);
        assert!(snapshots.current(&patient.id).await.unwrap().is_none());
        // The plan itself stays current for the record.
        assert!(repo.current(&patient.id).await.unwrap().unwrap().is_final());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_count_option_in_window() {
        let (db, patient) = setup().await;
        let repo = LibSqlDischargeRepository::new(db.connection());

        repo.commit(&tomorrow_plan(patient.id, 5_000)).await.unwrap();

        assert_eq!(
            repo.count_option_in_window("tomorrow", 0, 10_000).await.unwrap(),
            1
        );
        assert_eq!(
            repo.count_option_in_window("tomorrow", 6_000, 10_000)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            repo.count_option_in_window("today", 0, 10_000).await.unwrap(),
            0
        );
    }
}
