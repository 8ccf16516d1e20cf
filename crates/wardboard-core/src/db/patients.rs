//! Patient registry repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{Patient, PatientId};
use libsql::{params, Connection, Row};

/// Trait for patient registry operations
///
/// The registry is read-mostly: patients are registered once and only the
/// `is_active` flag ever changes afterwards (final discharge).
pub trait PatientRepository {
    /// Register a patient
    async fn create(&self, patient: &Patient) -> Result<()>;

    /// Get a patient by ID
    async fn get(&self, id: &PatientId) -> Result<Option<Patient>>;

    /// List active patients, optionally restricted to one building,
    /// ordered by building then name
    async fn list_active(&self, building: Option<&str>) -> Result<Vec<Patient>>;

    /// Distinct buildings that currently house active patients
    async fn buildings(&self) -> Result<Vec<String>>;

    /// Flip the active flag; used by final discharge
    async fn set_active(&self, id: &PatientId, active: bool) -> Result<()>;

    /// Number of active patients
    async fn count_active(&self) -> Result<u64>;

    /// Active patients whose ID starts with the given prefix
    async fn find_by_id_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<Patient>>;
}

/// libSQL implementation of `PatientRepository`
pub struct LibSqlPatientRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPatientRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_patient(row: &Row) -> Result<Patient> {
        let id: String = row.get(0)?;
        Ok(Patient {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid patient id in store: {id}")))?,
            hn: row.get::<Option<String>>(1)?,
            name: row.get(2)?,
            building: row.get(3)?,
            room: row.get::<Option<String>>(4)?,
            admitted_at: row.get(5)?,
            operated_at: row.get(6)?,
            is_active: row.get::<i32>(7)? != 0,
        })
    }
}

const PATIENT_COLUMNS: &str = "id, hn, name, building, room, admitted_at, operated_at, is_active";

impl PatientRepository for LibSqlPatientRepository<'_> {
    async fn create(&self, patient: &Patient) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO patients (id, hn, name, building, room, admitted_at, operated_at, is_active)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    patient.id.as_str(),
                    patient.hn.clone(),
                    patient.name.clone(),
                    patient.building.clone(),
                    patient.room.clone(),
                    patient.admitted_at,
                    patient.operated_at,
                    i64::from(patient.is_active)
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &PatientId) -> Result<Option<Patient>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_patient(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_active(&self, building: Option<&str>) -> Result<Vec<Patient>> {
        let mut rows = match building {
            Some(building) => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {PATIENT_COLUMNS} FROM patients
                             WHERE is_active = 1 AND building = ?
                             ORDER BY building, name"
                        ),
                        params![building],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {PATIENT_COLUMNS} FROM patients
                             WHERE is_active = 1
                             ORDER BY building, name"
                        ),
                        (),
                    )
                    .await?
            }
        };

        let mut patients = Vec::new();
        while let Some(row) = rows.next().await? {
            patients.push(Self::parse_patient(&row)?);
        }
        Ok(patients)
    }

    async fn buildings(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT building FROM patients WHERE is_active = 1 ORDER BY building",
                (),
            )
            .await?;

        let mut buildings = Vec::new();
        while let Some(row) = rows.next().await? {
            buildings.push(row.get(0)?);
        }
        Ok(buildings)
    }

    async fn set_active(&self, id: &PatientId, active: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE patients SET is_active = ? WHERE id = ?",
                params![i64::from(active), id.as_str()],
            )
            .await?;

        if changed == 0 {
            return Err(Error::PatientNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn count_active(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM patients WHERE is_active = 1", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count.unsigned_abs())
    }

    async fn find_by_id_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<Patient>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {PATIENT_COLUMNS} FROM patients
                     WHERE is_active = 1 AND id LIKE ?
                     ORDER BY id
                     LIMIT ?"
                ),
                params![format!("{prefix}%"), limit as i64],
            )
            .await?;

        let mut patients = Vec::new();
        while let Some(row) = rows.next().await? {
            patients.push(Self::parse_patient(&row)?);
        }
        Ok(patients)
    }
}
