//! Patient model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// A unique identifier for a patient, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(Uuid);

impl PatientId {
    /// Create a new unique patient ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for PatientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PatientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A registered ward patient
///
/// Registered once on admission; `is_active` flips to false on final
/// discharge. Patient rows are never physically deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Unique identifier
    pub id: PatientId,
    /// Hospital number, if recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hn: Option<String>,
    /// Full name
    pub name: String,
    /// Ward building
    pub building: String,
    /// Room, if recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Admission timestamp (Unix ms)
    pub admitted_at: i64,
    /// Operation timestamp (Unix ms)
    pub operated_at: i64,
    /// False once permanently discharged
    pub is_active: bool,
}

impl Patient {
    /// Create a newly admitted patient
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        building: impl Into<String>,
        admitted_at: i64,
        operated_at: i64,
    ) -> Self {
        Self {
            id: PatientId::new(),
            hn: None,
            name: name.into(),
            building: building.into(),
            room: None,
            admitted_at,
            operated_at,
            is_active: true,
        }
    }

    /// Whole days since the operation; negative when the operation is in
    /// the future
    #[must_use]
    pub const fn post_op_day(&self, now_ms: i64) -> i64 {
        (now_ms - self.operated_at).div_euclid(MILLIS_PER_DAY)
    }

    /// Whole days since admission, counting the admission day itself
    #[must_use]
    pub const fn length_of_stay(&self, now_ms: i64) -> i64 {
        (now_ms - self.admitted_at).div_euclid(MILLIS_PER_DAY) + 1
    }

    /// Whether more than `threshold_hours` have passed since the operation
    #[must_use]
    pub fn is_overdue(&self, threshold_hours: u32, now_ms: i64) -> bool {
        now_ms - self.operated_at > i64::from(threshold_hours) * MILLIS_PER_HOUR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_id_unique() {
        let id1 = PatientId::new();
        let id2 = PatientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_patient_id_parse() {
        let id = PatientId::new();
        let parsed: PatientId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_new_patient_is_active() {
        let patient = Patient::new("Somchai P.", "B5", 1_000, 2_000);
        assert!(patient.is_active);
        assert!(patient.hn.is_none());
        assert_eq!(patient.building, "B5");
    }

    #[test]
    fn test_post_op_day() {
        let patient = Patient::new("A", "B1", 0, 0);
        assert_eq!(patient.post_op_day(0), 0);
        assert_eq!(patient.post_op_day(MILLIS_PER_DAY - 1), 0);
        assert_eq!(patient.post_op_day(3 * MILLIS_PER_DAY), 3);
    }

    #[test]
    fn test_post_op_day_future_operation() {
        let patient = Patient::new("A", "B1", 0, 2 * MILLIS_PER_DAY);
        assert_eq!(patient.post_op_day(0), -2);
    }

    #[test]
    fn test_length_of_stay_counts_admission_day() {
        let patient = Patient::new("A", "B1", 0, 0);
        assert_eq!(patient.length_of_stay(0), 1);
        assert_eq!(patient.length_of_stay(2 * MILLIS_PER_DAY), 3);
    }

    #[test]
    fn test_is_overdue() {
        let patient = Patient::new("A", "B1", 0, 0);
        assert!(!patient.is_overdue(24, 24 * MILLIS_PER_HOUR));
        assert!(patient.is_overdue(24, 24 * MILLIS_PER_HOUR + 1));
        assert!(!patient.is_overdue(48, 30 * MILLIS_PER_HOUR));
    }
}
