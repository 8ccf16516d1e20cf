//! Alert snapshot model
//!
//! The unit of persistence for alert state: all field states for one patient
//! as of one submission. Snapshots are immutable once committed; a newer
//! submission supersedes the current one atomically (see `db::snapshots`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::alert::{AlertField, AlertLabel};
use super::patient::PatientId;

/// A unique identifier for an alert snapshot, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Create a new unique snapshot ID using UUID v7
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

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// All alert field states for one patient, as of one point in time
///
/// A patient accumulates a history of snapshots; exactly one per patient is
/// ever current (`is_active`). Labels never touched for this patient are
/// absent from `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSnapshot {
    /// Unique identifier
    pub id: SnapshotId,
    /// The patient this snapshot belongs to
    pub patient_id: PatientId,
    /// Submission timestamp (Unix ms); non-decreasing per patient
    pub submitted_at: i64,
    /// Field states keyed by label
    pub fields: BTreeMap<AlertLabel, AlertField>,
    /// Whether this is the patient's current snapshot
    pub is_active: bool,
}

impl AlertSnapshot {
    /// Create a snapshot ready for commit (current until superseded)
    #[must_use]
    pub fn new(
        patient_id: PatientId,
        submitted_at: i64,
        fields: BTreeMap<AlertLabel, AlertField>,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            patient_id,
            submitted_at,
            fields,
            is_active: true,
        }
    }

    /// State for one field, if it was ever set
    #[must_use]
    pub fn field(&self, label: AlertLabel) -> Option<&AlertField> {
        self.fields.get(&label)
    }

    /// Labels currently asserted, in fixed label order
    #[must_use]
    pub fn active_labels(&self) -> Vec<AlertLabel> {
        self.fields
            .iter()
            .filter(|(_, field)| field.active)
            .map(|(label, _)| *label)
            .collect()
    }

    /// Whether any field is currently asserted
    #[must_use]
    pub fn has_active_alerts(&self) -> bool {
        self.fields.values().any(|field| field.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn field(active: bool) -> AlertField {
        AlertField {
            active,
            triggered_at: Some(1_000),
            resolved_at: if active { None } else { Some(2_000) },
            note: None,
            symptoms: BTreeSet::new(),
            other_detail: None,
        }
    }

    #[test]
    fn test_snapshot_id_unique() {
        let id1 = SnapshotId::new();
        let id2 = SnapshotId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_snapshot_is_active() {
        let snapshot = AlertSnapshot::new(PatientId::new(), 5_000, BTreeMap::new());
        assert!(snapshot.is_active);
        assert_eq!(snapshot.submitted_at, 5_000);
        assert!(!snapshot.has_active_alerts());
    }

    #[test]
    fn test_active_labels_filters_resolved() {
        let fields = BTreeMap::from([
            (AlertLabel::Pain, field(true)),
            (AlertLabel::OutOfWard, field(false)),
        ]);
        let snapshot = AlertSnapshot::new(PatientId::new(), 0, fields);

        assert_eq!(snapshot.active_labels(), vec![AlertLabel::Pain]);
        assert!(snapshot.has_active_alerts());
    }

    #[test]
    fn test_fields_serialize_with_label_keys() {
        let fields = BTreeMap::from([(AlertLabel::Pain, field(true))]);
        let snapshot = AlertSnapshot::new(PatientId::new(), 0, fields);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"pain\""));

        let back: AlertSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
