//! Therapy progress model
//!
//! One record per submission of the sitting/standing/ambulation form, with
//! the same supersede-on-submit lifecycle as alert snapshots. Overdue
//! thresholds come from configuration, not code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::patient::{Patient, PatientId};

/// A unique identifier for a progress record, using UUID v7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
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

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Tracked physical-therapy milestones
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProgressActivity {
    Sitting,
    Standing,
    GoalAmbulation,
}

impl ProgressActivity {
    /// All activities, in milestone order
    pub const ALL: [Self; 3] = [Self::Sitting, Self::Standing, Self::GoalAmbulation];

    /// Stable wire/storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sitting => "sitting",
            Self::Standing => "standing",
            Self::GoalAmbulation => "goal_ambulation",
        }
    }
}

impl fmt::Display for ProgressActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressActivity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sitting" => Ok(Self::Sitting),
            "standing" => Ok(Self::Standing),
            "goal_ambulation" | "ambulation" => Ok(Self::GoalAmbulation),
            _ => Err(format!("unknown progress activity: {s}")),
        }
    }
}

/// Completion state for one activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStatus {
    /// Milestone reached
    pub completed: bool,
    /// Required when the milestone was completed past its threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_reason: Option<String>,
}

impl ProgressStatus {
    /// A completed status without a delay reason
    #[must_use]
    pub const fn completed() -> Self {
        Self {
            completed: true,
            delay_reason: None,
        }
    }

    /// A completed status with a delay reason
    #[must_use]
    pub fn completed_late(reason: impl Into<String>) -> Self {
        Self {
            completed: true,
            delay_reason: Some(reason.into()),
        }
    }

    /// A not-yet-completed status
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            completed: false,
            delay_reason: None,
        }
    }
}

/// One submission of the progress form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Unique identifier
    pub id: RecordId,
    /// The patient this record belongs to
    pub patient_id: PatientId,
    /// Submission timestamp (Unix ms)
    pub submitted_at: i64,
    /// Status per activity
    pub statuses: BTreeMap<ProgressActivity, ProgressStatus>,
    /// Whether this is the patient's current record
    pub is_active: bool,
}

impl ProgressRecord {
    /// Create a record ready for commit (current until superseded)
    #[must_use]
    pub fn new(
        patient_id: PatientId,
        submitted_at: i64,
        statuses: BTreeMap<ProgressActivity, ProgressStatus>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            patient_id,
            submitted_at,
            statuses,
            is_active: true,
        }
    }
}

/// Hours after the operation within which each milestone should be reached
///
/// The standing threshold has flip-flopped between 24h and 48h across ward
/// protocols, so none of these are hard-coded at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressThresholds {
    pub sitting_hours: u32,
    pub standing_hours: u32,
    pub goal_ambulation_hours: u32,
}

impl Default for ProgressThresholds {
    fn default() -> Self {
        Self {
            sitting_hours: 24,
            standing_hours: 24,
            goal_ambulation_hours: 48,
        }
    }
}

impl ProgressThresholds {
    /// Threshold for one activity, in hours
    #[must_use]
    pub const fn for_activity(&self, activity: ProgressActivity) -> u32 {
        match activity {
            ProgressActivity::Sitting => self.sitting_hours,
            ProgressActivity::Standing => self.standing_hours,
            ProgressActivity::GoalAmbulation => self.goal_ambulation_hours,
        }
    }
}

/// Validate a progress submission before it is committed
///
/// At least one activity must be marked completed, and an activity completed
/// past its threshold must carry a delay reason.
pub fn validate_statuses(
    statuses: &BTreeMap<ProgressActivity, ProgressStatus>,
    patient: &Patient,
    thresholds: &ProgressThresholds,
    now_ms: i64,
) -> Result<()> {
    if !statuses.values().any(|status| status.completed) {
        return Err(Error::Validation(
            "mark at least one therapy activity as completed".to_string(),
        ));
    }

    for (activity, status) in statuses {
        if !status.completed {
            continue;
        }
        let overdue = patient.is_overdue(thresholds.for_activity(*activity), now_ms);
        let reason_missing = status
            .delay_reason
            .as_deref()
            .is_none_or(|reason| reason.trim().is_empty());
        if overdue && reason_missing {
            return Err(Error::Validation(format!(
                "{activity} was completed past its threshold; a delay reason is required"
            )));
        }
    }

    Ok(())
}
