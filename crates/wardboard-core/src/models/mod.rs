//! Data models for wardboard

mod alert;
mod discharge;
mod patient;
mod progress;
mod snapshot;

pub use alert::{AlertField, AlertIntents, AlertLabel, FieldIntent, SymptomTag};
pub use discharge::{
    validate_plan, Criterion, CriterionKind, DischargeOption, DischargePlan, EquipmentKind, PlanId,
};
pub use patient::{Patient, PatientId};
pub use progress::{
    validate_statuses, ProgressActivity, ProgressRecord, ProgressStatus, ProgressThresholds,
    RecordId,
};
pub use snapshot::{AlertSnapshot, SnapshotId};
