//! Discharge planning model
//!
//! A plan is one submission of the discharge form: an optional today/
//! tomorrow/final marker, sign-off criteria with times, and take-home
//! equipment. Plans supersede each other like alert snapshots; committing a
//! final plan also deactivates the patient (see `db::discharge`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::patient::PatientId;

/// A unique identifier for a discharge plan, using UUID v7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(Uuid);

impl PlanId {
    /// Create a new unique plan ID using UUID v7
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

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// When the patient is expected to leave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DischargeOption {
    Today,
    Tomorrow,
    /// Permanent discharge; deactivates the patient on commit
    Final,
}

impl DischargeOption {
    /// Stable wire/storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for DischargeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DischargeOption {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "tomorrow" => Ok(Self::Tomorrow),
            "final" | "discharge" => Ok(Self::Final),
            _ => Err(format!("unknown discharge option: {s}")),
        }
    }
}

/// Disciplines that must sign off before final discharge
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    Geriatric,
    Orthopedist,
    PhysicalTherapist,
}

impl CriterionKind {
    /// All criteria, in fixed order
    pub const ALL: [Self; 3] = [Self::Geriatric, Self::Orthopedist, Self::PhysicalTherapist];

    /// Stable wire/storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Geriatric => "geriatric",
            Self::Orthopedist => "orthopedist",
            Self::PhysicalTherapist => "physical_therapist",
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriterionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "geriatric" => Ok(Self::Geriatric),
            "orthopedist" => Ok(Self::Orthopedist),
            "physical_therapist" => Ok(Self::PhysicalTherapist),
            _ => Err(format!("unknown discharge criterion: {s}")),
        }
    }
}

/// Sign-off state for one criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Signed off
    pub checked: bool,
    /// When the sign-off happened (Unix ms); required for a final plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl Criterion {
    /// A sign-off with its timestamp
    #[must_use]
    pub const fn signed_at(time: i64) -> Self {
        Self {
            checked: true,
            time: Some(time),
        }
    }
}

/// Take-home equipment options
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    Cane,
    Walker,
    WheelChair,
    /// Free-text equipment; requires a detail string while selected
    Other,
}

impl EquipmentKind {
    /// Stable wire/storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cane => "cane",
            Self::Walker => "walker",
            Self::WheelChair => "wheel_chair",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cane" => Ok(Self::Cane),
            "walker" => Ok(Self::Walker),
            "wheel_chair" | "wheelchair" => Ok(Self::WheelChair),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown equipment: {s}")),
        }
    }
}

/// One submission of the discharge form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DischargePlan {
    /// Unique identifier
    pub id: PlanId,
    /// The patient this plan belongs to
    pub patient_id: PatientId,
    /// Submission timestamp (Unix ms)
    pub submitted_at: i64,
    /// Expected discharge, if any was selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<DischargeOption>,
    /// Sign-off state per criterion
    pub criteria: BTreeMap<CriterionKind, Criterion>,
    /// Selected take-home equipment
    pub equipment: BTreeSet<EquipmentKind>,
    /// Detail for `other` equipment; required while selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_other: Option<String>,
    /// Whether this is the patient's current plan
    pub is_active: bool,
}

impl DischargePlan {
    /// Create a plan ready for commit (current until superseded)
    #[must_use]
    pub fn new(patient_id: PatientId, submitted_at: i64) -> Self {
        Self {
            id: PlanId::new(),
            patient_id,
            submitted_at,
            option: None,
            criteria: BTreeMap::new(),
            equipment: BTreeSet::new(),
            equipment_other: None,
            is_active: true,
        }
    }

    /// Whether this plan permanently discharges the patient
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.option == Some(DischargeOption::Final)
    }
}

/// Validate a discharge submission before it is committed
///
/// `other` equipment always needs its detail text. A final plan additionally
/// needs all three criteria signed off with times and at least one piece of
/// equipment.
pub fn validate_plan(plan: &DischargePlan) -> Result<()> {
    if plan.equipment.contains(&EquipmentKind::Other)
        && plan
            .equipment_other
            .as_deref()
            .is_none_or(|detail| detail.trim().is_empty())
    {
        return Err(Error::Validation(
            "equipment 'other' was selected; specify which equipment".to_string(),
        ));
    }

    if !plan.is_final() {
        return Ok(());
    }

    for kind in CriterionKind::ALL {
        let criterion = plan.criteria.get(&kind);
        if !criterion.is_some_and(|c| c.checked) {
            return Err(Error::Validation(format!(
                "final discharge requires the {kind} criterion to be signed off"
            )));
        }
        if criterion.and_then(|c| c.time).is_none() {
            return Err(Error::Validation(format!(
                "final discharge requires a sign-off time for {kind}"
            )));
        }
    }

    if plan.equipment.is_empty() {
        return Err(Error::Validation(
            "final discharge requires at least one equipment item".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn final_plan() -> DischargePlan {
        let mut plan = DischargePlan::new(PatientId::new(), 1_000);
        plan.option = Some(DischargeOption::Final);
        for kind in CriterionKind::ALL {
            plan.criteria.insert(kind, Criterion::signed_at(900));
        }
        plan.equipment.insert(EquipmentKind::Walker);
        plan
    }

    #[test]
    fn test_option_roundtrip() {
        for option in [
            DischargeOption::Today,
            DischargeOption::Tomorrow,
            DischargeOption::Final,
        ] {
            let parsed: DischargeOption = option.as_str().parse().unwrap();
            assert_eq!(parsed, option);
        }
    }

    #[test]
    fn test_final_accepts_discharge_alias() {
        assert_eq!(
            "discharge".parse::<DischargeOption>().unwrap(),
            DischargeOption::Final
        );
    }

    #[test]
    fn test_plan_without_option_is_valid() {
        let mut plan = DischargePlan::new(PatientId::new(), 0);
        plan.equipment.insert(EquipmentKind::Cane);
        validate_plan(&plan).unwrap();
        assert!(!plan.is_final());
    }

    #[test]
    fn test_other_equipment_requires_detail() {
        let mut plan = DischargePlan::new(PatientId::new(), 0);
        plan.equipment.insert(EquipmentKind::Other);
        assert!(matches!(validate_plan(&plan), Err(Error::Validation(_))));

        plan.equipment_other = Some("quad cane".to_string());
        validate_plan(&plan).unwrap();
    }

    #[test]
    fn test_final_plan_is_valid_when_complete() {
        validate_plan(&final_plan()).unwrap();
    }

    #[test]
    fn test_final_plan_requires_all_criteria() {
        let mut plan = final_plan();
        plan.criteria.remove(&CriterionKind::Orthopedist);
        assert!(matches!(validate_plan(&plan), Err(Error::Validation(_))));
    }

    #[test]
    fn test_final_plan_requires_criterion_times() {
        let mut plan = final_plan();
        plan.criteria.insert(
            CriterionKind::Geriatric,
            Criterion {
                checked: true,
                time: None,
            },
        );
        assert!(matches!(validate_plan(&plan), Err(Error::Validation(_))));
    }

    #[test]
    fn test_final_plan_requires_equipment() {
        let mut plan = final_plan();
        plan.equipment.clear();
        assert!(matches!(validate_plan(&plan), Err(Error::Validation(_))));
    }
}
