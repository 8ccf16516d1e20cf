//! Alert field model
//!
//! One tracked condition per [`AlertLabel`]; the grouped `symptoms` field
//! carries a tag set instead of a single checkbox. Field states live inside
//! an [`crate::models::AlertSnapshot`] keyed by label.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// The closed set of tracked alert conditions
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertLabel {
    /// Prepare the patient for therapy in 30 minutes
    PrepareForTherapy,
    /// Patient is ready for therapy pickup
    ReadyForTherapy,
    /// Physical therapy session completed
    TherapyCompleted,
    /// Patient reports pain
    Pain,
    /// Patient is out of the ward
    OutOfWard,
    /// Grouped symptom field
    Symptoms,
}

impl AlertLabel {
    /// All labels, in fixed order
    pub const ALL: [Self; 6] = [
        Self::PrepareForTherapy,
        Self::ReadyForTherapy,
        Self::TherapyCompleted,
        Self::Pain,
        Self::OutOfWard,
        Self::Symptoms,
    ];

    /// Stable wire/storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrepareForTherapy => "prepare_for_therapy",
            Self::ReadyForTherapy => "ready_for_therapy",
            Self::TherapyCompleted => "therapy_completed",
            Self::Pain => "pain",
            Self::OutOfWard => "out_of_ward",
            Self::Symptoms => "symptoms",
        }
    }

    /// Whether a checked field of this label requires a free-text reason
    #[must_use]
    pub const fn requires_note(self) -> bool {
        matches!(self, Self::OutOfWard)
    }
}

impl fmt::Display for AlertLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("unknown alert label: {s}"))
    }
}

/// A tag inside the grouped symptom field
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SymptomTag {
    Nausea,
    Dizziness,
    Fever,
    /// Free-text symptom; requires a detail string while selected
    Other,
}

impl SymptomTag {
    /// Stable wire/storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nausea => "nausea",
            Self::Dizziness => "dizziness",
            Self::Fever => "fever",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SymptomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymptomTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nausea" => Ok(Self::Nausea),
            "dizziness" => Ok(Self::Dizziness),
            "fever" => Ok(Self::Fever),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown symptom tag: {s}")),
        }
    }
}

/// Persisted state of one alert field
///
/// A label absent from a snapshot means "never set", which is distinct from
/// a field persisted with `active: false` (asserted once, then resolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertField {
    /// Currently asserted
    pub active: bool,
    /// Set on the first false-to-true transition since the last resolution;
    /// preserved while the field stays active
    pub triggered_at: Option<i64>,
    /// Set the moment the field transitions true-to-false
    pub resolved_at: Option<i64>,
    /// Free-text reason attached to the assertion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Selected tags; only used by the grouped symptom field
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub symptoms: BTreeSet<SymptomTag>,
    /// Detail for the `other` tag; cleared when the tag is deselected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_detail: Option<String>,
}

/// User-declared intent for one field from a submitted form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIntent {
    /// Ordinary checkbox field, with an optional free-text reason
    Flag { checked: bool, note: Option<String> },
    /// Grouped symptom field; "checked" means the selection is non-empty
    Symptoms {
        selected: BTreeSet<SymptomTag>,
        other_detail: Option<String>,
    },
}

impl FieldIntent {
    /// A plain checked intent with no note
    #[must_use]
    pub const fn checked() -> Self {
        Self::Flag {
            checked: true,
            note: None,
        }
    }

    /// A plain unchecked intent
    #[must_use]
    pub const fn unchecked() -> Self {
        Self::Flag {
            checked: false,
            note: None,
        }
    }

    /// A checked intent carrying a free-text reason
    #[must_use]
    pub fn checked_with_note(note: impl Into<String>) -> Self {
        Self::Flag {
            checked: true,
            note: Some(note.into()),
        }
    }

    /// Whether this intent asserts the field
    #[must_use]
    pub fn is_checked(&self) -> bool {
        match self {
            Self::Flag { checked, .. } => *checked,
            Self::Symptoms { selected, .. } => !selected.is_empty(),
        }
    }
}

/// A partial mapping of labels to field intents, as submitted by one form
///
/// Labels absent from the mapping pass through reconciliation unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertIntents(BTreeMap<AlertLabel, FieldIntent>);

impl AlertIntents {
    /// Empty intent set
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the intent for a label, replacing any previous one
    pub fn set(&mut self, label: AlertLabel, intent: FieldIntent) -> &mut Self {
        self.0.insert(label, intent);
        self
    }

    /// Builder-style [`Self::set`]
    #[must_use]
    pub fn with(mut self, label: AlertLabel, intent: FieldIntent) -> Self {
        self.0.insert(label, intent);
        self
    }

    /// Intent for a label, if one was submitted
    #[must_use]
    pub fn get(&self, label: AlertLabel) -> Option<&FieldIntent> {
        self.0.get(&label)
    }

    /// Whether a label is present and checked
    #[must_use]
    pub fn is_checked(&self, label: AlertLabel) -> bool {
        self.0.get(&label).is_some_and(FieldIntent::is_checked)
    }

    /// Whether any intent was submitted for this label
    #[must_use]
    pub fn contains(&self, label: AlertLabel) -> bool {
        self.0.contains_key(&label)
    }

    /// Iterate intents in label order
    pub fn iter(&self) -> impl Iterator<Item = (AlertLabel, &FieldIntent)> {
        self.0.iter().map(|(label, intent)| (*label, intent))
    }

    /// Number of submitted intents
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no intents were submitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip() {
        for label in AlertLabel::ALL {
            let parsed: AlertLabel = label.as_str().parse().unwrap();
            assert_eq!(parsed, label);
        }
    }

    #[test]
    fn test_label_rejects_unknown() {
        assert!("coffee_break".parse::<AlertLabel>().is_err());
    }

    #[test]
    fn test_symptom_tag_roundtrip() {
        for tag in [
            SymptomTag::Nausea,
            SymptomTag::Dizziness,
            SymptomTag::Fever,
            SymptomTag::Other,
        ] {
            let parsed: SymptomTag = tag.as_str().parse().unwrap();
            assert_eq!(parsed, tag);
        }
    }

    #[test]
    fn test_symptom_intent_checked_means_non_empty() {
        let empty = FieldIntent::Symptoms {
            selected: BTreeSet::new(),
            other_detail: None,
        };
        assert!(!empty.is_checked());

        let selected = FieldIntent::Symptoms {
            selected: BTreeSet::from([SymptomTag::Nausea]),
            other_detail: None,
        };
        assert!(selected.is_checked());
    }

    #[test]
    fn test_intents_partial_mapping() {
        let intents = AlertIntents::new()
            .with(AlertLabel::Pain, FieldIntent::checked())
            .with(AlertLabel::OutOfWard, FieldIntent::unchecked());

        assert!(intents.is_checked(AlertLabel::Pain));
        assert!(!intents.is_checked(AlertLabel::OutOfWard));
        assert!(intents.contains(AlertLabel::OutOfWard));
        assert!(!intents.contains(AlertLabel::Symptoms));
        assert_eq!(intents.len(), 2);
    }

    #[test]
    fn test_only_out_of_ward_requires_note() {
        for label in AlertLabel::ALL {
            assert_eq!(label.requires_note(), label == AlertLabel::OutOfWard);
        }
    }
}
