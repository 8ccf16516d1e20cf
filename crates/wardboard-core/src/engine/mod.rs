//! Status reconciliation engine
//!
//! Pure functions that compute the next alert snapshot for a patient from
//! the previous current snapshot and a set of submitted field intents. No
//! storage access happens here; the caller fetches `previous`, then commits
//! the returned snapshot atomically through `db::snapshots`.
//!
//! Merge rules, per field:
//! - checked: the field becomes active; `triggered_at` is stamped only on a
//!   false-to-true transition and carried forward otherwise.
//! - unchecked while active: the field stays in the snapshot with
//!   `active: false` and a fresh `resolved_at`, preserving `triggered_at`
//!   and the note for audit.
//! - unchecked while absent or already inactive: the field is omitted from
//!   the new snapshot entirely ("never happened" and "happened, then
//!   resolved" are distinct persisted shapes).
//! - no intent submitted: the field passes through unchanged.
//!
//! Checking a terminal field implicitly unchecks its precursors in the same
//! submission, so they receive proper `resolved_at` stamps.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::models::{
    AlertField, AlertIntents, AlertLabel, AlertSnapshot, FieldIntent, PatientId, SymptomTag,
};

/// Terminal fields and the precursor fields they resolve when checked
const SUPERSEDES: &[(AlertLabel, &[AlertLabel])] = &[(
    AlertLabel::TherapyCompleted,
    &[AlertLabel::PrepareForTherapy, AlertLabel::ReadyForTherapy],
)];

/// Compute the next snapshot for a patient from the previous one and the
/// submitted intents
///
/// Fails with [`Error::Validation`] before anything is built if a checked
/// field is missing its required reason or detail, so the caller never
/// attempts a commit for an invalid form.
pub fn reconcile(
    patient_id: PatientId,
    previous: Option<&AlertSnapshot>,
    intents: &AlertIntents,
    now_ms: i64,
) -> Result<AlertSnapshot> {
    validate_intents(intents)?;

    let now_ms = effective_now(previous, now_ms);
    let effective = apply_supersedes(intents);

    let mut fields: BTreeMap<AlertLabel, AlertField> = BTreeMap::new();

    // Labels the form did not touch pass through unchanged.
    if let Some(prev) = previous {
        for (label, field) in &prev.fields {
            if !effective.contains(*label) {
                fields.insert(*label, field.clone());
            }
        }
    }

    for (label, intent) in effective.iter() {
        let prev_field = previous.and_then(|snapshot| snapshot.field(label));
        if let Some(next) = next_field_state(prev_field, intent, now_ms) {
            fields.insert(label, next);
        }
    }

    Ok(AlertSnapshot::new(patient_id, now_ms, fields))
}

/// Resolve every listed field that is active in `previous`; everything else
/// passes through unchanged
///
/// This is `reconcile` specialized to an all-unchecked intent set restricted
/// to `labels`, used by "end activity" actions.
#[must_use]
pub fn resolve_group(
    patient_id: PatientId,
    previous: Option<&AlertSnapshot>,
    labels: &BTreeSet<AlertLabel>,
    now_ms: i64,
) -> AlertSnapshot {
    let now_ms = effective_now(previous, now_ms);
    let mut fields = previous.map(|snapshot| snapshot.fields.clone()).unwrap_or_default();

    for label in labels {
        if let Some(field) = fields.get_mut(label) {
            if field.active {
                field.active = false;
                field.resolved_at = Some(now_ms);
                field.symptoms.clear();
                field.other_detail = None;
            }
        }
    }

    AlertSnapshot::new(patient_id, now_ms, fields)
}

/// Reject incomplete or malformed intents before any merge work
fn validate_intents(intents: &AlertIntents) -> Result<()> {
    for (label, intent) in intents.iter() {
        match intent {
            FieldIntent::Flag { checked, note } => {
                if label == AlertLabel::Symptoms {
                    return Err(Error::InvalidInput(
                        "the symptoms field takes a symptom selection, not a checkbox".to_string(),
                    ));
                }
                let note_missing = note.as_deref().is_none_or(|n| n.trim().is_empty());
                if *checked && label.requires_note() && note_missing {
                    return Err(Error::Validation(format!(
                        "{label} requires a reason when checked"
                    )));
                }
            }
            FieldIntent::Symptoms {
                selected,
                other_detail,
            } => {
                if label != AlertLabel::Symptoms {
                    return Err(Error::InvalidInput(format!(
                        "{label} takes a checkbox, not a symptom selection"
                    )));
                }
                let detail_missing = other_detail
                    .as_deref()
                    .is_none_or(|detail| detail.trim().is_empty());
                if selected.contains(&SymptomTag::Other) && detail_missing {
                    return Err(Error::Validation(
                        "symptom 'other' requires a detail text".to_string(),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Force unchecked intents onto the precursors of every checked terminal
/// field, overriding anything the form said about them
fn apply_supersedes(intents: &AlertIntents) -> AlertIntents {
    let mut effective = intents.clone();
    for (terminal, precursors) in SUPERSEDES {
        if effective.is_checked(*terminal) {
            for precursor in *precursors {
                effective.set(*precursor, FieldIntent::unchecked());
            }
        }
    }
    effective
}

/// Next state of a single field, or `None` when the no-op state must not be
/// persisted
fn next_field_state(
    previous: Option<&AlertField>,
    intent: &FieldIntent,
    now_ms: i64,
) -> Option<AlertField> {
    if intent.is_checked() {
        // An already-active field does not re-trigger.
        let triggered_at = match previous {
            Some(prev) if prev.active => prev.triggered_at,
            _ => Some(now_ms),
        };
        let (note, symptoms, other_detail) = match intent {
            FieldIntent::Flag { note, .. } => (note.clone(), BTreeSet::new(), None),
            FieldIntent::Symptoms {
                selected,
                other_detail,
            } => {
                let detail = selected
                    .contains(&SymptomTag::Other)
                    .then(|| other_detail.clone())
                    .flatten();
                (None, selected.clone(), detail)
            }
        };
        return Some(AlertField {
            active: true,
            triggered_at,
            resolved_at: None,
            note,
            symptoms,
            other_detail,
        });
    }

    match previous {
        Some(prev) if prev.active => Some(AlertField {
            active: false,
            triggered_at: prev.triggered_at,
            resolved_at: Some(now_ms),
            note: prev.note.clone(),
            symptoms: BTreeSet::new(),
            other_detail: None,
        }),
        _ => None,
    }
}

/// Submission time, clamped strictly after the snapshot being superseded so
/// per-patient ordering never regresses under clock skew
fn effective_now(previous: Option<&AlertSnapshot>, now_ms: i64) -> i64 {
    previous.map_or(now_ms, |snapshot| now_ms.max(snapshot.submitted_at + 1))
}
