//! Live change propagation
//!
//! In-process fan-out for committed ward state, standing in for the hosted
//! store's snapshot subscriptions. Events are published only after a
//! transaction commits, so subscribers can re-render from them without ever
//! observing a half-applied supersession. A slow subscriber may lag and drop
//! old events; it never sees torn state.

use tokio::sync::broadcast;

use crate::models::{AlertSnapshot, DischargePlan, Patient, PatientId, ProgressRecord};

/// Default buffered events per subscriber before lagging sets in
const DEFAULT_CAPACITY: usize = 64;

/// One committed change to ward state
#[derive(Debug, Clone)]
pub enum BoardEvent {
    /// A patient was registered
    PatientRegistered(Patient),
    /// A patient's alert state was superseded by a new snapshot
    AlertsReconciled(AlertSnapshot),
    /// A patient's therapy progress was superseded by a new record
    ProgressRecorded(ProgressRecord),
    /// A patient's discharge plan was superseded
    DischargePlanned(DischargePlan),
    /// A patient was permanently discharged
    PatientDischarged(PatientId),
}

impl BoardEvent {
    /// The patient this event concerns
    #[must_use]
    pub const fn patient_id(&self) -> PatientId {
        match self {
            Self::PatientRegistered(patient) => patient.id,
            Self::AlertsReconciled(snapshot) => snapshot.patient_id,
            Self::ProgressRecorded(record) => record.patient_id,
            Self::DischargePlanned(plan) => plan.patient_id,
            Self::PatientDischarged(id) => *id,
        }
    }
}

/// Broadcast hub for [`BoardEvent`]s
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<BoardEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed {
    /// Create a feed with the given per-subscriber buffer capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to every committed change
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to changes for a single patient
    #[must_use]
    pub fn subscribe_patient(&self, patient_id: PatientId) -> PatientFeed {
        PatientFeed {
            rx: self.tx.subscribe(),
            patient_id,
        }
    }

    /// Publish a committed change; a feed with no subscribers swallows it
    pub fn publish(&self, event: BoardEvent) {
        let _ = self.tx.send(event);
    }
}

/// A subscription filtered down to one patient
#[derive(Debug)]
pub struct PatientFeed {
    rx: broadcast::Receiver<BoardEvent>,
    patient_id: PatientId,
}

impl PatientFeed {
    /// Next event for this patient; events for other patients are skipped
    ///
    /// Returns `None` once the feed is closed. Lagged gaps are skipped the
    /// same way the hosted store's listeners coalesce missed snapshots.
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.patient_id() == self.patient_id => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Patient feed lagged; continuing from newest");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
