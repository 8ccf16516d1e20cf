//! Shared ward service used by all clients
//!
//! The imperative shell around the pure reconciliation engine: fetch the
//! previous current state, let the engine compute the successor, commit it
//! atomically, then publish the change. Holding the database lock across
//! the read and the commit keeps one client's submissions for a patient in
//! order; concurrent stations race last-write-wins (see DESIGN.md).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::config::WardConfig;
use crate::db::{
    Database, DischargeRepository, LibSqlDischargeRepository, LibSqlPatientRepository,
    LibSqlProgressRepository, LibSqlSnapshotRepository, PatientRepository, ProgressRepository,
    SnapshotRepository,
};
use crate::engine;
use crate::error::{Error, Result};
use crate::models::{
    validate_plan, validate_statuses, AlertIntents, AlertLabel, AlertSnapshot, Criterion,
    CriterionKind, DischargeOption, DischargePlan, EquipmentKind, Patient, PatientId,
    ProgressActivity, ProgressRecord, ProgressStatus, ProgressThresholds,
};
use crate::watch::{BoardEvent, ChangeFeed, PatientFeed};

/// Registration form for a new patient
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub building: String,
    pub hn: Option<String>,
    pub room: Option<String>,
    /// Admission timestamp (Unix ms)
    pub admitted_at: i64,
    /// Operation timestamp (Unix ms)
    pub operated_at: i64,
}

/// One submission of the discharge form
#[derive(Debug, Clone, Default)]
pub struct DischargeForm {
    pub option: Option<DischargeOption>,
    pub criteria: BTreeMap<CriterionKind, Criterion>,
    pub equipment: BTreeSet<EquipmentKind>,
    pub equipment_other: Option<String>,
}

/// Headline numbers for the ward dashboard
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DashboardSummary {
    pub active_patients: u64,
    pub discharging_today: u64,
    pub discharging_tomorrow: u64,
    pub patients_with_alerts: u64,
}

/// Thread-safe service for ward operations
#[derive(Clone)]
pub struct WardService {
    db: Arc<Mutex<Database>>,
    feed: ChangeFeed,
    config: WardConfig,
}

impl WardService {
    /// Open a ward service at the given filesystem path
    pub async fn open_path(db_path: impl Into<PathBuf>, config: WardConfig) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = if let Some(sync) = config.sync.clone() {
            tracing::info!(
                "Replica sync enabled with {}",
                sync.url.as_deref().unwrap_or("unknown")
            );
            Database::open_with_sync(&db_path, sync).await?
        } else {
            tracing::info!("Running in local-only mode (no sync config)");
            Database::open(&db_path).await?
        };

        Ok(Self::wrap(db, config))
    }

    /// Open an in-memory ward service (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::wrap(db, WardConfig::default()))
    }

    fn wrap(db: Database, config: WardConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            feed: ChangeFeed::default(),
            config,
        }
    }

    /// The configured therapy thresholds
    #[must_use]
    pub const fn thresholds(&self) -> &ProgressThresholds {
        &self.config.thresholds
    }

    /// Subscribe to every committed change
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BoardEvent> {
        self.feed.subscribe()
    }

    /// Subscribe to committed changes for one patient
    #[must_use]
    pub fn subscribe_patient(&self, patient_id: PatientId) -> PatientFeed {
        self.feed.subscribe_patient(patient_id)
    }

    /// Sync with the hosted replica when configured
    pub async fn sync(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.sync().await
    }

    /// Whether replica sync is configured
    pub async fn is_sync_enabled(&self) -> bool {
        let db = self.db.lock().await;
        db.is_sync_enabled()
    }

    // ---------------------------------------------------------------------
    // Patient registry
    // ---------------------------------------------------------------------

    /// Register a patient
    pub async fn register_patient(&self, new: NewPatient) -> Result<Patient> {
        if new.name.trim().is_empty() {
            return Err(Error::InvalidInput("patient name cannot be empty".into()));
        }
        if new.building.trim().is_empty() {
            return Err(Error::InvalidInput("building cannot be empty".into()));
        }

        let mut patient = Patient::new(
            new.name.trim(),
            new.building.trim(),
            new.admitted_at,
            new.operated_at,
        );
        patient.hn = new.hn.filter(|hn| !hn.trim().is_empty());
        patient.room = new.room.filter(|room| !room.trim().is_empty());

        {
            let db = self.db.lock().await;
            LibSqlPatientRepository::new(db.connection())
                .create(&patient)
                .await?;
        }

        self.feed
            .publish(BoardEvent::PatientRegistered(patient.clone()));
        Ok(patient)
    }

    /// Fetch a patient by id
    pub async fn get_patient(&self, id: &PatientId) -> Result<Option<Patient>> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection()).get(id).await
    }

    /// List active patients, optionally restricted to one building
    pub async fn list_patients(&self, building: Option<&str>) -> Result<Vec<Patient>> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection())
            .list_active(building)
            .await
    }

    /// Buildings that currently house active patients
    pub async fn buildings(&self) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection())
            .buildings()
            .await
    }

    /// Active patients whose id starts with the given prefix
    pub async fn find_patients_by_id_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Patient>> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection())
            .find_by_id_prefix(prefix, limit)
            .await
    }

    // ---------------------------------------------------------------------
    // Alerts
    // ---------------------------------------------------------------------

    /// Submit an alert form: merge the intents with the current snapshot and
    /// commit the successor atomically
    pub async fn submit_alerts(
        &self,
        patient_id: &PatientId,
        intents: &AlertIntents,
    ) -> Result<AlertSnapshot> {
        let next = {
            let db = self.db.lock().await;
            Self::require_active_patient(&db, patient_id).await?;

            let snapshots = LibSqlSnapshotRepository::new(db.connection());
            let previous = snapshots.current(patient_id).await?;
            let next = engine::reconcile(
                *patient_id,
                previous.as_ref(),
                intents,
                Utc::now().timestamp_millis(),
            )?;
            snapshots.commit(&next).await?;
            next
        };

        self.feed.publish(BoardEvent::AlertsReconciled(next.clone()));
        Ok(next)
    }

    /// Resolve a group of alert fields in one step (e.g. ending a therapy
    /// round)
    pub async fn end_activity(
        &self,
        patient_id: &PatientId,
        labels: &BTreeSet<AlertLabel>,
    ) -> Result<AlertSnapshot> {
        let next = {
            let db = self.db.lock().await;
            Self::require_active_patient(&db, patient_id).await?;

            let snapshots = LibSqlSnapshotRepository::new(db.connection());
            let previous = snapshots.current(patient_id).await?;
            let next = engine::resolve_group(
                *patient_id,
                previous.as_ref(),
                labels,
                Utc::now().timestamp_millis(),
            );
            snapshots.commit(&next).await?;
            next
        };

        self.feed.publish(BoardEvent::AlertsReconciled(next.clone()));
        Ok(next)
    }

    /// The patient's current alert snapshot
    pub async fn current_alerts(&self, patient_id: &PatientId) -> Result<Option<AlertSnapshot>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection())
            .current(patient_id)
            .await
    }

    /// Alert snapshot history, newest first
    pub async fn alert_history(
        &self,
        patient_id: &PatientId,
        limit: usize,
    ) -> Result<Vec<AlertSnapshot>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection())
            .history(patient_id, limit)
            .await
    }

    // ---------------------------------------------------------------------
    // Therapy progress
    // ---------------------------------------------------------------------

    /// Record a therapy progress submission
    pub async fn record_progress(
        &self,
        patient_id: &PatientId,
        statuses: BTreeMap<ProgressActivity, ProgressStatus>,
    ) -> Result<ProgressRecord> {
        let record = {
            let db = self.db.lock().await;
            let patient = Self::require_active_patient(&db, patient_id).await?;

            let now_ms = Utc::now().timestamp_millis();
            validate_statuses(&statuses, &patient, &self.config.thresholds, now_ms)?;

            let records = LibSqlProgressRepository::new(db.connection());
            let submitted_at = records
                .current(patient_id)
                .await?
                .map_or(now_ms, |current| now_ms.max(current.submitted_at + 1));
            let record = ProgressRecord::new(*patient_id, submitted_at, statuses);
            records.commit(&record).await?;
            record
        };

        self.feed
            .publish(BoardEvent::ProgressRecorded(record.clone()));
        Ok(record)
    }

    /// The patient's current progress record
    pub async fn current_progress(
        &self,
        patient_id: &PatientId,
    ) -> Result<Option<ProgressRecord>> {
        let db = self.db.lock().await;
        LibSqlProgressRepository::new(db.connection())
            .current(patient_id)
            .await
    }

    // ---------------------------------------------------------------------
    // Discharge
    // ---------------------------------------------------------------------

    /// Submit a discharge form; a final plan permanently discharges the
    /// patient in the same transaction
    pub async fn plan_discharge(
        &self,
        patient_id: &PatientId,
        form: DischargeForm,
    ) -> Result<DischargePlan> {
        let plan = {
            let db = self.db.lock().await;
            Self::require_active_patient(&db, patient_id).await?;

            let plans = LibSqlDischargeRepository::new(db.connection());
            let now_ms = Utc::now().timestamp_millis();
            let submitted_at = plans
                .current(patient_id)
                .await?
                .map_or(now_ms, |current| now_ms.max(current.submitted_at + 1));

            let mut plan = DischargePlan::new(*patient_id, submitted_at);
            plan.option = form.option;
            plan.criteria = form.criteria;
            plan.equipment = form.equipment;
            plan.equipment_other = form.equipment_other.filter(|d| !d.trim().is_empty());
            validate_plan(&plan)?;

            plans.commit(&plan).await?;
            plan
        };

        self.feed
            .publish(BoardEvent::DischargePlanned(plan.clone()));
        if plan.is_final() {
            self.feed
                .publish(BoardEvent::PatientDischarged(*patient_id));
        }
        Ok(plan)
    }

    /// The patient's current discharge plan
    pub async fn current_plan(&self, patient_id: &PatientId) -> Result<Option<DischargePlan>> {
        let db = self.db.lock().await;
        LibSqlDischargeRepository::new(db.connection())
            .current(patient_id)
            .await
    }

    // ---------------------------------------------------------------------
    // Dashboard
    // ---------------------------------------------------------------------

    /// Headline counts as of `now_ms`
    pub async fn dashboard(&self, now_ms: i64) -> Result<DashboardSummary> {
        let (today_start, tomorrow_start) = day_window(now_ms);
        let db = self.db.lock().await;

        let active_patients = LibSqlPatientRepository::new(db.connection())
            .count_active()
            .await?;
        let plans = LibSqlDischargeRepository::new(db.connection());
        let discharging_today = plans
            .count_option_in_window(DischargeOption::Today.as_str(), today_start, tomorrow_start)
            .await?;
        let discharging_tomorrow = plans
            .count_option_in_window(
                DischargeOption::Tomorrow.as_str(),
                today_start,
                tomorrow_start,
            )
            .await?;
        let patients_with_alerts = LibSqlSnapshotRepository::new(db.connection())
            .count_alerting_patients()
            .await?;

        Ok(DashboardSummary {
            active_patients,
            discharging_today,
            discharging_tomorrow,
            patients_with_alerts,
        })
    }

    async fn require_active_patient(db: &Database, patient_id: &PatientId) -> Result<Patient> {
        let patient = LibSqlPatientRepository::new(db.connection())
            .get(patient_id)
            .await?
            .ok_or_else(|| Error::PatientNotFound(patient_id.to_string()))?;
        if !patient.is_active {
            return Err(Error::InvalidInput(format!(
                "patient {patient_id} has been discharged"
            )));
        }
        Ok(patient)
    }
}

/// UTC start of the day containing `now_ms` and of the following day
fn day_window(now_ms: i64) -> (i64, i64) {
    let now = DateTime::<Utc>::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now);
    let today_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(now_ms, |start| start.and_utc().timestamp_millis());
    let tomorrow_start = today_start + Duration::days(1).num_milliseconds();
    (today_start, tomorrow_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldIntent;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn new_patient(name: &str, building: &str) -> NewPatient {
        let now = Utc::now().timestamp_millis();
        NewPatient {
            name: name.to_string(),
            building: building.to_string(),
            hn: None,
            room: None,
            admitted_at: now - DAY_MS,
            operated_at: now - DAY_MS / 2,
        }
    }

    fn pain_checked() -> AlertIntents {
        AlertIntents::new().with(AlertLabel::Pain, FieldIntent::checked())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn register_and_list_roundtrip() {
        let service = WardService::open_in_memory().await.unwrap();

        let patient = service
            .register_patient(new_patient("Somsri T.", "B5"))
            .await
            .unwrap();
        let listed = service.list_patients(Some("B5")).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, patient.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn register_rejects_blank_name() {
        let service = WardService::open_in_memory().await.unwrap();

        let result = service.register_patient(new_patient("   ", "B5")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_alerts_builds_on_previous_snapshot() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();

        let first = service
            .submit_alerts(&patient.id, &pain_checked())
            .await
            .unwrap();
        let second = service
            .submit_alerts(&patient.id, &pain_checked())
            .await
            .unwrap();

        // Trigger time survives the resubmission.
        assert_eq!(
            second.field(AlertLabel::Pain).unwrap().triggered_at,
            first.field(AlertLabel::Pain).unwrap().triggered_at
        );
        assert!(second.submitted_at > first.submitted_at);

        let current = service.current_alerts(&patient.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
        assert_eq!(service.alert_history(&patient.id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_alerts_rejects_unknown_patient() {
        let service = WardService::open_in_memory().await.unwrap();

        let result = service
            .submit_alerts(&PatientId::new(), &pain_checked())
            .await;
        assert!(matches!(result, Err(Error::PatientNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_alert_form_commits_nothing() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();

        let missing_reason =
            AlertIntents::new().with(AlertLabel::OutOfWard, FieldIntent::checked());
        let result = service.submit_alerts(&patient.id, &missing_reason).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        assert!(service.current_alerts(&patient.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_activity_resolves_listed_fields() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();

        let intents = pain_checked().with(AlertLabel::ReadyForTherapy, FieldIntent::checked());
        service.submit_alerts(&patient.id, &intents).await.unwrap();

        let next = service
            .end_activity(&patient.id, &BTreeSet::from([AlertLabel::ReadyForTherapy]))
            .await
            .unwrap();

        assert!(!next.field(AlertLabel::ReadyForTherapy).unwrap().active);
        assert!(next.field(AlertLabel::Pain).unwrap().active);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_progress_validates_and_supersedes() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();

        let statuses =
            BTreeMap::from([(ProgressActivity::Sitting, ProgressStatus::completed())]);
        let first = service
            .record_progress(&patient.id, statuses.clone())
            .await
            .unwrap();

        let second = service.record_progress(&patient.id, statuses).await.unwrap();
        assert!(second.submitted_at > first.submitted_at);

        let current = service
            .current_progress(&patient.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, second.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_progress_rejects_empty_form() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();

        let result = service.record_progress(&patient.id, BTreeMap::new()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn final_discharge_locks_out_further_submissions() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();
        service
            .submit_alerts(&patient.id, &pain_checked())
            .await
            .unwrap();

        let now = Utc::now().timestamp_millis();
        let form = DischargeForm {
            option: Some(DischargeOption::Final),
            criteria: CriterionKind::ALL
                .into_iter()
                .map(|kind| (kind, Criterion::signed_at(now)))
                .collect(),
            equipment: BTreeSet::from([EquipmentKind::Walker]),
            equipment_other: None,
        };
        let plan = service.plan_discharge(&patient.id, form).await.unwrap();
        assert!(plan.is_final());

        // Patient is gone from the active ward.
        assert!(service.list_patients(None).await.unwrap().is_empty());
        assert!(service.current_alerts(&patient.id).await.unwrap().is_none());

        let result = service.submit_alerts(&patient.id, &pain_checked()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn incomplete_final_discharge_is_rejected() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();

        let form = DischargeForm {
            option: Some(DischargeOption::Final),
            ..Default::default()
        };
        let result = service.plan_discharge(&patient.id, form).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        // Nothing was committed and the patient is untouched.
        assert!(service.current_plan(&patient.id).await.unwrap().is_none());
        assert_eq!(service.list_patients(None).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dashboard_counts_ward_state() {
        let service = WardService::open_in_memory().await.unwrap();
        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();
        service
            .register_patient(new_patient("B", "B7"))
            .await
            .unwrap();
        service
            .submit_alerts(&patient.id, &pain_checked())
            .await
            .unwrap();

        let form = DischargeForm {
            option: Some(DischargeOption::Today),
            equipment: BTreeSet::from([EquipmentKind::Cane]),
            ..Default::default()
        };
        service.plan_discharge(&patient.id, form).await.unwrap();

        let summary = service
            .dashboard(Utc::now().timestamp_millis())
            .await
            .unwrap();
        assert_eq!(summary.active_patients, 2);
        assert_eq!(summary.discharging_today, 1);
        assert_eq!(summary.discharging_tomorrow, 0);
        assert_eq!(summary.patients_with_alerts, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn feed_reports_committed_changes() {
        let service = WardService::open_in_memory().await.unwrap();
        let mut events = service.subscribe();

        let patient = service
            .register_patient(new_patient("A", "B5"))
            .await
            .unwrap();
        service
            .submit_alerts(&patient.id, &pain_checked())
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            BoardEvent::PatientRegistered(_)
        ));
        match events.recv().await.unwrap() {
            BoardEvent::AlertsReconciled(snapshot) => {
                assert_eq!(snapshot.patient_id, patient.id);
                assert!(snapshot.has_active_alerts());
            }
            event => panic!("unexpected event: {event:?}"),
        }
    }

    #[test]
    fn day_window_spans_one_utc_day() {
        let (start, end) = day_window(1_700_000_000_000);
        assert_eq!(end - start, DAY_MS);
        assert!(start <= 1_700_000_000_000 && 1_700_000_000_000 < end);
    }
}
