//! wardboard CLI - Ward status board from the terminal
//!
//! Register patients, submit alert forms, record therapy progress, and plan
//! discharge against the shared ward database.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use serde::Serialize;
use thiserror::Error;
use wardboard_core::config::{resolve_db_path, WardConfig};
use wardboard_core::models::{
    AlertIntents, AlertLabel, AlertSnapshot, Criterion, CriterionKind, DischargeOption,
    EquipmentKind, FieldIntent, Patient, ProgressActivity, ProgressStatus, SymptomTag,
};
use wardboard_core::services::{DischargeForm, NewPatient, WardService};
use wardboard_core::Error as CoreError;

#[derive(Parser)]
#[command(name = "wardboard")]
#[command(about = "Ward status board - patients, alerts, progress, discharge")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Patient registry
    Patient {
        #[command(subcommand)]
        command: PatientCommands,
    },
    /// Care alerts
    Alert {
        #[command(subcommand)]
        command: AlertCommands,
    },
    /// Therapy progress
    Progress {
        #[command(subcommand)]
        command: ProgressCommands,
    },
    /// Submit a discharge form
    Discharge {
        /// Patient ID or unique ID prefix
        patient: String,
        /// Expected discharge: today, tomorrow, or final
        #[arg(long, value_name = "OPTION")]
        when: Option<DischargeOption>,
        /// Signed-off criterion, e.g. "orthopedist=2026-08-07T10:30"
        #[arg(long = "criterion", value_name = "KIND[=TIME]")]
        criteria: Vec<String>,
        /// Take-home equipment (cane, walker, wheel_chair, other)
        #[arg(long = "equipment", value_name = "KIND")]
        equipment: Vec<EquipmentKind>,
        /// Detail text required with --equipment other
        #[arg(long, value_name = "TEXT")]
        equipment_other: Option<String>,
    },
    /// Ward dashboard summary
    Dashboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync the local replica with the hosted ward database
    Sync,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PatientCommands {
    /// Register a newly admitted patient
    Register {
        /// Full name
        #[arg(long)]
        name: String,
        /// Ward building
        #[arg(long)]
        building: String,
        /// Hospital number
        #[arg(long)]
        hn: Option<String>,
        /// Room
        #[arg(long)]
        room: Option<String>,
        /// Admission date, e.g. 2026-08-01 or 2026-08-01T14:00
        #[arg(long, value_name = "DATE")]
        admitted: String,
        /// Operation date/time, e.g. 2026-08-02T09:30
        #[arg(long, value_name = "DATE")]
        operated: String,
    },
    /// List active patients
    List {
        /// Restrict to one building
        #[arg(long)]
        building: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one patient
    Show {
        /// Patient ID or unique ID prefix
        patient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// Submit the full alert form for a patient
    ///
    /// Flags that are omitted count as unchecked, exactly like an empty
    /// checkbox on the submitted form.
    Submit {
        /// Patient ID or unique ID prefix
        patient: String,
        /// Prepare for therapy in 30 minutes
        #[arg(long)]
        prepare: bool,
        /// Ready for therapy pickup
        #[arg(long)]
        ready: bool,
        /// Therapy completed (also resolves prepare/ready)
        #[arg(long)]
        completed: bool,
        /// Patient reports pain
        #[arg(long)]
        pain: bool,
        /// Note attached to the pain alert
        #[arg(long, value_name = "TEXT", requires = "pain")]
        pain_note: Option<String>,
        /// Patient is out of the ward; the value says where
        #[arg(long, value_name = "REASON")]
        out_of_ward: Option<String>,
        /// Observed symptom (nausea, dizziness, fever, other); repeatable
        #[arg(long = "symptom", value_name = "TAG")]
        symptoms: Vec<SymptomTag>,
        /// Detail text required with --symptom other
        #[arg(long, value_name = "TEXT")]
        symptom_other: Option<String>,
    },
    /// Resolve a group of alert fields without touching the rest
    End {
        /// Patient ID or unique ID prefix
        patient: String,
        /// Labels to resolve (e.g. prepare_for_therapy ready_for_therapy)
        #[arg(required = true)]
        labels: Vec<AlertLabel>,
    },
    /// Show a patient's current alert state
    Show {
        /// Patient ID or unique ID prefix
        patient: String,
        /// Show the last N snapshots instead of only the current one
        #[arg(long, value_name = "N")]
        history: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProgressCommands {
    /// Record the therapy progress form
    Record {
        /// Patient ID or unique ID prefix
        patient: String,
        /// Sitting milestone reached
        #[arg(long)]
        sitting: bool,
        /// Delay reason when sitting was reached late
        #[arg(long, value_name = "TEXT", requires = "sitting")]
        sitting_reason: Option<String>,
        /// Standing milestone reached
        #[arg(long)]
        standing: bool,
        /// Delay reason when standing was reached late
        #[arg(long, value_name = "TEXT", requires = "standing")]
        standing_reason: Option<String>,
        /// Goal ambulation milestone reached
        #[arg(long)]
        ambulation: bool,
        /// Delay reason when ambulation was reached late
        #[arg(long, value_name = "TEXT", requires = "ambulation")]
        ambulation_reason: Option<String>,
    },
    /// Show a patient's current progress record
    Show {
        /// Patient ID or unique ID prefix
        patient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid date '{0}'; expected YYYY-MM-DD or YYYY-MM-DDTHH:MM")]
    InvalidDate(String),
    #[error("Invalid criterion '{0}'; expected KIND or KIND=TIME")]
    InvalidCriterion(String),
    #[error("Patient ID cannot be empty")]
    EmptyPatientId,
    #[error("No active patient found for id/prefix: {0}")]
    PatientNotFound(String),
    #[error("{0}")]
    AmbiguousPatientId(String),
    #[error(
        "Sync is not configured. Set TURSO_DATABASE_URL and TURSO_AUTH_TOKEN to enable `wardboard sync`."
    )]
    SyncNotConfigured,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wardboard=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(
        cli.db_path,
        dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")),
    );

    match cli.command {
        Commands::Patient { command } => run_patient(command, &db_path).await,
        Commands::Alert { command } => run_alert(command, &db_path).await,
        Commands::Progress { command } => run_progress(command, &db_path).await,
        Commands::Discharge {
            patient,
            when,
            criteria,
            equipment,
            equipment_other,
        } => run_discharge(&patient, when, &criteria, equipment, equipment_other, &db_path).await,
        Commands::Dashboard { json } => run_dashboard(json, &db_path).await,
        Commands::Sync => run_sync(&db_path).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}

async fn run_patient(command: PatientCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        PatientCommands::Register {
            name,
            building,
            hn,
            room,
            admitted,
            operated,
        } => {
            let service = open_service(db_path).await?;
            let patient = service
                .register_patient(NewPatient {
                    name,
                    building,
                    hn,
                    room,
                    admitted_at: parse_timestamp(&admitted)?,
                    operated_at: parse_timestamp(&operated)?,
                })
                .await?;
            println!("{}", patient.id);
        }
        PatientCommands::List { building, json } => {
            let service = open_service(db_path).await?;
            let patients = service.list_patients(building.as_deref()).await?;
            let now_ms = Utc::now().timestamp_millis();

            if json {
                let items: Vec<PatientListItem> = patients
                    .iter()
                    .map(|p| patient_to_list_item(p, now_ms))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if patients.is_empty() {
                println!("No active patients");
            } else {
                for line in format_patient_lines(&patients, now_ms) {
                    println!("{line}");
                }
            }
        }
        PatientCommands::Show { patient, json } => {
            let service = open_service(db_path).await?;
            let patient = resolve_patient(&service, &patient).await?;
            let now_ms = Utc::now().timestamp_millis();

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&patient_to_list_item(&patient, now_ms))?
                );
            } else {
                print_patient(&patient, now_ms);
            }
        }
    }
    Ok(())
}

async fn run_alert(command: AlertCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        AlertCommands::Submit {
            patient,
            prepare,
            ready,
            completed,
            pain,
            pain_note,
            out_of_ward,
            symptoms,
            symptom_other,
        } => {
            let intents = build_alert_intents(
                prepare,
                ready,
                completed,
                pain,
                pain_note,
                out_of_ward,
                &symptoms,
                symptom_other,
            );
            let service = open_service(db_path).await?;
            let resolved = resolve_patient(&service, &patient).await?;
            let snapshot = service.submit_alerts(&resolved.id, &intents).await?;
            print_snapshot(&snapshot);
        }
        AlertCommands::End { patient, labels } => {
            let service = open_service(db_path).await?;
            let resolved = resolve_patient(&service, &patient).await?;
            let labels: BTreeSet<AlertLabel> = labels.into_iter().collect();
            let snapshot = service.end_activity(&resolved.id, &labels).await?;
            print_snapshot(&snapshot);
        }
        AlertCommands::Show {
            patient,
            history,
            json,
        } => {
            let service = open_service(db_path).await?;
            let resolved = resolve_patient(&service, &patient).await?;

            if let Some(limit) = history {
                let snapshots = service.alert_history(&resolved.id, limit).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&snapshots)?);
                } else if snapshots.is_empty() {
                    println!("No alert snapshots for {}", resolved.name);
                } else {
                    for snapshot in &snapshots {
                        print_snapshot(snapshot);
                        println!();
                    }
                }
            } else {
                match service.current_alerts(&resolved.id).await? {
                    Some(snapshot) if json => {
                        println!("{}", serde_json::to_string_pretty(&snapshot)?);
                    }
                    Some(snapshot) => print_snapshot(&snapshot),
                    None => println!("No alerts recorded for {}", resolved.name),
                }
            }
        }
    }
    Ok(())
}

async fn run_progress(command: ProgressCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        ProgressCommands::Record {
            patient,
            sitting,
            sitting_reason,
            standing,
            standing_reason,
            ambulation,
            ambulation_reason,
        } => {
            let statuses = build_progress_statuses(
                sitting,
                sitting_reason,
                standing,
                standing_reason,
                ambulation,
                ambulation_reason,
            );
            let service = open_service(db_path).await?;
            let resolved = resolve_patient(&service, &patient).await?;
            let record = service.record_progress(&resolved.id, statuses).await?;

            for (activity, status) in &record.statuses {
                let mark = if status.completed { "done" } else { "pending" };
                match &status.delay_reason {
                    Some(reason) => println!("{activity}: {mark} (delayed: {reason})"),
                    None => println!("{activity}: {mark}"),
                }
            }
        }
        ProgressCommands::Show { patient, json } => {
            let service = open_service(db_path).await?;
            let resolved = resolve_patient(&service, &patient).await?;

            match service.current_progress(&resolved.id).await? {
                Some(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
                Some(record) => {
                    println!("{} (submitted {})", resolved.name, format_ts(record.submitted_at));
                    for (activity, status) in &record.statuses {
                        let mark = if status.completed { "done" } else { "pending" };
                        match &status.delay_reason {
                            Some(reason) => println!("  {activity}: {mark} (delayed: {reason})"),
                            None => println!("  {activity}: {mark}"),
                        }
                    }
                }
                None => println!("No progress recorded for {}", resolved.name),
            }
        }
    }
    Ok(())
}

async fn run_discharge(
    patient: &str,
    when: Option<DischargeOption>,
    criteria: &[String],
    equipment: Vec<EquipmentKind>,
    equipment_other: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let mut parsed_criteria = BTreeMap::new();
    for raw in criteria {
        let (kind, criterion) = parse_criterion(raw)?;
        parsed_criteria.insert(kind, criterion);
    }

    let form = DischargeForm {
        option: when,
        criteria: parsed_criteria,
        equipment: equipment.into_iter().collect(),
        equipment_other,
    };

    let service = open_service(db_path).await?;
    let resolved = resolve_patient(&service, patient).await?;
    let plan = service.plan_discharge(&resolved.id, form).await?;

    match plan.option {
        Some(DischargeOption::Final) => {
            println!("{} permanently discharged", resolved.name);
        }
        Some(option) => println!("{} planned for discharge {option}", resolved.name),
        None => println!("Discharge form saved for {}", resolved.name),
    }
    Ok(())
}

async fn run_dashboard(json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let summary = service.dashboard(Utc::now().timestamp_millis()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Active patients:      {}", summary.active_patients);
        println!("Discharging today:    {}", summary.discharging_today);
        println!("Discharging tomorrow: {}", summary.discharging_tomorrow);
        println!("Patients with alerts: {}", summary.patients_with_alerts);
    }
    Ok(())
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    if !service.is_sync_enabled().await {
        return Err(CliError::SyncNotConfigured);
    }

    service.sync().await?;
    println!("Sync completed");
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "wardboard", buffer);
}

async fn open_service(db_path: &Path) -> Result<WardService, CliError> {
    let config = WardConfig::from_env()?;
    tracing::debug!(path = %db_path.display(), "Opening ward database");
    Ok(WardService::open_path(db_path, config).await?)
}

/// Resolve a patient by exact id or unique id prefix
async fn resolve_patient(service: &WardService, query: &str) -> Result<Patient, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::EmptyPatientId);
    }

    if let Ok(id) = query.parse() {
        if let Some(patient) = service.get_patient(&id).await? {
            return Ok(patient);
        }
    }

    let matches = service.find_patients_by_id_prefix(query, 3).await?;
    match matches.len() {
        0 => Err(CliError::PatientNotFound(query.to_string())),
        1 => Ok(matches.into_iter().next().expect("one match")),
        _ => {
            let options = matches
                .iter()
                .map(|p| p.id.as_str().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousPatientId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Build the full-form intent set: omitted flags are unchecked checkboxes
#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn build_alert_intents(
    prepare: bool,
    ready: bool,
    completed: bool,
    pain: bool,
    pain_note: Option<String>,
    out_of_ward: Option<String>,
    symptoms: &[SymptomTag],
    symptom_other: Option<String>,
) -> AlertIntents {
    let mut intents = AlertIntents::new();
    intents.set(
        AlertLabel::PrepareForTherapy,
        flag_intent(prepare, None),
    );
    intents.set(AlertLabel::ReadyForTherapy, flag_intent(ready, None));
    intents.set(AlertLabel::TherapyCompleted, flag_intent(completed, None));
    intents.set(AlertLabel::Pain, flag_intent(pain, pain_note));
    intents.set(
        AlertLabel::OutOfWard,
        flag_intent(out_of_ward.is_some(), out_of_ward),
    );
    intents.set(
        AlertLabel::Symptoms,
        FieldIntent::Symptoms {
            selected: symptoms.iter().copied().collect(),
            other_detail: symptom_other,
        },
    );
    intents
}

fn flag_intent(checked: bool, note: Option<String>) -> FieldIntent {
    if checked {
        match note {
            Some(note) => FieldIntent::checked_with_note(note),
            None => FieldIntent::checked(),
        }
    } else {
        FieldIntent::unchecked()
    }
}

/// Build the submitted statuses map; untouched activities stay pending
fn build_progress_statuses(
    sitting: bool,
    sitting_reason: Option<String>,
    standing: bool,
    standing_reason: Option<String>,
    ambulation: bool,
    ambulation_reason: Option<String>,
) -> BTreeMap<ProgressActivity, ProgressStatus> {
    let status = |completed: bool, reason: Option<String>| ProgressStatus {
        completed,
        delay_reason: reason.filter(|r| !r.trim().is_empty()),
    };

    BTreeMap::from([
        (ProgressActivity::Sitting, status(sitting, sitting_reason)),
        (ProgressActivity::Standing, status(standing, standing_reason)),
        (
            ProgressActivity::GoalAmbulation,
            status(ambulation, ambulation_reason),
        ),
    ])
}

/// Parse "KIND" or "KIND=TIME" into a signed-off criterion
fn parse_criterion(raw: &str) -> Result<(CriterionKind, Criterion), CliError> {
    let (kind_str, time_str) = match raw.split_once('=') {
        Some((kind, time)) => (kind, Some(time)),
        None => (raw, None),
    };

    let kind: CriterionKind = kind_str
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidCriterion(raw.to_string()))?;
    let time = time_str.map(parse_timestamp).transpose()?;

    Ok((
        kind,
        Criterion {
            checked: true,
            time,
        },
    ))
}

/// Parse a date or date-time string into Unix milliseconds (UTC)
fn parse_timestamp(raw: &str) -> Result<i64, CliError> {
    let raw = raw.trim();

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed.and_utc().timestamp_millis());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }

    Err(CliError::InvalidDate(raw.to_string()))
}

fn format_ts(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

#[derive(Debug, Serialize)]
struct PatientListItem {
    id: String,
    hn: Option<String>,
    name: String,
    building: String,
    room: Option<String>,
    post_op_day: i64,
    length_of_stay: i64,
}

fn patient_to_list_item(patient: &Patient, now_ms: i64) -> PatientListItem {
    PatientListItem {
        id: patient.id.as_str(),
        hn: patient.hn.clone(),
        name: patient.name.clone(),
        building: patient.building.clone(),
        room: patient.room.clone(),
        post_op_day: patient.post_op_day(now_ms),
        length_of_stay: patient.length_of_stay(now_ms),
    }
}

fn format_patient_lines(patients: &[Patient], now_ms: i64) -> Vec<String> {
    patients
        .iter()
        .map(|patient| {
            let id = patient.id.as_str();
            let short_id = id.chars().take(13).collect::<String>();
            format!(
                "{short_id:<13}  {:<24}  {:<6}  POD {:>3}  LOS {:>3}",
                patient.name,
                patient.building,
                patient.post_op_day(now_ms),
                patient.length_of_stay(now_ms)
            )
        })
        .collect()
}

fn print_patient(patient: &Patient, now_ms: i64) {
    println!("{}", patient.name);
    println!("  id:        {}", patient.id);
    if let Some(hn) = &patient.hn {
        println!("  hn:        {hn}");
    }
    println!("  building:  {}", patient.building);
    if let Some(room) = &patient.room {
        println!("  room:      {room}");
    }
    println!("  admitted:  {}", format_ts(patient.admitted_at));
    println!("  operated:  {}", format_ts(patient.operated_at));
    println!("  post-op:   day {}", patient.post_op_day(now_ms));
    println!("  stay:      {} days", patient.length_of_stay(now_ms));
}

fn print_snapshot(snapshot: &AlertSnapshot) {
    println!(
        "snapshot {} (submitted {})",
        snapshot.id,
        format_ts(snapshot.submitted_at)
    );
    if snapshot.fields.is_empty() {
        println!("  no alert fields recorded");
        return;
    }
    for (label, field) in &snapshot.fields {
        let state = if field.active {
            field
                .triggered_at
                .map_or_else(|| "active".to_string(), |t| format!("active since {}", format_ts(t)))
        } else {
            field
                .resolved_at
                .map_or_else(|| "resolved".to_string(), |t| format!("resolved at {}", format_ts(t)))
        };
        let mut extras = Vec::new();
        if let Some(note) = &field.note {
            extras.push(note.clone());
        }
        if !field.symptoms.is_empty() {
            extras.push(
                field
                    .symptoms
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        if let Some(detail) = &field.other_detail {
            extras.push(format!("other: {detail}"));
        }

        if extras.is_empty() {
            println!("  {label:<20} {state}");
        } else {
            println!("  {label:<20} {state}  ({})", extras.join("; "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    use wardboard_core::models::ProgressThresholds;

    #[test]
    fn parse_timestamp_accepts_date_and_datetime() {
        let midnight = parse_timestamp("2026-08-01").unwrap();
        let with_time = parse_timestamp("2026-08-01T09:30").unwrap();
        let with_seconds = parse_timestamp("2026-08-01T09:30:15").unwrap();

        assert_eq!(with_time - midnight, (9 * 60 + 30) * 60 * 1000);
        assert_eq!(with_seconds - with_time, 15 * 1000);
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(CliError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_timestamp("01/08/2026"),
            Err(CliError::InvalidDate(_))
        ));
    }

    #[test]
    fn parse_criterion_with_and_without_time() {
        let (kind, criterion) = parse_criterion("orthopedist=2026-08-07T10:30").unwrap();
        assert_eq!(kind, CriterionKind::Orthopedist);
        assert!(criterion.checked);
        assert!(criterion.time.is_some());

        let (kind, criterion) = parse_criterion("geriatric").unwrap();
        assert_eq!(kind, CriterionKind::Geriatric);
        assert!(criterion.time.is_none());
    }

    #[test]
    fn parse_criterion_rejects_unknown_kind() {
        assert!(matches!(
            parse_criterion("janitor=2026-08-07T10:30"),
            Err(CliError::InvalidCriterion(_))
        ));
    }

    #[test]
    fn build_alert_intents_covers_every_label() {
        let intents = build_alert_intents(
            true,
            false,
            false,
            true,
            Some("hip pain".to_string()),
            None,
            &[SymptomTag::Nausea],
            None,
        );

        // A full form submits an intent for every label.
        for label in AlertLabel::ALL {
            assert!(intents.contains(label), "missing intent for {label}");
        }
        assert!(intents.is_checked(AlertLabel::PrepareForTherapy));
        assert!(!intents.is_checked(AlertLabel::ReadyForTherapy));
        assert!(intents.is_checked(AlertLabel::Pain));
        assert!(!intents.is_checked(AlertLabel::OutOfWard));
        assert!(intents.is_checked(AlertLabel::Symptoms));
    }

    #[test]
    fn build_alert_intents_out_of_ward_carries_reason() {
        let intents = build_alert_intents(
            false,
            false,
            false,
            false,
            None,
            Some("radiology".to_string()),
            &[],
            None,
        );

        match intents.get(AlertLabel::OutOfWard).unwrap() {
            FieldIntent::Flag { checked, note } => {
                assert!(*checked);
                assert_eq!(note.as_deref(), Some("radiology"));
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn build_progress_statuses_drops_blank_reasons() {
        let statuses = build_progress_statuses(
            true,
            Some("  ".to_string()),
            true,
            Some("ward transfer".to_string()),
            false,
            None,
        );

        assert!(statuses[&ProgressActivity::Sitting].delay_reason.is_none());
        assert_eq!(
            statuses[&ProgressActivity::Standing].delay_reason.as_deref(),
            Some("ward transfer")
        );
        assert!(!statuses[&ProgressActivity::GoalAmbulation].completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_patient_supports_exact_and_prefix_id() {
        let db_path = unique_test_db_path();
        let service = WardService::open_path(&db_path, WardConfig::default())
            .await
            .unwrap();
        let now = Utc::now().timestamp_millis();
        let patient = service
            .register_patient(NewPatient {
                name: "Somchai P.".to_string(),
                building: "B5".to_string(),
                hn: None,
                room: None,
                admitted_at: now,
                operated_at: now,
            })
            .await
            .unwrap();

        let by_exact = resolve_patient(&service, &patient.id.as_str()).await.unwrap();
        assert_eq!(by_exact.id, patient.id);

        let prefix: String = patient.id.as_str().chars().take(13).collect();
        let by_prefix = resolve_patient(&service, &prefix).await.unwrap();
        assert_eq!(by_prefix.id, patient.id);

        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_patient_rejects_missing_and_empty() {
        let db_path = unique_test_db_path();
        let service = WardService::open_path(&db_path, WardConfig::default())
            .await
            .unwrap();

        assert!(matches!(
            resolve_patient(&service, "  ").await,
            Err(CliError::EmptyPatientId)
        ));
        assert!(matches!(
            resolve_patient(&service, "does-not-exist").await,
            Err(CliError::PatientNotFound(_))
        ));

        cleanup_db_files(&db_path);
    }

    #[test]
    fn default_thresholds_match_ward_protocol() {
        // The CLI inherits thresholds from core config; pin the defaults the
        // ward protocol documents.
        let thresholds = ProgressThresholds::default();
        assert_eq!(
            (thresholds.sitting_hours, thresholds.standing_hours, thresholds.goal_ambulation_hours),
            (24, 24, 48)
        );
    }

    #[test]
    fn run_completions_writes_bash_script_file() {
        let output_path = std::env::temp_dir().join(format!(
            "wardboard-completions-test-{}.bash",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));

        run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

        let script = std::fs::read_to_string(&output_path).unwrap();
        assert!(script.contains("_wardboard()"));
        assert!(script.contains("complete -F _wardboard"));

        let _ = std::fs::remove_file(output_path);
    }

    fn unique_test_db_path() -> PathBuf {
        static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("wardboard-cli-test-{timestamp}-{sequence}.db"))
    }

    fn cleanup_db_files(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
    }
}
