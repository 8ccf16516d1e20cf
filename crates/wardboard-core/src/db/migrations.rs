//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: ward schema
///
/// Every per-patient collection carries `is_active` for supersession plus a
/// `(patient_id, is_active)` index so the current-row query stays cheap.
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql has no execute_batch; run statements inside one transaction.
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Patient registry
        "CREATE TABLE IF NOT EXISTS patients (
            id TEXT PRIMARY KEY,
            hn TEXT,
            name TEXT NOT NULL,
            building TEXT NOT NULL,
            room TEXT,
            admitted_at INTEGER NOT NULL,
            operated_at INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        "CREATE INDEX IF NOT EXISTS idx_patients_building ON patients(building)",
        "CREATE INDEX IF NOT EXISTS idx_patients_active ON patients(is_active)",
        // Alert snapshot history; `fields` is the label -> field-state JSON
        // document, `has_alerts` is derived at commit time for dashboards
        "CREATE TABLE IF NOT EXISTS alert_snapshots (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL REFERENCES patients(id),
            submitted_at INTEGER NOT NULL,
            fields TEXT NOT NULL,
            has_alerts INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        "CREATE INDEX IF NOT EXISTS idx_alert_snapshots_current
            ON alert_snapshots(patient_id, is_active)",
        "CREATE INDEX IF NOT EXISTS idx_alert_snapshots_submitted
            ON alert_snapshots(patient_id, submitted_at DESC)",
        // Therapy progress history
        "CREATE TABLE IF NOT EXISTS progress_records (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL REFERENCES patients(id),
            submitted_at INTEGER NOT NULL,
            statuses TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        "CREATE INDEX IF NOT EXISTS idx_progress_records_current
            ON progress_records(patient_id, is_active)",
        // Discharge plan history
        "CREATE TABLE IF NOT EXISTS discharge_plans (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL REFERENCES patients(id),
            submitted_at INTEGER NOT NULL,
            option TEXT,
            criteria TEXT NOT NULL,
            equipment TEXT NOT NULL,
            equipment_other TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        "CREATE INDEX IF NOT EXISTS idx_discharge_plans_current
            ON discharge_plans(patient_id, is_active)",
        "CREATE INDEX IF NOT EXISTS idx_discharge_plans_option
            ON discharge_plans(option, submitted_at)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v1_creates_ward_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in [
            "patients",
            "alert_snapshots",
            "progress_records",
            "discharge_plans",
        ] {
            let mut rows = conn
                .query(
                    "SELECT EXISTS(
                        SELECT 1 FROM sqlite_master
                        WHERE type = 'table' AND name = ?
                    )",
                    libsql::params![table],
                )
                .await
                .unwrap();

            let exists = rows
                .next()
                .await
                .unwrap()
                .is_some_and(|row| row.get::<i32>(0).unwrap() != 0);

            assert!(exists, "missing table {table}");
        }
    }
}
