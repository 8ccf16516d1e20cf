//! Database connection management

use crate::error::{Error, Result};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;
use std::time::Duration;

use super::migrations;

/// Configuration for syncing the local database with a hosted Turso replica
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Remote database URL (e.g., `libsql://your-ward.turso.io`)
    pub url: Option<String>,
    /// Authentication token for the remote database
    pub auth_token: Option<String>,
    /// Automatic sync interval; `None` disables background sync
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    /// Default interval between background syncs
    const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a sync configuration for the given remote
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
            sync_interval: Some(Self::DEFAULT_SYNC_INTERVAL),
        }
    }

    /// Override the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Check if both remote URL and token are present
    pub const fn is_configured(&self) -> bool {
        self.url.is_some() && self.auth_token.is_some()
    }
}

/// Wrapper around a libSQL database and its primary connection
pub struct Database {
    db: LibSqlDatabase,
    conn: Connection,
    sync_config: Option<SyncConfig>,
}

impl Database {
    /// Open a local-only ward database, creating it if missing
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::finish_open(db, None).await
    }

    /// Open an in-memory ward database (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::finish_open(db, None).await
    }

    /// Open an embedded replica that syncs with a hosted Turso database
    ///
    /// Reads are served locally; writes sync to the remote, which is how
    /// other ward stations observe committed snapshots.
    pub async fn open_with_sync(
        local_path: impl AsRef<Path>,
        sync_config: SyncConfig,
    ) -> Result<Self> {
        let path_str = local_path.as_ref().to_string_lossy().to_string();

        let url = sync_config
            .url
            .clone()
            .ok_or_else(|| Error::InvalidInput("sync URL is required".into()))?;
        let token = sync_config
            .auth_token
            .clone()
            .ok_or_else(|| Error::InvalidInput("sync auth token is required".into()))?;

        let mut builder = Builder::new_remote_replica(&path_str, url, token);
        if let Some(interval) = sync_config.sync_interval {
            builder = builder.sync_interval(interval);
        }

        let db = builder.build().await?;

        // Pull the remote schema first so migrations see the shared state.
        db.sync().await?;
        tracing::debug!("Initial replica sync complete");

        Self::finish_open(db, Some(sync_config)).await
    }

    async fn finish_open(db: LibSqlDatabase, sync_config: Option<SyncConfig>) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self {
            db,
            conn,
            sync_config,
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure connection pragmas; some are unsupported on replicas and
    /// failures there are ignored
    async fn configure(&self) -> Result<()> {
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Sync with the remote database, if configured
    pub async fn sync(&self) -> Result<()> {
        if self.sync_config.is_some() {
            self.db.sync().await?;
            tracing::debug!("Ward database synced with remote");
        }
        Ok(())
    }

    /// Check if replica sync is configured
    pub const fn is_sync_enabled(&self) -> bool {
        self.sync_config.is_some()
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn open_in_memory_runs_migrations() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(!db.is_sync_enabled());

        let mut rows = db
            .connection()
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'patients'",
                (),
            )
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ward.db");

        let db = Database::open(&path).await.unwrap();
        drop(db);
        assert!(path.exists());
    }

    #[test]
    fn sync_config_is_configured_needs_both_values() {
        assert!(SyncConfig::new("libsql://ward.turso.io", "token").is_configured());
        assert!(!SyncConfig::default().is_configured());
    }
}
