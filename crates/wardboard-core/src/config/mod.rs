//! Runtime configuration
//!
//! Database location, optional replica sync credentials, and the therapy
//! overdue thresholds. Thresholds are deliberately configuration: ward
//! protocols disagree on whether standing is a 24h or 48h milestone.

use std::env;
use std::path::PathBuf;

use crate::db::SyncConfig;
use crate::error::{Error, Result};
use crate::models::ProgressThresholds;

/// Environment variable overriding the database path
pub const ENV_DB_PATH: &str = "WARDBOARD_DB_PATH";
/// Environment variable for the hosted replica URL
pub const ENV_SYNC_URL: &str = "TURSO_DATABASE_URL";
/// Environment variable for the hosted replica auth token
pub const ENV_SYNC_TOKEN: &str = "TURSO_AUTH_TOKEN";

const ENV_SITTING_HOURS: &str = "WARDBOARD_SITTING_HOURS";
const ENV_STANDING_HOURS: &str = "WARDBOARD_STANDING_HOURS";
const ENV_AMBULATION_HOURS: &str = "WARDBOARD_AMBULATION_HOURS";

/// Resolved configuration for one wardboard process
#[derive(Debug, Clone, Default)]
pub struct WardConfig {
    /// Replica sync credentials, when the hosted database is reachable
    pub sync: Option<SyncConfig>,
    /// Overdue thresholds for therapy milestones
    pub thresholds: ProgressThresholds,
}

impl WardConfig {
    /// Build a configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            sync: sync_config_from_env(),
            thresholds: thresholds_from_env()?,
        })
    }
}

/// Database path resolution: explicit override, then environment, then the
/// platform data directory
#[must_use]
pub fn resolve_db_path(explicit: Option<PathBuf>, default_dir: PathBuf) -> PathBuf {
    explicit
        .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(|| default_dir.join("wardboard").join("wardboard.db"))
}

fn sync_config_from_env() -> Option<SyncConfig> {
    let url = env::var(ENV_SYNC_URL).ok()?;
    let auth_token = env::var(ENV_SYNC_TOKEN).ok()?;

    if url.trim().is_empty() || auth_token.trim().is_empty() {
        return None;
    }

    Some(SyncConfig::new(url, auth_token))
}

fn thresholds_from_env() -> Result<ProgressThresholds> {
    let mut thresholds = ProgressThresholds::default();
    if let Some(hours) = parse_hours(ENV_SITTING_HOURS)? {
        thresholds.sitting_hours = hours;
    }
    if let Some(hours) = parse_hours(ENV_STANDING_HOURS)? {
        thresholds.standing_hours = hours;
    }
    if let Some(hours) = parse_hours(ENV_AMBULATION_HOURS)? {
        thresholds.goal_ambulation_hours = hours;
    }
    Ok(thresholds)
}

fn parse_hours(var: &str) -> Result<Option<u32>> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidInput(format!("{var} must be a whole number of hours"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_db_path_prefers_explicit() {
        let explicit = PathBuf::from("/tmp/explicit.db");
        let resolved = resolve_db_path(Some(explicit.clone()), PathBuf::from("/data"));
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn resolve_db_path_defaults_under_data_dir() {
        // Environment-variable behavior is not exercised here; process env
        // is shared across the test binary.
        let resolved = resolve_db_path(None, PathBuf::from("/data"));
        if env::var_os(ENV_DB_PATH).is_none() {
            assert_eq!(resolved, PathBuf::from("/data/wardboard/wardboard.db"));
        }
    }

    #[test]
    fn default_config_has_default_thresholds() {
        let config = WardConfig::default();
        assert_eq!(config.thresholds, ProgressThresholds::default());
        assert!(config.sync.is_none());
    }
}
