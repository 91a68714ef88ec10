//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{Result, SyncError};

/// Upper bound on lookup values per statement (TDS allows 2100 parameters).
const MAX_KEY_LOOKUP_BATCH: usize = 2000;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    if config.source.host.eq_ignore_ascii_case(&config.target.host)
        && config.source.port == config.target.port
        && config.source.database.eq_ignore_ascii_case(&config.target.database)
    {
        return Err(SyncError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.confirm_token.trim().is_empty() {
        return Err(SyncError::Config(
            "migration.confirm_token cannot be empty".into(),
        ));
    }
    if migration.legacy_temporal_type.trim().is_empty() {
        return Err(SyncError::Config(
            "migration.legacy_temporal_type cannot be empty".into(),
        ));
    }
    if migration.key_lookup_batch == 0 || migration.key_lookup_batch > MAX_KEY_LOOKUP_BATCH {
        return Err(SyncError::Config(format!(
            "migration.key_lookup_batch must be between 1 and {}, got {}",
            MAX_KEY_LOOKUP_BATCH, migration.key_lookup_batch
        )));
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(SyncError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(SyncError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(SyncError::Config(format!("{}.user is required", side)));
    }
    if db.password.is_none() {
        return Err(SyncError::Config(format!(
            "{}.password is not set (use password_env or the override variable)",
            side
        )));
    }
    Ok(())
}
