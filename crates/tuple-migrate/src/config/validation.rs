//! Configuration validation.

use super::{Config, DatabaseConfig, StateBackend};
use crate::drivers::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    // Reading and writing the same database would translate rows into themselves
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let translation = &config.translation;
    if let Some(0) = translation.tree_limit {
        return Err(MigrateError::Config(
            "translation.tree_limit must be at least 1".into(),
        ));
    }
    if translation.matching_model.as_os_str().is_empty() {
        return Err(MigrateError::Config(
            "translation.matching_model is required".into(),
        ));
    }
    if translation.state_backend == StateBackend::File
        && translation.process_file.as_os_str().is_empty()
    {
        return Err(MigrateError::Config(
            "translation.process_file is required for the file state backend".into(),
        ));
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", side)));
    }
    SslMode::parse(&db.ssl_mode)
        .map_err(|e| MigrateError::Config(format!("{}.ssl_mode: {}", side, e)))?;
    Ok(())
}
