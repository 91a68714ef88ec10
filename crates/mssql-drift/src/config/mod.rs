//! Configuration loading, secret resolution and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{Result, SyncError};
use std::path::Path;

/// Environment variable overriding the source password.
pub const SOURCE_PASSWORD_ENV: &str = "MSSQL_DRIFT_SOURCE_PASSWORD";

/// Environment variable overriding the target password.
pub const TARGET_PASSWORD_ENV: &str = "MSSQL_DRIFT_TARGET_PASSWORD";

impl Config {
    /// Load configuration from a YAML file, resolving secrets from the environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_yaml_with_env(yaml, |key| std::env::var(key).ok())
    }

    /// Parse configuration, looking secrets up through `env`.
    pub fn from_yaml_with_env<F>(yaml: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.source.resolve_password(SOURCE_PASSWORD_ENV, &env)?;
        config.target.resolve_password(TARGET_PASSWORD_ENV, &env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl DatabaseConfig {
    /// Fill `password` from the override variable or `password_env`.
    ///
    /// The override variable wins over everything in the file; `password_env`
    /// wins over an inline `password`.
    fn resolve_password<F>(&mut self, override_var: &str, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env(override_var) {
            self.password = Some(value);
            return Ok(());
        }
        if let Some(var) = &self.password_env {
            match env(var) {
                Some(value) => self.password = Some(value),
                None => {
                    return Err(SyncError::Config(format!(
                        "environment variable {} (password_env for {}) is not set",
                        var,
                        self.display_name()
                    )))
                }
            }
        }
        Ok(())
    }
}
