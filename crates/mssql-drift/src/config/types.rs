//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database (the side rows are copied from).
    pub source: DatabaseConfig,

    /// Target database (the side whose tables are replaced).
    pub target: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Connection parameters for one SQL Server database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Display label used in logs and reports (default: the database name).
    #[serde(default)]
    pub name: Option<String>,

    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Prefer `password_env` so the secret stays out of the file.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl DatabaseConfig {
    /// Label shown to the operator for this database.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.database)
    }

    /// Resolved password, or empty when none was configured.
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("password_env", &self.password_env)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Literal the operator must type before any destructive step.
    /// Compared after trimming, case-insensitively.
    #[serde(default = "default_confirm_token")]
    pub confirm_token: String,

    /// Temporal type that is never transferred (default: "datetime").
    #[serde(default = "default_legacy_temporal_type")]
    pub legacy_temporal_type: String,

    /// Rows included in log previews of a failing batch.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,

    /// Values per target lookup when checking foreign-key references.
    #[serde(default = "default_key_lookup_batch")]
    pub key_lookup_batch: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            confirm_token: default_confirm_token(),
            legacy_temporal_type: default_legacy_temporal_type(),
            preview_rows: default_preview_rows(),
            key_lookup_batch: default_key_lookup_batch(),
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_confirm_token() -> String {
    "YES".to_string()
}

fn default_legacy_temporal_type() -> String {
    "datetime".to_string()
}

fn default_preview_rows() -> usize {
    3
}

fn default_key_lookup_batch() -> usize {
    2000
}
