//! # mssql-drift
//!
//! Drift detection and dependency-safe data migration between two SQL Server
//! databases.
//!
//! - **Drift reports** for tables, columns and stored procedures
//! - **Foreign-key ordering** so deletes run children-first and inserts parents-first
//! - **Orphan filtering** of rows whose parent keys are missing on the target
//! - **Per-table transactions** with identity override and legacy temporal column handling
//! - **Procedure script archiving** for versioned `NNN_Name.sql` files
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_drift::{AssumeYes, Config, MssqlDatabase, Migrator};
//!
//! #[tokio::main]
//! async fn main() -> mssql_drift::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut source = MssqlDatabase::connect("source", &config.source).await?;
//!     let mut target = MssqlDatabase::connect("target", &config.target).await?;
//!     let summary = Migrator::new(&config.migration)
//!         .run(&mut source, &mut target, &mut AssumeYes)
//!         .await?;
//!     println!("Transferred {} rows", summary.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod core;
pub mod diff;
pub mod error;
pub mod graph;
pub mod mssql;
pub mod orchestrator;
pub mod order;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use archive::{archive_old_versions, ArchiveMove, ArchiveReport};
pub use config::{Config, DatabaseConfig, MigrationConfig};
pub use crate::core::{Database, ForeignKeyEdge, SchemaIntrospector, TableId, TableStore};
pub use diff::{compare_databases, CompareOptions, DriftReport};
pub use error::{Result, SyncError};
pub use graph::DependencyGraph;
pub use mssql::MssqlDatabase;
pub use orchestrator::{
    token_matches, AssumeYes, Confirmer, MigrationPlan, MigrationSummary, Migrator, RunStatus,
};
pub use order::{order_for_delete, order_for_insert, OrderedTableSequence};
pub use transfer::{TableTransferReport, TransferConfig, TransferEngine, TransferStatus};
