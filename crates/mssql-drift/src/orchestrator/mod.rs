//! Migration orchestrator.
//!
//! Sequence: common tables, dependency graph against the target, delete and
//! insert orders, operator confirmation, deletions (children first), then
//! transfers (parents first). Per-table failures are recorded and the run
//! moves on; only introspection failures before confirmation abort it.

mod plan;

pub use plan::MigrationPlan;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::core::{Database, TableId};
use crate::error::Result;
use crate::transfer::{TableTransferReport, TransferConfig, TransferEngine};

/// Asks the operator before anything destructive happens.
pub trait Confirmer {
    /// Show `prompt`; true only for an explicit affirmative answer.
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirmer for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Confirms without asking (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Whether operator input matches the confirmation token.
///
/// Surrounding whitespace and case are ignored; anything else declines.
pub fn token_matches(input: &str, token: &str) -> bool {
    let token = token.trim();
    !token.is_empty() && input.trim().eq_ignore_ascii_case(token)
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every table was deleted and transferred.
    Completed,
    /// At least one table failed; the others were migrated.
    CompletedWithErrors,
    /// The operator declined; nothing was changed.
    Aborted,
}

/// Outcome of clearing one target table.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub table: TableId,
    pub rows_deleted: u64,
    pub error: Option<String>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    /// Unique run identifier.
    pub run_id: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Deletion order that was used.
    pub delete_order: Vec<TableId>,

    /// Insertion order that was used.
    pub insert_order: Vec<TableId>,

    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,

    pub rows_deleted: u64,
    pub rows_read: usize,
    pub rows_transferred: u64,
    pub rows_dropped_orphans: usize,

    pub deletions: Vec<DeleteReport>,
    pub transfers: Vec<TableTransferReport>,

    /// Tables whose deletion or transfer failed, for follow-up.
    pub failed_tables: Vec<String>,
}

impl MigrationSummary {
    fn new(run_id: String, started_at: DateTime<Utc>, plan: &MigrationPlan) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            delete_order: plan.delete_order.sequence.clone(),
            insert_order: plan.insert_order.sequence.clone(),
            tables_total: plan.common_tables.len(),
            tables_success: 0,
            tables_failed: 0,
            rows_deleted: 0,
            rows_read: 0,
            rows_transferred: 0,
            rows_dropped_orphans: 0,
            deletions: Vec::new(),
            transfers: Vec::new(),
            failed_tables: Vec::new(),
        }
    }

    fn mark_failed(&mut self, table: &TableId) {
        let name = table.to_string();
        if !self.failed_tables.contains(&name) {
            self.failed_tables.push(name);
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs delete-then-insert migrations between two databases.
pub struct Migrator {
    engine: TransferEngine,
}

impl Migrator {
    pub fn new(config: &MigrationConfig) -> Self {
        Self {
            engine: TransferEngine::new(TransferConfig::from(config)),
        }
    }

    /// Use a preconfigured transfer engine.
    pub fn with_engine(engine: TransferEngine) -> Self {
        Self { engine }
    }

    /// Compute tables and orders without touching any data.
    pub async fn plan(
        &self,
        source: &mut dyn Database,
        target: &mut dyn Database,
    ) -> Result<MigrationPlan> {
        MigrationPlan::build(source, target).await
    }

    /// Plan, confirm, then replace every common table's contents.
    pub async fn run(
        &self,
        source: &mut dyn Database,
        target: &mut dyn Database,
        confirmer: &mut dyn Confirmer,
    ) -> Result<MigrationSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Starting migration run: {}", run_id);

        info!("Phase 1: Building migration plan");
        let plan = self.plan(source, target).await?;
        plan.log();

        let prompt = plan.confirmation_prompt(target.label());
        if !confirmer.confirm(&prompt) {
            info!("Migration declined by operator; no changes made");
            let mut summary = MigrationSummary::new(run_id, started_at, &plan);
            summary.status = RunStatus::Aborted;
            summary.completed_at = Utc::now();
            return Ok(summary);
        }

        Ok(self.execute(&plan, source, target, run_id, started_at).await)
    }

    /// Delete in delete order, then transfer in insert order.
    pub async fn execute(
        &self,
        plan: &MigrationPlan,
        source: &mut dyn Database,
        target: &mut dyn Database,
        run_id: String,
        started_at: DateTime<Utc>,
    ) -> MigrationSummary {
        let timer = Instant::now();
        let mut summary = MigrationSummary::new(run_id, started_at, plan);

        info!("Phase 2: Deleting target rows ({} tables)", plan.delete_order.len());
        for table in plan.delete_order.iter() {
            match target.delete_all_rows(table).await {
                Ok(rows) => {
                    info!("{}: deleted {} rows", table, rows);
                    summary.rows_deleted += rows;
                    summary.deletions.push(DeleteReport {
                        table: table.clone(),
                        rows_deleted: rows,
                        error: None,
                    });
                }
                Err(e) => {
                    error!("{}: delete failed: {}", table, e.format_detailed());
                    summary.mark_failed(table);
                    summary.deletions.push(DeleteReport {
                        table: table.clone(),
                        rows_deleted: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!("Phase 3: Transferring data ({} tables)", plan.insert_order.len());
        for table in plan.insert_order.iter() {
            let report = self
                .engine
                .transfer_table(source, target, table, &plan.foreign_keys)
                .await;
            summary.rows_read += report.rows_read;
            summary.rows_transferred += report.rows_written;
            summary.rows_dropped_orphans += report.rows_dropped();
            if report.is_failed() {
                summary.mark_failed(table);
            }
            summary.transfers.push(report);
        }

        // A table counts as failed if either its delete or its transfer failed
        summary.tables_failed = summary.failed_tables.len();
        summary.tables_success = summary.tables_total.saturating_sub(summary.tables_failed);
        summary.completed_at = Utc::now();
        summary.duration_seconds = timer.elapsed().as_secs_f64();
        if !summary.failed_tables.is_empty() {
            summary.status = RunStatus::CompletedWithErrors;
            warn!(
                "Migration finished with {} failed tables: {}",
                summary.failed_tables.len(),
                summary.failed_tables.join(", ")
            );
        } else {
            info!(
                "Migration complete: {} tables, {} rows in {:.2}s",
                summary.tables_success, summary.rows_transferred, summary.duration_seconds
            );
        }
        summary
    }
}
