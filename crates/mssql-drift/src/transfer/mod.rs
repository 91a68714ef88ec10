//! Row transfer engine.
//!
//! Moves one table at a time from source to target:
//!
//! 1. **Read** every row of the source table into memory
//! 2. **Orphan filter** rows whose foreign-key values are missing in the target
//! 3. **Column strip** the legacy temporal columns, which are never copied
//! 4. **Substitute** the table's start instant into stripped NOT NULL columns,
//!    normalize values and put self-referenced rows ahead of their referrers
//! 5. **Write** in a single transaction, with identity override when the
//!    target table has an identity column
//!
//! A failure never escapes [`TransferEngine::transfer_table`]: it is logged
//! with the batch shape and recorded in the returned report, so the caller
//! can carry on with the next table.

mod orphans;
mod report;

pub use report::{OrphanReport, TableTransferReport, TransferPhase, TransferStatus};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{error, info, warn};

use crate::config::MigrationConfig;
use crate::core::{ColumnMetadata, Database, ForeignKeyEdge, RowBatch, SqlValue, TableId};
use crate::error::SyncError;

/// Source of the current instant; injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Base type of the temporal columns that are never copied.
    pub legacy_temporal_type: String,
    /// Values per foreign-key lookup against the target.
    pub key_lookup_batch: usize,
    /// Rows shown when logging a failed batch.
    pub preview_rows: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self::from(&MigrationConfig::default())
    }
}

impl From<&MigrationConfig> for TransferConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            legacy_temporal_type: config.legacy_temporal_type.clone(),
            key_lookup_batch: config.key_lookup_batch,
            preview_rows: config.preview_rows,
        }
    }
}

/// Why a table transfer stopped.
struct Failure {
    phase: TransferPhase,
    error: SyncError,
    batch_preview: Option<String>,
}

fn at(phase: TransferPhase) -> impl FnOnce(SyncError) -> Failure {
    move |error| Failure {
        phase,
        error,
        batch_preview: None,
    }
}

/// Transfers tables from a source to a target database.
pub struct TransferEngine {
    config: TransferConfig,
    clock: Clock,
}

impl TransferEngine {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for substituted timestamps.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Transfer every row of `table`, checking it against the target's
    /// `foreign_keys`. Never fails; the outcome is in the report.
    pub async fn transfer_table(
        &self,
        source: &mut dyn Database,
        target: &mut dyn Database,
        table: &TableId,
        foreign_keys: &[ForeignKeyEdge],
    ) -> TableTransferReport {
        let started = Instant::now();
        let mut report = TableTransferReport::new(table.clone());

        if let Err(failure) = self.run(source, target, table, foreign_keys, &mut report).await {
            error!(
                "{}: transfer failed during {:?}: {}",
                table,
                failure.phase,
                failure.error.format_detailed()
            );
            if let Some(preview) = &failure.batch_preview {
                error!("{}: batch that failed:\n{}", table, preview);
            }
            report.status = TransferStatus::Failed;
            report.failed_phase = Some(failure.phase);
            report.error = Some(failure.error.to_string());
            return report;
        }

        info!(
            "{}: {:?}, {} read, {} dropped as orphans, {} written in {:.2}s",
            table,
            report.status,
            report.rows_read,
            report.rows_dropped(),
            report.rows_written,
            started.elapsed().as_secs_f64()
        );
        report
    }

    async fn run(
        &self,
        source: &mut dyn Database,
        target: &mut dyn Database,
        table: &TableId,
        foreign_keys: &[ForeignKeyEdge],
        report: &mut TableTransferReport,
    ) -> Result<(), Failure> {
        let substitute_at = (self.clock)().naive_utc().trunc_subsecs(0);

        let mut batch = source.read_all_rows(table).await.map_err(at(TransferPhase::Read))?;
        report.rows_read = batch.len();
        info!("{}: read {} rows from {}", table, batch.len(), source.label());
        if batch.is_empty() {
            report.status = TransferStatus::Empty;
            return Ok(());
        }

        report.orphans = orphans::filter_orphans(
            target,
            table,
            &mut batch,
            foreign_keys,
            self.config.key_lookup_batch,
        )
        .await
        .map_err(at(TransferPhase::OrphanFilter))?;
        if batch.is_empty() {
            warn!("{}: every row referenced a missing parent; nothing to insert", table);
            report.status = TransferStatus::EmptyAfterFiltering;
            return Ok(());
        }

        let target_columns = target
            .list_columns(table)
            .await
            .map_err(at(TransferPhase::Prepare))?;
        report.skipped_columns = drop_unknown_columns(&mut batch, &target_columns);
        if !report.skipped_columns.is_empty() {
            warn!(
                "{}: columns missing on the target are not copied: {:?}",
                table, report.skipped_columns
            );
        }

        let tag = self.config.legacy_temporal_type.as_str();
        let legacy = target
            .list_columns_of_type(table, tag)
            .await
            .map_err(at(TransferPhase::Prepare))?;
        report.stripped_columns = legacy.into_iter().filter(|c| batch.drop_column(c)).collect();
        if !report.stripped_columns.is_empty() {
            info!("{}: {} columns not copied: {:?}", table, tag, report.stripped_columns);
        }

        let required = target
            .list_required_columns_of_type(table, tag)
            .await
            .map_err(at(TransferPhase::Prepare))?;
        for name in &required {
            if batch.column_index(name).is_none() {
                batch.push_constant_column(name.clone(), SqlValue::Timestamp(substitute_at));
                warn!(
                    "{}: NOT NULL {} column {} filled with {} (UTC) for {} rows",
                    table,
                    tag,
                    name,
                    substitute_at,
                    batch.len()
                );
                report.substituted_columns.push(name.clone());
            }
        }
        if !report.substituted_columns.is_empty() {
            report.substituted_at = Some(substitute_at);
        }
        if batch.columns.is_empty() {
            warn!("{}: no columns left after removing {} columns", table, tag);
            report.status = TransferStatus::EmptyAfterFiltering;
            return Ok(());
        }

        batch.normalize();
        orphans::order_self_references(table, &mut batch, foreign_keys);

        let has_identity = target
            .has_identity_column(table)
            .await
            .map_err(at(TransferPhase::Prepare))?;
        report.identity_override = has_identity
            && target_columns
                .iter()
                .any(|c| c.identity && batch.column_index(&c.name).is_some());

        let written = match target.write_rows(table, &batch, report.identity_override).await {
            Ok(n) => n,
            Err(error) => {
                return Err(Failure {
                    phase: TransferPhase::Write,
                    error,
                    batch_preview: Some(batch.preview(self.config.preview_rows)),
                })
            }
        };
        report.rows_written = written;
        report.status = TransferStatus::Transferred;
        Ok(())
    }
}

/// Drop batch columns the target table does not have or computes itself;
/// returns their names.
fn drop_unknown_columns(batch: &mut RowBatch, target_columns: &[ColumnMetadata]) -> Vec<String> {
    let unknown: Vec<String> = batch
        .columns
        .iter()
        .filter(|name| {
            !target_columns
                .iter()
                .any(|c| c.is_insertable() && c.name.eq_ignore_ascii_case(name))
        })
        .cloned()
        .collect();
    for name in &unknown {
        batch.drop_column(name);
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KeyValue;
    use crate::graph::tests::{fk, t};
    use crate::testing::{column, identity, MemoryDatabase};
    use chrono::{NaiveDate, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap() + chrono::Duration::milliseconds(789)
    }

    fn engine() -> TransferEngine {
        TransferEngine::new(TransferConfig::default()).with_clock(fixed_now)
    }

    fn orders_columns() -> Vec<ColumnMetadata> {
        vec![
            identity("OrderId"),
            column("CustomerName", "nvarchar", true),
            column("CreatedAt", "datetime", false),
            column("ShippedAt", "datetime", true),
            column("DueAt", "datetime2", true),
            column("Weight", "float", true),
        ]
    }

    fn order(id: i64, name: &str, weight: f64) -> Vec<SqlValue> {
        let ts = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        vec![
            SqlValue::Int(id),
            name.into(),
            SqlValue::Timestamp(ts),
            SqlValue::Timestamp(ts),
            SqlValue::Timestamp(ts),
            SqlValue::Float(weight),
        ]
    }

    fn pair() -> (MemoryDatabase, MemoryDatabase) {
        let source = MemoryDatabase::new("source")
            .with_table(t("Orders"), orders_columns())
            .with_rows(&t("Orders"), vec![order(10, "a", 1.5), order(20, "b", f64::NAN)]);
        let target = MemoryDatabase::new("target").with_table(t("Orders"), orders_columns());
        (source, target)
    }

    #[tokio::test]
    async fn test_transfers_with_identity_override() {
        let (mut source, mut target) = pair();
        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Orders"), &[])
            .await;

        assert_eq!(report.status, TransferStatus::Transferred);
        assert_eq!(report.rows_read, 2);
        assert_eq!(report.rows_written, 2);
        assert!(report.identity_override);
        assert_eq!(
            target.column_values(&t("Orders"), "OrderId"),
            vec![SqlValue::Int(10), SqlValue::Int(20)]
        );
        assert_eq!(
            target.log,
            vec![
                "IDENTITY_INSERT dbo.Orders ON",
                "BEGIN",
                "INSERT dbo.Orders (2 rows)",
                "COMMIT",
                "IDENTITY_INSERT dbo.Orders OFF",
            ]
        );
    }

    #[tokio::test]
    async fn test_legacy_temporal_columns_stripped_and_substituted() {
        let (mut source, mut target) = pair();
        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Orders"), &[])
            .await;

        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(10, 20, 30).unwrap();
        assert_eq!(report.stripped_columns, vec!["CreatedAt", "ShippedAt"]);
        assert_eq!(report.substituted_columns, vec!["CreatedAt"]);
        assert_eq!(report.substituted_at, Some(expected));
        assert!(target
            .column_values(&t("Orders"), "CreatedAt")
            .iter()
            .all(|v| *v == SqlValue::Timestamp(expected)));
        assert!(target
            .column_values(&t("Orders"), "ShippedAt")
            .iter()
            .all(SqlValue::is_null));
        // datetime2 is a different type and is copied
        assert!(target
            .column_values(&t("Orders"), "DueAt")
            .iter()
            .all(|v| matches!(v, SqlValue::Timestamp(_))));
    }

    #[tokio::test]
    async fn test_non_finite_floats_written_as_null() {
        let (mut source, mut target) = pair();
        engine()
            .transfer_table(&mut source, &mut target, &t("Orders"), &[])
            .await;
        assert_eq!(
            target.column_values(&t("Orders"), "Weight"),
            vec![SqlValue::Float(1.5), SqlValue::Null]
        );
    }

    #[tokio::test]
    async fn test_orphan_row_is_excluded_and_reported() {
        let items = vec![identity("ItemId"), column("OrderId", "int", false)];
        let mut source = MemoryDatabase::new("source")
            .with_table(t("OrderItems"), items.clone())
            .with_rows(
                &t("OrderItems"),
                vec![
                    vec![SqlValue::Int(1), SqlValue::Int(10)],
                    vec![SqlValue::Int(2), SqlValue::Int(999)],
                ],
            );
        let edge = fk("OrderItems", "OrderId", "Orders", "OrderId");
        let mut target = MemoryDatabase::new("target")
            .with_table(t("Orders"), vec![column("OrderId", "int", false)])
            .with_rows(&t("Orders"), vec![vec![SqlValue::Int(10)]])
            .with_table(t("OrderItems"), items)
            .with_foreign_key(edge.clone());

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("OrderItems"), &[edge])
            .await;

        assert_eq!(report.status, TransferStatus::Transferred);
        assert_eq!(report.rows_written, 1);
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(report.orphans[0].orphan_values, vec![KeyValue::Int(999)]);
        assert_eq!(report.rows_dropped(), 1);
        assert_eq!(
            target.column_values(&t("OrderItems"), "OrderId"),
            vec![SqlValue::Int(10)]
        );
    }

    #[tokio::test]
    async fn test_all_rows_orphaned_writes_nothing() {
        let items = vec![column("OrderId", "int", false)];
        let mut source = MemoryDatabase::new("source")
            .with_table(t("OrderItems"), items.clone())
            .with_rows(&t("OrderItems"), vec![vec![SqlValue::Int(999)]]);
        let edge = fk("OrderItems", "OrderId", "Orders", "OrderId");
        let mut target = MemoryDatabase::new("target")
            .with_table(t("Orders"), vec![column("OrderId", "int", false)])
            .with_table(t("OrderItems"), items);

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("OrderItems"), &[edge])
            .await;

        assert_eq!(report.status, TransferStatus::EmptyAfterFiltering);
        assert!(!target.log.iter().any(|l| l.starts_with("INSERT")));
    }

    #[tokio::test]
    async fn test_write_failure_rolls_back_and_disables_identity() {
        let (mut source, mut target) = pair();
        target.fail_inserts.insert(t("Orders"));

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Orders"), &[])
            .await;

        assert!(report.is_failed());
        assert_eq!(report.failed_phase, Some(TransferPhase::Write));
        assert!(report.error.as_deref().unwrap_or_default().contains("injected insert failure"));
        assert!(target.rows(&t("Orders")).is_empty());
        assert_eq!(target.log.last().map(String::as_str), Some("IDENTITY_INSERT dbo.Orders OFF"));
        assert!(target.log.iter().any(|l| l == "ROLLBACK"));
    }

    #[tokio::test]
    async fn test_read_failure_reports_read_phase() {
        let (mut source, mut target) = pair();
        source.fail_reads.insert(t("Orders"));

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Orders"), &[])
            .await;

        assert_eq!(report.failed_phase, Some(TransferPhase::Read));
        assert!(target.log.is_empty());
    }

    #[tokio::test]
    async fn test_identity_disable_failure_is_not_escalated() {
        let (mut source, mut target) = pair();
        target.fail_identity_off = true;

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Orders"), &[])
            .await;

        assert_eq!(report.status, TransferStatus::Transferred);
        assert_eq!(target.rows(&t("Orders")).len(), 2);
    }

    #[tokio::test]
    async fn test_empty_source_table() {
        let mut source = MemoryDatabase::new("source").with_table(t("Orders"), orders_columns());
        let mut target = MemoryDatabase::new("target").with_table(t("Orders"), orders_columns());

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Orders"), &[])
            .await;
        assert_eq!(report.status, TransferStatus::Empty);
        assert!(target.log.is_empty());
    }

    #[tokio::test]
    async fn test_table_of_only_required_legacy_columns_is_still_written() {
        let ts = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let columns = || vec![column("CreatedAt", "datetime", false)];
        let mut source = MemoryDatabase::new("source")
            .with_table(t("Log"), columns())
            .with_rows(
                &t("Log"),
                vec![vec![SqlValue::Timestamp(ts)], vec![SqlValue::Timestamp(ts)]],
            );
        let mut target = MemoryDatabase::new("target").with_table(t("Log"), columns());

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Log"), &[])
            .await;

        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(10, 20, 30).unwrap();
        assert_eq!(report.status, TransferStatus::Transferred);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.substituted_columns, vec!["CreatedAt"]);
        assert_eq!(
            target.column_values(&t("Log"), "CreatedAt"),
            vec![SqlValue::Timestamp(expected); 2]
        );
    }

    #[tokio::test]
    async fn test_managers_written_before_their_reports() {
        let columns = || vec![column("Id", "int", false), column("ManagerId", "int", true)];
        let edge = fk("Employees", "ManagerId", "Employees", "Id");
        let mut source = MemoryDatabase::new("source")
            .with_table(t("Employees"), columns())
            .with_rows(
                &t("Employees"),
                vec![
                    vec![SqlValue::Int(5), SqlValue::Int(9)],
                    vec![SqlValue::Int(9), SqlValue::Null],
                ],
            );
        let mut target = MemoryDatabase::new("target")
            .with_table(t("Employees"), columns())
            .with_foreign_key(edge.clone());

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Employees"), &[edge])
            .await;

        assert_eq!(report.status, TransferStatus::Transferred);
        assert_eq!(
            target.column_values(&t("Employees"), "Id"),
            vec![SqlValue::Int(9), SqlValue::Int(5)]
        );
    }

    #[tokio::test]
    async fn test_columns_missing_on_target_are_skipped() {
        let mut source = MemoryDatabase::new("source")
            .with_table(t("Notes"), vec![column("Id", "int", false), column("Legacy", "int", true)])
            .with_rows(&t("Notes"), vec![vec![SqlValue::Int(1), SqlValue::Int(5)]]);
        let mut target = MemoryDatabase::new("target").with_table(t("Notes"), vec![column("Id", "int", false)]);

        let report = engine()
            .transfer_table(&mut source, &mut target, &t("Notes"), &[])
            .await;
        assert_eq!(report.status, TransferStatus::Transferred);
        assert_eq!(report.skipped_columns, vec!["Legacy"]);
        assert!(!report.identity_override);
    }
}
