//! Per-table transfer reports.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::core::{KeyValue, TableId};

/// Where a table transfer ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Rows were written and committed.
    Transferred,
    /// The source table had no rows.
    Empty,
    /// Every row or every column was filtered out; nothing was written.
    EmptyAfterFiltering,
    /// Read or write failed; the table's transaction was rolled back.
    Failed,
}

/// Step of the transfer that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    Read,
    OrphanFilter,
    Prepare,
    Write,
}

/// Orphaned values found for one foreign key of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanReport {
    pub foreign_key: String,
    pub column: String,
    pub referenced_table: TableId,
    pub referenced_column: String,
    /// Distinct child-column values with no referenced row, sorted.
    pub orphan_values: Vec<KeyValue>,
    /// Rows removed because of this foreign key.
    pub rows_dropped: usize,
}

/// Outcome of transferring one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableTransferReport {
    pub table: TableId,
    pub status: TransferStatus,
    pub rows_read: usize,
    pub orphans: Vec<OrphanReport>,
    /// Columns dropped because the target does not have them.
    pub skipped_columns: Vec<String>,
    /// Legacy temporal columns dropped from the outgoing set.
    pub stripped_columns: Vec<String>,
    /// NOT NULL columns filled with `substituted_at`.
    pub substituted_columns: Vec<String>,
    pub substituted_at: Option<NaiveDateTime>,
    pub identity_override: bool,
    pub rows_written: u64,
    pub failed_phase: Option<TransferPhase>,
    pub error: Option<String>,
}

impl TableTransferReport {
    pub(crate) fn new(table: TableId) -> Self {
        Self {
            table,
            status: TransferStatus::Empty,
            rows_read: 0,
            orphans: Vec::new(),
            skipped_columns: Vec::new(),
            stripped_columns: Vec::new(),
            substituted_columns: Vec::new(),
            substituted_at: None,
            identity_override: false,
            rows_written: 0,
            failed_phase: None,
            error: None,
        }
    }

    /// Rows removed by orphan filtering across all foreign keys.
    pub fn rows_dropped(&self) -> usize {
        self.orphans.iter().map(|o| o.rows_dropped).sum()
    }

    pub fn is_failed(&self) -> bool {
        self.status == TransferStatus::Failed
    }
}
