//! Structural drift between two databases: tables, columns and stored
//! procedures.

mod procedures;
mod tables;

pub use procedures::{
    compare_procedures, export_definitions, normalize_definition, unified_diff, ProcedureComparison,
    ProcedureDifference, ProcedureOptions,
};
pub use tables::{
    compare_columns, compare_tables, AttributeChange, ColumnDifference, TableComparison,
    TableStructureDiff,
};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::{Database, TableId};
use crate::error::Result;

/// What to compare.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub tables: bool,
    pub procedures: bool,
    /// Compare columns of every common table.
    pub table_details: bool,
    /// List common tables without column differences as well.
    pub include_unchanged: bool,
    pub procedure: ProcedureOptions,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            tables: true,
            procedures: true,
            table_details: false,
            include_unchanged: false,
            procedure: ProcedureOptions::default(),
        }
    }
}

/// Everything found by one comparison.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub source: String,
    pub target: String,
    pub tables: Option<TableComparison>,
    /// Common tables with column differences.
    pub structures: Vec<TableStructureDiff>,
    /// Common tables without column differences (only with `include_unchanged`).
    pub unchanged_tables: Vec<TableId>,
    pub procedures: Option<ProcedureComparison>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        let tables = self
            .tables
            .as_ref()
            .is_some_and(|t| !t.only_in_source.is_empty() || !t.only_in_target.is_empty());
        let procedures = self.procedures.as_ref().is_some_and(ProcedureComparison::has_differences);
        tables || procedures || !self.structures.is_empty()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Compare two databases according to `options`. Read-only.
pub async fn compare_databases(
    source: &mut dyn Database,
    target: &mut dyn Database,
    options: &CompareOptions,
) -> Result<DriftReport> {
    let mut report = DriftReport {
        source: source.label().to_string(),
        target: target.label().to_string(),
        tables: None,
        structures: Vec::new(),
        unchanged_tables: Vec::new(),
        procedures: None,
    };

    if options.tables {
        let source_tables = source.list_tables().await?;
        let target_tables = target.list_tables().await?;
        let comparison = compare_tables(&source_tables, &target_tables);
        info!(
            "Tables: {} only in {}, {} only in {}, {} in common",
            comparison.only_in_source.len(),
            report.source,
            comparison.only_in_target.len(),
            report.target,
            comparison.common.len()
        );

        if options.table_details {
            for table in &comparison.common {
                let source_columns = source.list_columns(table).await?;
                let target_columns = target.list_columns(table).await?;
                let diff = compare_columns(table, &source_columns, &target_columns);
                if diff.has_differences() {
                    debug!("{}: {} column differences", table, diff.different.len());
                    report.structures.push(diff);
                } else if options.include_unchanged {
                    report.unchanged_tables.push(table.clone());
                }
            }
        }
        report.tables = Some(comparison);
    }

    if options.procedures {
        let source_procs = source.list_procedures().await?;
        let target_procs = target.list_procedures().await?;
        let comparison = compare_procedures(
            &source_procs,
            &target_procs,
            &options.procedure,
            (&report.source, &report.target),
        );
        info!(
            "Procedures: {} only in {}, {} only in {}, {} different, {} identical",
            comparison.only_in_source.len(),
            report.source,
            comparison.only_in_target.len(),
            report.target,
            comparison.different.len(),
            comparison.identical
        );
        report.procedures = Some(comparison);
    }

    Ok(report)
}
