//! Plain-text report rendering.

use std::io::{self, Write};

use chrono::NaiveDateTime;

use mssql_drift::diff::ProcedureComparison;
use mssql_drift::transfer::TransferStatus;
use mssql_drift::{ArchiveReport, DriftReport, MigrationPlan, MigrationSummary, TableId};

use crate::HealthResult;

fn join(tables: &[TableId]) -> String {
    tables.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn list(out: &mut dyn Write, heading: &str, items: &[String]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {} ({}):", heading, items.len())?;
    for item in items {
        writeln!(out, "    {}", item)?;
    }
    Ok(())
}

pub fn drift(out: &mut dyn Write, report: &DriftReport) -> io::Result<()> {
    writeln!(out, "Drift report: {} -> {}", report.source, report.target)?;

    if let Some(tables) = &report.tables {
        writeln!(out, "\nTables:")?;
        let names = |ts: &[TableId]| ts.iter().map(ToString::to_string).collect::<Vec<_>>();
        list(out, &format!("Only in {}", report.source), &names(&tables.only_in_source))?;
        list(out, &format!("Only in {}", report.target), &names(&tables.only_in_target))?;
        writeln!(out, "  In both: {}", tables.common.len())?;
    }

    for diff in &report.structures {
        writeln!(out, "\n  {}:", diff.table)?;
        for col in &diff.only_in_source {
            writeln!(out, "    - {} {} (only in {})", col.name, col.column_type, report.source)?;
        }
        for col in &diff.only_in_target {
            writeln!(out, "    + {} {} (only in {})", col.name, col.column_type, report.target)?;
        }
        for col in &diff.different {
            for change in &col.changes {
                writeln!(
                    out,
                    "    ~ {} {}: {} -> {}",
                    col.column, change.attribute, change.source, change.target
                )?;
            }
        }
    }
    if !report.unchanged_tables.is_empty() {
        writeln!(out, "\n  Unchanged: {}", join(&report.unchanged_tables))?;
    }

    if let Some(procs) = &report.procedures {
        procedures(out, report, procs)?;
    }

    writeln!(
        out,
        "\n{}",
        if report.has_drift() { "Drift detected" } else { "No drift" }
    )
}

fn procedures(out: &mut dyn Write, report: &DriftReport, procs: &ProcedureComparison) -> io::Result<()> {
    writeln!(out, "\nStored procedures:")?;
    list(out, &format!("Only in {}", report.source), &procs.only_in_source)?;
    list(out, &format!("Only in {}", report.target), &procs.only_in_target)?;
    let different: Vec<String> = procs
        .different
        .iter()
        .map(|p| {
            let modified = |m: Option<NaiveDateTime>| {
                m.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "?".into())
            };
            format!(
                "{} (modified {} / {})",
                p.name,
                modified(p.source_modified),
                modified(p.target_modified)
            )
        })
        .collect();
    list(out, "Different", &different)?;
    writeln!(out, "  Identical: {}", procs.identical)?;

    for p in &procs.different {
        if let Some(diff) = &p.diff {
            writeln!(out, "\n{}", diff)?;
        }
    }
    Ok(())
}

pub fn plan(out: &mut dyn Write, plan: &MigrationPlan) -> io::Result<()> {
    writeln!(out, "Migration plan (dry run):")?;
    writeln!(out, "  Common tables: {}", plan.common_tables.len())?;
    writeln!(out, "  Dependencies: {}", plan.graph.edge_count())?;
    writeln!(out, "\n  Delete order:")?;
    for (i, table) in plan.delete_order.iter().enumerate() {
        writeln!(out, "    {:>3}. {}", i + 1, table)?;
    }
    writeln!(out, "\n  Insert order:")?;
    for (i, table) in plan.insert_order.iter().enumerate() {
        writeln!(out, "    {:>3}. {}", i + 1, table)?;
    }
    if !plan.insert_order.isolated.is_empty() {
        writeln!(out, "\n  Without dependencies: {}", join(&plan.insert_order.isolated))?;
    }
    if !plan.insert_order.unresolved.is_empty() {
        writeln!(
            out,
            "\n  Cyclic or unresolved (appended last): {}",
            join(&plan.insert_order.unresolved)
        )?;
    }
    if !plan.source_only.is_empty() {
        writeln!(out, "\n  Skipped, only in source: {}", join(&plan.source_only))?;
    }
    if !plan.target_only.is_empty() {
        writeln!(out, "  Untouched, only in target: {}", join(&plan.target_only))?;
    }
    Ok(())
}

pub fn summary(out: &mut dyn Write, result: &MigrationSummary) -> io::Result<()> {
    if result.failed_tables.is_empty() {
        writeln!(out, "\nMigration completed!")?;
    } else {
        writeln!(out, "\nMigration completed with errors")?;
    }
    writeln!(out, "  Run ID: {}", result.run_id)?;
    writeln!(out, "  Duration: {:.2}s", result.duration_seconds)?;
    writeln!(out, "  Tables: {}/{}", result.tables_success, result.tables_total)?;
    writeln!(out, "  Rows deleted: {}", result.rows_deleted)?;
    writeln!(out, "  Rows read: {}", result.rows_read)?;
    writeln!(out, "  Rows transferred: {}", result.rows_transferred)?;
    writeln!(out, "  Rows dropped (orphans): {}", result.rows_dropped_orphans)?;

    for report in &result.transfers {
        let status = match report.status {
            TransferStatus::Transferred => "ok",
            TransferStatus::Empty => "empty",
            TransferStatus::EmptyAfterFiltering => "filtered",
            TransferStatus::Failed => "FAILED",
        };
        write!(out, "    [{}] {}: {}/{}", status, report.table, report.rows_written, report.rows_read)?;
        if report.rows_dropped() > 0 {
            write!(out, ", {} orphans dropped", report.rows_dropped())?;
        }
        if let Some(err) = &report.error {
            write!(out, " ({})", err)?;
        }
        writeln!(out)?;
    }

    if !result.failed_tables.is_empty() {
        writeln!(out, "  Failed tables: {:?}", result.failed_tables)?;
    }
    Ok(())
}

pub fn archive(out: &mut dyn Write, report: &ArchiveReport) -> io::Result<()> {
    let verb = if report.dry_run { "Would move" } else { "Moved" };
    for m in &report.moves {
        writeln!(out, "{} {} -> {} (keeping {})", verb, m.from.display(), m.to.display(), m.kept)?;
    }
    for path in &report.skipped {
        writeln!(out, "Skipped {} (already archived)", path.display())?;
    }
    writeln!(
        out,
        "{} {} superseded scripts{}",
        verb,
        report.moves.len(),
        if report.dry_run { "; rerun with --apply to move them" } else { "" }
    )
}

pub fn health(out: &mut dyn Write, results: &[&HealthResult]) -> io::Result<()> {
    writeln!(out, "Health Check Results:")?;
    for r in results {
        writeln!(
            out,
            "  {} ({}): {} ({}ms)",
            r.side,
            r.label,
            if r.error.is_none() { "OK" } else { "FAILED" },
            r.latency_ms
        )?;
        if let Some(version) = &r.version {
            writeln!(out, "    {}", version)?;
        }
        if let Some(err) = &r.error {
            writeln!(out, "    Error: {}", err)?;
        }
    }
    let healthy = results.iter().all(|r| r.error.is_none());
    writeln!(out, "\n  Overall: {}", if healthy { "HEALTHY" } else { "UNHEALTHY" })
}
