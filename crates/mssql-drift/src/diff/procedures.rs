//! Stored procedure comparison.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use similar::TextDiff;
use tracing::info;

use crate::core::StoredProcedure;
use crate::error::Result;

/// A procedure whose normalized definition differs between the databases.
#[derive(Debug, Clone, Serialize)]
pub struct ProcedureDifference {
    /// `schema.name`
    pub name: String,
    pub source_modified: Option<NaiveDateTime>,
    pub target_modified: Option<NaiveDateTime>,
    /// Unified diff of the raw definitions, when requested.
    pub diff: Option<String>,
    #[serde(skip)]
    pub source_definition: String,
    #[serde(skip)]
    pub target_definition: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcedureComparison {
    pub only_in_source: Vec<String>,
    pub only_in_target: Vec<String>,
    pub different: Vec<ProcedureDifference>,
    pub identical: usize,
}

impl ProcedureComparison {
    pub fn has_differences(&self) -> bool {
        !self.only_in_source.is_empty() || !self.only_in_target.is_empty() || !self.different.is_empty()
    }
}

/// Procedure comparison switches.
#[derive(Debug, Clone, Default)]
pub struct ProcedureOptions {
    /// Attach a unified diff to every differing procedure.
    pub show_diff: bool,
    /// Only compare procedures named `name` or `schema.name` (case-insensitive).
    pub name_filter: Option<String>,
}

fn line_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--[^\n]*").expect("valid regex"))
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*,\s*").expect("valid regex"))
}

fn equals_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*=\s*").expect("valid regex"))
}

fn paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*([()])\s*").expect("valid regex"))
}

/// Canonical form of a definition: comments removed, whitespace collapsed,
/// spacing around `,` `=` `(` `)` made uniform. Case is preserved.
pub fn normalize_definition(definition: &str) -> String {
    let d = line_comment_re().replace_all(definition, "");
    let d = block_comment_re().replace_all(&d, "");
    let d = whitespace_re().replace_all(&d, " ");
    let d = comma_re().replace_all(&d, ", ");
    let d = equals_re().replace_all(&d, "=");
    let d = paren_re().replace_all(&d, "$1");
    d.trim().to_string()
}

/// Unified diff of two definitions, labeled with the database names.
pub fn unified_diff(name: &str, source_label: &str, target_label: &str, source: &str, target: &str) -> String {
    let source = source.replace("\r\n", "\n");
    let target = target.replace("\r\n", "\n");
    TextDiff::from_lines(&source, &target)
        .unified_diff()
        .context_radius(3)
        .header(
            &format!("{}: {}", source_label, name),
            &format!("{}: {}", target_label, name),
        )
        .to_string()
}

fn matches_filter(proc: &StoredProcedure, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(f) => proc.name.eq_ignore_ascii_case(f) || proc.key().eq_ignore_ascii_case(f),
    }
}

/// Compare procedures keyed by `schema.name`.
pub fn compare_procedures(
    source: &[StoredProcedure],
    target: &[StoredProcedure],
    options: &ProcedureOptions,
    labels: (&str, &str),
) -> ProcedureComparison {
    let filter = options.name_filter.as_deref();
    let index = |procs: &[StoredProcedure]| -> BTreeMap<String, StoredProcedure> {
        procs
            .iter()
            .filter(|p| matches_filter(p, filter))
            .map(|p| (p.key(), p.clone()))
            .collect()
    };
    let source = index(source);
    let target = index(target);

    let mut comparison = ProcedureComparison::default();
    for (key, src) in &source {
        let Some(dst) = target.get(key) else {
            comparison.only_in_source.push(key.clone());
            continue;
        };
        let src_def = src.definition.clone().unwrap_or_default();
        let dst_def = dst.definition.clone().unwrap_or_default();
        if normalize_definition(&src_def) == normalize_definition(&dst_def) {
            comparison.identical += 1;
            continue;
        }
        let diff = options
            .show_diff
            .then(|| unified_diff(key, labels.0, labels.1, &src_def, &dst_def));
        comparison.different.push(ProcedureDifference {
            name: key.clone(),
            source_modified: src.modified,
            target_modified: dst.modified,
            diff,
            source_definition: src_def,
            target_definition: dst_def,
        });
    }
    comparison.only_in_target = target
        .keys()
        .filter(|k| !source.contains_key(*k))
        .cloned()
        .collect();

    comparison
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '.' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Write both definitions of every differing procedure into `dir` as
/// `<schema>_<name>_source.sql` and `<schema>_<name>_target.sql`.
pub fn export_definitions(dir: &Path, different: &[ProcedureDifference]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(different.len() * 2);
    for proc in different {
        let stem = file_stem(&proc.name);
        let source_path = dir.join(format!("{}_source.sql", stem));
        let target_path = dir.join(format!("{}_target.sql", stem));
        fs::write(&source_path, &proc.source_definition)?;
        fs::write(&target_path, &proc.target_definition)?;
        info!("Exported {} to {} and {}", proc.name, source_path.display(), target_path.display());
        written.push(source_path);
        written.push(target_path);
    }
    Ok(written)
}
