//! Archiving of superseded stored procedure scripts.
//!
//! A scripts root holds one directory per entity. Inside, procedure scripts
//! are versioned as `NNN_Name.sql`. For each name only the highest version
//! stays in place; older ones move to `Deprecated/NNN_Name-Deprecated.sql`
//! inside the same entity directory. Files are moved, never deleted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// Subdirectory receiving superseded scripts.
pub const DEPRECATED_DIR: &str = "Deprecated";

fn versioned_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<version>\d{3})_(?P<base>.+)\.sql$").expect("valid regex"))
}

/// One superseded script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveMove {
    pub entity: String,
    pub base_name: String,
    /// File name of the version that stays.
    pub kept: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub dry_run: bool,
    pub moves: Vec<ArchiveMove>,
    /// Moves skipped because the destination already existed.
    pub skipped: Vec<PathBuf>,
}

/// Move every superseded script under `root` into its entity's
/// `Deprecated/` directory. With `dry_run`, only report what would move.
pub fn archive_old_versions(root: &Path, dry_run: bool) -> Result<ArchiveReport> {
    let mut report = ArchiveReport {
        dry_run,
        ..Default::default()
    };

    let mut entities: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    entities.sort();

    for entity_path in entities {
        let entity = entity_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // base name -> [(version, file name)]
        let mut versions: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
        for entry in fs::read_dir(&entity_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(caps) = versioned_re().captures(&file_name) {
                let version = caps["version"].parse::<u32>().unwrap_or(0);
                versions
                    .entry(caps["base"].to_string())
                    .or_default()
                    .push((version, file_name.clone()));
            }
        }

        for (base_name, mut files) in versions {
            files.sort_by(|a, b| b.cmp(a));
            let Some((_, kept)) = files.first().cloned() else {
                continue;
            };
            for (_, file_name) in files.into_iter().skip(1) {
                let from = entity_path.join(&file_name);
                let to = entity_path
                    .join(DEPRECATED_DIR)
                    .join(file_name.replace(".sql", "-Deprecated.sql"));

                if to.exists() {
                    warn!("{} already exists; leaving {} in place", to.display(), from.display());
                    report.skipped.push(from);
                    continue;
                }
                if !dry_run {
                    fs::create_dir_all(entity_path.join(DEPRECATED_DIR))?;
                    fs::rename(&from, &to)?;
                }
                info!(
                    "{}{} -> {}",
                    if dry_run { "[dry run] " } else { "" },
                    from.display(),
                    to.display()
                );
                report.moves.push(ArchiveMove {
                    entity: entity.clone(),
                    base_name: base_name.clone(),
                    kept: kept.clone(),
                    from,
                    to,
                });
            }
        }
    }

    Ok(report)
}
