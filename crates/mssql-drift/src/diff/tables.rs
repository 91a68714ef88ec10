//! Table and column comparison.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::{ColumnMetadata, TableId};

/// Tables split by where they exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableComparison {
    pub only_in_source: Vec<TableId>,
    pub only_in_target: Vec<TableId>,
    /// Present in both, sorted by (schema, name).
    pub common: Vec<TableId>,
}

/// Compare table lists by `(schema, name)`.
pub fn compare_tables(source: &[TableId], target: &[TableId]) -> TableComparison {
    let source: BTreeSet<&TableId> = source.iter().collect();
    let target: BTreeSet<&TableId> = target.iter().collect();
    TableComparison {
        only_in_source: source.difference(&target).map(|t| (*t).clone()).collect(),
        only_in_target: target.difference(&source).map(|t| (*t).clone()).collect(),
        common: source.intersection(&target).map(|t| (*t).clone()).collect(),
    }
}

/// One attribute that differs between the two copies of a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub attribute: &'static str,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDifference {
    /// Column name as spelled in the source.
    pub column: String,
    pub changes: Vec<AttributeChange>,
}

/// Column-level differences of one common table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStructureDiff {
    pub table: TableId,
    pub only_in_source: Vec<ColumnMetadata>,
    pub only_in_target: Vec<ColumnMetadata>,
    pub different: Vec<ColumnDifference>,
}

impl TableStructureDiff {
    pub fn has_differences(&self) -> bool {
        !self.only_in_source.is_empty() || !self.only_in_target.is_empty() || !self.different.is_empty()
    }
}

/// Compare the columns of one table. Names match case-insensitively; type,
/// nullability and identity are compared.
pub fn compare_columns(
    table: &TableId,
    source: &[ColumnMetadata],
    target: &[ColumnMetadata],
) -> TableStructureDiff {
    let by_name = |cols: &[ColumnMetadata]| -> BTreeMap<String, ColumnMetadata> {
        cols.iter().map(|c| (c.name.to_lowercase(), c.clone())).collect()
    };
    let source = by_name(source);
    let target = by_name(target);

    let mut diff = TableStructureDiff {
        table: table.clone(),
        only_in_source: Vec::new(),
        only_in_target: Vec::new(),
        different: Vec::new(),
    };

    for (key, src) in &source {
        let Some(dst) = target.get(key) else {
            diff.only_in_source.push(src.clone());
            continue;
        };
        let mut changes = Vec::new();
        if src.column_type != dst.column_type {
            changes.push(AttributeChange {
                attribute: "type",
                source: src.column_type.to_string(),
                target: dst.column_type.to_string(),
            });
        }
        if src.nullable != dst.nullable {
            changes.push(AttributeChange {
                attribute: "nullability",
                source: nullability(src.nullable).to_string(),
                target: nullability(dst.nullable).to_string(),
            });
        }
        if src.identity != dst.identity {
            changes.push(AttributeChange {
                attribute: "identity",
                source: identity(src.identity).to_string(),
                target: identity(dst.identity).to_string(),
            });
        }
        if !changes.is_empty() {
            diff.different.push(ColumnDifference {
                column: src.name.clone(),
                changes,
            });
        }
    }
    diff.only_in_target = target
        .iter()
        .filter(|(key, _)| !source.contains_key(*key))
        .map(|(_, c)| c.clone())
        .collect();

    diff
}

fn nullability(nullable: bool) -> &'static str {
    if nullable {
        "NULL"
    } else {
        "NOT NULL"
    }
}

fn identity(identity: bool) -> &'static str {
    if identity {
        "IDENTITY"
    } else {
        "NOT IDENTITY"
    }
}
