//! In-memory database for unit tests.
//!
//! Behaves like SQL Server where the engines care: transactions roll back,
//! identity columns reject explicit values unless IDENTITY_INSERT is on for
//! that table, NOT NULL and foreign keys are enforced, and failures can be
//! injected per table.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;

use crate::core::{
    ColumnMetadata, ColumnType, ForeignKeyEdge, KeyValue, RowBatch, RowRecord, SchemaIntrospector,
    SqlValue, StoredProcedure, TableId, TableStore,
};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<ColumnMetadata>,
    rows: Vec<RowRecord>,
}

impl MemTable {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn key_forms(&self, column: &str) -> HashSet<KeyValue> {
        let Some(idx) = self.index_of(column) else {
            return HashSet::new();
        };
        self.rows
            .iter()
            .filter_map(|r| r[idx].key())
            .map(|k| k.lookup_form())
            .collect()
    }
}

pub(crate) fn column(name: &str, base: &str, nullable: bool) -> ColumnMetadata {
    ColumnMetadata {
        name: name.to_string(),
        column_type: ColumnType::plain(base),
        nullable,
        identity: false,
        computed: false,
        description: String::new(),
    }
}

pub(crate) fn identity(name: &str) -> ColumnMetadata {
    ColumnMetadata {
        identity: true,
        ..column(name, "int", false)
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryDatabase {
    label: String,
    tables: BTreeMap<TableId, MemTable>,
    foreign_keys: Vec<ForeignKeyEdge>,
    procedures: Vec<StoredProcedure>,
    snapshot: Option<BTreeMap<TableId, MemTable>>,
    identity_insert: Option<TableId>,
    pub(crate) fail_reads: HashSet<TableId>,
    pub(crate) fail_inserts: HashSet<TableId>,
    pub(crate) fail_identity_off: bool,
    /// Statements in execution order, e.g. `IDENTITY_INSERT dbo.T ON`.
    pub(crate) log: Vec<String>,
}

impl MemoryDatabase {
    pub(crate) fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn with_table(mut self, table: TableId, columns: Vec<ColumnMetadata>) -> Self {
        self.tables.insert(table, MemTable { columns, rows: Vec::new() });
        self
    }

    pub(crate) fn with_rows(mut self, table: &TableId, rows: Vec<RowRecord>) -> Self {
        if let Some(t) = self.tables.get_mut(table) {
            t.rows.extend(rows);
        }
        self
    }

    pub(crate) fn with_foreign_key(mut self, edge: ForeignKeyEdge) -> Self {
        self.foreign_keys.push(edge);
        self
    }

    pub(crate) fn with_procedure(mut self, schema: &str, name: &str, definition: &str) -> Self {
        self.procedures.push(StoredProcedure {
            schema: schema.to_string(),
            name: name.to_string(),
            definition: Some(definition.to_string()),
            created: None,
            modified: None,
        });
        self
    }

    pub(crate) fn rows(&self, table: &TableId) -> Vec<RowRecord> {
        self.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    pub(crate) fn column_values(&self, table: &TableId, column: &str) -> Vec<SqlValue> {
        let Some(t) = self.tables.get(table) else {
            return Vec::new();
        };
        let Some(idx) = t.index_of(column) else {
            return Vec::new();
        };
        t.rows.iter().map(|r| r[idx].clone()).collect()
    }

    fn table(&self, table: &TableId) -> Result<&MemTable> {
        self.tables
            .get(table)
            .ok_or_else(|| SyncError::Introspection(format!("Invalid object name '{}'", table)))
    }

    fn check_foreign_keys(&self, table: &TableId, staged: &MemTable) -> Result<()> {
        for edge in self.foreign_keys.iter().filter(|e| &e.child == table) {
            let Some(idx) = staged.index_of(&edge.child_column) else {
                continue;
            };
            let parent_keys = if edge.is_self_reference() {
                staged.key_forms(&edge.parent_column)
            } else {
                self.table(&edge.parent)?.key_forms(&edge.parent_column)
            };
            for row in &staged.rows {
                if let Some(key) = row[idx].key() {
                    if !parent_keys.contains(&key.lookup_form()) {
                        return Err(SyncError::write(
                            table,
                            format!("INSERT conflicted with FOREIGN KEY constraint {}", edge.name),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaIntrospector for MemoryDatabase {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list_tables(&mut self) -> Result<Vec<TableId>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKeyEdge>> {
        Ok(self.foreign_keys.clone())
    }

    async fn list_columns(&mut self, table: &TableId) -> Result<Vec<ColumnMetadata>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn list_procedures(&mut self) -> Result<Vec<StoredProcedure>> {
        Ok(self.procedures.clone())
    }
}

#[async_trait]
impl TableStore for MemoryDatabase {
    async fn read_all_rows(&mut self, table: &TableId) -> Result<RowBatch> {
        if self.fail_reads.contains(table) {
            return Err(SyncError::read(table, "injected read failure"));
        }
        let t = self.table(table)?;
        let keep: Vec<usize> = (0..t.columns.len()).filter(|&i| t.columns[i].is_insertable()).collect();
        let columns = keep.iter().map(|&i| t.columns[i].name.clone()).collect();
        let rows = t
            .rows
            .iter()
            .map(|r| keep.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Ok(RowBatch::new(columns, rows))
    }

    async fn existing_key_values(
        &mut self,
        table: &TableId,
        column: &str,
        values: &[KeyValue],
    ) -> Result<HashSet<KeyValue>> {
        self.log.push(format!("LOOKUP {}.{} ({} values)", table, column, values.len()));
        let present = self.table(table)?.key_forms(column);
        Ok(values
            .iter()
            .filter(|v| present.contains(&v.lookup_form()))
            .cloned()
            .collect())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(SyncError::Write {
                table: String::new(),
                message: "transaction already open".into(),
            });
        }
        self.log.push("BEGIN".into());
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.log.push("COMMIT".into());
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.log.push("ROLLBACK".into());
        if let Some(tables) = self.snapshot.take() {
            self.tables = tables;
        }
        Ok(())
    }

    async fn set_identity_insert(&mut self, table: &TableId, enabled: bool) -> Result<()> {
        self.log.push(format!(
            "IDENTITY_INSERT {} {}",
            table,
            if enabled { "ON" } else { "OFF" }
        ));
        if !self.table(table)?.columns.iter().any(|c| c.identity) {
            return Err(SyncError::write(table, "table does not have the identity property"));
        }
        if enabled {
            if let Some(other) = &self.identity_insert {
                if other != table {
                    return Err(SyncError::write(
                        table,
                        format!("IDENTITY_INSERT is already ON for {}", other),
                    ));
                }
            }
            self.identity_insert = Some(table.clone());
        } else {
            if self.fail_identity_off {
                return Err(SyncError::write(table, "injected identity toggle failure"));
            }
            self.identity_insert = None;
        }
        Ok(())
    }

    async fn insert_rows(&mut self, table: &TableId, batch: &RowBatch) -> Result<u64> {
        self.log.push(format!("INSERT {} ({} rows)", table, batch.len()));
        if self.fail_inserts.contains(table) {
            return Err(SyncError::write(table, "injected insert failure"));
        }
        let identity_on = self.identity_insert.as_ref() == Some(table);
        let mut staged = self.table(table)?.clone();

        let mut positions = Vec::with_capacity(batch.columns.len());
        for name in &batch.columns {
            let idx = staged
                .index_of(name)
                .ok_or_else(|| SyncError::write(table, format!("Invalid column name '{}'", name)))?;
            if staged.columns[idx].identity && !identity_on {
                return Err(SyncError::write(
                    table,
                    format!("Cannot insert explicit value for identity column '{}'", name),
                ));
            }
            positions.push(idx);
        }

        let identity_idx = staged.columns.iter().position(|c| c.identity);
        let mut next_identity = identity_idx
            .and_then(|idx| {
                staged
                    .rows
                    .iter()
                    .filter_map(|r| if let SqlValue::Int(i) = r[idx] { Some(i) } else { None })
                    .max()
            })
            .unwrap_or(0)
            + 1;

        for source_row in &batch.rows {
            let mut row = vec![SqlValue::Null; staged.columns.len()];
            for (value, &idx) in source_row.iter().zip(&positions) {
                row[idx] = value.clone();
            }
            for (idx, col) in staged.columns.iter().enumerate() {
                if col.identity && !positions.contains(&idx) {
                    row[idx] = SqlValue::Int(next_identity);
                    next_identity += 1;
                }
                if !col.nullable && row[idx].is_null() {
                    return Err(SyncError::write(
                        table,
                        format!("Cannot insert the value NULL into column '{}'", col.name),
                    ));
                }
            }
            staged.rows.push(row);
        }

        self.check_foreign_keys(table, &staged)?;
        self.tables.insert(table.clone(), staged);
        Ok(batch.len() as u64)
    }

    async fn delete_rows(&mut self, table: &TableId) -> Result<u64> {
        self.log.push(format!("DELETE {}", table));
        for edge in self
            .foreign_keys
            .iter()
            .filter(|e| &e.parent == table && !e.is_self_reference())
        {
            if let Some(child) = self.tables.get(&edge.child) {
                if let Some(idx) = child.index_of(&edge.child_column) {
                    if child.rows.iter().any(|r| !r[idx].is_null()) {
                        return Err(SyncError::write(
                            table,
                            format!("DELETE conflicted with REFERENCE constraint {}", edge.name),
                        ));
                    }
                }
            }
        }
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| SyncError::write(table, "no such table"))?;
        let deleted = t.rows.len() as u64;
        t.rows.clear();
        Ok(deleted)
    }
}
