//! Collaborator traits used by the migration engine.
//!
//! - [`SchemaIntrospector`]: catalog queries (tables, columns, foreign keys, procedures)
//! - [`TableStore`]: bulk row access and the transaction primitives around it
//! - [`Database`]: both of the above, implemented for anything that has them
//!
//! Each implementation owns one connection and is driven strictly
//! sequentially, hence `&mut self` throughout. Default methods hold the
//! transactional skeletons so every backend gets the same rollback and
//! identity-override cleanup behavior.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;

use crate::error::Result;

use super::schema::{ColumnMetadata, ForeignKeyEdge, StoredProcedure, TableId};
use super::value::{KeyValue, RowBatch};

/// Catalog queries against one database.
#[async_trait]
pub trait SchemaIntrospector: Send {
    /// Display label for logs.
    fn label(&self) -> &str;

    /// All user tables, sorted by (schema, name).
    async fn list_tables(&mut self) -> Result<Vec<TableId>>;

    /// Every foreign-key column pair in the database.
    async fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKeyEdge>>;

    /// Columns of a table in ordinal order.
    async fn list_columns(&mut self, table: &TableId) -> Result<Vec<ColumnMetadata>>;

    /// Stored procedures with their definitions.
    async fn list_procedures(&mut self) -> Result<Vec<StoredProcedure>>;

    /// Whether the table has an identity column.
    async fn has_identity_column(&mut self, table: &TableId) -> Result<bool> {
        Ok(self.list_columns(table).await?.iter().any(|c| c.identity))
    }

    /// Names of the columns whose base type is `type_tag`.
    async fn list_columns_of_type(&mut self, table: &TableId, type_tag: &str) -> Result<Vec<String>> {
        Ok(self
            .list_columns(table)
            .await?
            .into_iter()
            .filter(|c| c.column_type.is(type_tag))
            .map(|c| c.name)
            .collect())
    }

    /// Names of the NOT NULL columns whose base type is `type_tag`.
    async fn list_required_columns_of_type(
        &mut self,
        table: &TableId,
        type_tag: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .list_columns(table)
            .await?
            .into_iter()
            .filter(|c| c.column_type.is(type_tag) && !c.nullable)
            .map(|c| c.name)
            .collect())
    }
}

/// Bulk row access against one database.
#[async_trait]
pub trait TableStore: Send {
    /// Read every insertable column of every row into memory.
    async fn read_all_rows(&mut self, table: &TableId) -> Result<RowBatch>;

    /// The subset of `values` present in `table.column`.
    ///
    /// Callers keep `values` under the driver's parameter limit.
    async fn existing_key_values(
        &mut self,
        table: &TableId,
        column: &str,
        values: &[KeyValue],
    ) -> Result<HashSet<KeyValue>>;

    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;

    /// Toggle explicit values for the table's identity column (session scoped).
    async fn set_identity_insert(&mut self, table: &TableId, enabled: bool) -> Result<()>;

    /// Insert rows inside the current transaction; returns rows inserted.
    async fn insert_rows(&mut self, table: &TableId, batch: &RowBatch) -> Result<u64>;

    /// Delete every row inside the current transaction; returns rows deleted.
    async fn delete_rows(&mut self, table: &TableId) -> Result<u64>;

    /// Delete all rows of a table as one transaction.
    async fn delete_all_rows(&mut self, table: &TableId) -> Result<u64> {
        self.begin().await?;
        match self.delete_rows(table).await {
            Ok(deleted) => {
                self.commit().await?;
                Ok(deleted)
            }
            Err(e) => {
                self.rollback_quietly(table).await;
                Err(e)
            }
        }
    }

    /// Write a batch as one transaction, optionally with identity override.
    ///
    /// Identity override is switched off afterwards whether or not the write
    /// succeeded; a failure to switch it off is logged and not returned.
    async fn write_rows(
        &mut self,
        table: &TableId,
        batch: &RowBatch,
        identity_override: bool,
    ) -> Result<u64> {
        if identity_override {
            self.set_identity_insert(table, true).await?;
        }

        let outcome = self.insert_in_transaction(table, batch).await;

        if identity_override {
            if let Err(e) = self.set_identity_insert(table, false).await {
                warn!("{}: could not disable IDENTITY_INSERT: {}", table, e);
            }
        }

        outcome
    }

    /// Begin, insert, then commit or roll back.
    async fn insert_in_transaction(&mut self, table: &TableId, batch: &RowBatch) -> Result<u64> {
        self.begin().await?;
        match self.insert_rows(table, batch).await {
            Ok(inserted) => match self.commit().await {
                Ok(()) => Ok(inserted),
                Err(e) => {
                    self.rollback_quietly(table).await;
                    Err(e)
                }
            },
            Err(e) => {
                self.rollback_quietly(table).await;
                Err(e)
            }
        }
    }

    /// Roll back, logging instead of failing.
    async fn rollback_quietly(&mut self, table: &TableId) {
        if let Err(e) = self.rollback().await {
            warn!("{}: rollback failed: {}", table, e);
        }
    }
}

/// A database usable as either side of a comparison or migration.
pub trait Database: SchemaIntrospector + TableStore {}

impl<T: SchemaIntrospector + TableStore> Database for T {}
