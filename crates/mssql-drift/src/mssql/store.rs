//! Row reads, key lookups and transactional writes.

use std::collections::HashSet;

use async_trait::async_trait;
use tiberius::ToSql;
use tracing::debug;

use crate::core::identifier::{column_list, quote_ident};
use crate::core::{ColumnMetadata, KeyValue, RowBatch, RowRecord, SchemaIntrospector, TableId, TableStore};
use crate::error::{Result, SyncError};

use super::convert::{build_insert, cell_to_value, insert_chunks, value_to_param};
use super::MssqlDatabase;

/// Select expression returning a column in a form the driver can decode.
fn select_expr(column: &ColumnMetadata) -> Result<String> {
    let quoted = quote_ident(&column.name)?;
    let ty = &column.column_type;
    Ok(if ty.is("xml") || ty.is("sql_variant") {
        format!("CAST({q} AS NVARCHAR(MAX)) AS {q}", q = quoted)
    } else if ty.is("hierarchyid") || ty.is("geometry") || ty.is("geography") {
        format!("{q}.ToString() AS {q}", q = quoted)
    } else {
        quoted
    })
}

#[async_trait]
impl TableStore for MssqlDatabase {
    async fn read_all_rows(&mut self, table: &TableId) -> Result<RowBatch> {
        let columns: Vec<ColumnMetadata> = self
            .list_columns(table)
            .await?
            .into_iter()
            .filter(ColumnMetadata::is_insertable)
            .collect();
        let select = columns.iter().map(select_expr).collect::<Result<Vec<_>>>()?;
        let sql = format!("SELECT {} FROM {}", select.join(", "), table.qualified()?);

        let rows = self
            .client
            .simple_query(&sql)
            .await
            .map_err(|e| SyncError::read(table, e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| SyncError::read(table, e.to_string()))?;

        let mut records: Vec<RowRecord> = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row
                .into_iter()
                .map(|cell| cell_to_value(&cell))
                .collect::<Result<RowRecord>>()
                .map_err(|e| SyncError::read(table, e.to_string()))?;
            records.push(record);
        }

        debug!("{}: read {} rows from {}", self.label, records.len(), table);
        Ok(RowBatch::new(columns.into_iter().map(|c| c.name).collect(), records))
    }

    async fn existing_key_values(
        &mut self,
        table: &TableId,
        column: &str,
        values: &[KeyValue],
    ) -> Result<HashSet<KeyValue>> {
        if values.is_empty() {
            return Ok(HashSet::new());
        }
        let quoted = quote_ident(column)?;
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("@P{}", i)).collect();
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IN ({params})",
            col = quoted,
            table = table.qualified()?,
            params = placeholders.join(", ")
        );
        let params: Vec<Box<dyn ToSql>> = values.iter().map(|v| value_to_param(&v.to_sql_value())).collect();
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = self.client.query(sql, &refs).await?.into_first_result().await?;

        let mut found = HashSet::with_capacity(rows.len());
        for row in rows {
            for cell in row {
                if let Some(key) = cell_to_value(&cell)?.key() {
                    found.insert(key.lookup_form());
                }
            }
        }

        // Report the caller's spelling of each value
        Ok(values
            .iter()
            .filter(|v| found.contains(&v.lookup_form()))
            .cloned()
            .collect())
    }

    async fn begin(&mut self) -> Result<()> {
        self.batch("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        // The server may already have aborted the transaction
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn set_identity_insert(&mut self, table: &TableId, enabled: bool) -> Result<()> {
        let sql = format!(
            "SET IDENTITY_INSERT {} {}",
            table.qualified()?,
            if enabled { "ON" } else { "OFF" }
        );
        self.batch(&sql).await
    }

    async fn insert_rows(&mut self, table: &TableId, batch: &RowBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let qualified = table.qualified()?;
        let columns = column_list(&batch.columns)?;

        let mut inserted = 0u64;
        for chunk in insert_chunks(batch) {
            let stmt = build_insert(&qualified, &columns, chunk);
            let refs: Vec<&dyn ToSql> = stmt.params.iter().map(|p| p.as_ref()).collect();
            let result = self
                .client
                .execute(stmt.sql, &refs)
                .await
                .map_err(|e| SyncError::write(table, e.to_string()))?;
            inserted += result.total();
        }
        debug!("{}: inserted {} rows into {}", self.label, inserted, table);
        Ok(inserted)
    }

    async fn delete_rows(&mut self, table: &TableId) -> Result<u64> {
        let sql = format!("DELETE FROM {}", table.qualified()?);
        let result = self
            .client
            .execute(sql, &[])
            .await
            .map_err(|e| SyncError::write(table, e.to_string()))?;
        Ok(result.total())
    }
}
