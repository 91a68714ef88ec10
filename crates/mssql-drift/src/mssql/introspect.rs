//! Catalog queries against `sys.*` views.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tiberius::Row;
use tracing::debug;

use crate::core::{ColumnMetadata, ColumnType, ForeignKeyEdge, SchemaIntrospector, StoredProcedure, TableId};
use crate::error::{Result, SyncError};

use super::MssqlDatabase;

const TABLES_SQL: &str = r#"
SELECT s.name AS schema_name, t.name AS table_name
FROM sys.tables t
JOIN sys.schemas s ON s.schema_id = t.schema_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT fk.name,
       cs.name, ct.name, cc.name,
       ps.name, pt.name, pc.name
FROM sys.foreign_key_columns fkc
JOIN sys.foreign_keys fk ON fk.object_id = fkc.constraint_object_id
JOIN sys.tables ct ON ct.object_id = fkc.parent_object_id
JOIN sys.schemas cs ON cs.schema_id = ct.schema_id
JOIN sys.columns cc ON cc.object_id = fkc.parent_object_id AND cc.column_id = fkc.parent_column_id
JOIN sys.tables pt ON pt.object_id = fkc.referenced_object_id
JOIN sys.schemas ps ON ps.schema_id = pt.schema_id
JOIN sys.columns pc ON pc.object_id = fkc.referenced_object_id AND pc.column_id = fkc.referenced_column_id
ORDER BY cs.name, ct.name, fk.name, fkc.constraint_column_id"#;

// Alias types report their base type; CLR types (hierarchyid, geography)
// have no base row and keep their own name.
const COLUMNS_SQL: &str = r#"
SELECT c.name,
       COALESCE(bt.name, ut.name) AS type_name,
       c.max_length, c.precision, c.scale,
       c.is_nullable, c.is_identity, c.is_computed,
       CAST(ep.value AS NVARCHAR(4000)) AS description
FROM sys.columns c
JOIN sys.types ut ON ut.user_type_id = c.user_type_id
LEFT JOIN sys.types bt ON ut.is_user_defined = 1 AND ut.is_assembly_type = 0
                      AND bt.user_type_id = c.system_type_id
LEFT JOIN sys.extended_properties ep ON ep.class = 1 AND ep.major_id = c.object_id
                                    AND ep.minor_id = c.column_id AND ep.name = 'MS_Description'
WHERE c.object_id = OBJECT_ID(@P1)
ORDER BY c.column_id"#;

const HAS_IDENTITY_SQL: &str = r#"
SELECT COUNT(*)
FROM sys.columns c
JOIN sys.tables t ON c.object_id = t.object_id
JOIN sys.schemas s ON t.schema_id = s.schema_id
WHERE s.name = @P1 AND t.name = @P2 AND c.is_identity = 1"#;

const PROCEDURES_SQL: &str = r#"
SELECT s.name, p.name, OBJECT_DEFINITION(p.object_id), p.create_date, p.modify_date
FROM sys.procedures p
JOIN sys.schemas s ON s.schema_id = p.schema_id
WHERE p.is_ms_shipped = 0
ORDER BY s.name, p.name"#;

fn text(row: &Row, idx: usize) -> Result<String> {
    row.try_get::<&str, _>(idx)?
        .map(str::to_string)
        .ok_or_else(|| SyncError::Introspection(format!("unexpected NULL in catalog column {}", idx)))
}

fn flag(row: &Row, idx: usize) -> Result<bool> {
    Ok(row.try_get::<bool, _>(idx)?.unwrap_or(false))
}

fn column_from_row(row: &Row) -> Result<ColumnMetadata> {
    let base = text(row, 1)?;
    let max_length = row.try_get::<i16, _>(2)?.unwrap_or(0);
    let precision = row.try_get::<u8, _>(3)?.unwrap_or(0);
    let scale = row.try_get::<u8, _>(4)?.unwrap_or(0);
    Ok(ColumnMetadata {
        name: text(row, 0)?,
        column_type: ColumnType::from_catalog(&base, max_length, precision, scale),
        nullable: flag(row, 5)?,
        identity: flag(row, 6)?,
        computed: flag(row, 7)?,
        description: row.try_get::<&str, _>(8)?.unwrap_or_default().to_string(),
    })
}

#[async_trait]
impl SchemaIntrospector for MssqlDatabase {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list_tables(&mut self) -> Result<Vec<TableId>> {
        let rows = self.client.simple_query(TABLES_SQL).await?.into_first_result().await?;
        let tables = rows
            .iter()
            .map(|row| Ok(TableId::new(text(row, 0)?, text(row, 1)?)))
            .collect::<Result<Vec<_>>>()?;
        debug!("{}: {} tables", self.label, tables.len());
        Ok(tables)
    }

    async fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKeyEdge>> {
        let rows = self
            .client
            .simple_query(FOREIGN_KEYS_SQL)
            .await?
            .into_first_result()
            .await?;
        let edges = rows
            .iter()
            .map(|row| {
                Ok(ForeignKeyEdge {
                    name: text(row, 0)?,
                    child: TableId::new(text(row, 1)?, text(row, 2)?),
                    child_column: text(row, 3)?,
                    parent: TableId::new(text(row, 4)?, text(row, 5)?),
                    parent_column: text(row, 6)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("{}: {} foreign key column pairs", self.label, edges.len());
        Ok(edges)
    }

    async fn list_columns(&mut self, table: &TableId) -> Result<Vec<ColumnMetadata>> {
        let qualified = table.qualified()?;
        let rows = self
            .client
            .query(COLUMNS_SQL, &[&qualified])
            .await?
            .into_first_result()
            .await?;
        if rows.is_empty() {
            return Err(SyncError::Introspection(format!(
                "table {} not found in {}",
                table, self.label
            )));
        }
        rows.iter().map(column_from_row).collect()
    }

    async fn list_procedures(&mut self) -> Result<Vec<StoredProcedure>> {
        let rows = self
            .client
            .simple_query(PROCEDURES_SQL)
            .await?
            .into_first_result()
            .await?;
        rows.iter()
            .map(|row| {
                Ok(StoredProcedure {
                    schema: text(row, 0)?,
                    name: text(row, 1)?,
                    definition: row.try_get::<&str, _>(2)?.map(str::to_string),
                    created: row.try_get::<NaiveDateTime, _>(3)?,
                    modified: row.try_get::<NaiveDateTime, _>(4)?,
                })
            })
            .collect()
    }

    async fn has_identity_column(&mut self, table: &TableId) -> Result<bool> {
        let row = self
            .client
            .query(HAS_IDENTITY_SQL, &[&table.schema.as_str(), &table.name.as_str()])
            .await?
            .into_row()
            .await?;
        let count = match row {
            Some(row) => row.try_get::<i32, _>(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(count > 0)
    }
}
