//! Conversion between tiberius column data and [`SqlValue`], and the
//! parameterized INSERT builder.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{ColumnData, FromSql, ToSql};

use crate::core::{RowBatch, RowRecord, SqlValue};
use crate::error::{Result, SyncError};

/// SQL Server rejects requests with more than 2100 parameters.
pub(crate) const MAX_PARAMS: usize = 2100;

/// Row constructors allowed in one `VALUES` list.
pub(crate) const MAX_VALUES_ROWS: usize = 1000;

/// Convert one cell as returned by the driver.
pub(crate) fn cell_to_value(data: &ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(|x| SqlValue::Int(i64::from(x))),
        ColumnData::I16(v) => v.map(|x| SqlValue::Int(i64::from(x))),
        ColumnData::I32(v) => v.map(|x| SqlValue::Int(i64::from(x))),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|x| SqlValue::Float(f64::from(x))),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Numeric(_) => Decimal::from_sql(data)?.map(SqlValue::Decimal),
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(SqlValue::Time),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(SqlValue::Timestamp)
        }
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(data)?.map(SqlValue::TimestampTz)
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(SyncError::Introspection(format!(
                "unsupported column data: {:?}",
                other
            )))
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Box a value for binding as a query parameter.
pub(crate) fn value_to_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int(i) => Box::new(*i),
        SqlValue::Float(f) => Box::new(*f),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
        SqlValue::Timestamp(ts) => Box::new(*ts),
        SqlValue::TimestampTz(ts) => Box::new(*ts),
    }
}

/// Rows per INSERT statement for `columns` values per row.
pub(crate) fn rows_per_statement(columns: usize) -> usize {
    if columns == 0 {
        return MAX_VALUES_ROWS;
    }
    // Leave headroom below the hard limit
    ((MAX_PARAMS - 100) / columns).clamp(1, MAX_VALUES_ROWS)
}

/// One multi-row INSERT with its bound parameters.
pub(crate) struct InsertStatement {
    pub sql: String,
    pub params: Vec<Box<dyn ToSql>>,
}

/// Build `INSERT INTO table (cols) VALUES (...), (...)` for `rows`.
///
/// NULL cells are written as literals rather than bound, so a typed null
/// never needs an implicit conversion to the column's type.
pub(crate) fn build_insert(qualified_table: &str, column_list: &str, rows: &[RowRecord]) -> InsertStatement {
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", qualified_table, column_list);
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    for (row_idx, row) in rows.iter().enumerate() {
        if row_idx > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (col_idx, value) in row.iter().enumerate() {
            if col_idx > 0 {
                sql.push_str(", ");
            }
            if value.is_null() {
                sql.push_str("NULL");
            } else {
                params.push(value_to_param(value));
                sql.push_str(&format!("@P{}", params.len()));
            }
        }
        sql.push(')');
    }

    InsertStatement { sql, params }
}

/// Split a batch into INSERT-sized row slices.
pub(crate) fn insert_chunks(batch: &RowBatch) -> impl Iterator<Item = &[RowRecord]> {
    batch.rows.chunks(rows_per_statement(batch.columns.len()))
}
