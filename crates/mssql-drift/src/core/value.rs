//! Portable row values.
//!
//! Driver-specific representations never leave the driver: readers convert
//! every cell into a [`SqlValue`] with integers widened to `i64` and floats
//! to `f64`, and writers bind from the same enum.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Longest text shown in log previews before truncation.
const PREVIEW_TEXT_CHARS: usize = 40;

/// A single normalized cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Unify null markers: NaN and infinite floats become `Null`.
    pub fn normalize(self) -> Self {
        match self {
            SqlValue::Float(f) if !f.is_finite() => SqlValue::Null,
            other => other,
        }
    }

    /// Hashable projection used to compare foreign-key values.
    ///
    /// Returns `None` for nulls and for value kinds that are not
    /// key-comparable (floats, binary, temporal types).
    pub fn key(&self) -> Option<KeyValue> {
        match self {
            SqlValue::Int(v) => Some(KeyValue::Int(*v)),
            SqlValue::Bool(b) => Some(KeyValue::Int(i64::from(*b))),
            SqlValue::Uuid(u) => Some(KeyValue::Uuid(*u)),
            SqlValue::Text(s) => Some(KeyValue::Text(s.clone())),
            SqlValue::Decimal(d) => Some(KeyValue::Decimal(d.normalize())),
            _ => None,
        }
    }

    /// Name of the variant, used when logging row shapes.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::Text(s) if s.chars().count() > PREVIEW_TEXT_CHARS => {
                let head: String = s.chars().take(PREVIEW_TEXT_CHARS).collect();
                write!(f, "'{}...'", head)
            }
            SqlValue::Text(s) => write!(f, "'{}'", s),
            SqlValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Time(t) => write!(f, "{}", t),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts),
            SqlValue::TimestampTz(ts) => write!(f, "{}", ts),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// A key-comparable value (integer, uuid, text or exact numeric).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Uuid(Uuid),
    Text(String),
    Decimal(Decimal),
}

impl KeyValue {
    /// Form used to match values the way SQL Server's default collation does:
    /// text compares case-insensitively and ignores trailing spaces.
    pub fn lookup_form(&self) -> KeyValue {
        match self {
            KeyValue::Text(s) => KeyValue::Text(s.trim_end().to_lowercase()),
            other => other.clone(),
        }
    }

    pub fn to_sql_value(&self) -> SqlValue {
        match self {
            KeyValue::Int(v) => SqlValue::Int(*v),
            KeyValue::Uuid(u) => SqlValue::Uuid(*u),
            KeyValue::Text(s) => SqlValue::Text(s.clone()),
            KeyValue::Decimal(d) => SqlValue::Decimal(*d),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Uuid(u) => write!(f, "{}", u),
            KeyValue::Text(s) => write!(f, "'{}'", s),
            KeyValue::Decimal(d) => write!(f, "{}", d),
        }
    }
}

/// One row; values are positional and line up with [`RowBatch::columns`].
pub type RowRecord = Vec<SqlValue>;

/// All rows of one table held in memory, with their column header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<RowRecord>,
}

impl RowBatch {
    pub fn new(columns: Vec<String>, rows: Vec<RowRecord>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Remove a column from the header and every row. Returns false if absent.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Append a column holding the same value in every row.
    pub fn push_constant_column(&mut self, name: impl Into<String>, value: SqlValue) {
        self.columns.push(name.into());
        for row in &mut self.rows {
            row.push(value.clone());
        }
    }

    /// Keep only rows for which `keep` returns true; returns how many were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&RowRecord) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Distinct non-null key values of one column, plus the count of non-null
    /// cells that are not key-comparable.
    pub fn distinct_keys(&self, idx: usize) -> (BTreeSet<KeyValue>, usize) {
        let mut keys = BTreeSet::new();
        let mut incomparable = 0;
        for row in &self.rows {
            match row.get(idx) {
                None | Some(SqlValue::Null) => {}
                Some(value) => match value.key() {
                    Some(k) => {
                        keys.insert(k);
                    }
                    None => incomparable += 1,
                },
            }
        }
        (keys, incomparable)
    }

    /// Apply [`SqlValue::normalize`] to every cell.
    pub fn normalize(&mut self) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                let value = std::mem::replace(cell, SqlValue::Null);
                *cell = value.normalize();
            }
        }
    }

    /// Header plus the first `n` rows, one per line, for diagnostics.
    pub fn preview(&self, n: usize) -> String {
        let mut out = format!("columns: [{}]", self.columns.join(", "));
        for (i, row) in self.rows.iter().take(n).enumerate() {
            let cells: Vec<String> = row.iter().map(|v| format!("{}:{}", v.kind(), v)).collect();
            out.push_str(&format!("\n  row {}: ({})", i + 1, cells.join(", ")));
        }
        if self.rows.len() > n {
            out.push_str(&format!("\n  ... {} more rows", self.rows.len() - n));
        }
        out
    }
}
