//! Schema metadata types.

use crate::core::identifier::qualify;
use crate::error::Result;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::fmt;

/// A table identified by `(schema, name)`, case-sensitive as stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId {
    pub schema: String,
    pub name: String,
}

impl TableId {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Bracket-quoted `[schema].[name]` for use in T-SQL.
    pub fn qualified(&self) -> Result<String> {
        qualify(&self.schema, &self.name)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl Serialize for TableId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Length, precision or scale qualifier of a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeModifier {
    /// Character or byte length.
    Length(i32),
    /// `(MAX)` storage.
    Max,
    /// `(precision, scale)` for exact numerics.
    PrecisionScale(u8, u8),
}

/// Normalized column type: base type name plus an optional modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub base: String,
    pub modifier: Option<TypeModifier>,
}

impl ColumnType {
    pub fn plain(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            modifier: None,
        }
    }

    /// Build a type from `sys.columns` values.
    ///
    /// `max_length` is in bytes and `-1` marks `MAX`. Unicode character types
    /// report their length in characters.
    pub fn from_catalog(base: &str, max_length: i16, precision: u8, scale: u8) -> Self {
        let lower = base.to_ascii_lowercase();
        let modifier = match lower.as_str() {
            "varchar" | "char" | "varbinary" | "binary" => Some(if max_length == -1 {
                TypeModifier::Max
            } else {
                TypeModifier::Length(i32::from(max_length))
            }),
            "nvarchar" | "nchar" => Some(if max_length == -1 {
                TypeModifier::Max
            } else {
                TypeModifier::Length(i32::from(max_length) / 2)
            }),
            "decimal" | "numeric" => Some(TypeModifier::PrecisionScale(precision, scale)),
            _ => None,
        };
        Self {
            base: base.to_string(),
            modifier,
        }
    }

    /// Whether the base type is `tag`, ignoring case.
    pub fn is(&self, tag: &str) -> bool {
        self.base.eq_ignore_ascii_case(tag)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            None => write!(f, "{}", self.base),
            Some(TypeModifier::Max) => write!(f, "{}(MAX)", self.base),
            Some(TypeModifier::Length(n)) => write!(f, "{}({})", self.base, n),
            Some(TypeModifier::PrecisionScale(p, s)) => write!(f, "{}({},{})", self.base, p, s),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Column metadata as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub identity: bool,
    pub computed: bool,
    pub description: String,
}

impl ColumnMetadata {
    /// Whether rows can supply a value for this column on INSERT.
    pub fn is_insertable(&self) -> bool {
        !self.computed && !self.column_type.is("timestamp") && !self.column_type.is("rowversion")
    }
}

/// One referencing/referenced column pair of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ForeignKeyEdge {
    pub name: String,
    pub child: TableId,
    pub child_column: String,
    pub parent: TableId,
    pub parent_column: String,
}

impl ForeignKeyEdge {
    pub fn is_self_reference(&self) -> bool {
        self.child == self.parent
    }
}

impl fmt::Display for ForeignKeyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}.{} -> {}.{})",
            self.name, self.child, self.child_column, self.parent, self.parent_column
        )
    }
}

/// Stored procedure definition and catalog dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredProcedure {
    pub schema: String,
    pub name: String,
    /// `None` when the definition is encrypted or not visible to the login.
    pub definition: Option<String>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

impl StoredProcedure {
    /// `schema.name` key used to match procedures across databases.
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}
