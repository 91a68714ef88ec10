//! Core abstractions shared by the diff and migration engines.
//!
//! - [`identifier`]: validated bracket quoting for SQL Server identifiers
//! - [`schema`]: table, column, foreign-key and procedure metadata
//! - [`value`]: portable row values and in-memory row batches
//! - [`traits`]: the introspection and bulk data access seams
//!
//! The SQL Server implementation of the traits lives in [`crate::mssql`];
//! tests use an in-memory implementation so the engines run without a server.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnMetadata, ColumnType, ForeignKeyEdge, StoredProcedure, TableId, TypeModifier};
pub use traits::{Database, SchemaIntrospector, TableStore};
pub use value::{KeyValue, RowBatch, RowRecord, SqlValue};
