//! Identifier validation and quoting for dynamically built T-SQL.
//!
//! Table and column names cannot be bound as parameters, so every statement
//! that names an object goes through [`quote_ident`]. Names are validated
//! first, then wrapped in brackets with embedded `]` doubled.

use crate::error::{Result, SyncError};

/// Maximum identifier length in SQL Server (sysname).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing NUL bytes and
/// identifiers longer than 128 characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(SyncError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let chars = name.chars().count();
    if chars > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, chars, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier with brackets.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Quote a schema-qualified object name: `[schema].[name]`.
pub fn qualify(schema: &str, name: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(name)?))
}

/// Quote each column and join them into a select/insert list.
pub fn column_list<S: AsRef<str>>(columns: &[S]) -> Result<String> {
    let quoted: Result<Vec<String>> = columns.iter().map(|c| quote_ident(c.as_ref())).collect();
    Ok(quoted?.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_simple() {
        assert_eq!(quote_ident("Orders").unwrap(), "[Orders]");
    }

    #[test]
    fn test_quote_escapes_closing_bracket() {
        assert_eq!(quote_ident("odd]name").unwrap(), "[odd]]name]");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("sales", "Order Items").unwrap(), "[sales].[Order Items]");
    }

    #[test]
    fn test_rejects_null_byte_and_empty() {
        assert!(quote_ident("bad\0name").is_err());
        assert!(quote_ident("").is_err());
    }

    #[test]
    fn test_rejects_overlong() {
        let name = "x".repeat(129);
        assert!(validate_identifier(&name).is_err());
        assert!(validate_identifier(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn test_column_list() {
        assert_eq!(column_list(&["Id", "Name"]).unwrap(), "[Id], [Name]");
    }
}
