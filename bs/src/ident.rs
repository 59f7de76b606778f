//! Identifier checks for table and column names
//!
//! Names end up inside generated SQL and PostgREST URLs, so only plain
//! `[A-Za-z_][A-Za-z0-9_]*` identifiers are accepted.

use crate::error::ConfigError;

/// Validate a table or column name
pub fn check(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}

/// Double-quote an identifier for SQL
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
