//! Table, schema and column name handling

use pgdata_core::{PgDataError, Result};
use pgdata_driver_postgres::escape_identifier_pg;

/// Longest identifier PostgreSQL stores; longer names are silently cut
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Cut `name` to at most `max` bytes on a char boundary
pub(crate) fn truncate_to(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// The name PostgreSQL will actually store for `name`
pub(crate) fn truncate_identifier(name: &str) -> &str {
    truncate_to(name, MAX_IDENTIFIER_LEN)
}

/// Trim a table or schema name, rejecting empty or blank names
pub fn valid_identifier(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PgDataError::InvalidIdentifier(name.to_string()));
    }
    Ok(trimmed)
}

/// Split `schema.table` into its parts; an unqualified name has no schema
pub fn parse_table_name(name: &str) -> Result<(Option<String>, String)> {
    let name = valid_identifier(name)?;
    match name.split_once('.') {
        Some((schema, table)) => {
            let schema = valid_identifier(schema)?;
            let table = valid_identifier(table)?;
            Ok((Some(schema.to_string()), table.to_string()))
        }
        None => Ok((None, name.to_string())),
    }
}

/// Lower-case and trim a column name for comparisons
pub fn normalize_column_name(name: &str) -> Result<String> {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() || normalized.contains('.') || normalized.contains('-') {
        return Err(PgDataError::InvalidIdentifier(name.to_string()));
    }
    Ok(normalized)
}

pub(crate) fn quote(name: &str) -> String {
    escape_identifier_pg(name)
}

/// `"schema"."table"`
pub(crate) fn quote_qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote(schema), quote(table))
}
