//! DDL statement generation

use std::fmt;

use pgdata_core::{PgDataError, Result};
use ring::digest;

use crate::identifiers::{MAX_IDENTIFIER_LEN, quote, quote_qualified, truncate_to};

/// A column for `CREATE TABLE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// PostgreSQL type, e.g. `integer`, `text`, `geometry(Point, 3005)`
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default_value = Some(expr.into());
        self
    }

    fn to_sql(&self) -> String {
        let mut def = format!("{} {}", quote(&self.name), self.data_type);
        if !self.nullable && !self.primary_key {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }
}

/// Index access method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexKind {
    #[default]
    BTree,
    Hash,
    Gist,
    SpGist,
    Gin,
    Brin,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::BTree => "btree",
            IndexKind::Hash => "hash",
            IndexKind::Gist => "gist",
            IndexKind::SpGist => "spgist",
            IndexKind::Gin => "gin",
            IndexKind::Brin => "brin",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "btree" => Ok(IndexKind::BTree),
            "hash" => Ok(IndexKind::Hash),
            "gist" => Ok(IndexKind::Gist),
            "spgist" => Ok(IndexKind::SpGist),
            "gin" => Ok(IndexKind::Gin),
            "brin" => Ok(IndexKind::Brin),
            other => Err(PgDataError::UnsupportedConfiguration(format!(
                "unknown index type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ix_<table>_<hash>`, where the hash is the first 16 hex digits of the
/// SHA-1 of the sorted columns and the index kind joined by `||`.
///
/// The table part is shortened so the whole name fits in
/// [`MAX_IDENTIFIER_LEN`] bytes and keeps its hash.
pub fn default_index_name(table: &str, columns: &[&str], kind: IndexKind) -> String {
    let mut parts: Vec<&str> = columns.to_vec();
    parts.sort_unstable();
    parts.push(kind.as_str());
    let signature = parts.join("||");
    let hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, signature.as_bytes());
    let hex = hex::encode(hash.as_ref());
    let table = truncate_to(table, MAX_IDENTIFIER_LEN - "ix__".len() - 16);
    format!("ix_{}_{}", table, &hex[..16])
}

pub fn create_table_sql(schema: &str, table: &str, columns: &[ColumnDef]) -> Result<String> {
    if columns.is_empty() {
        return Err(PgDataError::Schema(format!(
            "cannot create {}.{} without columns",
            schema, table
        )));
    }
    let mut defs: Vec<String> = columns.iter().map(ColumnDef::to_sql).collect();
    let pk: Vec<String> = columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| quote(&c.name))
        .collect();
    if !pk.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    Ok(format!(
        "CREATE TABLE {} (\n  {}\n)",
        quote_qualified(schema, table),
        defs.join(",\n  ")
    ))
}

pub fn create_index_sql(
    schema: &str,
    table: &str,
    name: &str,
    columns: &[&str],
    kind: IndexKind,
) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    format!(
        "CREATE INDEX {} ON {} USING {} ({})",
        quote(name),
        quote_qualified(schema, table),
        kind.as_str(),
        cols.join(", ")
    )
}

pub fn drop_table_sql(schema: &str, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_qualified(schema, table))
}
