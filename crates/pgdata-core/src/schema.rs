//! Schema introspection traits and types

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Schema introspection interface
#[async_trait]
pub trait SchemaIntrospection: Send + Sync {
    /// List all schemas in the current database
    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>>;

    /// List base tables in a schema, or in every schema when `None`
    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableInfo>>;

    /// Get columns for a table, in ordinal order
    async fn get_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Get indexes for a table
    async fn get_indexes(&self, schema: Option<&str>, table: &str) -> Result<Vec<IndexInfo>>;

    /// Get primary key for a table
    async fn get_primary_key(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<PrimaryKeyInfo>>;

    /// Whether a table exists
    async fn table_exists(&self, schema: Option<&str>, table: &str) -> Result<bool> {
        let tables = self.list_tables(schema).await?;
        Ok(tables.iter().any(|t| t.name == table))
    }
}

/// Schema information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub owner: Option<String>,
}

/// Table information (basic)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: Option<String>,
    pub name: String,
    pub table_type: TableType,
}

impl TableInfo {
    /// `schema.name`, or just `name` when the schema is unknown
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// Table type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    ForeignTable,
    Temporary,
    System,
}

/// Column information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub ordinal: usize,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

/// Index information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: String,
}

/// Primary key information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyInfo {
    pub name: Option<String>,
    pub columns: Vec<String>,
}
