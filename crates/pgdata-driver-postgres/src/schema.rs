//! PostgreSQL schema introspection implementation

use async_trait::async_trait;
use pgdata_core::{
    ColumnInfo, Connection, IndexInfo, PrimaryKeyInfo, Result, SchemaInfo, SchemaIntrospection,
    TableInfo, TableType, Value,
};

use crate::PostgresConnection;

fn text(value: Option<&Value>) -> String {
    value.and_then(|v| v.as_str()).unwrap_or("").to_string()
}

#[async_trait]
impl SchemaIntrospection for PostgresConnection {
    /// Every schema except the `pg_` system namespaces, sorted
    #[tracing::instrument(skip(self))]
    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>> {
        let result = self
            .query(
                "SELECT schema_name::text, schema_owner::text
                 FROM information_schema.schemata
                 ORDER BY schema_name",
                &[],
            )
            .await?;

        let schemas = result
            .rows
            .iter()
            .map(|row| SchemaInfo {
                name: text(row.get(0)),
                owner: row.get(1).and_then(|v| v.as_str()).map(|s| s.to_string()),
            })
            .filter(|schema| !schema.name.starts_with("pg_"))
            .collect();

        Ok(schemas)
    }

    #[tracing::instrument(skip(self))]
    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableInfo>> {
        let result = match schema {
            Some(schema) => {
                self.query(
                    "SELECT table_schema::text, table_name::text, table_type::text
                     FROM information_schema.tables
                     WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                     ORDER BY table_name",
                    &[Value::String(schema.to_string())],
                )
                .await?
            }
            None => {
                self.query(
                    "SELECT table_schema::text, table_name::text, table_type::text
                     FROM information_schema.tables
                     WHERE table_schema NOT LIKE 'pg\\_%' AND table_type = 'BASE TABLE'
                     ORDER BY table_schema, table_name",
                    &[],
                )
                .await?
            }
        };

        let tables = result
            .rows
            .iter()
            .map(|row| {
                let table_type = match row.get(2).and_then(|v| v.as_str()) {
                    Some("VIEW") => TableType::View,
                    Some("FOREIGN") => TableType::ForeignTable,
                    Some("LOCAL TEMPORARY") => TableType::Temporary,
                    _ => TableType::Table,
                };
                TableInfo {
                    schema: Some(text(row.get(0))),
                    name: text(row.get(1)),
                    table_type,
                }
            })
            .collect();

        Ok(tables)
    }

    #[tracing::instrument(skip(self))]
    async fn get_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        let schema = schema.unwrap_or("public");
        let result = self
            .query(
                "SELECT
                    c.column_name::text,
                    c.ordinal_position::int4,
                    c.udt_name::text,
                    c.is_nullable::text,
                    c.column_default::text,
                    EXISTS (
                        SELECT 1
                        FROM information_schema.table_constraints tc
                        JOIN information_schema.key_column_usage kcu
                          ON tc.constraint_name = kcu.constraint_name
                         AND tc.table_schema = kcu.table_schema
                        WHERE tc.constraint_type = 'PRIMARY KEY'
                          AND tc.table_schema = c.table_schema
                          AND tc.table_name = c.table_name
                          AND kcu.column_name = c.column_name
                    ) AS is_primary_key
                 FROM information_schema.columns c
                 WHERE c.table_schema = $1 AND c.table_name = $2
                 ORDER BY c.ordinal_position",
                &[
                    Value::String(schema.to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;

        let columns = result
            .rows
            .iter()
            .map(|row| ColumnInfo {
                name: text(row.get(0)),
                ordinal: row.get(1).and_then(|v| v.as_i64()).unwrap_or(0) as usize,
                data_type: text(row.get(2)),
                nullable: row.get(3).and_then(|v| v.as_str()) == Some("YES"),
                default_value: row.get(4).and_then(|v| v.as_str()).map(|s| s.to_string()),
                is_primary_key: row.get(5).and_then(|v| v.as_bool()).unwrap_or(false),
            })
            .collect();

        Ok(columns)
    }

    #[tracing::instrument(skip(self))]
    async fn get_indexes(&self, schema: Option<&str>, table: &str) -> Result<Vec<IndexInfo>> {
        let schema = schema.unwrap_or("public");
        let result = self
            .query(
                "SELECT
                    i.relname::text AS index_name,
                    ix.indisunique AS is_unique,
                    ix.indisprimary AS is_primary,
                    array_agg(
                        a.attname::text
                        ORDER BY array_position(ix.indkey, a.attnum)
                    ) AS key_columns,
                    am.amname::text AS index_method
                 FROM pg_class t
                 JOIN pg_index ix ON t.oid = ix.indrelid
                 JOIN pg_class i ON i.oid = ix.indexrelid
                 JOIN pg_am am ON am.oid = i.relam
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
                 JOIN pg_namespace n ON n.oid = t.relnamespace
                 WHERE n.nspname = $1 AND t.relname = $2
                 GROUP BY i.relname, ix.indisunique, ix.indisprimary, am.amname
                 ORDER BY i.relname",
                &[
                    Value::String(schema.to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;

        let indexes = result
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.get(0).and_then(|v| v.as_str())?.to_string();
                Some(IndexInfo {
                    name,
                    is_unique: row.get(1).and_then(|v| v.as_bool()).unwrap_or(false),
                    is_primary: row.get(2).and_then(|v| v.as_bool()).unwrap_or(false),
                    columns: row
                        .get(3)
                        .and_then(|v| v.as_string_array())
                        .unwrap_or_default(),
                    index_type: row
                        .get(4)
                        .and_then(|v| v.as_str())
                        .unwrap_or("btree")
                        .to_string(),
                })
            })
            .collect();

        Ok(indexes)
    }

    #[tracing::instrument(skip(self))]
    async fn get_primary_key(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<PrimaryKeyInfo>> {
        let schema = schema.unwrap_or("public");
        let result = self
            .query(
                "SELECT
                    tc.constraint_name::text,
                    array_agg(kcu.column_name::text ORDER BY kcu.ordinal_position) AS columns
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                   AND tc.table_schema = kcu.table_schema
                 WHERE tc.constraint_type = 'PRIMARY KEY'
                   AND tc.table_schema = $1
                   AND tc.table_name = $2
                 GROUP BY tc.constraint_name",
                &[
                    Value::String(schema.to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;

        Ok(result.rows.first().map(|row| PrimaryKeyInfo {
            name: row.get(0).and_then(|v| v.as_str()).map(|s| s.to_string()),
            columns: row
                .get(1)
                .and_then(|v| v.as_string_array())
                .unwrap_or_default(),
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn table_exists(&self, schema: Option<&str>, table: &str) -> Result<bool> {
        let result = self
            .query(
                "SELECT 1
                 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_name = $2",
                &[
                    Value::String(schema.unwrap_or("public").to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;
        Ok(result.has_rows())
    }
}
