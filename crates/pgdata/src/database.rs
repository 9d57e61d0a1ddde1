//! Database handle: schema listing, DDL, and raw SQL pass-throughs

use std::path::PathBuf;
use std::sync::Arc;

use pgdata_connection::{
    ConnectionFactory, ConnectionLease, ConnectionMode, ConnectionSource, DriverFactory, PoolStats,
};
use pgdata_core::{
    Connection, ConnectionConfig, PgDataError, QueryCache, QueryResult, Record, Result,
    SchemaIntrospection, Value,
};
use pgdata_driver_postgres::PostgresDriver;
use pgdata_ogr::{CliOgrRunner, DEFAULT_OGR2OGR, OgrRunner};

use crate::ddl::{ColumnDef, create_table_sql, drop_table_sql};
use crate::identifiers::{parse_table_name, quote, valid_identifier};
use crate::table::Table;

/// Schema used for unqualified names when the handle is not bound to one
pub const DEFAULT_SCHEMA: &str = "public";

/// How a [`Database`] handle behaves
#[derive(Clone)]
pub struct DatabaseOptions {
    /// Bind the handle to one schema
    pub schema: Option<String>,
    pub mode: ConnectionMode,
    /// Fail with `UnknownColumn` instead of matching nothing
    pub strict: bool,
    /// Directory of named `.sql` files
    pub sql_path: PathBuf,
    pub ogr_binary: String,
    pub ogr_runner: Arc<dyn OgrRunner>,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self {
            schema: None,
            mode: ConnectionMode::default(),
            strict: false,
            sql_path: PathBuf::from("sql"),
            ogr_binary: DEFAULT_OGR2OGR.to_string(),
            ogr_runner: Arc::new(CliOgrRunner::new()),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Open a fresh connection for every operation
    pub fn no_pool(self) -> Self {
        self.with_mode(ConnectionMode::NoPool)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_sql_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sql_path = path.into();
        self
    }

    pub fn with_ogr_binary(mut self, binary: impl Into<String>) -> Self {
        self.ogr_binary = binary.into();
        self
    }

    pub fn with_ogr_runner(mut self, runner: Arc<dyn OgrRunner>) -> Self {
        self.ogr_runner = runner;
        self
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DatabaseOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseOptions")
            .field("schema", &self.schema)
            .field("mode", &self.mode)
            .field("strict", &self.strict)
            .field("sql_path", &self.sql_path)
            .field("ogr_binary", &self.ogr_binary)
            .finish_non_exhaustive()
    }
}

struct Inner {
    source: ConnectionSource,
    config: ConnectionConfig,
    schema: Option<String>,
    strict: bool,
    queries: QueryCache,
    ogr_binary: String,
    ogr_runner: Arc<dyn OgrRunner>,
}

/// A handle to one PostgreSQL database.
///
/// Cloning is cheap; clones share the connection source. Connections are
/// opened lazily on first use.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.inner.config.redacted_url())
            .field("schema", &self.inner.schema)
            .field("pooled", &self.inner.source.is_pooled())
            .finish()
    }
}

impl Database {
    /// Open a handle to `url`, or to `DATABASE_URL` when `url` is `None`
    pub fn connect(url: Option<&str>, options: DatabaseOptions) -> Result<Self> {
        let config = ConnectionConfig::from_env_or(url)?;
        tracing::info!(url = %config.redacted_url(), schema = ?options.schema, "opening database handle");
        let factory = DriverFactory::new(Arc::new(PostgresDriver::new()), config.clone());
        Ok(Self::with_factory(config, factory, options))
    }

    /// Build a handle over any connection factory
    pub fn with_factory<F: ConnectionFactory>(
        config: ConnectionConfig,
        factory: F,
        options: DatabaseOptions,
    ) -> Self {
        let source = ConnectionSource::new(options.mode, factory);
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                schema: options.schema,
                strict: options.strict,
                queries: QueryCache::new(options.sql_path),
                ogr_binary: options.ogr_binary,
                ogr_runner: options.ogr_runner,
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// The schema this handle is bound to, if any
    pub fn schema(&self) -> Option<&str> {
        self.inner.schema.as_deref()
    }

    pub fn is_strict(&self) -> bool {
        self.inner.strict
    }

    /// Named SQL files under the configured `sql_path`
    pub fn queries(&self) -> &QueryCache {
        &self.inner.queries
    }

    /// Pool statistics; `None` in no-pool mode
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.inner.source.stats()
    }

    pub(crate) fn ogr_binary(&self) -> &str {
        &self.inner.ogr_binary
    }

    pub(crate) fn ogr_runner(&self) -> &dyn OgrRunner {
        self.inner.ogr_runner.as_ref()
    }

    pub(crate) async fn lease(&self) -> Result<ConnectionLease<'_>> {
        self.inner.source.acquire().await
    }

    /// Schema for an unqualified table name
    pub(crate) fn default_schema(&self) -> &str {
        self.inner.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// Round trip to the server
    pub async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Close idle pooled connections
    pub async fn close(&self) {
        if let Some(stats) = self.pool_stats() {
            tracing::debug!(%stats, "closing pool");
        }
        self.inner.source.close().await;
    }

    /// Execute one auto-committed statement, returning the affected row count
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let conn = self.lease().await?;
        Ok(conn.execute(sql, params).await?.affected_rows)
    }

    /// Execute the same statement once per parameter set
    pub async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        let conn = self.lease().await?;
        conn.execute_many(sql, param_sets).await
    }

    /// Execute a script of `;`-separated statements without parameters
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.lease().await?;
        conn.execute_batch(sql).await
    }

    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.lease().await?;
        conn.query(sql, params).await
    }

    /// First row of a query, if any
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Record>> {
        let result = self.query(sql, params).await?;
        Ok(result.rows.into_iter().next().map(|row| row.into_record()))
    }

    /// Run the named query from the SQL directory
    pub async fn query_named(&self, name: &str, params: &[Value]) -> Result<QueryResult> {
        let sql = self.inner.queries.get(name)?;
        self.query(&sql, params).await
    }

    /// Replace `$key` tokens in `sql` with their values.
    ///
    /// Meant for table and column names in stored SQL, not for values. Longer
    /// keys are substituted first so `$table` does not clobber `$table_name`.
    pub fn build_query<I, K, V>(sql: &str, lookup: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(K, V)> = lookup.into_iter().collect();
        pairs.sort_by(|a, b| b.0.as_ref().len().cmp(&a.0.as_ref().len()));
        pairs.iter().fold(sql.to_string(), |acc, (key, value)| {
            acc.replace(&format!("${}", key.as_ref()), value.as_ref())
        })
    }

    /// Non-system schema names (not prefixed `pg_`), sorted
    #[tracing::instrument(skip(self))]
    pub async fn schemas(&self) -> Result<Vec<String>> {
        let conn = self.lease().await?;
        let mut names: Vec<String> = introspection(&*conn)?
            .list_schemas()
            .await?
            .into_iter()
            .map(|s| s.name)
            .filter(|name| !name.starts_with("pg_"))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Tables of the bound schema, or `schema.table` for every non-system
    /// schema when the handle is unbound
    #[tracing::instrument(skip(self))]
    pub async fn tables(&self) -> Result<Vec<String>> {
        if let Some(schema) = self.schema() {
            return self.tables_in_schema(schema).await;
        }
        let conn = self.lease().await?;
        let mut names: Vec<String> = introspection(&*conn)?
            .list_tables(None)
            .await?
            .into_iter()
            .filter(|t| !t.schema.as_deref().unwrap_or_default().starts_with("pg_"))
            .map(|t| t.qualified_name())
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn tables_in_schema(&self, schema: &str) -> Result<Vec<String>> {
        let schema = valid_identifier(schema)?;
        let conn = self.lease().await?;
        let mut names: Vec<String> = introspection(&*conn)?
            .list_tables(Some(schema))
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Create `schema` unless it exists; returns whether it was created
    #[tracing::instrument(skip(self))]
    pub async fn create_schema(&self, schema: &str) -> Result<bool> {
        let schema = valid_identifier(schema)?;
        if self.schemas().await?.iter().any(|s| s == schema) {
            return Ok(false);
        }
        self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote(schema)), &[])
            .await?;
        tracing::info!(%schema, "created schema");
        Ok(true)
    }

    /// Drop `schema` if it exists; returns whether it was dropped
    #[tracing::instrument(skip(self))]
    pub async fn drop_schema(&self, schema: &str, cascade: bool) -> Result<bool> {
        let schema = valid_identifier(schema)?;
        if !self.schemas().await?.iter().any(|s| s == schema) {
            return Ok(false);
        }
        let mut sql = format!("DROP SCHEMA IF EXISTS {}", quote(schema));
        if cascade {
            sql.push_str(" CASCADE");
        }
        self.execute(&sql, &[]).await?;
        tracing::info!(%schema, cascade, "dropped schema");
        Ok(true)
    }

    /// Drop every table in the bound schema; returns the number dropped
    #[tracing::instrument(skip(self))]
    pub async fn wipe_schema(&self) -> Result<usize> {
        let Some(schema) = self.schema() else {
            return Err(PgDataError::Configuration(
                "wipe_schema needs a handle bound to a schema".into(),
            ));
        };
        let names = self.tables_in_schema(schema).await?;
        for name in &names {
            self.execute(&drop_table_sql(schema, name), &[]).await?;
        }
        tracing::info!(%schema, tables = names.len(), "wiped schema");
        Ok(names.len())
    }

    /// Split `schema.table`, applying the bound or default schema
    pub fn parse_table_name(&self, name: &str) -> Result<(String, String)> {
        let (schema, table) = parse_table_name(name)?;
        Ok((
            schema.unwrap_or_else(|| self.default_schema().to_string()),
            table,
        ))
    }

    /// Load an existing table, or `None` when it does not exist
    #[tracing::instrument(skip(self))]
    pub async fn load_table(&self, name: &str) -> Result<Option<Table>> {
        let (schema, table) = self.parse_table_name(name)?;
        let exists = {
            let conn = self.lease().await?;
            introspection(&*conn)?
                .table_exists(Some(&schema), &table)
                .await?
        };
        if !exists {
            return Ok(None);
        }
        Table::load(self.clone(), &schema, &table).await.map(Some)
    }

    /// Look up a table; a missing table yields a dropped handle, so check
    /// [`Table::is_dropped`] before use
    pub async fn table(&self, name: &str) -> Result<Table> {
        match self.load_table(name).await? {
            Some(table) => Ok(table),
            None => {
                let (schema, table) = self.parse_table_name(name)?;
                tracing::debug!(%schema, %table, "table not found; returning dropped handle");
                Ok(Table::dropped(self.clone(), &schema, &table))
            }
        }
    }

    /// Create a table, or return the existing one.
    ///
    /// An existing table must already have every requested column; a
    /// mismatch is a `Schema` error rather than a silent no-op.
    #[tracing::instrument(skip(self, columns), fields(columns = columns.len()))]
    pub async fn create_table(&self, name: &str, columns: &[ColumnDef]) -> Result<Table> {
        let (schema, table) = self.parse_table_name(name)?;

        if let Some(existing) = self.load_table(&format!("{}.{}", schema, table)).await? {
            let present = existing.columns()?;
            let missing: Vec<&str> = columns
                .iter()
                .map(|c| c.name.as_str())
                .filter(|c| !present.iter().any(|p| p == c))
                .collect();
            if !missing.is_empty() {
                return Err(PgDataError::Schema(format!(
                    "table {}.{} already exists without column(s): {}",
                    schema,
                    table,
                    missing.join(", ")
                )));
            }
            tracing::debug!(%schema, %table, "table exists; returning it unchanged");
            return Ok(existing);
        }

        self.execute(&create_table_sql(&schema, &table, columns)?, &[])
            .await?;
        tracing::info!(%schema, %table, "created table");
        Table::load(self.clone(), &schema, &table).await
    }
}

pub(crate) fn introspection(conn: &dyn Connection) -> Result<&dyn SchemaIntrospection> {
    conn.as_schema_introspection().ok_or_else(|| {
        PgDataError::Driver(format!(
            "driver '{}' does not support schema introspection",
            conn.driver_name()
        ))
    })
}
