//! PostgreSQL connection implementation

use async_trait::async_trait;
use pgdata_core::{
    ColumnMeta, Connection, ConnectionConfig, PgDataError, QueryResult, Result, Row,
    SchemaIntrospection, StatementResult, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Statement, types::ToSql};

use crate::codec::{PgValue, postgres_to_value};
use crate::tls::{SslMode, TlsFiles, build_tls_connector};

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail().filter(|d| !d.trim().is_empty()) {
        message.push_str(&format!(" (detail: {})", detail));
    }
    if let Some(hint) = db_error.hint().filter(|h| !h.trim().is_empty()) {
        message.push_str(&format!(" (hint: {})", hint));
    }
    if let Some(column) = db_error.column().filter(|c| !c.trim().is_empty()) {
        message.push_str(&format!(" (column: {})", column));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        "42P01" => format!("undefined table: {}", message),
        "42703" => format!("undefined column: {}", message),
        _ => format!("{} (code: {})", message, code.code()),
    }
}

fn query_error(context: &str, e: tokio_postgres::Error) -> PgDataError {
    PgDataError::Query(format!("{}: {}", context, format_postgres_error(&e)))
}

fn sql_preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

/// PostgreSQL connection wrapper
///
/// The client is dropped on `close()`, which terminates the background
/// connection task.
pub struct PostgresConnection {
    client: Mutex<Option<Client>>,
    closed: AtomicBool,
}

impl PostgresConnection {
    /// Connect using a parsed configuration.
    ///
    /// Recognised parameters: `sslmode`, `sslrootcert`, `sslcert`, `sslkey`,
    /// `application_name` and `connect_timeout` (seconds).
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(
            &config
                .get_string("sslmode")
                .unwrap_or_else(|| "prefer".to_string()),
        );

        tracing::info!(
            host = %config.host,
            port = %config.port,
            database = %config.database,
            ssl_mode = ?ssl_mode,
            "connecting to PostgreSQL database"
        );

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .ssl_mode(ssl_mode.to_tokio_postgres())
            .application_name(
                config
                    .params
                    .get("application_name")
                    .map(String::as_str)
                    .unwrap_or("pgdata"),
            );
        if let Some(user) = &config.username {
            pg_config.user(user);
        }
        if let Some(password) = &config.password {
            pg_config.password(password);
        }
        if let Some(secs) = config
            .params
            .get("connect_timeout")
            .and_then(|s| s.parse::<u64>().ok())
        {
            pg_config.connect_timeout(std::time::Duration::from_secs(secs));
        }

        let connect_error = |e: tokio_postgres::Error| {
            PgDataError::Connection(format!(
                "Failed to connect to PostgreSQL: {}",
                format_postgres_error(&e)
            ))
        };

        let client = if ssl_mode.uses_tls() {
            let files = TlsFiles {
                root_cert: config.params.get("sslrootcert").cloned(),
                client_cert: config.params.get("sslcert").cloned(),
                client_key: config.params.get("sslkey").cloned(),
            };
            let tls = build_tls_connector(ssl_mode, &files)?;
            let (client, connection) = pg_config.connect(tls).await.map_err(connect_error)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        } else {
            let (client, connection) = pg_config.connect(NoTls).await.map_err(connect_error)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        };

        tracing::info!(
            host = %config.host,
            port = %config.port,
            database = %config.database,
            "PostgreSQL connection established"
        );
        Ok(Self {
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        })
    }

    fn closed_error() -> PgDataError {
        PgDataError::Connection("connection is closed".into())
    }

    async fn prepare(client: &Client, sql: &str) -> Result<Statement> {
        client
            .prepare(sql)
            .await
            .map_err(|e| query_error("Failed to prepare statement", e))
    }

    async fn execute_prepared(client: &Client, statement: &Statement, params: &[Value]) -> Result<u64> {
        let pg_params = PgValue::bind_all(params, statement.params());
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        client
            .execute(statement, &param_refs)
            .await
            .map_err(|e| query_error("Failed to execute statement", e))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(Self::closed_error)?;

        // Prepare first so we know the target column types for each parameter
        let statement = Self::prepare(client, sql).await?;
        let affected_rows = Self::execute_prepared(client, &statement, params).await?;

        tracing::debug!(affected_rows, "statement executed");
        Ok(StatementResult { affected_rows })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(Self::closed_error)?;

        let statement = Self::prepare(client, sql).await?;
        let pg_params = PgValue::bind_all(params, statement.params());
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| query_error("Failed to execute query", e))?;

        // Column metadata comes from the statement so empty results still carry it
        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(ordinal, col)| ColumnMeta {
                name: col.name().to_string(),
                data_type: col.type_().name().to_string(),
                ordinal,
            })
            .collect();
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let values = (0..columns.len())
                .map(|idx| postgres_to_value(pg_row, idx))
                .collect::<Result<Vec<_>>>()?;
            rows.push(Row::new(column_names.clone(), values));
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    #[tracing::instrument(skip(self, sql, param_sets), fields(sql_preview = %sql_preview(sql), sets = param_sets.len()))]
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(Self::closed_error)?;

        let statement = Self::prepare(client, sql).await?;
        let mut affected = 0;
        for params in param_sets {
            affected += Self::execute_prepared(client, &statement, params).await?;
        }
        tracing::debug!(affected, "execute_many completed");
        Ok(affected)
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql_preview(sql)))]
    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(Self::closed_error)?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| query_error("Failed to execute batch", e))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("closing PostgreSQL connection");
        self.client.lock().await.take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        Some(self)
    }
}
