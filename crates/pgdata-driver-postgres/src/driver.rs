//! PostgreSQL driver implementation

use async_trait::async_trait;
use pgdata_core::{Connection, ConnectionConfig, DatabaseDriver, PgDataError, Result};
use std::sync::Arc;

use crate::PostgresConnection;

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create a new PostgreSQL driver instance
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn id(&self) -> &'static str {
        "postgresql"
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    #[tracing::instrument(skip(self, config), fields(host = %config.host, database = %config.database))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let conn = PostgresConnection::connect(config).await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to PostgreSQL database");
            match e {
                PgDataError::Connection(_) => e,
                other => PgDataError::Connection(other.to_string()),
            }
        })?;
        Ok(Arc::new(conn))
    }
}
