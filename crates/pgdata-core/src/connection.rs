//! Connection trait

use crate::{QueryResult, Result, SchemaIntrospection, StatementResult, Value};
use async_trait::async_trait;

/// A database connection.
///
/// Every call is a single auto-committed statement; there is no
/// transaction API.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data or schema
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute the same statement once per parameter set.
    ///
    /// Returns the total number of affected rows. Drivers may override this
    /// to prepare the statement once.
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        let mut affected = 0;
        for params in param_sets {
            affected += self.execute(sql, params).await?.affected_rows;
        }
        tracing::debug!(statements = param_sets.len(), affected, "execute_many completed");
        Ok(affected)
    }

    /// Execute one or more `;`-separated statements without parameters
    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.execute(sql, &[]).await.map(|_| ())
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Get schema introspection interface if supported
    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        None
    }
}
