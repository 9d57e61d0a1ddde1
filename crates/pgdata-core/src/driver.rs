//! Database driver trait definition

use crate::{Connection, ConnectionConfig, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Core driver trait that opens connections from a [`ConnectionConfig`]
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "postgresql")
    fn id(&self) -> &'static str {
        self.name()
    }

    /// Human-readable name (e.g., "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;
}
