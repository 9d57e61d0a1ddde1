//! Connection factory backed by a database driver

use std::sync::Arc;

use async_trait::async_trait;
use pgdata_core::{Connection, ConnectionConfig, DatabaseDriver, Result};

use crate::pool::ConnectionFactory;

/// Opens connections to one server with one driver
pub struct DriverFactory {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
}

impl DriverFactory {
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        Self { driver, config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for DriverFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        tracing::debug!(
            driver = self.driver.id(),
            url = %self.config.redacted_url(),
            "opening connection"
        );
        self.driver.connect(&self.config).await
    }
}
