//! Pool configuration types

use std::time::Duration;

use pgdata_core::{PgDataError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of connections allowed in the pool
    max_size: usize,
    /// Timeout in milliseconds when acquiring a connection from the pool
    acquire_timeout_ms: u64,
    /// Timeout in milliseconds before an idle connection is closed
    idle_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds before it's recycled
    max_lifetime_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a pool configuration holding at most `max_size` connections
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(PgDataError::Configuration(
                "pool max_size must be greater than 0".into(),
            ));
        }

        Ok(Self {
            max_size,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: None,
        })
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum connection lifetime in milliseconds
    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    /// 5 connections, 30 second acquire timeout, 10 minute idle timeout
    fn default() -> Self {
        Self {
            max_size: 5,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: None,
        }
    }
}
