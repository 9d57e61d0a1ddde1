//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total number of connections (idle + active)
    total: usize,
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of connections currently leased
    active: usize,
    /// Number of requests waiting for a connection
    waiting: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Fraction of connections in use (0.0 to 1.0); 0.0 for an empty pool
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} connections ({} active, {} idle, {} waiting)",
            self.total, self.active, self.idle, self.waiting
        )
    }
}
