//! Connection pooling for database connections
//!
//! A bounded pool: at most `max_size` connections exist at once, idle
//! connections are reused, and callers wait (up to the acquire timeout)
//! when every connection is leased.
//!
//! # Example
//!
//! ```ignore
//! use pgdata_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(4)?.with_acquire_timeout_ms(5000);
//! let pool = ConnectionPool::new(config, factory);
//! let conn = pool.get().await?;
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
pub use stats::PoolStats;
