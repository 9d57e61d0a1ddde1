//! pgdata connection - where database connections come from
//!
//! A [`ConnectionSource`] hands out leases in one of two modes:
//!
//! - `Pooled`: a bounded pool shared by every task in the process
//! - `NoPool`: a fresh connection per lease, closed when the lease ends,
//!   so independent workers never share a handle

mod factory;
pub mod pool;
mod source;

pub use factory::DriverFactory;
pub use pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use source::{ConnectionLease, ConnectionMode, ConnectionSource};
