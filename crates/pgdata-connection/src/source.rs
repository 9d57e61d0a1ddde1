//! Pooled or per-lease connection sources

use std::ops::Deref;
use std::sync::Arc;

use pgdata_core::{Connection, Result};

use crate::pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection};

/// How a [`ConnectionSource`] obtains connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Share a bounded pool within the process
    Pooled(PoolConfig),
    /// Open a new connection for every lease and close it afterwards
    NoPool,
}

impl Default for ConnectionMode {
    fn default() -> Self {
        ConnectionMode::Pooled(PoolConfig::default())
    }
}

enum SourceKind {
    Pooled(ConnectionPool),
    Direct(Arc<dyn ConnectionFactory>),
}

/// Hands out connection leases according to a [`ConnectionMode`]
pub struct ConnectionSource {
    kind: SourceKind,
}

impl ConnectionSource {
    pub fn new<F: ConnectionFactory>(mode: ConnectionMode, factory: F) -> Self {
        let factory: Arc<dyn ConnectionFactory> = Arc::new(factory);
        let kind = match mode {
            ConnectionMode::Pooled(config) => {
                SourceKind::Pooled(ConnectionPool::with_shared_factory(config, factory))
            }
            ConnectionMode::NoPool => SourceKind::Direct(factory),
        };
        Self { kind }
    }

    /// Lease a connection for the duration of one operation
    pub async fn acquire(&self) -> Result<ConnectionLease<'_>> {
        match &self.kind {
            SourceKind::Pooled(pool) => Ok(ConnectionLease::Pooled(pool.get().await?)),
            SourceKind::Direct(factory) => {
                let conn = factory.create().await?;
                Ok(ConnectionLease::Direct(DirectConnection { conn }))
            }
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.kind, SourceKind::Pooled(_))
    }

    /// Pool statistics; `None` in no-pool mode
    pub fn stats(&self) -> Option<PoolStats> {
        match &self.kind {
            SourceKind::Pooled(pool) => Some(pool.stats()),
            SourceKind::Direct(_) => None,
        }
    }

    /// Close idle pooled connections
    pub async fn close(&self) {
        if let SourceKind::Pooled(pool) = &self.kind {
            pool.close_idle().await;
        }
    }
}

/// A connection opened for a single lease
pub struct DirectConnection {
    conn: Arc<dyn Connection>,
}

impl Drop for DirectConnection {
    fn drop(&mut self) {
        let conn = Arc::clone(&self.conn);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        tracing::warn!(error = %e, "failed to close connection");
                    }
                });
            }
            // outside a runtime the connection closes when its last handle drops
            Err(_) => drop(conn),
        }
    }
}

/// A leased connection; derefs to [`Connection`]
pub enum ConnectionLease<'a> {
    Pooled(PooledConnection<'a>),
    Direct(DirectConnection),
}

impl Deref for ConnectionLease<'_> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match self {
            ConnectionLease::Pooled(conn) => &**conn,
            ConnectionLease::Direct(direct) => direct.conn.as_ref(),
        }
    }
}
