//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use pgdata_core::{Connection, PgDataError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Idle connection with lifecycle timestamps
struct IdleConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
}

/// A bounded pool of database connections
///
/// Connections are returned to the pool when the `PooledConnection`
/// wrapper is dropped.
pub struct ConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<VecDeque<IdleConnection>>,
    /// Limits the number of connections in existence
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
}

impl ConnectionPool {
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        Self::with_shared_factory(config, Arc::new(factory))
    }

    pub fn with_shared_factory(config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            config,
            factory,
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
        }
    }

    /// Get a connection from the pool
    ///
    /// Reuses an idle connection when one passes validation, creates a new
    /// one while under `max_size`, and otherwise waits for a connection to
    /// be returned. Fails with `Timeout` once the acquire timeout elapses.
    pub async fn get(&self) -> Result<PooledConnection<'_>> {
        self.waiting_count.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(self.config.acquire_timeout(), async {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PgDataError::Connection("Pool semaphore closed".into()))?;

            let (connection, created_at) = match self.try_get_idle().await {
                Some(idle) => idle,
                None => (self.factory.create().await?, Instant::now()),
            };

            Ok::<_, PgDataError>((connection, created_at, permit))
        })
        .await;

        self.waiting_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(Ok((connection, created_at, permit))) => {
                self.active_count.fetch_add(1, Ordering::SeqCst);
                Ok(PooledConnection {
                    connection,
                    created_at,
                    pool: self,
                    _permit: permit,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PgDataError::Timeout(format!(
                "Timed out waiting for connection (timeout: {:?})",
                self.config.acquire_timeout()
            ))),
        }
    }

    /// Pop idle connections until one is within its lifetime and valid
    async fn try_get_idle(&self) -> Option<(Arc<dyn Connection>, Instant)> {
        loop {
            let inner = { self.idle.lock().pop_front() }?;

            let expired = self
                .config
                .max_lifetime()
                .is_some_and(|max| inner.created_at.elapsed() > max);
            let stale = inner.last_used_at.elapsed() > self.config.idle_timeout();

            if expired || stale || !self.factory.validate(&*inner.connection).await {
                tracing::debug!(expired, stale, "discarding pooled connection");
                let _ = inner.connection.close().await;
                continue;
            }

            return Some((inner.connection, inner.created_at));
        }
    }

    fn return_connection(&self, connection: Arc<dyn Connection>, created_at: Instant) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if connection.is_closed() {
            return;
        }

        self.idle.lock().push_back(IdleConnection {
            connection,
            created_at,
            last_used_at: Instant::now(),
        });
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let active = self.active_count.load(Ordering::SeqCst);
        let waiting = self.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(idle + active, idle, active, waiting)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Close all idle connections in the pool
    pub async fn close_idle(&self) {
        let connections: Vec<_> = { self.idle.lock().drain(..).collect() };

        for inner in connections {
            let _ = inner.connection.close().await;
        }
    }
}

/// A connection borrowed from the pool
///
/// When dropped, the connection is returned to the pool.
pub struct PooledConnection<'a> {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    pool: &'a ConnectionPool,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection<'_> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        self.pool
            .return_connection(Arc::clone(&self.connection), self.created_at);
    }
}

impl PooledConnection<'_> {
    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}
