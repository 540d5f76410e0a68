use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{self, DEFAULT_DATASTORE};

/// Errors from the datastore provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown datastore: {0}")]
    UnknownDatastore(String),

    #[error("connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Centralized connection pool manager for the configured datastores.
///
/// Pools are created lazily per datastore name and cached for the process
/// lifetime; each `acquire` call hands out exactly one session.
pub struct DatastoreProvider {
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl DatastoreProvider {
    fn instance() -> &'static DatastoreProvider {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<DatastoreProvider> = OnceLock::new();
        INSTANCE.get_or_init(|| DatastoreProvider {
            pools: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Acquire a session against a named datastore.
    ///
    /// `named` marks the session as accepting `:name` placeholders in SQL.
    /// With `autocommit` the session is a plain pooled connection; without
    /// it the session opens a transaction that rolls back on drop unless
    /// committed.
    pub async fn acquire(
        datastore: &str,
        named: bool,
        autocommit: bool,
    ) -> Result<Session, ProviderError> {
        let pool = Self::instance().get_pool(datastore).await?;
        let inner = if autocommit {
            let conn = pool.acquire().await.map_err(ProviderError::Connection)?;
            SessionInner::Autocommit(conn)
        } else {
            let tx = pool.begin().await.map_err(ProviderError::Connection)?;
            SessionInner::Transaction(tx)
        };
        Ok(Session { inner, named })
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, datastore: &str) -> Result<PgPool, ProviderError> {
        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(datastore) {
                return Ok(pool.clone());
            }
        }

        let config = config::config();
        let url = config
            .datastores
            .get(datastore)
            .ok_or_else(|| ProviderError::UnknownDatastore(datastore.to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.connection_timeout_secs))
            .connect(url)
            .await
            .map_err(ProviderError::Connection)?;

        {
            let mut pools = self.pools.write().await;
            pools.insert(datastore.to_string(), pool.clone());
        }

        info!("Created connection pool for datastore: {}", datastore);
        Ok(pool)
    }

    /// Pings the default datastore to ensure connectivity
    pub async fn health_check() -> Result<(), ProviderError> {
        let pool = Self::instance().get_pool(DEFAULT_DATASTORE).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all() {
        let provider = Self::instance();
        let mut pools = provider.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!("Closed connection pool: {}", name);
        }
    }
}

/// A live datastore session owned by one handler invocation.
///
/// Transactional sessions roll back when dropped; `commit` consumes the
/// session, so nothing can touch the connection after the transaction ends.
pub struct Session {
    inner: SessionInner,
    named: bool,
}

enum SessionInner {
    Autocommit(PoolConnection<Postgres>),
    Transaction(Transaction<'static, Postgres>),
}

impl Session {
    /// Whether SQL run on this session may use `:name` placeholders.
    pub fn named(&self) -> bool {
        self.named
    }

    pub(crate) fn connection(&mut self) -> &mut PgConnection {
        match &mut self.inner {
            SessionInner::Autocommit(conn) => &mut **conn,
            SessionInner::Transaction(tx) => &mut **tx,
        }
    }

    /// Commit the transaction, if any. A no-op for autocommit sessions.
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self.inner {
            SessionInner::Autocommit(_) => Ok(()),
            SessionInner::Transaction(tx) => tx.commit().await,
        }
    }
}
