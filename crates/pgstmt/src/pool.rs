//! Connection pool utilities

use crate::config::SessionConfig;
use crate::error::{StmtError, StmtResult};
use crate::session::Session;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

/// Pool of plain (non-TLS) connections with the default size of 16.
///
/// ```ignore
/// let session = pgstmt::Session::new(pgstmt::create_pool("postgres://app@localhost/app")?);
/// ```
pub fn create_pool(database_url: &str) -> StmtResult<Pool> {
    create_pool_with_config(database_url, SessionConfig::default().max_pool_size)
}

/// Pool of plain (non-TLS) connections holding at most `max_size` connections.
///
/// Connections are opened lazily on first checkout and recycled with the fast check.
/// A malformed URL is a [`StmtError::Connection`].
pub fn create_pool_with_config(database_url: &str, max_size: usize) -> StmtResult<Pool> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| StmtError::Connection(e.to_string()))?;
    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| StmtError::Pool(e.to_string()))
}

/// Build a pooled [`Session`] from configuration.
///
/// Requires `database_url`; the pool is sized by `max_pool_size` and the session applies
/// `timeout` to every statement.
///
/// ```ignore
/// let session = pgstmt::open(&pgstmt::SessionConfig::from_env()?)?;
/// ```
pub fn open(config: &SessionConfig) -> StmtResult<Session<Pool>> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| StmtError::Config("database_url is not set".to_string()))?;
    let pool = create_pool_with_config(url, config.max_pool_size)?;
    Ok(Session::from_config(pool, config))
}
