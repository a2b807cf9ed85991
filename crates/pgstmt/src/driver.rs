//! `tokio-postgres` drivers.
//!
//! - `Arc<tokio_postgres::Client>`: one shared connection. Transactions run on that same
//!   connection, so do not issue unrelated statements through other clones of the `Arc`
//!   while a transaction is open.
//! - `deadpool_postgres::Pool` (feature `pool`): every cursor and every transaction checks
//!   out its own connection and holds it until the cursor is closed or the transaction
//!   finishes.
//!
//! Both hand out [`PgTx`] as their transaction handle.
//!
//! Every cursor carries the `CancelToken` of the connection it runs on, so a context that
//! expires while rows are fetched also stops the statement on the server. A pooled
//! connection is only known once checked out, so the pool arms a `CancelOnDrop` guard
//! around each exchange instead.

use crate::error::{StmtError, StmtResult};
use crate::rows::Rows;
use crate::runner::{Driver, QueryCanceller, Queryer, TxHandle};
use crate::transaction::TxOptions;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};

/// A connection that owns (or shares) a `tokio_postgres::Client`.
pub trait PgClientHandle: Send + Sync + 'static {
    fn client(&self) -> &Client;
}

impl PgClientHandle for Arc<Client> {
    fn client(&self) -> &Client {
        self
    }
}

#[cfg(feature = "pool")]
impl PgClientHandle for deadpool_postgres::Object {
    fn client(&self) -> &Client {
        self
    }
}

/// Prepare `sql` (so column names are known up front) and start streaming its rows.
async fn start_query(
    client: &Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> StmtResult<(Vec<String>, tokio_postgres::RowStream)> {
    let stmt = client.prepare(sql).await.map_err(StmtError::from_db_error)?;
    let columns = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let stream = client
        .query_raw(&stmt, params.iter().copied())
        .await
        .map_err(StmtError::from_db_error)?;
    Ok((columns, stream))
}

/// Open a cursor that keeps `conn` checked out until the cursor goes away.
async fn open_cursor<C: PgClientHandle>(
    conn: C,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> StmtResult<Rows<Row>> {
    let (columns, stream) = start_query(conn.client(), sql, params).await?;
    let token = conn.client().cancel_token();
    let stream = stream.map(move |row| {
        let _conn = &conn;
        row.map_err(StmtError::from_db_error)
    });
    Ok(Rows::new(columns, stream).with_canceller(Arc::new(token)))
}

/// Fires its canceller when dropped while still armed, i.e. when the future holding it
/// is abandoned in the middle of an exchange.
#[cfg_attr(not(feature = "pool"), allow(dead_code))]
pub(crate) struct CancelOnDrop(Option<Arc<dyn QueryCanceller>>);

#[cfg_attr(not(feature = "pool"), allow(dead_code))]
impl CancelOnDrop {
    pub(crate) fn arm(canceller: Arc<dyn QueryCanceller>) -> Self {
        Self(Some(canceller))
    }

    /// The exchange finished (either way); nothing to cancel.
    pub(crate) fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(canceller) = self.0.take() {
            canceller.cancel();
        }
    }
}

impl Queryer for Arc<Client> {
    type Row = Row;

    async fn query_rows(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StmtResult<Rows<Row>> {
        open_cursor(Arc::clone(self), sql, params).await
    }

    fn canceller(&self) -> Option<Arc<dyn QueryCanceller>> {
        Some(Arc::new(self.cancel_token()))
    }
}

impl Driver for Arc<Client> {
    type Tx = PgTx<Arc<Client>>;

    async fn begin(&self, opts: &TxOptions) -> StmtResult<PgTx<Arc<Client>>> {
        PgTx::begin(Arc::clone(self), opts).await
    }
}

#[cfg(feature = "pool")]
impl Queryer for deadpool_postgres::Pool {
    type Row = Row;

    async fn query_rows(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StmtResult<Rows<Row>> {
        let conn = self.get().await?;
        let guard = CancelOnDrop::arm(Arc::new(conn.cancel_token()));
        let result = open_cursor(conn, sql, params).await;
        guard.disarm();
        result
    }
}

#[cfg(feature = "pool")]
impl Driver for deadpool_postgres::Pool {
    type Tx = PgTx<deadpool_postgres::Object>;

    async fn begin(&self, opts: &TxOptions) -> StmtResult<PgTx<deadpool_postgres::Object>> {
        let conn = self.get().await?;
        let guard = CancelOnDrop::arm(Arc::new(conn.cancel_token()));
        let result = PgTx::begin(conn, opts).await;
        guard.disarm();
        result
    }
}

/// A transaction running on one Postgres connection.
///
/// Dropping a handle that never committed or rolled back schedules a `ROLLBACK` on the
/// current tokio runtime.
pub struct PgTx<C: PgClientHandle> {
    conn: Option<C>,
}

impl<C: PgClientHandle> PgTx<C> {
    async fn begin(conn: C, opts: &TxOptions) -> StmtResult<Self> {
        conn.client()
            .batch_execute(&opts.begin_sql())
            .await
            .map_err(StmtError::from_db_error)?;
        Ok(Self { conn: Some(conn) })
    }

    pub fn is_finished(&self) -> bool {
        self.conn.is_none()
    }

    /// Run `COMMIT`/`ROLLBACK` and release the connection.
    ///
    /// The connection is only released once the statement returns, so an interrupted
    /// attempt still leaves the handle able to roll back.
    async fn finish(&mut self, sql: &str) -> StmtResult<()> {
        let conn = self.conn.as_ref().ok_or(StmtError::TxDone)?;
        let result = conn.client().batch_execute(sql).await;
        self.conn = None;
        result.map_err(StmtError::from_db_error)
    }
}

impl<C: PgClientHandle> Queryer for PgTx<C> {
    type Row = Row;

    async fn query_rows(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StmtResult<Rows<Row>> {
        let conn = self.conn.as_ref().ok_or(StmtError::TxDone)?;
        let (columns, stream) = start_query(conn.client(), sql, params).await?;
        let token = conn.client().cancel_token();
        Ok(Rows::new(
            columns,
            stream.map(|row| row.map_err(StmtError::from_db_error)),
        )
        .with_canceller(Arc::new(token)))
    }

    fn canceller(&self) -> Option<Arc<dyn QueryCanceller>> {
        let token = self.conn.as_ref()?.client().cancel_token();
        Some(Arc::new(token))
    }
}

impl<C: PgClientHandle> TxHandle for PgTx<C> {
    async fn commit(&mut self) -> StmtResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> StmtResult<()> {
        self.finish("ROLLBACK").await
    }
}

impl<C: PgClientHandle> Drop for PgTx<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        #[cfg(feature = "tracing")]
        tracing::warn!("transaction dropped without commit or rollback; rolling back");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(_e) = conn.client().batch_execute("ROLLBACK").await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_e, "background rollback failed");
                }
            });
        }
    }
}
