//! The execution boundary.
//!
//! Three driver-facing traits describe what the core needs from a database connection:
//!
//! - [`Queryer`]: open a row cursor for SQL text plus bind values,
//! - [`Driver`]: a `Queryer` that can begin a transaction,
//! - [`TxHandle`]: a `Queryer` bound to one open transaction that can commit or roll back.
//!
//! On top of those sits [`Runner`], the single capability statements execute against. Both
//! [`crate::Session`] and [`crate::Transaction`] implement it, so a statement never needs to
//! know which one it was created from.

use crate::context::Context;
use crate::error::StmtResult;
use crate::rows::Rows;
use crate::transaction::TxOptions;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;

/// Something that can run a query and return an open cursor.
pub trait Queryer: Send + Sync {
    /// The driver's row type.
    type Row: Send + 'static;

    /// Run `sql` with positional `params` and return the open cursor.
    fn query_rows(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = StmtResult<Rows<Self::Row>>> + Send;

    /// Cancellation hook for the connection this queryer always runs on, if any.
    ///
    /// Fired when a context expires while a cursor is being opened. Queryers that check
    /// out a connection per call (pools) return `None` and arm their own hook around the
    /// checked-out connection instead.
    fn canceller(&self) -> Option<Arc<dyn QueryCanceller>> {
        None
    }
}

/// Asks the server to abandon whatever one connection is currently running.
///
/// Fire-and-forget: `cancel` must not block, and failures are ignored.
pub trait QueryCanceller: Send + Sync {
    fn cancel(&self);
}

impl QueryCanceller for tokio_postgres::CancelToken {
    fn cancel(&self) {
        let token = self.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = token.cancel_query(tokio_postgres::NoTls).await;
            });
        }
    }
}

/// A connection source that can start transactions.
pub trait Driver: Queryer {
    /// The handle of one open transaction.
    type Tx: TxHandle<Row = Self::Row>;

    /// Start a new transaction.
    fn begin(&self, opts: &TxOptions) -> impl Future<Output = StmtResult<Self::Tx>> + Send;
}

/// One open transaction on the driver side.
///
/// Once `commit` or `rollback` has been attempted the handle is finished and every further
/// call fails with [`crate::StmtError::TxDone`].
pub trait TxHandle: Queryer {
    fn commit(&mut self) -> impl Future<Output = StmtResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = StmtResult<()>> + Send;
}

/// Anything a statement can execute against.
pub trait Runner: Send + Sync {
    type Row: Send + 'static;

    /// Run `sql` under `ctx` and return the open cursor.
    ///
    /// The cursor keeps honouring `ctx` while rows are fetched.
    fn query_rows(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = StmtResult<Rows<Self::Row>>> + Send;

    /// Per-statement timeout layered onto the caller's context before every execution.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Runner slot of a statement that is not wired to any session or transaction.
///
/// `Detached` deliberately does not implement [`Runner`]: a detached statement can be
/// rendered but has no execution methods until it is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

pub(crate) async fn run_query<Q: Queryer>(
    ctx: &Context,
    queryer: &Q,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> StmtResult<Rows<Q::Row>> {
    match ctx.run(queryer.query_rows(sql, params)).await {
        Ok(rows) => Ok(rows.with_context(ctx.clone())),
        Err(e) => {
            if e.is_cancellation() {
                if let Some(canceller) = queryer.canceller() {
                    canceller.cancel();
                }
            }
            Err(e)
        }
    }
}
