//! Sessions: the non-transactional entry point.

use crate::buffer::Param;
use crate::config::SessionConfig;
use crate::context::Context;
use crate::dialect::{Dialect, PostgreSql};
use crate::error::StmtResult;
use crate::event::{EventReceiver, NullEventReceiver, names};
use crate::rows::Rows;
use crate::runner::{Driver, Queryer, Runner, run_query};
use crate::transaction::{Transaction, TxOptions};
use crate::with::WithStmt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;

/// A driver plus the dialect, event receiver and statement timeout every statement and
/// transaction created from it inherits.
///
/// # Example
///
/// ```ignore
/// use pgstmt::{Session, TracingEventReceiver};
/// use std::{sync::Arc, time::Duration};
///
/// let session = Session::new(pool)
///     .events(Arc::new(TracingEventReceiver::new()))
///     .statement_timeout(Duration::from_secs(5));
/// ```
pub struct Session<D> {
    driver: D,
    dialect: Arc<dyn Dialect>,
    events: Arc<dyn EventReceiver>,
    timeout: Option<Duration>,
}

impl<D: Queryer> Session<D> {
    /// A session using the Postgres dialect, no event receiver and no timeout.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            dialect: Arc::new(PostgreSql),
            events: Arc::new(NullEventReceiver),
            timeout: None,
        }
    }

    /// A session configured from `config` (only the timeout applies here; pooling is the
    /// driver's business).
    pub fn from_config(driver: D, config: &SessionConfig) -> Self {
        let mut session = Self::new(driver);
        session.timeout = config.timeout;
        session
    }

    /// Replace the dialect.
    pub fn dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Arc::new(dialect);
        self
    }

    /// Replace the event receiver.
    pub fn events(mut self, events: Arc<dyn EventReceiver>) -> Self {
        self.events = events;
        self
    }

    /// Set the per-statement timeout.
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn event_receiver(&self) -> &Arc<dyn EventReceiver> {
        &self.events
    }

    /// Start a CTE statement bound to this session.
    pub fn with(&self) -> WithStmt<'_, Self> {
        WithStmt::attached(self, Arc::clone(&self.dialect), Arc::clone(&self.events))
    }

    /// A statement made of hand-written SQL bound to this session.
    pub fn with_by_sql(
        &self,
        query: impl Into<String>,
        values: impl IntoIterator<Item = Param>,
    ) -> WithStmt<'_, Self> {
        self.with().raw(query, values)
    }
}

impl<D: Driver> Session<D> {
    /// Begin a transaction with default options under a background context.
    pub async fn begin(&self) -> StmtResult<Transaction<D::Tx>> {
        self.begin_tx(&Context::background(), &TxOptions::default())
            .await
    }

    /// Begin a transaction.
    ///
    /// Failures are reported as `pgstmt.begin.error` and returned; success reports
    /// `pgstmt.begin`. The transaction inherits this session's dialect, event receiver and
    /// timeout.
    pub async fn begin_tx(&self, ctx: &Context, opts: &TxOptions) -> StmtResult<Transaction<D::Tx>> {
        match ctx.run(self.driver.begin(opts)).await {
            Ok(handle) => {
                self.events.event(names::BEGIN);
                Ok(Transaction::new(
                    handle,
                    Arc::clone(&self.dialect),
                    Arc::clone(&self.events),
                    self.timeout,
                ))
            }
            Err(e) => Err(self.events.event_err(names::BEGIN_ERROR, e)),
        }
    }
}

impl<D: Queryer> Runner for Session<D> {
    type Row = D::Row;

    async fn query_rows(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StmtResult<Rows<D::Row>> {
        run_query(ctx, &self.driver, sql, params).await
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<D> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.dialect)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
