//! Transaction lifecycle: begin options, commit, rollback, and deferred cleanup.
//!
//! A [`Transaction`] wraps exactly one driver transaction handle together with the
//! session's dialect, event receiver and statement timeout. It is `open` until a commit or
//! rollback succeeds, after which it is `committed` or `rolled back` for good.
//!
//! For ergonomic commit/rollback handling, use the [`transaction!`] macro.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = session.begin().await?;
//!
//! let mut ids: Vec<(i64,)> = Vec::new();
//! tx.with_by_sql("SELECT id FROM users WHERE active", [])
//!     .load(&mut ids)
//!     .await?;
//!
//! tx.commit().await?;
//! // Safe to call unconditionally: a committed transaction makes this a silent no-op.
//! tx.rollback_unless_committed().await;
//! ```

use crate::buffer::Param;
use crate::context::Context;
use crate::dialect::Dialect;
use crate::error::StmtResult;
use crate::event::{EventReceiver, names};
use crate::rows::Rows;
use crate::runner::{Runner, TxHandle, run_query};
use crate::with::WithStmt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;

/// Runs the given block inside a transaction begun on `$session`.
///
/// - Begins a transaction via `$session.begin().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)` (and after a failed commit).
///
/// The block must evaluate to `pgstmt::StmtResult<T>`.
///
/// ```ignore
/// let n = pgstmt::transaction!(session, tx, {
///     let mut rows: Vec<(i64,)> = Vec::new();
///     tx.with_by_sql("SELECT 1", []).load(&mut rows).await
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($session:expr, $tx:ident, $body:block) => {{
        let mut $tx = ($session).begin().await?;

        let __pgstmt_tx_body_result = async { $body }.await;
        match __pgstmt_tx_body_result {
            Ok(value) => match $tx.commit().await {
                Ok(()) => Ok(value),
                Err(error) => {
                    $tx.rollback_unless_committed().await;
                    Err(error)
                }
            },
            Err(error) => {
                $tx.rollback_unless_committed().await;
                Err(error)
            }
        }
    }};
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Options for starting a transaction. Unset fields use the server default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub access_mode: Option<AccessMode>,
    pub deferrable: Option<bool>,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access_mode = Some(AccessMode::ReadOnly);
        self
    }

    pub fn read_write(mut self) -> Self {
        self.access_mode = Some(AccessMode::ReadWrite);
        self
    }

    /// Only meaningful for `SERIALIZABLE READ ONLY` transactions.
    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = Some(deferrable);
        self
    }

    /// The `BEGIN` statement for these options.
    pub fn begin_sql(&self) -> String {
        let mut sql = String::from("BEGIN");
        if let Some(level) = self.isolation {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level.as_sql());
        }
        match self.access_mode {
            Some(AccessMode::ReadOnly) => sql.push_str(" READ ONLY"),
            Some(AccessMode::ReadWrite) => sql.push_str(" READ WRITE"),
            None => {}
        }
        match self.deferrable {
            Some(true) => sql.push_str(" DEFERRABLE"),
            Some(false) => sql.push_str(" NOT DEFERRABLE"),
            None => {}
        }
        sql
    }
}

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// What a deferred-cleanup rollback ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cleanup {
    /// Already committed or rolled back. Nothing to do, nothing reported.
    AlreadyDone,
    RolledBack,
    /// The rollback failed; the failure went to the event receiver.
    Failed,
}

/// An open transaction.
///
/// Not meant for concurrent use from two call sites; commit and rollback take `&mut self`.
pub struct Transaction<T> {
    handle: T,
    dialect: Arc<dyn Dialect>,
    events: Arc<dyn EventReceiver>,
    timeout: Option<Duration>,
    state: TxState,
}

impl<T: TxHandle> Transaction<T> {
    pub(crate) fn new(
        handle: T,
        dialect: Arc<dyn Dialect>,
        events: Arc<dyn EventReceiver>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            handle,
            dialect,
            events,
            timeout,
            state: TxState::Open,
        }
    }

    /// Per-statement timeout inherited from the session.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn events(&self) -> &Arc<dyn EventReceiver> {
        &self.events
    }

    /// Commit under a background context.
    pub async fn commit(&mut self) -> StmtResult<()> {
        self.commit_context(&Context::background()).await
    }

    /// Commit the transaction.
    ///
    /// Failures are reported as `pgstmt.commit.error` and returned.
    pub async fn commit_context(&mut self, ctx: &Context) -> StmtResult<()> {
        match ctx.run(self.handle.commit()).await {
            Ok(()) => {
                self.state = TxState::Committed;
                self.events.event(names::COMMIT);
                Ok(())
            }
            Err(e) => Err(self.events.event_err(names::COMMIT_ERROR, e)),
        }
    }

    /// Roll back under a background context.
    pub async fn rollback(&mut self) -> StmtResult<()> {
        self.rollback_context(&Context::background()).await
    }

    /// Roll the transaction back.
    ///
    /// Failures, including rolling back an already finished transaction, are reported as
    /// `pgstmt.rollback.error` and returned.
    pub async fn rollback_context(&mut self, ctx: &Context) -> StmtResult<()> {
        match ctx.run(self.handle.rollback()).await {
            Ok(()) => {
                self.state = TxState::RolledBack;
                self.events.event(names::ROLLBACK);
                Ok(())
            }
            Err(e) => Err(self.events.event_err(names::ROLLBACK_ERROR, e)),
        }
    }

    /// Deferred cleanup under a background context.
    pub async fn rollback_unless_committed(&mut self) {
        self.rollback_unless_committed_context(&Context::background())
            .await;
    }

    /// Roll back unless the transaction already finished.
    ///
    /// Meant to run unconditionally at the end of a unit of work. Never fails: an already
    /// finished transaction is a silent no-op, a successful rollback reports
    /// `pgstmt.rollback`, and any other failure is only reported as
    /// `pgstmt.rollback_unless_committed`.
    pub async fn rollback_unless_committed_context(&mut self, ctx: &Context) {
        // The no-op and failed outcomes are deliberately indistinguishable to the caller.
        let _ = self.cleanup(ctx).await;
    }

    pub(crate) async fn cleanup(&mut self, ctx: &Context) -> Cleanup {
        if self.state != TxState::Open {
            return Cleanup::AlreadyDone;
        }
        match ctx.run(self.handle.rollback()).await {
            Ok(()) => {
                self.state = TxState::RolledBack;
                self.events.event(names::ROLLBACK);
                Cleanup::RolledBack
            }
            Err(e) if e.is_tx_done() => Cleanup::AlreadyDone,
            Err(e) => {
                let _ = self.events.event_err(names::ROLLBACK_UNLESS_COMMITTED, e);
                Cleanup::Failed
            }
        }
    }

    /// Start a CTE statement that runs inside this transaction.
    pub fn with(&self) -> WithStmt<'_, Self> {
        WithStmt::attached(self, Arc::clone(&self.dialect), Arc::clone(&self.events))
    }

    /// A statement made of hand-written SQL that runs inside this transaction.
    pub fn with_by_sql(
        &self,
        query: impl Into<String>,
        values: impl IntoIterator<Item = Param>,
    ) -> WithStmt<'_, Self> {
        self.with().raw(query, values)
    }
}

impl<T: TxHandle> Runner for Transaction<T> {
    type Row = T::Row;

    async fn query_rows(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StmtResult<Rows<T::Row>> {
        run_query(ctx, &self.handle, sql, params).await
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<T> fmt::Debug for Transaction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("dialect", &self.dialect)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_begin_plainly() {
        assert_eq!(TxOptions::new().begin_sql(), "BEGIN");
    }

    #[test]
    fn options_render_in_postgres_order() {
        let opts = TxOptions::new()
            .isolation(IsolationLevel::Serializable)
            .read_only()
            .deferrable(true);
        assert_eq!(
            opts.begin_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY DEFERRABLE"
        );

        let opts = TxOptions::new()
            .isolation(IsolationLevel::ReadCommitted)
            .read_write()
            .deferrable(false);
        assert_eq!(
            opts.begin_sql(),
            "BEGIN ISOLATION LEVEL READ COMMITTED READ WRITE NOT DEFERRABLE"
        );
    }

    /// Finishes once; optionally refuses to roll back.
    struct FakeTx {
        done: bool,
        fail_rollback: bool,
    }

    impl crate::runner::Queryer for FakeTx {
        type Row = ();

        async fn query_rows(
            &self,
            _sql: &str,
            _params: &[&(dyn ToSql + Sync)],
        ) -> StmtResult<Rows<()>> {
            Err(crate::error::StmtError::Other("no queries here".to_string()))
        }
    }

    impl TxHandle for FakeTx {
        async fn commit(&mut self) -> StmtResult<()> {
            self.finish(false)
        }

        async fn rollback(&mut self) -> StmtResult<()> {
            self.finish(self.fail_rollback)
        }
    }

    impl FakeTx {
        fn finish(&mut self, fail: bool) -> StmtResult<()> {
            if self.done {
                return Err(crate::error::StmtError::TxDone);
            }
            self.done = true;
            if fail {
                return Err(crate::error::StmtError::Other("connection reset".to_string()));
            }
            Ok(())
        }
    }

    fn open_tx(fail_rollback: bool) -> (Transaction<FakeTx>, Arc<crate::RecordingEventReceiver>) {
        let events = Arc::new(crate::RecordingEventReceiver::new());
        let tx = Transaction::new(
            FakeTx {
                done: false,
                fail_rollback,
            },
            Arc::new(crate::PostgreSql),
            events.clone(),
            None,
        );
        (tx, events)
    }

    #[tokio::test]
    async fn cleanup_rolls_back_an_open_transaction_once() {
        let (mut tx, events) = open_tx(false);
        let ctx = Context::background();

        assert_eq!(tx.cleanup(&ctx).await, Cleanup::RolledBack);
        assert_eq!(tx.cleanup(&ctx).await, Cleanup::AlreadyDone);
        assert_eq!(events.event_names(), [names::ROLLBACK]);
    }

    #[tokio::test]
    async fn cleanup_after_commit_is_already_done() {
        let (mut tx, events) = open_tx(false);
        tx.commit().await.unwrap();

        assert_eq!(tx.cleanup(&Context::background()).await, Cleanup::AlreadyDone);
        assert!(events.errors().is_empty());
    }

    #[tokio::test]
    async fn failed_cleanup_is_reported_not_returned() {
        let (mut tx, events) = open_tx(true);

        assert_eq!(tx.cleanup(&Context::background()).await, Cleanup::Failed);
        assert_eq!(tx.state(), TxState::Open);
        assert_eq!(events.errors()[0].0, names::ROLLBACK_UNLESS_COMMITTED);
    }
}
