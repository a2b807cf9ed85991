//! # pgstmt
//!
//! SQL statement composition and execution for Postgres.
//!
//! ## Features
//!
//! - **Composable statements**: anything implementing [`Builder`] renders into a shared
//!   [`Buffer`], so fragments nest freely and placeholder numbering stays correct
//! - **CTEs**: [`WithStmt`] builds `WITH [RECURSIVE]` statements from named sub-statements
//! - **One execution capability**: statements run against a [`Runner`], implemented by both
//!   [`Session`] and [`Transaction`]
//! - **Transaction lifecycle**: begin/commit/rollback plus a deferred-cleanup
//!   `rollback_unless_committed` that never fails
//! - **Cancellation**: every operation has a `*_context` form that honours a [`Context`]
//!   deadline or cancel handle; the session timeout is layered on top
//! - **Observability**: lifecycle events, failures and timings go to an [`EventReceiver`]
//!   (`tracing` integration behind the `tracing` feature)
//!
//! ## Example
//!
//! ```ignore
//! use pgstmt::{Session, sql};
//!
//! let session = Session::new(pgstmt::create_pool(&database_url)?);
//!
//! let mut tx = session.begin().await?;
//! let mut ids: Vec<(i64,)> = Vec::new();
//! tx.with()
//!     .cte("recent", sql("SELECT id FROM orders WHERE created_at > now() - interval '1 day'"))
//!     .primary(sql("SELECT id FROM recent"))
//!     .load(&mut ids)
//!     .await?;
//! tx.commit().await?;
//! tx.rollback_unless_committed().await;
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod event;
mod query;
pub mod row;
pub mod rows;
pub mod runner;
pub mod session;
pub mod sql;
pub mod transaction;
pub mod with;

pub use buffer::{Buffer, Builder, Comments, Param, RawFragment, param, render};
pub use config::SessionConfig;
pub use context::{CancelHandle, Context};
pub use dialect::{Dialect, PostgreSql};
pub use driver::{PgClientHandle, PgTx};
pub use error::{StmtError, StmtResult};
pub use event::{EventReceiver, NullEventReceiver, RecordedEvent, RecordingEventReceiver};
pub use row::{FromRow, RowExt};
pub use rows::{RowIter, Rows};
pub use runner::{Detached, Driver, QueryCanceller, Queryer, Runner, TxHandle};
pub use session::Session;
pub use sql::{Sql, sql};
pub use transaction::{AccessMode, IsolationLevel, Transaction, TxOptions, TxState};
pub use with::{WithStmt, with, with_by_sql};

#[cfg(feature = "tracing")]
pub use event::TracingEventReceiver;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config, open};
