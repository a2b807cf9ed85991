//! Observability sink.
//!
//! Every state-changing operation reports a named event to an [`EventReceiver`]:
//! transactions report `begin`/`commit`/`rollback`, query execution reports a timing
//! and any failure under a stable name from [`names`].
//!
//! Receivers are fire-and-forget. They return nothing the core acts on (except
//! [`EventReceiver::event_err`], which hands the error back unchanged for fluent
//! propagation), so a misbehaving sink can never fail a SQL operation.
//!
//! # Example
//!
//! ```ignore
//! use pgstmt::{RecordingEventReceiver, Session};
//! use std::sync::Arc;
//!
//! let events = Arc::new(RecordingEventReceiver::new());
//! let session = Session::new(driver).events(events.clone());
//!
//! let mut tx = session.begin().await?;
//! tx.commit().await?;
//! assert_eq!(events.event_names(), ["pgstmt.begin", "pgstmt.commit"]);
//! ```

mod receivers;
#[cfg(feature = "tracing")]
mod tracing_receiver;

pub use receivers::{NullEventReceiver, RecordedEvent, RecordingEventReceiver};
#[cfg(feature = "tracing")]
pub use tracing_receiver::TracingEventReceiver;

use crate::error::StmtError;
use std::time::Duration;

/// Key/value pairs attached to an event (e.g. `("sql", "...")`).
pub type Kvs<'a> = &'a [(&'a str, &'a str)];

/// Stable event names reported by the core.
pub mod names {
    pub const BEGIN: &str = "pgstmt.begin";
    pub const BEGIN_ERROR: &str = "pgstmt.begin.error";
    pub const COMMIT: &str = "pgstmt.commit";
    pub const COMMIT_ERROR: &str = "pgstmt.commit.error";
    pub const ROLLBACK: &str = "pgstmt.rollback";
    pub const ROLLBACK_ERROR: &str = "pgstmt.rollback.error";
    /// Failure of a deferred-cleanup rollback (never surfaced as a return value).
    pub const ROLLBACK_UNLESS_COMMITTED: &str = "pgstmt.rollback_unless_committed";
    /// Timing of a select-style execution.
    pub const SELECT: &str = "pgstmt.select";
    pub const SELECT_BUILD: &str = "pgstmt.select.build";
    pub const SELECT_QUERY: &str = "pgstmt.select.load.query";
    pub const SELECT_SCAN: &str = "pgstmt.select.load.scan";
}

/// Receives events, errors and timings from the core.
///
/// All methods have no-op defaults; implement the ones you care about. The plain forms
/// delegate to the `*_kv` forms with no key/value pairs.
pub trait EventReceiver: Send + Sync {
    /// A named event occurred.
    fn event(&self, name: &str) {
        self.event_kv(name, &[]);
    }

    /// A named event occurred, with key/value context.
    fn event_kv(&self, name: &str, kvs: Kvs<'_>) {
        let _ = (name, kvs);
    }

    /// A named error occurred. Returns the error unchanged.
    fn event_err(&self, name: &str, err: StmtError) -> StmtError {
        self.event_err_kv(name, err, &[])
    }

    /// A named error occurred, with key/value context. Returns the error unchanged.
    fn event_err_kv(&self, name: &str, err: StmtError, kvs: Kvs<'_>) -> StmtError {
        let _ = (name, kvs);
        err
    }

    /// A named operation took `elapsed`.
    fn timing(&self, name: &str, elapsed: Duration) {
        self.timing_kv(name, elapsed, &[]);
    }

    /// A named operation took `elapsed`, with key/value context.
    fn timing_kv(&self, name: &str, elapsed: Duration, kvs: Kvs<'_>) {
        let _ = (name, elapsed, kvs);
    }
}

#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
