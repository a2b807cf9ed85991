//! In-memory driver for exercising sessions, transactions and statements without a server.

#![allow(dead_code)]

use futures_util::{StreamExt, stream};
use pgstmt::{
    Driver, FromRow, QueryCanceller, Queryer, RecordingEventReceiver, Rows, Session, StmtError,
    StmtResult, TxHandle, TxOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_postgres::types::ToSql;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRow {
    pub id: i64,
    pub name: String,
}

pub fn row(id: i64, name: &str) -> MockRow {
    MockRow {
        id,
        name: name.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl FromRow<MockRow> for User {
    fn from_row(row: &MockRow) -> StmtResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name.clone(),
        })
    }
}

/// Maps only rows with a non-empty name.
#[derive(Debug)]
pub struct Named(pub String);

impl FromRow<MockRow> for Named {
    fn from_row(row: &MockRow) -> StmtResult<Self> {
        if row.name.is_empty() {
            return Err(StmtError::decode("name", "empty name"));
        }
        Ok(Self(row.name.clone()))
    }
}

/// What the driver should do next.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub rows: Vec<MockRow>,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_query: bool,
    /// Yield a fetch error instead of the row at this index.
    pub fail_fetch_at: Option<usize>,
    pub query_delay: Option<Duration>,
    /// Stall before yielding each row.
    pub fetch_delay: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    open_cursors: AtomicUsize,
    cancels: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl Shared {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }
}

async fn open_cursor(
    shared: &Arc<Shared>,
    prefix: &str,
    sql: &str,
    n_params: usize,
) -> StmtResult<Rows<MockRow>> {
    shared.record(format!("{prefix}query: {sql} [{n_params}]"));
    let script = shared.script();
    if let Some(delay) = script.query_delay {
        tokio::time::sleep(delay).await;
    }
    if script.fail_query {
        return Err(StmtError::Other("query failed".to_string()));
    }

    shared.open_cursors.fetch_add(1, Ordering::SeqCst);
    let guard = CursorGuard(Arc::clone(shared));
    let items: Vec<StmtResult<MockRow>> = script
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            if script.fail_fetch_at == Some(i) {
                Err(StmtError::Other("fetch failed".to_string()))
            } else {
                Ok(r)
            }
        })
        .collect();
    let fetch_delay = script.fetch_delay;
    let stream = stream::iter(items).then(move |r| async move {
        if let Some(delay) = fetch_delay {
            tokio::time::sleep(delay).await;
        }
        r
    });
    let stream = stream.map(move |r| {
        let _guard = &guard;
        r
    });
    Ok(Rows::new(vec!["id".to_string(), "name".to_string()], stream)
        .with_canceller(Arc::new(MockCanceller(Arc::clone(shared)))))
}

/// Counts server-side cancel requests.
struct MockCanceller(Arc<Shared>);

impl QueryCanceller for MockCanceller {
    fn cancel(&self) {
        self.0.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decrements the open-cursor count when the cursor's stream is dropped.
struct CursorGuard(Arc<Shared>);

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MockDriver {
    shared: Arc<Shared>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<MockRow>) -> Self {
        let driver = Self::new();
        driver.script(|s| s.rows = rows);
        driver
    }

    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.shared.script.lock().unwrap());
    }

    pub fn open_cursors(&self) -> usize {
        self.shared.open_cursors.load(Ordering::SeqCst)
    }

    /// Number of server-side cancels requested so far.
    pub fn cancels(&self) -> usize {
        self.shared.cancels.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log().iter().filter(|e| e.as_str() == entry).count()
    }
}

impl Queryer for MockDriver {
    type Row = MockRow;

    async fn query_rows(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StmtResult<Rows<MockRow>> {
        open_cursor(&self.shared, "", sql, params.len()).await
    }

    fn canceller(&self) -> Option<Arc<dyn QueryCanceller>> {
        Some(Arc::new(MockCanceller(Arc::clone(&self.shared))))
    }
}

impl Driver for MockDriver {
    type Tx = MockTx;

    async fn begin(&self, opts: &TxOptions) -> StmtResult<MockTx> {
        self.shared.record(opts.begin_sql());
        if self.shared.script().fail_begin {
            return Err(StmtError::Connection("begin failed".to_string()));
        }
        Ok(MockTx {
            shared: Arc::clone(&self.shared),
            done: false,
        })
    }
}

pub struct MockTx {
    shared: Arc<Shared>,
    done: bool,
}

impl MockTx {
    fn finish(&mut self, verb: &str, fail: bool) -> StmtResult<()> {
        if self.done {
            return Err(StmtError::TxDone);
        }
        self.done = true;
        self.shared.record(verb.to_string());
        if fail {
            return Err(StmtError::Other(format!("{verb} failed")));
        }
        Ok(())
    }
}

impl Queryer for MockTx {
    type Row = MockRow;

    async fn query_rows(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StmtResult<Rows<MockRow>> {
        if self.done {
            return Err(StmtError::TxDone);
        }
        open_cursor(&self.shared, "tx ", sql, params.len()).await
    }

    fn canceller(&self) -> Option<Arc<dyn QueryCanceller>> {
        Some(Arc::new(MockCanceller(Arc::clone(&self.shared))))
    }
}

impl TxHandle for MockTx {
    async fn commit(&mut self) -> StmtResult<()> {
        let fail = self.shared.script().fail_commit;
        self.finish("COMMIT", fail)
    }

    async fn rollback(&mut self) -> StmtResult<()> {
        let fail = self.shared.script().fail_rollback;
        self.finish("ROLLBACK", fail)
    }
}

/// A session over `driver` reporting into a fresh recorder.
pub fn session(driver: &MockDriver) -> (Session<MockDriver>, Arc<RecordingEventReceiver>) {
    let events = Arc::new(RecordingEventReceiver::new());
    let session = Session::new(driver.clone()).events(events.clone());
    (session, events)
}
