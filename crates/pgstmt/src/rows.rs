//! Row cursors.
//!
//! [`Rows`] is an open, streaming result cursor; [`RowIter`] wraps one together with the
//! column names captured when the query was opened. Both are single-owner and
//! single-consumer. `close` releases the underlying driver resource and may be called any
//! number of times; dropping a cursor closes it as well.

use crate::context::Context;
use crate::error::StmtResult;
use crate::row::FromRow;
use crate::runner::QueryCanceller;
use futures_core::Stream;
use futures_util::StreamExt;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

type BoxRowStream<R> = Pin<Box<dyn Stream<Item = StmtResult<R>> + Send>>;

/// An open result cursor.
#[must_use = "an open cursor holds a database resource until it is closed or dropped"]
pub struct Rows<R> {
    columns: Vec<String>,
    stream: Option<BoxRowStream<R>>,
    ctx: Context,
    canceller: Option<Arc<dyn QueryCanceller>>,
}

impl<R> Rows<R> {
    /// Wrap a driver row stream.
    ///
    /// Whatever the stream owns (a pooled connection, a portal) is released when the
    /// cursor is closed.
    pub fn new<S>(columns: Vec<String>, stream: S) -> Self
    where
        S: Stream<Item = StmtResult<R>> + Send + 'static,
    {
        Self {
            columns,
            stream: Some(Box::pin(stream)),
            ctx: Context::background(),
            canceller: None,
        }
    }

    /// Ask the server to cancel the statement when a fetch is abandoned because the
    /// context expired.
    pub fn with_canceller(mut self, canceller: Arc<dyn QueryCanceller>) -> Self {
        self.canceller = Some(canceller);
        self
    }

    /// Honour `ctx` on every subsequent fetch.
    pub(crate) fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    /// Result column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fetch the next row.
    ///
    /// Returns `None` once the cursor is exhausted or closed. Reaching the end, a driver
    /// error, and a context expiry all close the cursor. An expiry also asks the server
    /// to cancel the statement.
    pub async fn next_row(&mut self) -> Option<StmtResult<R>> {
        let Self { stream, ctx, .. } = self;
        let inner = stream.as_mut()?;
        let next = ctx.run(async { Ok(inner.next().await) }).await;
        match next {
            Ok(Some(Ok(row))) => Some(Ok(row)),
            Ok(Some(Err(e))) => {
                self.close();
                Some(Err(e))
            }
            Err(e) => {
                if let Some(canceller) = self.canceller.take() {
                    canceller.cancel();
                }
                self.close();
                Some(Err(e))
            }
            Ok(None) => {
                self.close();
                None
            }
        }
    }

    /// Release the cursor. Safe to call more than once.
    pub fn close(&mut self) {
        self.stream = None;
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl<R> fmt::Debug for Rows<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.columns)
            .field("closed", &self.is_closed())
            .field("cancellable", &self.canceller.is_some())
            .finish()
    }
}

/// A caller-owned iterator over an open cursor.
///
/// # Example
///
/// ```ignore
/// let mut iter = stmt.iterate().await?;
/// while let Some(user) = iter.next_as::<User>().await {
///     let user = user?;
///     // ...
/// }
/// iter.close();
/// ```
#[must_use = "an open iterator holds a database resource until it is closed or dropped"]
pub struct RowIter<R> {
    rows: Rows<R>,
    columns: Vec<String>,
}

impl<R> RowIter<R> {
    pub(crate) fn new(rows: Rows<R>, columns: Vec<String>) -> Self {
        Self { rows, columns }
    }

    /// Column names captured when the iterator was opened.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fetch the next raw row.
    pub async fn next_row(&mut self) -> Option<StmtResult<R>> {
        self.rows.next_row().await
    }

    /// Fetch the next row and map it into `T`.
    ///
    /// A mapping failure closes the iterator.
    pub async fn next_as<T: FromRow<R>>(&mut self) -> Option<StmtResult<T>> {
        let row = match self.rows.next_row().await? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        let mapped = T::from_row(&row);
        if mapped.is_err() {
            self.rows.close();
        }
        Some(mapped)
    }

    /// Release the cursor. Safe to call more than once.
    pub fn close(&mut self) {
        self.rows.close();
    }

    pub fn is_closed(&self) -> bool {
        self.rows.is_closed()
    }
}

impl<R> fmt::Debug for RowIter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowIter")
            .field("columns", &self.columns)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StmtError;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cursor(values: Vec<StmtResult<i32>>) -> Rows<i32> {
        Rows::new(vec!["n".to_string()], stream::iter(values))
    }

    #[derive(Default)]
    struct CountingCanceller(AtomicUsize);

    impl QueryCanceller for CountingCanceller {
        fn cancel(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn exhausting_a_cursor_closes_it() {
        let mut rows = cursor(vec![Ok(1), Ok(2)]);
        assert_eq!(rows.columns(), ["n"]);
        assert_eq!(rows.next_row().await.unwrap().unwrap(), 1);
        assert_eq!(rows.next_row().await.unwrap().unwrap(), 2);
        assert!(!rows.is_closed());
        assert!(rows.next_row().await.is_none());
        assert!(rows.is_closed());
    }

    #[tokio::test]
    async fn driver_error_closes_the_cursor() {
        let mut rows = cursor(vec![Err(StmtError::Other("wire".into())), Ok(2)]);
        assert!(rows.next_row().await.unwrap().is_err());
        assert!(rows.is_closed());
        assert!(rows.next_row().await.is_none());
    }

    #[tokio::test]
    async fn double_close_is_harmless() {
        let mut rows = cursor(vec![Ok(1)]);
        rows.close();
        rows.close();
        assert!(rows.is_closed());
        assert!(rows.next_row().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_context_stops_fetching() {
        let (ctx, handle) = Context::background().with_cancel();
        let mut rows = cursor(vec![Ok(1), Ok(2)]).with_context(ctx);
        assert_eq!(rows.next_row().await.unwrap().unwrap(), 1);
        handle.cancel();
        let err = rows.next_row().await.unwrap().unwrap_err();
        assert!(matches!(err, StmtError::Cancelled));
        assert!(rows.is_closed());
    }

    #[tokio::test]
    async fn expired_fetch_cancels_on_the_server() {
        let canceller = Arc::new(CountingCanceller::default());
        let stalled = stream::pending::<StmtResult<i32>>();
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let mut rows = Rows::new(vec!["n".to_string()], stalled)
            .with_canceller(canceller.clone())
            .with_context(ctx);

        let err = rows.next_row().await.unwrap().unwrap_err();

        assert!(matches!(err, StmtError::DeadlineExceeded));
        assert_eq!(canceller.0.load(Ordering::SeqCst), 1);
        assert!(rows.is_closed());
    }

    #[tokio::test]
    async fn driver_errors_and_exhaustion_never_cancel() {
        let canceller = Arc::new(CountingCanceller::default());
        let mut rows = cursor(vec![Ok(1), Err(StmtError::Other("wire".into()))])
            .with_canceller(canceller.clone());
        assert!(rows.next_row().await.unwrap().is_ok());
        assert!(rows.next_row().await.unwrap().is_err());

        let mut rows = cursor(vec![Ok(1)]).with_canceller(canceller.clone());
        while rows.next_row().await.is_some() {}

        assert_eq!(canceller.0.load(Ordering::SeqCst), 0);
    }
}
