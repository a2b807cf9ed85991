//! Shared execution path for every statement.
//!
//! A statement hands itself (as a [`Builder`]) to these helpers together with the runner,
//! dialect and event receiver it was wired to. The helpers render, apply the runner's
//! statement timeout, run the query, and report:
//!
//! - `pgstmt.select.build` when rendering fails (nothing is sent to the database),
//! - `pgstmt.select.load.query` (with the SQL) when the driver rejects the query,
//! - `pgstmt.select.load.scan` (with the SQL) when fetching or mapping a row fails,
//! - a `pgstmt.select` timing (with the SQL) for every statement that reached the driver.

use crate::buffer::{Builder, render};
use crate::context::Context;
use crate::dialect::Dialect;
use crate::error::{StmtError, StmtResult};
use crate::event::{EventReceiver, names};
use crate::row::FromRow;
use crate::rows::Rows;
use crate::runner::Runner;
use std::time::Instant;

/// Reports the `pgstmt.select` timing when dropped, so every exit path is timed.
struct SelectTiming<'a> {
    events: &'a dyn EventReceiver,
    sql: String,
    start: Instant,
}

impl Drop for SelectTiming<'_> {
    fn drop(&mut self) {
        self.events
            .timing_kv(names::SELECT, self.start.elapsed(), &[("sql", self.sql.as_str())]);
    }
}

async fn open<'e, R: Runner>(
    ctx: &Context,
    runner: &R,
    events: &'e dyn EventReceiver,
    builder: &dyn Builder,
    dialect: &dyn Dialect,
) -> StmtResult<(SelectTiming<'e>, Rows<R::Row>)> {
    let buf = render(builder, dialect).map_err(|e| events.event_err(names::SELECT_BUILD, e))?;
    let params = buf.params_ref();
    let timing = SelectTiming {
        events,
        sql: buf.sql().to_string(),
        start: Instant::now(),
    };

    let ctx = ctx.with_optional_timeout(runner.timeout());
    match runner.query_rows(&ctx, &timing.sql, &params).await {
        Ok(rows) => Ok((timing, rows)),
        Err(e) => Err(events.event_err_kv(names::SELECT_QUERY, e, &[("sql", timing.sql.as_str())])),
    }
}

/// Render and run `builder`, returning the SQL text and the open cursor.
pub(crate) async fn query_rows<R: Runner>(
    ctx: &Context,
    runner: &R,
    events: &dyn EventReceiver,
    builder: &dyn Builder,
    dialect: &dyn Dialect,
) -> StmtResult<(String, Rows<R::Row>)> {
    let (timing, rows) = open(ctx, runner, events, builder, dialect).await?;
    Ok((timing.sql.clone(), rows))
}

/// Render and run `builder`, appending every row to `dest`. Returns the number of rows
/// appended; zero is not an error.
pub(crate) async fn query<R, T>(
    ctx: &Context,
    runner: &R,
    events: &dyn EventReceiver,
    builder: &dyn Builder,
    dialect: &dyn Dialect,
    dest: &mut Vec<T>,
) -> StmtResult<usize>
where
    R: Runner,
    T: FromRow<R::Row> + Send,
{
    let (timing, mut rows) = open(ctx, runner, events, builder, dialect).await?;
    let mut count = 0;
    while let Some(next) = rows.next_row().await {
        let value = next.and_then(|row| T::from_row(&row)).map_err(|e| {
            events.event_err_kv(names::SELECT_SCAN, e, &[("sql", timing.sql.as_str())])
        })?;
        dest.push(value);
        count += 1;
    }
    Ok(count)
}

/// Render and run `builder`, mapping the first row.
///
/// Zero rows is [`StmtError::NotFound`], which is not reported as an error event. Any rows
/// after the first are discarded and the cursor is closed.
pub(crate) async fn query_one<R, T>(
    ctx: &Context,
    runner: &R,
    events: &dyn EventReceiver,
    builder: &dyn Builder,
    dialect: &dyn Dialect,
) -> StmtResult<T>
where
    R: Runner,
    T: FromRow<R::Row>,
{
    let (timing, mut rows) = open(ctx, runner, events, builder, dialect).await?;
    let first = rows.next_row().await;
    rows.close();
    match first {
        None => Err(StmtError::NotFound),
        Some(next) => next
            .and_then(|row| T::from_row(&row))
            .map_err(|e| events.event_err_kv(names::SELECT_SCAN, e, &[("sql", timing.sql.as_str())])),
    }
}
