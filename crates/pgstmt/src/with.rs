//! `WITH [RECURSIVE] ...` statements.
//!
//! [`WithStmt`] composes named sub-statements (common table expressions) and an optional
//! primary statement into one query. Any [`Builder`] can be a CTE body or the primary
//! statement, including another `WithStmt`.
//!
//! Rendered layout:
//!
//! ```text
//! WITH [RECURSIVE ]
//!   name1 as (
//!     <body1>
//!   ),
//!   name2 as (
//!     <body2>
//!   )
//! <primary>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pgstmt::sql;
//!
//! let mut tree: Vec<(i64, String, i32)> = Vec::new();
//! session
//!     .with()
//!     .recursive(true)
//!     .cte(
//!         "org_tree(id, name, level)",
//!         sql("SELECT id, name, 0 FROM employees WHERE parent_id IS NULL UNION ALL \
//!              SELECT e.id, e.name, t.level + 1 FROM employees e JOIN org_tree t ON e.parent_id = t.id"),
//!     )
//!     .primary(sql("SELECT id, name, level FROM org_tree ORDER BY level"))
//!     .load(&mut tree)
//!     .await?;
//! ```

use crate::buffer::{Buffer, Builder, Comments, Param, RawFragment};
use crate::context::Context;
use crate::dialect::{Dialect, PostgreSql};
use crate::error::{StmtError, StmtResult};
use crate::event::{EventReceiver, NullEventReceiver};
use crate::query;
use crate::row::FromRow;
use crate::rows::{RowIter, Rows};
use crate::runner::{Detached, Runner};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

const INDENT: &str = "  ";
const BODY_INDENT: &str = "    ";

struct NamedBuilder<'a> {
    name: String,
    builder: Box<dyn Builder + 'a>,
}

/// A `WITH` statement.
///
/// `R` is the runner the statement executes against. Statements made by [`with`] or
/// [`with_by_sql`] are [`Detached`]: they render but cannot execute until
/// [`WithStmt::attach`] wires them to a runner.
#[must_use]
pub struct WithStmt<'a, R = Detached> {
    runner: &'a R,
    dialect: Arc<dyn Dialect>,
    events: Arc<dyn EventReceiver>,
    raw: RawFragment,
    is_recursive: bool,
    statements: Vec<NamedBuilder<'a>>,
    primary: Option<Box<dyn Builder + 'a>>,
    comments: Comments,
}

/// Start a detached `WITH` statement.
pub fn with<'a>() -> WithStmt<'a> {
    WithStmt::attached(
        &Detached,
        Arc::new(PostgreSql),
        Arc::new(NullEventReceiver),
    )
}

/// A detached statement that renders exactly `query` with `values`, bypassing composition.
pub fn with_by_sql<'a>(
    query: impl Into<String>,
    values: impl IntoIterator<Item = Param>,
) -> WithStmt<'a> {
    with().raw(query, values)
}

impl<'a, R> WithStmt<'a, R> {
    pub(crate) fn attached(
        runner: &'a R,
        dialect: Arc<dyn Dialect>,
        events: Arc<dyn EventReceiver>,
    ) -> Self {
        Self {
            runner,
            dialect,
            events,
            raw: RawFragment::default(),
            is_recursive: false,
            statements: Vec::new(),
            primary: None,
            comments: Comments::default(),
        }
    }

    /// Emit `WITH RECURSIVE` instead of `WITH`.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.is_recursive = recursive;
        self
    }

    /// Append a named sub-statement. Emission order is insertion order.
    ///
    /// `name` is emitted verbatim, so a column list may be included
    /// (`"tree(id, parent_id)"`). Names must be unique within the statement.
    pub fn cte(mut self, name: impl Into<String>, builder: impl Builder + 'a) -> Self {
        self.statements.push(NamedBuilder {
            name: name.into(),
            builder: Box::new(builder),
        });
        self
    }

    /// Set the trailing statement that consumes the CTEs.
    pub fn primary(mut self, builder: impl Builder + 'a) -> Self {
        self.primary = Some(Box::new(builder));
        self
    }

    /// Replace the whole statement with hand-written SQL.
    ///
    /// The text must already use the dialect's placeholder syntax. While the text is
    /// non-empty, the recursive flag, CTEs, primary statement and comments are ignored.
    pub fn raw(mut self, query: impl Into<String>, values: impl IntoIterator<Item = Param>) -> Self {
        self.raw = RawFragment::with_values(query, values);
        self
    }

    /// Prepend a `/* comment */` line.
    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comments.append(text);
        self
    }

    pub fn is_recursive(&self) -> bool {
        self.is_recursive
    }

    /// CTE names in emission order.
    pub fn cte_names(&self) -> impl Iterator<Item = &str> {
        self.statements.iter().map(|s| s.name.as_str())
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    fn check_names(&self) -> StmtResult<()> {
        let mut seen = HashSet::with_capacity(self.statements.len());
        for stmt in &self.statements {
            if stmt.name.trim().is_empty() {
                return Err(StmtError::build("CTE name cannot be empty"));
            }
            if !seen.insert(stmt.name.as_str()) {
                return Err(StmtError::build(format!("duplicate CTE name: {}", stmt.name)));
            }
        }
        Ok(())
    }
}

impl<'a> WithStmt<'a, Detached> {
    /// Wire a detached statement to a runner, dialect and event receiver.
    ///
    /// Only detached statements can be attached; a statement made by a session or
    /// transaction keeps its wiring for life.
    pub fn attach<'b, R>(
        self,
        runner: &'b R,
        dialect: Arc<dyn Dialect>,
        events: Arc<dyn EventReceiver>,
    ) -> WithStmt<'b, R>
    where
        'a: 'b,
    {
        WithStmt {
            runner,
            dialect,
            events,
            raw: self.raw,
            is_recursive: self.is_recursive,
            statements: self.statements,
            primary: self.primary,
            comments: self.comments,
        }
    }
}

impl<R: Sync> Builder for WithStmt<'_, R> {
    fn build(&self, dialect: &dyn Dialect, buf: &mut Buffer) -> StmtResult<()> {
        if !self.raw.is_empty() {
            return self.raw.build(dialect, buf);
        }
        self.check_names()?;

        self.comments.build(dialect, buf)?;

        buf.write_str("WITH ");
        if self.is_recursive {
            buf.write_str("RECURSIVE ");
        }

        buf.write_str("\n").write_str(INDENT);
        for (i, stmt) in self.statements.iter().enumerate() {
            if i > 0 {
                buf.write_str(",\n").write_str(INDENT);
            }
            buf.write_str(&stmt.name)
                .write_str(" as (\n")
                .write_str(BODY_INDENT);
            stmt.builder.build(dialect, buf)?;
            buf.write_str("\n").write_str(INDENT).write_str(")");
        }

        if let Some(primary) = &self.primary {
            buf.write_str("\n");
            primary.build(dialect, buf)?;
        }
        Ok(())
    }
}

impl<R: Runner> WithStmt<'_, R> {
    /// Execute and return the open cursor. The caller owns closing it.
    pub async fn rows(&self) -> StmtResult<Rows<R::Row>> {
        self.rows_context(&Context::background()).await
    }

    pub async fn rows_context(&self, ctx: &Context) -> StmtResult<Rows<R::Row>> {
        let (_, rows) = query::query_rows(
            ctx,
            self.runner,
            self.events.as_ref(),
            self,
            self.dialect.as_ref(),
        )
        .await?;
        Ok(rows)
    }

    /// Execute and append every row to `dest`. Returns the number of rows appended.
    pub async fn load<T>(&self, dest: &mut Vec<T>) -> StmtResult<usize>
    where
        T: FromRow<R::Row> + Send,
    {
        self.load_context(&Context::background(), dest).await
    }

    pub async fn load_context<T>(&self, ctx: &Context, dest: &mut Vec<T>) -> StmtResult<usize>
    where
        T: FromRow<R::Row> + Send,
    {
        query::query(
            ctx,
            self.runner,
            self.events.as_ref(),
            self,
            self.dialect.as_ref(),
            dest,
        )
        .await
    }

    /// Execute and map one row.
    ///
    /// Zero rows is [`StmtError::NotFound`]. With more than one row the first row is
    /// returned and the rest are discarded.
    pub async fn load_one<T: FromRow<R::Row>>(&self) -> StmtResult<T> {
        self.load_one_context(&Context::background()).await
    }

    pub async fn load_one_context<T: FromRow<R::Row>>(&self, ctx: &Context) -> StmtResult<T> {
        query::query_one(
            ctx,
            self.runner,
            self.events.as_ref(),
            self,
            self.dialect.as_ref(),
        )
        .await
    }

    /// Execute and return an iterator over the open cursor.
    pub async fn iterate(&self) -> StmtResult<RowIter<R::Row>> {
        self.iterate_context(&Context::background()).await
    }

    /// On failure no cursor is left open.
    pub async fn iterate_context(&self, ctx: &Context) -> StmtResult<RowIter<R::Row>> {
        let rows = self.rows_context(ctx).await?;
        let columns = rows.columns().to_vec();
        Ok(RowIter::new(rows, columns))
    }
}

impl<R> fmt::Debug for WithStmt<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithStmt")
            .field("is_recursive", &self.is_recursive)
            .field("ctes", &self.statements.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field("has_primary", &self.primary.is_some())
            .field("raw", &self.raw.query())
            .finish_non_exhaustive()
    }
}
