//! Dynamic SQL fragments.
//!
//! `Sql` stores SQL pieces and bind values separately. Placeholders are produced by the
//! [`Dialect`] when the fragment is rendered, so a fragment can be nested anywhere (a CTE
//! body, a primary statement) without manually tracking placeholder indices.
//!
//! # Example
//!
//! ```ignore
//! use pgstmt::sql;
//!
//! let mut active = sql("SELECT id FROM accounts WHERE closed_at IS NULL");
//! if let Some(region) = region {
//!     active.push(" AND region = ").push_bind(region);
//! }
//! let stmt = session
//!     .with()
//!     .cte("active", active)
//!     .primary(sql("SELECT count(*) FROM active"));
//! ```

use crate::buffer::{Buffer, Builder, Param};
use crate::dialect::Dialect;
use crate::error::{StmtError, StmtResult};
use std::sync::Arc;
use tokio_postgres::types::ToSql;

#[derive(Debug, Clone)]
enum SqlPart {
    Raw(String),
    Param,
    Ident(String),
}

/// Start building a SQL fragment.
pub fn sql(initial_sql: impl Into<String>) -> Sql {
    Sql::new(initial_sql)
}

/// A parameter-safe dynamic SQL fragment.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct Sql {
    parts: Vec<SqlPart>,
    params: Vec<Param>,
}

impl Sql {
    /// Create a new fragment with initial SQL text.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            parts: vec![SqlPart::Raw(initial_sql.into())],
            params: Vec::new(),
        }
    }

    /// Create an empty fragment.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }

        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a parameter placeholder and bind its value.
    pub fn push_bind<T>(&mut self, value: T) -> &mut Self
    where
        T: ToSql + Sync + Send + 'static,
    {
        self.parts.push(SqlPart::Param);
        self.params.push(Arc::new(value));
        self
    }

    /// Append a comma-separated list of placeholders and bind all values.
    ///
    /// An empty list appends `NULL`, so `IN (NULL)` stays valid SQL but matches nothing.
    pub fn push_bind_list<T>(&mut self, values: impl IntoIterator<Item = T>) -> &mut Self
    where
        T: ToSql + Sync + Send + 'static,
    {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return self.push("NULL");
        };

        self.push_bind(first);
        for v in iter {
            self.push(", ");
            self.push_bind(v);
        }
        self
    }

    /// Append an identifier, quoted by the dialect at render time.
    ///
    /// Fails on an empty identifier or one containing NUL.
    pub fn push_ident(&mut self, ident: &str) -> StmtResult<&mut Self> {
        if ident.is_empty() {
            return Err(StmtError::build("identifier cannot be empty"));
        }
        if ident.contains('\0') {
            return Err(StmtError::build("identifier cannot contain NUL character"));
        }
        self.parts.push(SqlPart::Ident(ident.to_string()));
        Ok(self)
    }

    /// Append another fragment, consuming it.
    pub fn push_sql(&mut self, mut other: Sql) -> &mut Self {
        self.parts.append(&mut other.parts);
        self.params.append(&mut other.params);
        self
    }

    /// Bind a parameter and return `self` (consuming version of [`Sql::push_bind`]).
    ///
    /// ```ignore
    /// pgstmt::sql("SELECT * FROM users WHERE status = ").bind("active")
    /// ```
    pub fn bind<T>(mut self, value: T) -> Self
    where
        T: ToSql + Sync + Send + 'static,
    {
        self.push_bind(value);
        self
    }

    /// Number of bound parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

impl Builder for Sql {
    fn build(&self, dialect: &dyn Dialect, buf: &mut Buffer) -> StmtResult<()> {
        let mut params = self.params.iter();
        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => {
                    buf.write_str(s);
                }
                SqlPart::Param => {
                    let value = params.next().ok_or_else(|| {
                        StmtError::build("Sql: more placeholders than bound parameters")
                    })?;
                    buf.write_value(dialect, Arc::clone(value));
                }
                SqlPart::Ident(ident) => {
                    buf.write_str(&dialect.quote_ident(ident));
                }
            }
        }
        Ok(())
    }
}
