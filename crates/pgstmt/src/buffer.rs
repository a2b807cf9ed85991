//! Rendering primitives: [`Buffer`], the [`Builder`] trait, and [`RawFragment`].
//!
//! Every statement renders itself into a `Buffer`, which accumulates SQL text and the
//! positional bind values referenced by that text. Because all fragments of a statement
//! share one buffer, placeholder numbering stays correct across nested builders.

use crate::dialect::Dialect;
use crate::error::StmtResult;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A bind value owned by a statement.
pub type Param = Arc<dyn ToSql + Sync + Send>;

/// Wrap a value as a [`Param`].
pub fn param<T>(value: T) -> Param
where
    T: ToSql + Sync + Send + 'static,
{
    Arc::new(value)
}

/// Accumulates emitted SQL text and positional bind values.
#[derive(Debug, Default)]
pub struct Buffer {
    sql: String,
    values: Vec<Param>,
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append SQL text verbatim.
    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.sql.push_str(s);
        self
    }

    /// Append a bind value and the dialect's placeholder that refers to it.
    pub fn write_value(&mut self, dialect: &dyn Dialect, value: Param) -> &mut Self {
        self.values.push(value);
        let placeholder = dialect.placeholder(self.values.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append a bind value without emitting a placeholder.
    ///
    /// Used by pre-rendered fragments whose text already references the value.
    pub fn push_value(&mut self, value: Param) -> &mut Self {
        self.values.push(value);
        self
    }

    /// The SQL text rendered so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bind values collected so far, in placeholder order.
    pub fn values(&self) -> &[Param] {
        &self.values
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }

    /// Split into SQL text and bind values.
    pub fn into_parts(self) -> (String, Vec<Param>) {
        (self.sql, self.values)
    }
}

/// Something that can render itself as SQL into a [`Buffer`].
///
/// SELECT/INSERT/... builders, [`crate::Sql`] fragments, [`RawFragment`]s and
/// [`crate::WithStmt`] all implement this trait, so any of them can be nested as a CTE
/// body or primary statement.
pub trait Builder: Send + Sync {
    /// Render into `buf` using `dialect` for placeholders and identifiers.
    fn build(&self, dialect: &dyn Dialect, buf: &mut Buffer) -> StmtResult<()>;
}

impl<B: Builder + ?Sized> Builder for &B {
    fn build(&self, dialect: &dyn Dialect, buf: &mut Buffer) -> StmtResult<()> {
        (**self).build(dialect, buf)
    }
}

impl<B: Builder + ?Sized> Builder for Box<B> {
    fn build(&self, dialect: &dyn Dialect, buf: &mut Buffer) -> StmtResult<()> {
        (**self).build(dialect, buf)
    }
}

/// Render a builder into a fresh buffer.
pub fn render(builder: &dyn Builder, dialect: &dyn Dialect) -> StmtResult<Buffer> {
    let mut buf = Buffer::new();
    builder.build(dialect, &mut buf)?;
    Ok(buf)
}

/// A pre-rendered query plus its bind values.
///
/// When a statement carries a non-empty raw fragment, the fragment completely replaces
/// the statement's structural rendering. The text is emitted verbatim, so it must already
/// use the dialect's placeholder syntax.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct RawFragment {
    query: String,
    values: Vec<Param>,
}

impl RawFragment {
    /// Create a raw fragment from query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            values: Vec::new(),
        }
    }

    /// Create a raw fragment from query text and already-wrapped values.
    pub fn with_values(query: impl Into<String>, values: impl IntoIterator<Item = Param>) -> Self {
        Self {
            query: query.into(),
            values: values.into_iter().collect(),
        }
    }

    /// Bind another value (consuming).
    pub fn bind<T>(mut self, value: T) -> Self
    where
        T: ToSql + Sync + Send + 'static,
    {
        self.values.push(Arc::new(value));
        self
    }

    /// The query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The bound values.
    pub fn values(&self) -> &[Param] {
        &self.values
    }

    /// A fragment with empty text does not override anything.
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }
}

impl Builder for RawFragment {
    fn build(&self, _dialect: &dyn Dialect, buf: &mut Buffer) -> StmtResult<()> {
        buf.write_str(&self.query);
        for value in &self.values {
            buf.push_value(Arc::clone(value));
        }
        Ok(())
    }
}

/// Leading `/* ... */` comment lines of a statement.
#[derive(Debug, Clone, Default)]
pub struct Comments(Vec<String>);

impl Comments {
    /// Append a comment line. A `*/` inside the text is neutralised.
    pub fn append(&mut self, comment: impl Into<String>) {
        let comment: String = comment.into();
        self.0.push(comment.replace("*/", "* /"));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Builder for Comments {
    fn build(&self, _dialect: &dyn Dialect, buf: &mut Buffer) -> StmtResult<()> {
        for comment in &self.0 {
            buf.write_str("/* ").write_str(comment).write_str(" */\n");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgreSql;

    #[test]
    fn write_value_numbers_placeholders_in_order() {
        let mut buf = Buffer::new();
        buf.write_str("a = ")
            .write_value(&PostgreSql, param(1_i64))
            .write_str(" AND b = ")
            .write_value(&PostgreSql, param("x"));

        assert_eq!(buf.sql(), "a = $1 AND b = $2");
        assert_eq!(buf.params_ref().len(), 2);
        assert!(format!("{buf:?}").contains("a = $1 AND b = $2"));
    }

    #[test]
    fn raw_fragment_renders_verbatim() {
        let raw = RawFragment::new("SELECT * FROM t WHERE id = $1").bind(7_i32);
        let buf = render(&raw, &PostgreSql).unwrap();

        assert_eq!(buf.sql(), "SELECT * FROM t WHERE id = $1");
        assert_eq!(buf.values().len(), 1);
        assert!(!raw.is_empty());
        assert!(RawFragment::default().is_empty());
    }

    #[test]
    fn comments_render_one_line_each() {
        let mut comments = Comments::default();
        comments.append("first");
        comments.append("sneaky */ DROP");

        let buf = render(&comments, &PostgreSql).unwrap();
        assert_eq!(buf.sql(), "/* first */\n/* sneaky * / DROP */\n");
    }
}
