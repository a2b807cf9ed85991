//! SQL dialects.
//!
//! A [`Dialect`] is a pure translation service: it turns abstract placeholders and
//! identifiers into dialect-specific text. It holds no state and performs no I/O, so a
//! single instance is shared by every builder rendered for a session.

use std::fmt;

/// Translation from abstract placeholder/identifier forms to dialect-specific text.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Quote an identifier (`schema.table.column`), quoting each dotted part.
    fn quote_ident(&self, ident: &str) -> String;

    /// Placeholder text for the `n`-th bind value of a statement (1-based).
    fn placeholder(&self, n: usize) -> String;

    /// Encode a string literal.
    fn encode_string(&self, s: &str) -> String;

    /// Encode a boolean literal.
    fn encode_bool(&self, b: bool) -> String {
        if b { "TRUE" } else { "FALSE" }.to_string()
    }
}

/// PostgreSQL: `$n` placeholders and `"double quoted"` identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSql;

impl Dialect for PostgreSql {
    fn quote_ident(&self, ident: &str) -> String {
        let mut out = String::with_capacity(ident.len() + 2);
        for (i, part) in ident.split('.').enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push('"');
            out.push_str(&part.replace('"', "\"\""));
            out.push('"');
        }
        out
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn encode_string(&self, s: &str) -> String {
        let escaped = s.replace('\'', "''");
        if escaped.contains('\\') {
            format!("E'{}'", escaped.replace('\\', "\\\\"))
        } else {
            format!("'{escaped}'")
        }
    }
}
