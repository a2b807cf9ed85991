//! Row mapping traits and utilities

use crate::error::{StmtError, StmtResult};
use tokio_postgres::Row;
use tokio_postgres::types::FromSql;

/// Trait for converting a result row into a Rust value.
///
/// The row type defaults to `tokio_postgres::Row`; drivers with their own row type
/// (test doubles, other wire clients) map from that type instead.
///
/// # Example
///
/// ```ignore
/// use pgstmt::{FromRow, RowExt, StmtResult};
///
/// struct User {
///     id: i64,
///     username: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &tokio_postgres::Row) -> StmtResult<Self> {
///         Ok(Self {
///             id: row.try_get_column("id")?,
///             username: row.try_get_column("username")?,
///         })
///     }
/// }
/// ```
pub trait FromRow<R = Row>: Sized {
    /// Convert a row into Self
    fn from_row(row: &R) -> StmtResult<Self>;
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning StmtError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> StmtResult<T>
    where
        T: for<'a> FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> StmtResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| StmtError::decode(column, e.to_string()))
    }
}

// Positional tuples: `(i64, String)` reads columns 0 and 1.
macro_rules! impl_from_row_tuple {
    ($($idx:tt => $T:ident),+) => {
        impl<$($T),+> FromRow for ($($T,)+)
        where
            $($T: for<'a> FromSql<'a>,)+
        {
            fn from_row(row: &Row) -> StmtResult<Self> {
                Ok(($(
                    row.try_get::<usize, $T>($idx)
                        .map_err(|e| StmtError::decode(stringify!($idx), e.to_string()))?,
                )+))
            }
        }
    };
}

impl_from_row_tuple!(0 => A);
impl_from_row_tuple!(0 => A, 1 => B);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
