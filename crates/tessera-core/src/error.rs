//! Error types for query definitions and compilation.

use thiserror::Error;

/// Shape violations detected while compiling a [`QueryDef`](crate::query::QueryDef).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// `TOP` and `OFFSET ... FETCH` were both requested.
    #[error("TOP cannot be combined with LIMIT")]
    TopWithLimit,

    /// `OFFSET ... FETCH` without an `ORDER BY`.
    #[error("LIMIT requires ORDER BY")]
    LimitWithoutOrderBy,

    /// `HAVING` without a `GROUP BY`.
    #[error("HAVING requires GROUP BY")]
    HavingWithoutGroupBy,

    /// A table name carried a database qualifier but no schema.
    #[error("table '{table}' names database '{database}' without a schema")]
    DatabaseWithoutSchema {
        /// Database qualifier.
        database: String,
        /// Table name.
        table: String,
    },

    /// A join definition had no alias to bind its columns to.
    #[error("join definition has no alias")]
    JoinWithoutAlias,

    /// A union source with no members.
    #[error("UNION requires at least one select")]
    EmptyUnion,

    /// A select definition with nothing to select from.
    #[error("select definition has no FROM source")]
    MissingFrom,

    /// An upsert without a match condition.
    #[error("UPSERT requires a WHERE condition")]
    UpsertWithoutWhere,

    /// An insert with no columns.
    #[error("{statement} record has no columns")]
    EmptyRecord {
        /// Statement kind.
        statement: &'static str,
    },
}

/// Result type alias for compilation.
pub type Result<T> = std::result::Result<T, QueryError>;
