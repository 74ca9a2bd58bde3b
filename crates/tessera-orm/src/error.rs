//! Error types for the query graph and the session.

use thiserror::Error;

use tessera_core::QueryError;

/// Error returned by an [`Executor`](crate::context::Executor).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building, executing or migrating.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Shape violation caught while compiling a definition.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A statement kind was combined with a clause it does not accept.
    #[error("{statement} cannot be combined with {clause}")]
    IllegalClause {
        /// Statement being built.
        statement: &'static str,
        /// Offending clause.
        clause: &'static str,
    },

    /// A write was attempted on a graph without a physical table.
    #[error("{statement} requires a physical table; the graph was wrapped or unioned")]
    NoTable {
        /// Statement being built.
        statement: &'static str,
    },

    /// Upsert without a WHERE clause.
    #[error("UPSERT requires a WHERE clause")]
    UpsertWithoutWhere,

    /// HAVING without GROUP BY.
    #[error("HAVING requires GROUP BY")]
    HavingWithoutGroupBy,

    /// LIMIT without ORDER BY.
    #[error("LIMIT requires ORDER BY")]
    LimitWithoutOrderBy,

    /// LIMIT over a join that multiplies rows.
    #[error("LIMIT cannot be combined with a collection join; apply LIMIT and wrap before joining, or group the rows")]
    LimitWithCollectionJoin,

    /// The same ordering expression was added twice.
    #[error("duplicate ORDER BY expression: {0}")]
    DuplicateOrderBy(String),

    /// COUNT after DISTINCT.
    #[error("count cannot follow distinct; wrap first or group and count manually")]
    CountAfterDistinct,

    /// COUNT after GROUP BY.
    #[error("count cannot follow group by; wrap first")]
    CountAfterGroupBy,

    /// Scalar subquery without `top(1)`.
    #[error("a scalar subquery must select top 1")]
    ScalarSubqueryWithoutTop,

    /// Scalar subquery selecting zero or several columns.
    #[error("a scalar subquery must select exactly one column, found {0}")]
    ScalarSubqueryColumns(usize),

    /// A union of zero graphs.
    #[error("cannot union an empty list of graphs")]
    EmptyUnion,

    /// No foreign key or foreign key target under the given name.
    #[error("'{table}.{path}' is neither a foreign key nor a foreign key target")]
    UnknownRelation {
        /// Table the relation was looked up on.
        table: String,
        /// Dotted relation path.
        path: String,
    },

    /// Foreign key columns do not line up with the target primary key.
    #[error("foreign key '{table}.{foreign_key}' has {columns} column(s) but '{target}' has {primary_keys} primary key column(s)")]
    KeyLengthMismatch {
        /// Table owning the foreign key.
        table: String,
        /// Foreign key name.
        foreign_key: String,
        /// Referenced table.
        target: String,
        /// Number of foreign key columns.
        columns: usize,
        /// Number of primary key columns.
        primary_keys: usize,
    },

    /// A record or output list named a field that is not a column.
    #[error("'{table}' has no column '{key}'")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Property key.
        key: String,
    },

    /// A relation was walked on a graph that has no table metadata.
    #[error("include is not available after wrap")]
    IncludeAfterWrap,

    /// A query returned more than one row where one was expected.
    #[error("expected at most one row, found {0}")]
    MultipleRows(usize),

    /// The session is not in a state that allows the operation.
    #[error("session error: {0}")]
    Session(String),

    /// Connection, transaction or bulk insert failure in the executor.
    #[error("executor error: {0}")]
    Executor(#[source] BoxError),

    /// Statement failure in the executor, with the batch that failed.
    #[error("failed to execute statements:\n{statements}")]
    Statement {
        /// The batch, joined by blank lines.
        statements: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// A migration failed.
    #[error("migration {name} failed: {source}")]
    Migration {
        /// Migration name.
        name: String,
        /// Underlying error.
        #[source]
        source: Box<OrmError>,
    },

    /// Result rows did not match the requested type.
    #[error("result conversion error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
