//! The boundary to the database driver.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::result::Row;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// READ UNCOMMITTED.
    ReadUncommitted,
    /// READ COMMITTED.
    #[default]
    ReadCommitted,
    /// REPEATABLE READ.
    RepeatableRead,
    /// SERIALIZABLE.
    Serializable,
    /// SNAPSHOT.
    Snapshot,
}

impl IsolationLevel {
    /// The SQL spelling.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
            Self::Snapshot => "SNAPSHOT",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Column description handed to [`Executor::bulk_insert`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkColumn {
    /// Physical column name.
    pub name: String,
    /// Dialect type name.
    pub data_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the database generates the value.
    pub auto_increment: bool,
}

/// A connection to one database.
///
/// The session compiles every statement; an executor only runs text and
/// returns rows. Implementations are driven by one session at a time.
#[async_trait]
pub trait Executor: fmt::Debug + Send + Sync + 'static {
    /// Opens the connection.
    async fn connect(&mut self) -> Result<(), BoxError>;

    /// Starts a transaction.
    async fn begin_transaction(&mut self, isolation: Option<IsolationLevel>) -> Result<(), BoxError>;

    /// Commits the open transaction.
    async fn commit_transaction(&mut self) -> Result<(), BoxError>;

    /// Rolls back the open transaction.
    async fn rollback_transaction(&mut self) -> Result<(), BoxError>;

    /// Closes the connection.
    async fn close(&mut self) -> Result<(), BoxError>;

    /// Runs a batch and returns one result set per statement, in order.
    async fn execute(&mut self, statements: &[String]) -> Result<Vec<Vec<Row>>, BoxError>;

    /// Loads rows through the driver's bulk copy path. Row keys are
    /// physical column names.
    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[BulkColumn],
        rows: &[Row],
    ) -> Result<(), BoxError>;
}
