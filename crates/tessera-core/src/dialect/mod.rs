//! SQL dialect support.
//!
//! The compiler emits statement shapes; a dialect decides how identifiers are
//! quoted, how literal values are written and which type names columns get.
//! [`MssqlDialect`] is the only shipped implementation.

mod mssql;

use std::fmt::Debug;

pub use mssql::MssqlDialect;

use crate::error::{QueryError, Result};
use crate::query::TableName;
use crate::schema::{ColumnMeta, DataType, ValueType};
use crate::value::SqlValue;

/// Trait for SQL dialect-specific behavior.
pub trait Dialect: Debug + Send + Sync {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String;

    /// Writes a literal value inline, escaped.
    fn render_literal(&self, value: &SqlValue) -> String;

    /// Default type name for a logical type.
    fn value_type_name(&self, value_type: ValueType) -> String;

    /// Type name for an explicit data type.
    fn data_type_name(&self, data_type: &DataType) -> String;

    /// Type name for a column, preferring its explicit data type.
    fn column_type_name(&self, column: &ColumnMeta) -> String {
        column.data_type.as_ref().map_or_else(
            || self.value_type_name(column.value_type),
            |data_type| self.data_type_name(data_type),
        )
    }

    /// Unquoted qualifier chain of a table name.
    ///
    /// A database qualifier without a schema is rejected.
    fn table_name_chain(&self, table: &TableName) -> Result<Vec<String>> {
        match (&table.database, &table.schema) {
            (Some(database), Some(schema)) => Ok(vec![
                database.clone(),
                schema.clone(),
                table.name.clone(),
            ]),
            (Some(database), None) => Err(QueryError::DatabaseWithoutSchema {
                database: database.clone(),
                table: table.name.clone(),
            }),
            (None, Some(schema)) => Ok(vec![schema.clone(), table.name.clone()]),
            (None, None) => Ok(vec![table.name.clone()]),
        }
    }

    /// Quoted, dot separated table name.
    fn quote_table_name(&self, table: &TableName) -> Result<String> {
        Ok(self
            .table_name_chain(table)?
            .iter()
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join("."))
    }
}
