//! Schema definition statements.

use serde::{Deserialize, Serialize};

use super::{OrderDirection, QueryValue};

/// A possibly qualified table name. Parts are unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// Database qualifier.
    pub database: Option<String>,
    /// Schema qualifier.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
}

impl TableName {
    /// Creates an unqualified name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: None,
            name: name.into(),
        }
    }

    /// Creates a fully qualified name.
    #[must_use]
    pub fn qualified(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: Some(database.into()),
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Sets the database qualifier.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the schema qualifier.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// A column in CREATE TABLE or ALTER TABLE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Physical name, unquoted.
    pub name: String,
    /// SQL type name as rendered by the dialect.
    pub data_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the column is an identity.
    #[serde(default)]
    pub auto_increment: bool,
    /// Value used to backfill existing rows when the column becomes NOT NULL.
    pub default_value: Option<QueryValue>,
}

/// A column of a key or index, unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    /// Physical column name.
    pub name: String,
    /// Sort order.
    pub order: OrderDirection,
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Logical name; the constraint name is derived from it.
    pub name: String,
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub target_table: TableName,
    /// Referenced primary key columns.
    pub target_columns: Vec<String>,
}

/// An index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Logical name; the index name is derived from it.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<KeyColumn>,
}

/// `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableDef {
    /// Table to create.
    pub table: TableName,
    /// Columns in order.
    pub columns: Vec<ColumnDef>,
    /// Primary key columns in key order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_keys: Vec<KeyColumn>,
}

/// `ALTER TABLE ... ADD` or `ALTER COLUMN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChangeDef {
    /// Altered table.
    pub table: TableName,
    /// New column definition.
    pub column: ColumnDef,
}

/// `ALTER TABLE ... DROP COLUMN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveColumnDef {
    /// Altered table.
    pub table: TableName,
    /// Physical column name.
    pub column: String,
}

/// `sp_rename` of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameColumnDef {
    /// Altered table.
    pub table: TableName,
    /// Current column name.
    pub previous: String,
    /// New column name.
    pub next: String,
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddForeignKeyDef {
    /// Referencing table.
    pub table: TableName,
    /// Constraint.
    pub foreign_key: ForeignKeyDef,
}

/// `ALTER TABLE ... DROP CONSTRAINT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveForeignKeyDef {
    /// Referencing table.
    pub table: TableName,
    /// Logical foreign key name.
    pub name: String,
}

/// `CREATE INDEX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexDef {
    /// Indexed table.
    pub table: TableName,
    /// Index.
    pub index: IndexDef,
}

/// `SET IDENTITY_INSERT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIdentityInsertDef {
    /// Target table.
    pub table: TableName,
    /// `ON` when true.
    pub enabled: bool,
}
