//! Query definition IR.
//!
//! A closed set of statement definitions produced by the query graph and the
//! migration layer and consumed by the [compiler](crate::compiler). The IR is
//! plain data: it can be serialized, compared, and compiled any number of
//! times with the same result.

mod ddl;
mod select;
mod write;

use serde::{Deserialize, Serialize};

pub use ddl::{
    AddForeignKeyDef, ColumnChangeDef, ColumnDef, ConfigIdentityInsertDef, CreateIndexDef,
    CreateTableDef, ForeignKeyDef, IndexDef, KeyColumn, RemoveColumnDef, RemoveForeignKeyDef,
    RenameColumnDef, TableName,
};
pub use select::{JoinStrategy, Limit, SelectDef};
pub use write::{DeleteDef, InsertDef, UpdateDef, UpsertDef};

use crate::value::{SqlValue, ToSqlValue};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl OrderDirection {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// An expression inside a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryValue {
    /// SQL text emitted verbatim. Identifiers inside are already quoted.
    Raw(String),
    /// A value rendered and escaped by the dialect.
    Literal(SqlValue),
    /// A nested select, rendered in parentheses.
    Select(Box<SelectDef>),
    /// Tokens concatenated into one parenthesized expression.
    Group(Vec<QueryValue>),
}

impl QueryValue {
    /// Creates a verbatim fragment.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// Creates a literal.
    #[must_use]
    pub fn literal(value: impl ToSqlValue) -> Self {
        Self::Literal(value.to_sql_value())
    }

    /// Returns `true` for a NULL literal.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Literal(SqlValue::Null))
    }
}

impl From<SqlValue> for QueryValue {
    fn from(value: SqlValue) -> Self {
        Self::Literal(value)
    }
}

impl From<SelectDef> for QueryValue {
    fn from(def: SelectDef) -> Self {
        Self::Select(Box::new(def))
    }
}

impl From<&str> for QueryValue {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

/// Source of a select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FromSource {
    /// Physical table.
    Table(TableName),
    /// Single subquery.
    Select(Box<SelectDef>),
    /// Subqueries combined with `UNION ALL`.
    Union(Vec<SelectDef>),
}

/// A statement definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueryDef {
    /// SELECT.
    Select(SelectDef),
    /// INSERT.
    Insert(InsertDef),
    /// UPDATE.
    Update(UpdateDef),
    /// MERGE based upsert.
    Upsert(UpsertDef),
    /// DELETE.
    Delete(DeleteDef),
    /// Creates the database when missing.
    CreateDatabaseIfNotExists {
        /// Database name.
        database: String,
    },
    /// Drops every object in the database when it exists.
    ClearDatabaseIfExists {
        /// Database name.
        database: String,
    },
    /// Probes the database catalog.
    GetDatabaseInfo {
        /// Database name.
        database: String,
    },
    /// Probes the table catalog.
    GetTableInfo {
        /// Table to look up.
        table: TableName,
    },
    /// CREATE TABLE.
    CreateTable(CreateTableDef),
    /// DROP TABLE.
    DropTable {
        /// Table to drop.
        table: TableName,
    },
    /// ALTER TABLE ADD column.
    AddColumn(ColumnChangeDef),
    /// ALTER TABLE DROP COLUMN.
    RemoveColumn(RemoveColumnDef),
    /// ALTER TABLE ALTER COLUMN.
    ModifyColumn(ColumnChangeDef),
    /// Column rename.
    RenameColumn(RenameColumnDef),
    /// ADD CONSTRAINT FOREIGN KEY.
    AddForeignKey(AddForeignKeyDef),
    /// DROP CONSTRAINT of a foreign key.
    RemoveForeignKey(RemoveForeignKeyDef),
    /// CREATE INDEX.
    CreateIndex(CreateIndexDef),
    /// SET IDENTITY_INSERT.
    ConfigIdentityInsert(ConfigIdentityInsertDef),
}

impl QueryDef {
    /// Returns `true` for a SELECT.
    #[must_use]
    pub const fn is_select(&self) -> bool {
        matches!(self, Self::Select(_))
    }

    /// Returns `true` for statements that never change data or schema.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::Select(_) | Self::GetDatabaseInfo { .. } | Self::GetTableInfo { .. }
        )
    }

    /// Short name of the statement kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Upsert(_) => "upsert",
            Self::Delete(_) => "delete",
            Self::CreateDatabaseIfNotExists { .. } => "createDatabaseIfNotExists",
            Self::ClearDatabaseIfExists { .. } => "clearDatabaseIfExists",
            Self::GetDatabaseInfo { .. } => "getDatabaseInfo",
            Self::GetTableInfo { .. } => "getTableInfo",
            Self::CreateTable(_) => "createTable",
            Self::DropTable { .. } => "dropTable",
            Self::AddColumn(_) => "addColumn",
            Self::RemoveColumn(_) => "removeColumn",
            Self::ModifyColumn(_) => "modifyColumn",
            Self::RenameColumn(_) => "renameColumn",
            Self::AddForeignKey(_) => "addForeignKey",
            Self::RemoveForeignKey(_) => "removeForeignKey",
            Self::CreateIndex(_) => "createIndex",
            Self::ConfigIdentityInsert(_) => "configIdentityInsert",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_round_trip_through_json() {
        let def = QueryDef::Select(
            SelectDef::table(TableName::qualified("DB", "dbo", "T"))
                .alias("[TBL]")
                .column("[id]", "[TBL].[id]")
                .where_tokens(vec![
                    QueryValue::raw("[TBL].[name] = "),
                    QueryValue::literal("it's"),
                ]),
        );
        let json = serde_json::to_string(&def).unwrap();
        let back: QueryDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
        assert!(json.contains(r#""type":"select""#));
    }

    #[test]
    fn test_read_only_kinds() {
        assert!(QueryDef::GetDatabaseInfo {
            database: String::from("DB")
        }
        .is_read_only());
        assert!(!QueryDef::DropTable {
            table: TableName::new("T")
        }
        .is_read_only());
    }
}
