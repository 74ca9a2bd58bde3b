//! Data modification definitions.
//!
//! Record keys and output columns are quoted column names.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{QueryValue, SelectDef, TableName};

/// `INSERT INTO ... VALUES`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertDef {
    /// Target table.
    pub from: TableName,
    /// Values keyed by quoted column name.
    pub record: IndexMap<String, QueryValue>,
    /// Columns returned through `OUTPUT INSERTED`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
}

/// `UPDATE ... SET ... FROM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDef {
    /// Target table.
    pub from: TableName,
    /// Alias of the target row.
    pub alias: String,
    /// `UPDATE TOP (n)`.
    pub top: Option<u64>,
    /// Assignments keyed by quoted column name.
    pub record: IndexMap<String, QueryValue>,
    /// Columns returned through `OUTPUT INSERTED`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    /// Joins available to the assignments and condition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<SelectDef>,
    /// WHERE tokens.
    pub where_clause: Option<Vec<QueryValue>>,
}

/// `MERGE` that updates the matched row or inserts a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertDef {
    /// Target table.
    pub from: TableName,
    /// Alias of the target row.
    pub alias: String,
    /// Match condition tokens.
    pub where_clause: Vec<QueryValue>,
    /// Assignments when matched. Empty skips the matched branch.
    pub update_record: IndexMap<String, QueryValue>,
    /// Values when not matched.
    pub insert_record: IndexMap<String, QueryValue>,
    /// Columns returned through `OUTPUT INSERTED`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
}

/// `DELETE ... FROM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteDef {
    /// Target table.
    pub from: TableName,
    /// Alias of the target row.
    pub alias: String,
    /// `DELETE TOP (n)`.
    pub top: Option<u64>,
    /// Columns returned through `OUTPUT DELETED`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    /// Joins available to the condition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<SelectDef>,
    /// WHERE tokens.
    pub where_clause: Option<Vec<QueryValue>>,
}
