//! Defaults a graph resolves table names and identifiers against.

use std::sync::Arc;

use tessera_core::dialect::{Dialect, MssqlDialect};
use tessera_core::query::TableName;
use tessera_core::schema::TableMeta;

/// Root alias of every graph. Joins are aliased `TBL.<path>`.
pub const ROOT_ALIAS: &str = "TBL";

/// Database and schema defaults plus the dialect used for quoting.
///
/// A table whose metadata names no database or schema inherits the scope's.
#[derive(Debug, Clone)]
pub struct QueryScope {
    database: Option<String>,
    schema: Option<String>,
    dialect: Arc<dyn Dialect>,
}

impl Default for QueryScope {
    fn default() -> Self {
        Self::new(Arc::new(MssqlDialect))
    }
}

impl QueryScope {
    /// Creates a scope without defaults.
    #[must_use]
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            database: None,
            schema: None,
            dialect,
        }
    }

    /// Sets the default database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the default schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Default database.
    #[must_use]
    pub fn default_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Default schema.
    #[must_use]
    pub fn default_schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The dialect identifiers are quoted with.
    #[must_use]
    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Resolves the physical name of a table.
    #[must_use]
    pub fn table_name(&self, meta: &TableMeta) -> TableName {
        TableName {
            database: meta.database.clone().or_else(|| self.database.clone()),
            schema: meta.schema.clone().or_else(|| self.schema.clone()),
            name: meta.name.clone(),
        }
    }

    /// Resolves a table that has no metadata, such as `_migration`.
    #[must_use]
    pub fn named_table(&self, name: &str) -> TableName {
        TableName {
            database: self.database.clone(),
            schema: self.schema.clone(),
            name: name.to_string(),
        }
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Quoted alias of a graph at the given join path.
    #[must_use]
    pub fn alias(&self, path: Option<&str>) -> String {
        match path {
            Some(path) => self.quote(&format!("{ROOT_ALIAS}.{path}")),
            None => self.quote(ROOT_ALIAS),
        }
    }

    /// Quoted reference to `column` under the alias at `path`.
    #[must_use]
    pub fn column_ref(&self, path: Option<&str>, column: &str) -> String {
        format!("{}.{}", self.alias(path), self.quote(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        let scope = QueryScope::default();
        assert_eq!(scope.alias(None), "[TBL]");
        assert_eq!(scope.alias(Some("company.owner")), "[TBL.company.owner]");
        assert_eq!(scope.column_ref(Some("a"), "b.c"), "[TBL.a].[b.c]");
    }

    #[test]
    fn test_table_name_inherits_defaults() {
        let scope = QueryScope::default().database("Main").schema("dbo");
        let meta = TableMeta::builder("Employee").schema("hr").build();
        let name = scope.table_name(&meta);
        assert_eq!(name.database.as_deref(), Some("Main"));
        assert_eq!(name.schema.as_deref(), Some("hr"));
        assert_eq!(name.name, "Employee");
    }
}
