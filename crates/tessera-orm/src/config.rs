//! Session configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tessera_core::dialect::{Dialect, MssqlDialect};

use crate::error::{OrmError, Result};

/// Settings of a [`DbContext`](crate::DbContext).
///
/// ```rust
/// use tessera_orm::ContextConfig;
///
/// let config = ContextConfig::from_json(r#"{"database": "Main", "schema": "dbo"}"#).unwrap();
/// assert_eq!(config.database.as_deref(), Some("Main"));
/// assert_eq!(config.select_cache_window_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Database used by tables that do not name one.
    pub database: Option<String>,
    /// Schema used by tables that do not name one.
    pub schema: Option<String>,
    /// SQL dialect. Only `"mssql"` is available.
    pub dialect: String,
    /// How long identical selects are answered from the session cache.
    /// Zero disables the cache.
    pub select_cache_window_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            database: None,
            schema: None,
            dialect: String::from("mssql"),
            select_cache_window_ms: 1000,
        }
    }
}

impl ContextConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| OrmError::Config(e.to_string()))
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

    /// Sets the select cache window.
    #[must_use]
    pub fn select_cache_window(mut self, window: Duration) -> Self {
        self.select_cache_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The select cache window.
    #[must_use]
    pub const fn cache_window(&self) -> Duration {
        Duration::from_millis(self.select_cache_window_ms)
    }

    /// Resolves the configured dialect.
    pub fn resolve_dialect(&self) -> Result<Arc<dyn Dialect>> {
        match self.dialect.to_ascii_lowercase().as_str() {
            "mssql" | "mssql-azure" => Ok(Arc::new(MssqlDialect)),
            other => Err(OrmError::Config(format!("unsupported dialect '{other}'"))),
        }
    }
}
