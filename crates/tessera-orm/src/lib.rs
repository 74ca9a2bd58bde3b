//! # tessera-orm
//!
//! Typed query graphs and an async session runtime over `tessera-core`.
//!
//! - [`graph`]: immutable, chainable selects over a model and its relations,
//!   plus the write definitions derived from them
//! - [`expr`]: predicates and value expressions used inside graph closures
//! - [`context`]: the [`DbContext`] session, its [`Executor`] boundary,
//!   transactions, prepared batches and the select cache
//! - [`migration`]: database initialization and named migrations
//! - [`result`]: reconstruction of nested objects from flat rows
//!
//! ## Example
//!
//! ```rust,ignore
//! use serde::{Deserialize, Serialize};
//! use tessera_orm::{expr, DbContext, Model, OrderDirection};
//!
//! #[derive(Debug, Model, Serialize, Deserialize)]
//! #[table(schema = "dbo")]
//! struct Employee {
//!     #[column(primary_key = 1, auto_increment)]
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! let ctx = DbContext::builder(executor).database("Main").model::<Employee>().build()?;
//! let names = ctx
//!     .connect(|db| async move {
//!         db.query::<Employee>()
//!             .where_clause(|e| vec![expr::starts_with(e.col("name"), "K")])
//!             .order_by(|e| e.col("name"), OrderDirection::Asc)?
//!             .result(&db)
//!             .await
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod expr;
pub mod graph;
pub mod migration;
pub mod record;
pub mod result;
pub mod scope;

pub use config::ContextConfig;
pub use context::{
    BulkColumn, DbContext, DbContextBuilder, Executor, IsolationLevel, SessionStatus,
};
pub use entity::{Entity, Field};
pub use error::{BoxError, OrmError, Result};
pub use expr::{IntoUnit, Predicate, QueryUnit};
pub use graph::QueryGraph;
pub use migration::Migration;
pub use record::Record;
pub use result::{ParseOption, Row};
pub use scope::QueryScope;

pub use tessera_core::{OrderDirection, QueryDef, TableName, ValueType};
pub use tessera_core::schema::{Model, ModelRef, ModelRegistry, Related, TableMeta};
pub use tessera_derive::Model;
