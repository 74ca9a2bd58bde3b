//! # tessera-core
//!
//! Schema metadata, a query definition IR and a SQL Server compiler.
//!
//! This crate provides:
//! - [`schema`]: table, column, foreign key and index metadata attached to
//!   model types through the [`Model`] trait
//! - [`query`]: plain data definitions for every supported statement
//! - [`compiler`]: a pure definition-to-text compiler
//! - [`dialect`]: identifier quoting, literal rendering and type names
//!
//! ## Compiling a definition
//!
//! ```rust
//! use tessera_core::compiler::QueryCompiler;
//! use tessera_core::query::{OrderDirection, QueryDef, QueryValue, SelectDef, TableName};
//!
//! let def = SelectDef::table(TableName::qualified("DB", "dbo", "Employee"))
//!     .alias("[TBL]")
//!     .column("[name]", "[TBL].[name]")
//!     .where_tokens(vec![QueryValue::raw("[TBL].[name] = "), QueryValue::literal("it's")])
//!     .order_by("[TBL].[name]", OrderDirection::Asc)
//!     .limit(0, 10);
//!
//! let sql = QueryCompiler::mssql().compile(&QueryDef::Select(def)).unwrap();
//! assert_eq!(
//!     sql[0],
//!     "SELECT\n  [TBL].[name] as [name]\nFROM [DB].[dbo].[Employee] as [TBL]\n\
//!      WHERE [TBL].[name] = N'it''s'\nORDER BY [TBL].[name] ASC\n\
//!      OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
//! );
//! ```

pub mod compiler;
pub mod dialect;
pub mod error;
pub mod query;
pub mod schema;
pub mod value;

pub use compiler::QueryCompiler;
pub use dialect::{Dialect, MssqlDialect};
pub use error::{QueryError, Result};
pub use query::{OrderDirection, QueryDef, QueryValue, SelectDef, TableName};
pub use schema::{Model, ModelRef, ModelRegistry, TableMeta, ValueType};
pub use value::{SqlValue, ToSqlValue};
