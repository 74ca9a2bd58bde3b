//! Database initialization and versioned migrations.
//!
//! Applied migrations are recorded by name in `[<database>].[dbo].[_migration]`
//! of the session's default database. [`DbContext::initialize`] either
//! applies the missing ones or, on a fresh or forced start, builds every
//! registered table and marks every migration as applied.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use tessera_core::query::{
    AddForeignKeyDef, ColumnChangeDef, ColumnDef, CreateIndexDef, CreateTableDef, ForeignKeyDef,
    IndexDef, KeyColumn,
};
use tessera_core::schema::{ColumnMeta, DataType, Length, TableMeta, ValueType};
use tessera_core::{OrderDirection, QueryDef, QueryValue};

use crate::context::{DbContext, SessionStatus};
use crate::error::{OrmError, Result};
use crate::graph::QueryGraph;
use crate::record::Record;
use crate::scope::QueryScope;

/// A named schema or data change, applied once per database.
///
/// Migrations run in ascending name order, so names usually start with a
/// sortable timestamp.
#[async_trait]
pub trait Migration: Send + Sync + 'static {
    /// Unique name, stored in `_migration` once applied.
    fn name(&self) -> &str;

    /// Applies the change through `ctx`, inside the migration transaction.
    async fn up(&self, ctx: &DbContext) -> Result<()>;
}

fn migration_table() -> &'static TableMeta {
    static META: OnceLock<TableMeta> = OnceLock::new();
    META.get_or_init(|| {
        TableMeta::builder("_migration")
            .schema("dbo")
            .column(
                ColumnMeta::new("code", ValueType::String)
                    .data_type(DataType::String(Some(Length::Fixed(255))))
                    .primary_key(1),
            )
            .build()
    })
}

#[derive(Debug, Deserialize)]
struct AppliedMigration {
    code: String,
}

fn column_def(scope: &QueryScope, column: &ColumnMeta) -> ColumnDef {
    ColumnDef {
        name: column.name.clone(),
        data_type: scope.dialect().column_type_name(column),
        nullable: column.nullable,
        auto_increment: column.auto_increment,
        default_value: None,
    }
}

fn physical_name(meta: &TableMeta, key: &str) -> Result<String> {
    meta.column(key)
        .map(|column| column.name.clone())
        .ok_or_else(|| OrmError::UnknownColumn {
            table: meta.name.clone(),
            key: key.to_string(),
        })
}

fn column_meta<'a>(meta: &'a TableMeta, key: &str) -> Result<&'a ColumnMeta> {
    meta.column(key).ok_or_else(|| OrmError::UnknownColumn {
        table: meta.name.clone(),
        key: key.to_string(),
    })
}

/// CREATE TABLE for a model, primary key included.
#[must_use]
pub fn create_table_def(scope: &QueryScope, meta: &TableMeta) -> CreateTableDef {
    CreateTableDef {
        table: scope.table_name(meta),
        columns: meta.columns.iter().map(|c| column_def(scope, c)).collect(),
        primary_keys: meta
            .primary_keys()
            .into_iter()
            .map(|column| KeyColumn {
                name: column.name.clone(),
                order: OrderDirection::Asc,
            })
            .collect(),
    }
}

/// One ADD CONSTRAINT per foreign key, each followed by an index over the
/// key columns named after the foreign key.
pub fn foreign_key_defs(scope: &QueryScope, meta: &TableMeta) -> Result<Vec<QueryDef>> {
    let table = scope.table_name(meta);
    let mut defs = Vec::with_capacity(meta.foreign_keys.len() * 2);
    for foreign_key in &meta.foreign_keys {
        let target = foreign_key.target.meta();
        let columns = foreign_key
            .columns
            .iter()
            .map(|key| physical_name(meta, key))
            .collect::<Result<Vec<_>>>()?;
        let target_columns: Vec<String> = target
            .primary_keys()
            .into_iter()
            .map(|column| column.name.clone())
            .collect();
        if columns.len() != target_columns.len() {
            return Err(OrmError::KeyLengthMismatch {
                table: meta.name.clone(),
                foreign_key: foreign_key.name.clone(),
                target: target.name.clone(),
                columns: columns.len(),
                primary_keys: target_columns.len(),
            });
        }

        let index = IndexDef {
            name: foreign_key.name.clone(),
            columns: columns
                .iter()
                .map(|name| KeyColumn {
                    name: name.clone(),
                    order: OrderDirection::Asc,
                })
                .collect(),
        };
        defs.push(QueryDef::AddForeignKey(AddForeignKeyDef {
            table: table.clone(),
            foreign_key: ForeignKeyDef {
                name: foreign_key.name.clone(),
                columns,
                target_table: scope.table_name(target),
                target_columns,
            },
        }));
        defs.push(QueryDef::CreateIndex(CreateIndexDef {
            table: table.clone(),
            index,
        }));
    }
    Ok(defs)
}

/// CREATE INDEX for every declared index of a model.
pub fn index_defs(scope: &QueryScope, meta: &TableMeta) -> Result<Vec<QueryDef>> {
    let table = scope.table_name(meta);
    meta.indexes
        .iter()
        .map(|index| {
            let columns = index
                .columns
                .iter()
                .map(|column| {
                    Ok(KeyColumn {
                        name: physical_name(meta, &column.property_key)?,
                        order: column.order,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(QueryDef::CreateIndex(CreateIndexDef {
                table: table.clone(),
                index: IndexDef {
                    name: index.name.clone(),
                    columns,
                },
            }))
        })
        .collect()
}

/// ALTER TABLE ADD for one model column. A NOT NULL column needs `default`
/// to backfill existing rows.
pub fn add_column_def(
    scope: &QueryScope,
    meta: &TableMeta,
    key: &str,
    default: Option<QueryValue>,
) -> Result<QueryDef> {
    let mut column = column_def(scope, column_meta(meta, key)?);
    column.default_value = default;
    Ok(QueryDef::AddColumn(ColumnChangeDef {
        table: scope.table_name(meta),
        column,
    }))
}

/// ALTER TABLE ALTER COLUMN to the model's current definition of a column.
pub fn modify_column_def(scope: &QueryScope, meta: &TableMeta, key: &str) -> Result<QueryDef> {
    Ok(QueryDef::ModifyColumn(ColumnChangeDef {
        table: scope.table_name(meta),
        column: column_def(scope, column_meta(meta, key)?),
    }))
}

impl DbContext {
    fn migration_graph(&self) -> QueryGraph<AppliedMigration> {
        QueryGraph::from_meta(Arc::clone(self.scope()), migration_table()).cast()
    }

    /// Creates or upgrades the databases.
    ///
    /// Unless `force` is set and when the default database already holds a
    /// `_migration` table, the registered migrations missing from it are
    /// applied in name order inside one transaction (the enclosing one, if
    /// any) and `false` is returned. Otherwise each database in `databases`
    /// (the default database when `None`) is cleared and recreated with every
    /// registered table located in it, and `true` is returned.
    ///
    /// Forced initialization cannot run inside a transaction.
    pub async fn initialize(&self, databases: Option<&[&str]>, force: bool) -> Result<bool> {
        if force && self.status() == SessionStatus::Transacting {
            return Err(OrmError::Session(String::from(
                "forced initialization cannot run inside a transaction",
            )));
        }
        let main = self
            .scope()
            .default_database()
            .map(str::to_string)
            .ok_or_else(|| OrmError::Session(String::from("no default database configured")))?;

        if !force
            && self.is_database_exists(&main).await?
            && self
                .is_table_exists(&self.scope().table_name(migration_table()))
                .await?
        {
            self.migrate().await?;
            return Ok(false);
        }

        let databases: Vec<String> = match databases {
            Some(databases) => databases.iter().map(ToString::to_string).collect(),
            None => vec![main],
        };
        if databases.is_empty() {
            return Err(OrmError::Session(String::from("no database to initialize")));
        }
        info!(databases = ?databases, force, "Initializing databases");
        self.create_databases(&databases).await?;
        Ok(true)
    }

    async fn migrate(&self) -> Result<()> {
        let applied: Vec<String> = self
            .migration_graph()
            .result(self)
            .await?
            .into_iter()
            .map(|row| row.code)
            .collect();
        let mut pending: Vec<Arc<dyn Migration>> = self
            .migrations()
            .iter()
            .filter(|migration| !applied.iter().any(|code| code == migration.name()))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        pending.sort_by(|a, b| a.name().cmp(b.name()));

        if self.status() == SessionStatus::Transacting {
            self.apply_migrations(&pending).await
        } else {
            self.transaction(|db| async move { db.apply_migrations(&pending).await })
                .await
        }
    }

    async fn apply_migrations(&self, pending: &[Arc<dyn Migration>]) -> Result<()> {
        let graph = self.migration_graph();
        for migration in pending {
            let name = migration.name().to_string();
            info!(migration = %name, "Applying migration");
            migration
                .up(self)
                .await
                .map_err(|e| OrmError::Migration {
                    name: name.clone(),
                    source: Box::new(e),
                })?;
            graph
                .insert(self, &[Record::new().set("code", name.as_str())])
                .await?;
            info!(migration = %name, "Migration applied");
        }
        Ok(())
    }

    async fn create_databases(&self, databases: &[String]) -> Result<()> {
        let scope = Arc::clone(self.scope());
        let tables: Vec<&'static TableMeta> = self
            .models()
            .iter()
            .map(|model| model.meta())
            .filter(|meta| {
                meta.database
                    .as_ref()
                    .is_none_or(|database| databases.contains(database))
            })
            .collect();

        let mut resets = Vec::with_capacity(databases.len() * 2);
        for database in databases {
            resets.push(QueryDef::ClearDatabaseIfExists {
                database: database.clone(),
            });
            resets.push(QueryDef::CreateDatabaseIfNotExists {
                database: database.clone(),
            });
        }

        let mut creates: Vec<QueryDef> = tables
            .iter()
            .map(|meta| QueryDef::CreateTable(create_table_def(&scope, meta)))
            .collect();
        creates.push(QueryDef::CreateTable(create_table_def(&scope, migration_table())));

        let mut foreign_keys = Vec::new();
        let mut indexes = Vec::new();
        for meta in &tables {
            foreign_keys.extend(foreign_key_defs(&scope, meta)?);
            indexes.extend(index_defs(&scope, meta)?);
        }

        for batch in [resets, creates, foreign_keys, indexes] {
            if batch.is_empty() {
                continue;
            }
            let options = vec![None; batch.len()];
            self.execute_defs(&batch, &options).await?;
        }

        let mut names: Vec<&str> = self.migrations().iter().map(|m| m.name()).collect();
        names.sort_unstable();
        let records: Vec<Record> = names
            .into_iter()
            .map(|name| Record::new().set("code", name))
            .collect();
        self.migration_graph().insert(self, &records).await?;

        info!(tables = tables.len(), "Databases initialized");
        Ok(())
    }
}
