//! Database and schema statements.
//!
//! Constraint and index names are derived from the qualified table name and
//! the logical name, so existing migrations can refer to them by name.

use super::QueryCompiler;
use crate::error::Result;
use crate::query::{
    AddForeignKeyDef, ColumnChangeDef, ColumnDef, ConfigIdentityInsertDef, CreateIndexDef,
    CreateTableDef, OrderDirection, RemoveColumnDef, RemoveForeignKeyDef, RenameColumnDef,
    TableName,
};

fn escape_text(text: &str) -> String {
    text.replace('\'', "''")
}

impl QueryCompiler {
    fn column_def(&self, column: &ColumnDef) -> String {
        let mut q = format!("{} {} ", self.dialect.quote_identifier(&column.name), column.data_type);
        if column.auto_increment {
            q.push_str("IDENTITY(1,1) ");
        }
        q.push_str(if column.nullable { "NULL" } else { "NOT NULL" });
        q
    }

    fn derived_name(&self, prefix: &str, table: &TableName, name: &str) -> Result<String> {
        let chain = self.dialect.table_name_chain(table)?;
        Ok(self
            .dialect
            .quote_identifier(&format!("{prefix}_{}_{name}", chain.join("_"))))
    }

    /// `IF NOT EXISTS ... CREATE DATABASE`.
    #[must_use]
    pub fn create_database_if_not_exists(&self, database: &str) -> String {
        format!(
            "IF NOT EXISTS(select * from sys.databases WHERE name='{}') CREATE DATABASE {}",
            escape_text(database),
            self.dialect.quote_identifier(database)
        )
    }

    /// Drops procedures, functions, views, foreign keys and tables of an
    /// existing database.
    #[must_use]
    pub fn clear_database_if_exists(&self, database: &str) -> String {
        let db = self.dialect.quote_identifier(database);
        let name = escape_text(database);
        format!(
            "IF EXISTS(select * from sys.databases WHERE name='{name}')
BEGIN
  DECLARE @sql NVARCHAR(MAX);
  SET @sql = N'';

  SELECT @sql = @sql + 'DROP PROCEDURE ' + QUOTENAME(SCHEMA_NAME(schema_id)) + '.' + QUOTENAME(o.name) +';' + CHAR(13) + CHAR(10)
  FROM {db}.sys.sql_modules m
  INNER JOIN {db}.sys.objects o ON m.object_id=o.object_id
  WHERE type_desc like '%PROCEDURE%'

  SELECT @sql = @sql + 'DROP FUNCTION {db}.' + QUOTENAME(SCHEMA_NAME(schema_id)) + '.' + QUOTENAME(o.name) + N';' + CHAR(13) + CHAR(10)
  FROM {db}.sys.sql_modules m
  INNER JOIN {db}.sys.objects o ON m.object_id=o.object_id
  WHERE type_desc like '%function%'

  SELECT @sql = @sql + 'DROP VIEW {db}.' + QUOTENAME(SCHEMA_NAME(schema_id)) + '.' + QUOTENAME(v.name) + N';' + CHAR(13) + CHAR(10)
  FROM {db}.sys.views v

  SELECT @sql = @sql + N'ALTER TABLE {db}.' + QUOTENAME(SCHEMA_NAME([tbl].schema_id)) + '.' + QUOTENAME([tbl].[name]) + N' DROP CONSTRAINT ' + QUOTENAME([obj].[name]) + N';' + CHAR(13) + CHAR(10)
  FROM {db}.sys.tables [tbl]
  INNER JOIN {db}.sys.objects AS [obj] ON [obj].[parent_object_id] = [tbl].[object_id] AND [obj].[type] = 'F'

  SELECT @sql = @sql + N'DROP TABLE {db}.' + QUOTENAME(SCHEMA_NAME(schema_id)) + '.' + QUOTENAME([tbl].[name]) + N';' + CHAR(13) + CHAR(10)
  FROM {db}.sys.tables [tbl]
  WHERE [type]= 'U'

  EXEC(@sql);
END"
        )
    }

    /// Catalog probe for a database.
    #[must_use]
    pub fn get_database_info(&self, database: &str) -> String {
        format!(
            "SELECT * FROM master.dbo.sysdatabases WHERE name='{}'",
            escape_text(database)
        )
    }

    /// Catalog probe for a table.
    #[must_use]
    pub fn get_table_info(&self, table: &TableName) -> String {
        let catalog = table
            .database
            .as_deref()
            .map(|db| format!("{}.", self.dialect.quote_identifier(db)))
            .unwrap_or_default();
        format!(
            "SELECT * FROM {catalog}INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA='{}' AND TABLE_NAME='{}'",
            escape_text(table.schema.as_deref().unwrap_or("dbo")),
            escape_text(&table.name)
        )
    }

    /// `CREATE TABLE` with an optional named primary key.
    pub fn create_table(&self, def: &CreateTableDef) -> Result<String> {
        let table = self.dialect.quote_table_name(&def.table)?;
        let mut q = format!("CREATE TABLE {table} (\n");
        let columns = def
            .columns
            .iter()
            .map(|c| format!("  {}", self.column_def(c)))
            .collect::<Vec<_>>();
        q.push_str(&columns.join(",\n"));
        if def.primary_keys.is_empty() {
            q.push('\n');
        } else {
            let keys = def
                .primary_keys
                .iter()
                .map(|k| {
                    let name = self.dialect.quote_identifier(&k.name);
                    match k.order {
                        OrderDirection::Asc => name,
                        OrderDirection::Desc => format!("{name} DESC"),
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            q.push_str(&format!(
                ",\n  CONSTRAINT {} PRIMARY KEY ({keys})\n",
                self.dialect
                    .quote_identifier(&format!("PK_{}", def.table.name))
            ));
        }
        q.push_str(");");
        Ok(q.trim().to_string())
    }

    /// `DROP TABLE`.
    pub fn drop_table(&self, table: &TableName) -> Result<String> {
        Ok(format!("DROP TABLE {}", self.dialect.quote_table_name(table)?))
    }

    /// Adds a column. A NOT NULL column with a default is added nullable,
    /// backfilled, then tightened.
    pub fn add_column(&self, def: &ColumnChangeDef) -> Result<Vec<String>> {
        let table = self.dialect.quote_table_name(&def.table)?;
        let column = &def.column;
        match (&column.default_value, column.nullable) {
            (Some(default), false) => {
                let loose = ColumnDef {
                    nullable: true,
                    ..column.clone()
                };
                Ok(vec![
                    format!("ALTER TABLE {table} ADD {}", self.column_def(&loose)),
                    format!(
                        "UPDATE {table} SET {} = {}",
                        self.dialect.quote_identifier(&column.name),
                        self.value(default)?
                    ),
                    format!("ALTER TABLE {table} ALTER COLUMN {}", self.column_def(column)),
                ])
            }
            _ => Ok(vec![format!(
                "ALTER TABLE {table} ADD {}",
                self.column_def(column)
            )]),
        }
    }

    /// `ALTER TABLE ... DROP COLUMN`.
    pub fn remove_column(&self, def: &RemoveColumnDef) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.dialect.quote_table_name(&def.table)?,
            self.dialect.quote_identifier(&def.column)
        ))
    }

    /// Alters a column. Making a column NOT NULL with a default first fills
    /// existing NULLs.
    pub fn modify_column(&self, def: &ColumnChangeDef) -> Result<Vec<String>> {
        let table = self.dialect.quote_table_name(&def.table)?;
        let column = &def.column;
        let mut queries = Vec::new();
        if let (Some(default), false) = (&column.default_value, column.nullable) {
            let loose = ColumnDef {
                nullable: true,
                ..column.clone()
            };
            let name = self.dialect.quote_identifier(&column.name);
            queries.push(format!(
                "ALTER TABLE {table} ALTER COLUMN {}",
                self.column_def(&loose)
            ));
            queries.push(format!(
                "UPDATE {table} SET {name} = {} WHERE {name} IS NULL",
                self.value(default)?
            ));
        }
        queries.push(format!(
            "ALTER TABLE {table} ALTER COLUMN {}",
            self.column_def(column)
        ));
        Ok(queries)
    }

    /// Renames a column through `sp_rename`.
    #[must_use]
    pub fn rename_column(&self, def: &RenameColumnDef) -> String {
        let procedure = def.table.database.as_deref().map_or_else(
            || String::from("sp_rename"),
            |db| format!("{}..sp_rename", self.dialect.quote_identifier(db)),
        );
        let mut object = String::new();
        if let Some(schema) = &def.table.schema {
            object.push_str(schema);
            object.push('.');
        }
        object.push_str(&def.table.name);
        format!(
            "EXECUTE {procedure} N'{}.{}', N'{}', 'COLUMN'",
            escape_text(&object),
            escape_text(&self.dialect.quote_identifier(&def.previous)),
            escape_text(&def.next)
        )
    }

    /// Adds a foreign key named `FK_<chain>_<name>`.
    pub fn add_foreign_key(&self, def: &AddForeignKeyDef) -> Result<String> {
        let table = self.dialect.quote_table_name(&def.table)?;
        let fk = &def.foreign_key;
        let name = self.derived_name("FK", &def.table, &fk.name)?;
        let target = self.dialect.quote_table_name(&fk.target_table)?;
        let quote_all = |columns: &[String]| {
            columns
                .iter()
                .map(|c| self.dialect.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut q = format!(
            "ALTER TABLE {table} ADD CONSTRAINT {name} FOREIGN KEY ({})\n",
            quote_all(&fk.columns)
        );
        q.push_str(&format!(
            "  REFERENCES {target} ({})\n",
            quote_all(&fk.target_columns)
        ));
        q.push_str("  ON DELETE NO ACTION\n");
        q.push_str("  ON UPDATE NO ACTION");
        Ok(q)
    }

    /// Drops a foreign key by its logical name.
    pub fn remove_foreign_key(&self, def: &RemoveForeignKeyDef) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.dialect.quote_table_name(&def.table)?,
            self.derived_name("FK", &def.table, &def.name)?
        ))
    }

    /// Creates an index named `IDX_<chain>_<name>`.
    pub fn create_index(&self, def: &CreateIndexDef) -> Result<String> {
        let columns = def
            .index
            .columns
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    self.dialect.quote_identifier(&c.name),
                    c.order.as_sql()
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "CREATE INDEX {} ON {} ({columns})",
            self.derived_name("IDX", &def.table, &def.index.name)?,
            self.dialect.quote_table_name(&def.table)?
        ))
    }

    /// `SET IDENTITY_INSERT ... ON|OFF`.
    pub fn config_identity_insert(&self, def: &ConfigIdentityInsertDef) -> Result<String> {
        Ok(format!(
            "SET IDENTITY_INSERT {} {}",
            self.dialect.quote_table_name(&def.table)?,
            if def.enabled { "ON" } else { "OFF" }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ForeignKeyDef, IndexDef, KeyColumn, QueryDef, QueryValue};

    fn table() -> TableName {
        TableName::qualified("DB", "dbo", "Employee")
    }

    fn column(name: &str, nullable: bool) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            data_type: String::from("BIGINT"),
            nullable,
            auto_increment: false,
            default_value: None,
        }
    }

    #[test]
    fn test_create_table_with_primary_key() {
        let def = CreateTableDef {
            table: table(),
            columns: vec![
                ColumnDef {
                    auto_increment: true,
                    ..column("id", false)
                },
                ColumnDef {
                    data_type: String::from("NVARCHAR(255)"),
                    ..column("name", true)
                },
            ],
            primary_keys: vec![KeyColumn {
                name: String::from("id"),
                order: OrderDirection::Asc,
            }],
        };
        assert_eq!(
            QueryCompiler::mssql().create_table(&def).unwrap(),
            "CREATE TABLE [DB].[dbo].[Employee] (\n\
             \x20 [id] BIGINT IDENTITY(1,1) NOT NULL,\n\
             \x20 [name] NVARCHAR(255) NULL,\n\
             \x20 CONSTRAINT [PK_Employee] PRIMARY KEY ([id])\n\
             );"
        );
    }

    #[test]
    fn test_create_table_without_primary_key() {
        let def = CreateTableDef {
            table: TableName::new("Log"),
            columns: vec![column("seq", false)],
            primary_keys: Vec::new(),
        };
        assert_eq!(
            QueryCompiler::mssql().create_table(&def).unwrap(),
            "CREATE TABLE [Log] (\n  [seq] BIGINT NOT NULL\n);"
        );
    }

    #[test]
    fn test_add_not_null_column_with_default_expands() {
        let def = ColumnChangeDef {
            table: table(),
            column: ColumnDef {
                default_value: Some(QueryValue::literal(0)),
                ..column("age", false)
            },
        };
        assert_eq!(
            QueryCompiler::mssql().add_column(&def).unwrap(),
            vec![
                "ALTER TABLE [DB].[dbo].[Employee] ADD [age] BIGINT NULL",
                "UPDATE [DB].[dbo].[Employee] SET [age] = 0",
                "ALTER TABLE [DB].[dbo].[Employee] ALTER COLUMN [age] BIGINT NOT NULL",
            ]
        );
    }

    #[test]
    fn test_add_nullable_column_is_single_statement() {
        let def = ColumnChangeDef {
            table: table(),
            column: column("age", true),
        };
        assert_eq!(
            QueryCompiler::mssql().add_column(&def).unwrap(),
            vec!["ALTER TABLE [DB].[dbo].[Employee] ADD [age] BIGINT NULL"]
        );
    }

    #[test]
    fn test_modify_column_backfills_nulls() {
        let def = ColumnChangeDef {
            table: table(),
            column: ColumnDef {
                default_value: Some(QueryValue::literal(0)),
                ..column("age", false)
            },
        };
        assert_eq!(
            QueryCompiler::mssql().modify_column(&def).unwrap(),
            vec![
                "ALTER TABLE [DB].[dbo].[Employee] ALTER COLUMN [age] BIGINT NULL",
                "UPDATE [DB].[dbo].[Employee] SET [age] = 0 WHERE [age] IS NULL",
                "ALTER TABLE [DB].[dbo].[Employee] ALTER COLUMN [age] BIGINT NOT NULL",
            ]
        );
    }

    #[test]
    fn test_generated_names() {
        let compiler = QueryCompiler::mssql();
        let fk = AddForeignKeyDef {
            table: table(),
            foreign_key: ForeignKeyDef {
                name: String::from("company"),
                columns: vec![String::from("companyId")],
                target_table: TableName::qualified("DB", "dbo", "Company"),
                target_columns: vec![String::from("id")],
            },
        };
        assert_eq!(
            compiler.add_foreign_key(&fk).unwrap(),
            "ALTER TABLE [DB].[dbo].[Employee] ADD CONSTRAINT [FK_DB_dbo_Employee_company] FOREIGN KEY ([companyId])\n\
             \x20 REFERENCES [DB].[dbo].[Company] ([id])\n\
             \x20 ON DELETE NO ACTION\n\
             \x20 ON UPDATE NO ACTION"
        );
        assert_eq!(
            compiler
                .remove_foreign_key(&RemoveForeignKeyDef {
                    table: table(),
                    name: String::from("company"),
                })
                .unwrap(),
            "ALTER TABLE [DB].[dbo].[Employee] DROP CONSTRAINT [FK_DB_dbo_Employee_company]"
        );
        let index = CreateIndexDef {
            table: table(),
            index: IndexDef {
                name: String::from("company"),
                columns: vec![KeyColumn {
                    name: String::from("companyId"),
                    order: OrderDirection::Asc,
                }],
            },
        };
        assert_eq!(
            compiler.create_index(&index).unwrap(),
            "CREATE INDEX [IDX_DB_dbo_Employee_company] ON [DB].[dbo].[Employee] ([companyId] ASC)"
        );
    }

    #[test]
    fn test_rename_column() {
        let def = RenameColumnDef {
            table: table(),
            previous: String::from("name"),
            next: String::from("fullName"),
        };
        assert_eq!(
            QueryCompiler::mssql().rename_column(&def),
            "EXECUTE [DB]..sp_rename N'dbo.Employee.[name]', N'fullName', 'COLUMN'"
        );
    }

    #[test]
    fn test_database_statements() {
        let compiler = QueryCompiler::mssql();
        assert_eq!(
            compiler.create_database_if_not_exists("DB"),
            "IF NOT EXISTS(select * from sys.databases WHERE name='DB') CREATE DATABASE [DB]"
        );
        assert_eq!(
            compiler.get_database_info("DB"),
            "SELECT * FROM master.dbo.sysdatabases WHERE name='DB'"
        );
        assert_eq!(
            compiler.get_table_info(&table()),
            "SELECT * FROM [DB].INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA='dbo' AND TABLE_NAME='Employee'"
        );
        let clear = compiler.clear_database_if_exists("DB");
        assert!(clear.starts_with("IF EXISTS(select * from sys.databases WHERE name='DB')"));
        assert!(clear.contains("FROM [DB].sys.tables [tbl]"));
        assert!(clear.ends_with("EXEC(@sql);\nEND"));
    }

    #[test]
    fn test_identity_insert_and_drop() {
        let compiler = QueryCompiler::mssql();
        assert_eq!(
            compiler
                .compile(&QueryDef::ConfigIdentityInsert(ConfigIdentityInsertDef {
                    table: table(),
                    enabled: true,
                }))
                .unwrap(),
            vec!["SET IDENTITY_INSERT [DB].[dbo].[Employee] ON"]
        );
        assert_eq!(
            compiler.drop_table(&table()).unwrap(),
            "DROP TABLE [DB].[dbo].[Employee]"
        );
    }
}
