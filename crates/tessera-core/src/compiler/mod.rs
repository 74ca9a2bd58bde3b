//! Query definition to SQL text.
//!
//! [`QueryCompiler`] is a pure function of its input: no I/O, no metadata
//! lookups. Every identifier in the output has either been quoted by the
//! caller or passes through the dialect here.
//!
//! ```rust
//! use tessera_core::compiler::QueryCompiler;
//! use tessera_core::query::{QueryDef, SelectDef, TableName};
//!
//! let def = QueryDef::Select(
//!     SelectDef::table(TableName::qualified("DB", "S", "T")).column("[id1]", "[id]"),
//! );
//! let sql = QueryCompiler::mssql().compile(&def).unwrap();
//! assert_eq!(sql, vec!["SELECT\n  [id] as [id1]\nFROM [DB].[S].[T]"]);
//! ```

mod ddl;
mod write;

use std::sync::Arc;

use crate::dialect::{Dialect, MssqlDialect};
use crate::error::{QueryError, Result};
use crate::query::{FromSource, JoinStrategy, QueryDef, QueryValue, SelectDef};

/// Compiles definitions into statement text for one dialect.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    dialect: Arc<dyn Dialect>,
}

impl QueryCompiler {
    /// Creates a compiler for the given dialect.
    #[must_use]
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    /// Creates a compiler for SQL Server.
    #[must_use]
    pub fn mssql() -> Self {
        Self::new(Arc::new(MssqlDialect))
    }

    /// The dialect in use.
    #[must_use]
    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Compiles a definition. Most kinds produce one statement; column
    /// additions and modifications that backfill a default produce several.
    pub fn compile(&self, def: &QueryDef) -> Result<Vec<String>> {
        let single = match def {
            QueryDef::Select(def) => self.select(def)?,
            QueryDef::Insert(def) => self.insert(def)?,
            QueryDef::Update(def) => self.update(def)?,
            QueryDef::Upsert(def) => self.upsert(def)?,
            QueryDef::Delete(def) => self.delete(def)?,
            QueryDef::CreateDatabaseIfNotExists { database } => {
                self.create_database_if_not_exists(database)
            }
            QueryDef::ClearDatabaseIfExists { database } => self.clear_database_if_exists(database),
            QueryDef::GetDatabaseInfo { database } => self.get_database_info(database),
            QueryDef::GetTableInfo { table } => self.get_table_info(table),
            QueryDef::CreateTable(def) => self.create_table(def)?,
            QueryDef::DropTable { table } => self.drop_table(table)?,
            QueryDef::AddColumn(def) => return self.add_column(def),
            QueryDef::RemoveColumn(def) => self.remove_column(def)?,
            QueryDef::ModifyColumn(def) => return self.modify_column(def),
            QueryDef::RenameColumn(def) => self.rename_column(def),
            QueryDef::AddForeignKey(def) => self.add_foreign_key(def)?,
            QueryDef::RemoveForeignKey(def) => self.remove_foreign_key(def)?,
            QueryDef::CreateIndex(def) => self.create_index(def)?,
            QueryDef::ConfigIdentityInsert(def) => self.config_identity_insert(def)?,
        };
        Ok(vec![single])
    }

    /// Compiles a SELECT.
    pub fn select(&self, def: &SelectDef) -> Result<String> {
        if def.top.is_some() && def.limit.is_some() {
            return Err(QueryError::TopWithLimit);
        }

        let mut q = String::from("SELECT");
        if def.distinct {
            q.push_str(" DISTINCT");
        }
        if let Some(top) = def.top {
            q.push_str(&format!(" TOP {top}"));
        }

        match &def.select {
            Some(select) if !select.is_empty() => {
                q.push('\n');
                let columns = select
                    .iter()
                    .map(|(key, value)| match value {
                        QueryValue::Select(sub) => Ok(format!(
                            "  (\n    {}\n  ) as {key}",
                            indent(&self.select(sub)?, "    ")
                        )),
                        _ => Ok(format!("  {} as {key}", self.value(value)?)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                q.push_str(&columns.join(",\n"));
                q.push('\n');
            }
            _ => q.push_str(" *\n"),
        }

        if let Some(from) = &def.from {
            q.push_str("FROM ");
            q.push_str(&self.from_source(from)?);
            if let Some(alias) = &def.alias {
                q.push_str(&format!(" as {alias}"));
            }
            q.push('\n');
        }

        for join in &def.joins {
            q.push_str(&self.join(join)?);
            q.push('\n');
        }

        if let Some(tokens) = def.where_clause.as_ref().filter(|t| !t.is_empty()) {
            q.push_str(&format!("WHERE {}\n", self.tokens(tokens)?));
        }

        if !def.group_by.is_empty() {
            let group = def
                .group_by
                .iter()
                .map(|v| self.value(v))
                .collect::<Result<Vec<_>>>()?;
            q.push_str(&format!("GROUP BY {}\n", group.join(", ")));
        }

        if let Some(tokens) = def.having.as_ref().filter(|t| !t.is_empty()) {
            if def.group_by.is_empty() {
                return Err(QueryError::HavingWithoutGroupBy);
            }
            q.push_str(&format!("HAVING {}\n", self.tokens(tokens)?));
        }

        if !def.order_by.is_empty() {
            let order = def
                .order_by
                .iter()
                .map(|(v, dir)| Ok(format!("{} {}", self.value(v)?, dir.as_sql())))
                .collect::<Result<Vec<_>>>()?;
            q.push_str(&format!("ORDER BY {}\n", order.join(", ")));
        }

        if let Some(limit) = def.limit {
            if def.order_by.is_empty() {
                return Err(QueryError::LimitWithoutOrderBy);
            }
            q.push_str(&format!(
                "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY\n",
                limit.skip, limit.take
            ));
        }

        Ok(q.trim().to_string())
    }

    /// Renders one expression.
    pub fn value(&self, value: &QueryValue) -> Result<String> {
        Ok(match value {
            QueryValue::Raw(sql) => sql.clone(),
            QueryValue::Literal(literal) => self.dialect.render_literal(literal),
            QueryValue::Select(sub) => format!("(\n  {}\n)", indent(&self.select(sub)?, "  ")),
            QueryValue::Group(items) => format!("({})", self.tokens(items)?),
        })
    }

    /// Concatenates a token list.
    pub fn tokens(&self, tokens: &[QueryValue]) -> Result<String> {
        tokens.iter().map(|t| self.value(t)).collect()
    }

    fn from_source(&self, from: &FromSource) -> Result<String> {
        match from {
            FromSource::Table(table) => self.dialect.quote_table_name(table),
            FromSource::Select(sub) => Ok(format!("(\n  {}\n)", indent(&self.select(sub)?, "  "))),
            FromSource::Union(members) => self.union(members),
        }
    }

    fn union(&self, members: &[SelectDef]) -> Result<String> {
        if members.is_empty() {
            return Err(QueryError::EmptyUnion);
        }
        let parts = members
            .iter()
            .map(|m| Ok(format!("  {}", indent(&self.select(m)?, "  "))))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("(\n{}\n)", parts.join("\n\n  UNION ALL\n\n")))
    }

    /// Renders a join according to its [`JoinStrategy`].
    pub fn join(&self, join: &SelectDef) -> Result<String> {
        let alias = join.alias.as_ref().ok_or(QueryError::JoinWithoutAlias)?;
        match JoinStrategy::classify(join) {
            JoinStrategy::LeftOuterJoin => {
                let from = join.from.as_ref().ok_or(QueryError::MissingFrom)?;
                let on = match join.where_clause.as_ref().filter(|t| !t.is_empty()) {
                    Some(tokens) => self.tokens(tokens)?,
                    None => String::from("1 = 1"),
                };
                Ok(format!(
                    "LEFT OUTER JOIN {} as {alias} ON {on}",
                    self.from_source(from)?
                ))
            }
            JoinStrategy::OuterApply => Ok(format!(
                "OUTER APPLY (\n  {}\n) as {alias}",
                indent(&self.select(join)?, "  ")
            )),
        }
    }

    pub(crate) fn record_lists(
        &self,
        record: &indexmap::IndexMap<String, QueryValue>,
    ) -> Result<(String, String)> {
        let keys = record.keys().cloned().collect::<Vec<_>>().join(", ");
        let values = record
            .values()
            .map(|v| self.value(v))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok((keys, values))
    }
}

/// Prefixes every line after the first.
pub(crate) fn indent(text: &str, prefix: &str) -> String {
    text.replace('\n', &format!("\n{prefix}"))
}
