use indexmap::IndexMap;

use tessera_core::query::{DeleteDef, FromSource, InsertDef, UpdateDef, UpsertDef};
use tessera_core::schema::TableMeta;
use tessera_core::{QueryValue, TableName};

use super::QueryGraph;
use crate::error::{OrmError, Result};
use crate::record::Record;

#[derive(Debug, Clone, Copy)]
enum Clause {
    Join,
    Where,
    Distinct,
    Top,
    OrderBy,
    Limit,
    GroupBy,
    Having,
}

impl Clause {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Where => "WHERE",
            Self::Distinct => "DISTINCT",
            Self::Top => "TOP",
            Self::OrderBy => "ORDER BY",
            Self::Limit => "LIMIT",
            Self::GroupBy => "GROUP BY",
            Self::Having => "HAVING",
        }
    }
}

impl<T> QueryGraph<T> {
    fn has_clause(&self, clause: Clause) -> bool {
        let clauses = &*self.clauses;
        match clause {
            Clause::Join => !clauses.joins.is_empty(),
            Clause::Where => clauses.where_clause.is_some(),
            Clause::Distinct => clauses.distinct,
            Clause::Top => clauses.top.is_some(),
            Clause::OrderBy => !clauses.order_by.is_empty(),
            Clause::Limit => clauses.limit.is_some(),
            Clause::GroupBy => !clauses.group_by.is_empty(),
            Clause::Having => clauses.having.is_some(),
        }
    }

    fn write_target(
        &self,
        statement: &'static str,
        rejected: &[Clause],
    ) -> Result<(&'static TableMeta, TableName)> {
        let table = match (self.table, &self.clauses.from) {
            (Some(meta), Some(FromSource::Table(name))) => (meta, name.clone()),
            _ => return Err(OrmError::NoTable { statement }),
        };
        if self.custom {
            return Err(OrmError::IllegalClause {
                statement,
                clause: "SELECT",
            });
        }
        if let Some(clause) = rejected.iter().find(|clause| self.has_clause(**clause)) {
            return Err(OrmError::IllegalClause {
                statement,
                clause: clause.as_str(),
            });
        }
        Ok(table)
    }

    fn record_values(&self, meta: &TableMeta, record: &Record) -> Result<IndexMap<String, QueryValue>> {
        record
            .iter()
            .map(|(key, unit)| {
                let column = meta.column(key).ok_or_else(|| OrmError::UnknownColumn {
                    table: meta.name.clone(),
                    key: key.clone(),
                })?;
                Ok((self.scope.quote(&column.name), unit.value().clone()))
            })
            .collect()
    }

    fn output_columns(&self, meta: &TableMeta, output: &[&str]) -> Result<Vec<String>> {
        output
            .iter()
            .map(|key| {
                let column = meta.column(key).ok_or_else(|| OrmError::UnknownColumn {
                    table: meta.name.clone(),
                    key: (*key).to_string(),
                })?;
                let name = self.scope.quote(&column.name);
                Ok(if column.name == *key {
                    name
                } else {
                    format!("{name} as {}", self.scope.quote(key))
                })
            })
            .collect()
    }

    /// INSERT of one record. `output` names the columns returned for the
    /// inserted row.
    pub fn insert_def(&self, record: &Record, output: &[&str]) -> Result<InsertDef> {
        let (meta, from) = self.write_target(
            "INSERT",
            &[
                Clause::Join,
                Clause::Where,
                Clause::Distinct,
                Clause::Top,
                Clause::OrderBy,
                Clause::Limit,
                Clause::GroupBy,
                Clause::Having,
            ],
        )?;
        Ok(InsertDef {
            from,
            record: self.record_values(meta, record)?,
            output: self.output_columns(meta, output)?,
        })
    }

    /// UPDATE of the rows this graph selects. Record values may reference
    /// the entity, joined relations included.
    pub fn update_def(&self, record: &Record, output: &[&str]) -> Result<UpdateDef> {
        let (meta, from) = self.write_target(
            "UPDATE",
            &[Clause::OrderBy, Clause::Limit, Clause::GroupBy, Clause::Having],
        )?;
        Ok(UpdateDef {
            from,
            alias: self.quoted_alias(),
            top: self.clauses.top,
            record: self.record_values(meta, record)?,
            output: self.output_columns(meta, output)?,
            joins: self.clauses.joins.iter().map(|join| join.def.clone()).collect(),
            where_clause: self.clauses.where_clause.clone(),
        })
    }

    /// MERGE updating the rows matching the WHERE clause, or inserting one
    /// when none match. The insert record defaults to the update record.
    pub fn upsert_def(
        &self,
        update: &Record,
        insert: Option<&Record>,
        output: &[&str],
    ) -> Result<UpsertDef> {
        let (meta, from) = self.write_target(
            "UPSERT",
            &[
                Clause::Join,
                Clause::Distinct,
                Clause::Top,
                Clause::OrderBy,
                Clause::Limit,
                Clause::GroupBy,
                Clause::Having,
            ],
        )?;
        let where_clause = self
            .clauses
            .where_clause
            .clone()
            .ok_or(OrmError::UpsertWithoutWhere)?;
        let update_record = self.record_values(meta, update)?;
        let insert_record = match insert {
            Some(insert) => self.record_values(meta, insert)?,
            None => update_record.clone(),
        };
        Ok(UpsertDef {
            from,
            alias: self.quoted_alias(),
            where_clause,
            update_record,
            insert_record,
            output: self.output_columns(meta, output)?,
        })
    }

    /// DELETE of the rows this graph selects.
    pub fn delete_def(&self, output: &[&str]) -> Result<DeleteDef> {
        let (meta, from) = self.write_target(
            "DELETE",
            &[
                Clause::Distinct,
                Clause::OrderBy,
                Clause::Limit,
                Clause::GroupBy,
                Clause::Having,
            ],
        )?;
        Ok(DeleteDef {
            from,
            alias: self.quoted_alias(),
            top: self.clauses.top,
            output: self.output_columns(meta, output)?,
            joins: self.clauses.joins.iter().map(|join| join.def.clone()).collect(),
            where_clause: self.clauses.where_clause.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::{OrderDirection, QueryCompiler, QueryDef};

    use super::super::tests::employees;
    use super::*;
    use crate::entity::Entity;
    use crate::expr::{self, IntoUnit};

    fn compile(def: QueryDef) -> String {
        QueryCompiler::mssql().compile(&def).unwrap().remove(0)
    }

    #[test]
    fn test_insert_maps_physical_names() {
        let record = Record::new().set("name", "kim").set("age", 30);
        let def = employees().insert_def(&record, &["id", "name"]).unwrap();
        assert_eq!(
            compile(QueryDef::Insert(def)),
            "INSERT INTO [Main].[dbo].[Employee] ([fullName], [age])\n\
             OUTPUT INSERTED.[id], INSERTED.[fullName] as [name]\n\
             VALUES (N'kim', 30);"
        );
    }

    #[test]
    fn test_insert_rejects_where() {
        let result = employees()
            .where_clause(|e| vec![expr::equal(e.col("id"), 1)])
            .insert_def(&Record::new().set("name", "kim"), &[]);
        assert!(matches!(
            result,
            Err(OrmError::IllegalClause { statement: "INSERT", clause: "WHERE" })
        ));
    }

    #[test]
    fn test_insert_rejects_unknown_column() {
        let result = employees().insert_def(&Record::new().set("salary", 1), &[]);
        assert!(matches!(result, Err(OrmError::UnknownColumn { key, .. }) if key == "salary"));
    }

    #[test]
    fn test_update_with_expression() {
        let graph = employees().where_clause(|e| vec![expr::equal(e.col("id"), 3)]);
        let age = graph.entity().col("age");
        let record = Record::new().set(
            "age",
            expr::query(
                tessera_core::ValueType::Number,
                vec![age.into_value(), QueryValue::raw(" + "), 1.into_unit().into_value()],
            ),
        );
        let def = graph.update_def(&record, &[]).unwrap();
        assert_eq!(
            compile(QueryDef::Update(def)),
            "UPDATE [TBL] SET\n  [TBL].[age] = ([TBL].[age] + 1)\n\
             FROM [Main].[dbo].[Employee] as [TBL]\n\
             WHERE ([TBL].[id] = 3);"
        );
    }

    #[test]
    fn test_update_rejects_order_by() {
        let result = employees()
            .order_by(|e| e.col("id"), OrderDirection::Asc)
            .unwrap()
            .update_def(&Record::new().set("age", 1), &[]);
        assert!(matches!(
            result,
            Err(OrmError::IllegalClause { statement: "UPDATE", clause: "ORDER BY" })
        ));
    }

    #[test]
    fn test_writes_reject_custom_and_wrapped_graphs() {
        let custom = employees().select(|e| Entity::new().with("id", e.col("id")));
        assert!(matches!(
            custom.delete_def(&[]),
            Err(OrmError::IllegalClause { clause: "SELECT", .. })
        ));
        let wrapped = employees().wrap().unwrap();
        assert!(matches!(
            wrapped.delete_def(&[]),
            Err(OrmError::NoTable { statement: "DELETE" })
        ));
    }

    #[test]
    fn test_upsert_requires_where() {
        let result = employees().upsert_def(&Record::new().set("age", 1), None, &[]);
        assert!(matches!(result, Err(OrmError::UpsertWithoutWhere)));
    }

    #[test]
    fn test_upsert_defaults_insert_record() {
        let def = employees()
            .where_clause(|e| vec![expr::equal(e.col("name"), "kim")])
            .upsert_def(&Record::new().set("age", 5), None, &["id"])
            .unwrap();
        assert_eq!(def.update_record, def.insert_record);
        assert_eq!(
            compile(QueryDef::Upsert(def)),
            "MERGE [Main].[dbo].[Employee] as [TBL]\n\
             USING (SELECT 0 as _using) as _using\n\
             ON ([TBL].[fullName] = N'kim')\n\
             WHEN MATCHED THEN\n  UPDATE SET\n    [age] = 5\n\
             WHEN NOT MATCHED THEN\n  INSERT ([age])\n  VALUES (5)\n\
             OUTPUT INSERTED.[id];"
        );
    }

    #[test]
    fn test_delete_rejects_distinct() {
        let result = employees().distinct().delete_def(&[]);
        assert!(matches!(
            result,
            Err(OrmError::IllegalClause { statement: "DELETE", clause: "DISTINCT" })
        ));
    }

    #[test]
    fn test_delete_with_top() {
        let def = employees().top(2).delete_def(&["id"]).unwrap();
        assert_eq!(
            compile(QueryDef::Delete(def)),
            "DELETE TOP (2) [TBL]\nOUTPUT DELETED.[id]\nFROM [Main].[dbo].[Employee] as [TBL];"
        );
    }
}
