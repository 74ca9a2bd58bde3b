use serde_json::Value;

use tessera_core::schema::{Model, TableMeta};
use tessera_core::{OrderDirection, QueryValue};

use super::{JoinEntry, QueryGraph};
use crate::entity::{Entity, Field};
use crate::error::{OrmError, Result};
use crate::expr::{Predicate, QueryUnit};

impl<T> QueryGraph<T> {
    /// Joins the rows of `J` as an array under `path`.
    ///
    /// The closure receives a graph over `J` aliased at the join path and
    /// the current entity, and returns the joined graph, usually with a
    /// correlating `where_clause`. Joining a path that is already joined
    /// leaves the graph unchanged.
    pub fn join<J, R, F>(self, path: &str, f: F) -> Result<Self>
    where
        J: Model,
        F: FnOnce(QueryGraph<J>, &Entity) -> Result<QueryGraph<R>>,
    {
        self.join_meta(path, J::table_meta(), false, |graph, entity| {
            f(graph.cast(), entity)
        })
    }

    /// Joins at most one row of `J` as an object under `path`.
    pub fn join_single<J, R, F>(self, path: &str, f: F) -> Result<Self>
    where
        J: Model,
        F: FnOnce(QueryGraph<J>, &Entity) -> Result<QueryGraph<R>>,
    {
        self.join_meta(path, J::table_meta(), true, |graph, entity| {
            f(graph.cast(), entity)
        })
    }

    /// Joins the distinct union of several graphs as an array under `path`.
    ///
    /// The closure gets the same base graph as [`QueryGraph::join`] and
    /// returns the members; clone the base graph to build each one.
    pub fn join_union<J, R, F>(self, path: &str, f: F) -> Result<Self>
    where
        J: Model,
        F: FnOnce(QueryGraph<J>, &Entity) -> Result<Vec<QueryGraph<R>>>,
    {
        self.join_union_meta(path, J::table_meta(), false, f)
    }

    /// Joins at most one row of the distinct union of several graphs.
    pub fn join_single_union<J, R, F>(self, path: &str, f: F) -> Result<Self>
    where
        J: Model,
        F: FnOnce(QueryGraph<J>, &Entity) -> Result<Vec<QueryGraph<R>>>,
    {
        self.join_union_meta(path, J::table_meta(), true, f)
    }

    fn join_union_meta<J, R, F>(
        self,
        path: &str,
        meta: &'static TableMeta,
        single: bool,
        f: F,
    ) -> Result<Self>
    where
        F: FnOnce(QueryGraph<J>, &Entity) -> Result<Vec<QueryGraph<R>>>,
    {
        self.join_meta(path, meta, single, |graph, entity| {
            let alias = graph.alias.clone();
            let members = f(graph.cast(), entity)?;
            Ok(QueryGraph::union_at(members, alias)?.distinct())
        })
    }

    fn join_meta<R, F>(
        self,
        path: &str,
        meta: &'static TableMeta,
        single: bool,
        f: F,
    ) -> Result<Self>
    where
        F: FnOnce(QueryGraph<Value>, &Entity) -> Result<QueryGraph<R>>,
    {
        let full = self.join_path(path);
        let alias = self.scope.alias(Some(&full));
        if self
            .clauses
            .joins
            .iter()
            .any(|join| join.def.alias.as_deref() == Some(alias.as_str()))
        {
            return Ok(self);
        }

        let base = QueryGraph::at(std::sync::Arc::clone(&self.scope), meta, Some(full));
        let joined = f(base, &self.entity)?;
        self.attach(path, joined, single)
    }

    fn join_path(&self, path: &str) -> String {
        match &self.alias {
            Some(alias) => format!("{alias}.{path}"),
            None => path.to_string(),
        }
    }

    fn attach<R>(mut self, path: &str, joined: QueryGraph<R>, single: bool) -> Result<Self> {
        let clauses = &*joined.clauses;
        let plain = !joined.custom
            && clauses.joins.is_empty()
            && !clauses.distinct
            && clauses.top.is_none()
            && clauses.group_by.is_empty()
            && clauses.having.is_none()
            && clauses.order_by.is_empty()
            && clauses.limit.is_none();

        let mut def = joined.select_def()?;
        let entity = if plain {
            def.select = None;
            joined.entity.as_ref().clone()
        } else {
            joined.entity.repoint(&self.scope, joined.alias.as_deref())
        };

        let field = if single {
            Field::Single(entity)
        } else {
            Field::Many(entity)
        };
        if !self.entity_mut().set_chain(path, field) {
            return Err(OrmError::UnknownRelation {
                table: self.label(),
                path: path.to_string(),
            });
        }

        self.custom |= joined.custom;
        self.clauses_mut().joins.push(JoinEntry { def, single });
        Ok(self)
    }

    fn label(&self) -> String {
        self.table
            .map_or_else(|| self.quoted_alias(), |meta| meta.name.clone())
    }

    /// Joins a relation declared in the model metadata, following a dotted
    /// path such as `"company.owner"`.
    ///
    /// A foreign key joins the referenced row as an object; a foreign key
    /// target joins the referencing rows as an array. Relations already
    /// joined are reused.
    pub fn include(self, path: &str) -> Result<Self> {
        let mut graph = self;
        let mut meta = graph.table.ok_or(OrmError::IncludeAfterWrap)?;
        let mut parent = String::new();

        for key in path.split('.') {
            let current = if parent.is_empty() {
                key.to_string()
            } else {
                format!("{parent}.{key}")
            };

            if let Some(fk) = meta.foreign_key(key) {
                let target = fk.target.meta();
                let primary_keys = target.primary_keys();
                if primary_keys.len() != fk.columns.len() {
                    return Err(OrmError::KeyLengthMismatch {
                        table: meta.name.clone(),
                        foreign_key: fk.name.clone(),
                        target: target.name.clone(),
                        columns: fk.columns.len(),
                        primary_keys: primary_keys.len(),
                    });
                }
                let pairs: Vec<(String, String)> = primary_keys
                    .iter()
                    .map(|pk| pk.property_key.clone())
                    .zip(fk.columns.iter().cloned())
                    .collect();
                let scope = parent.clone();
                graph = graph.join_meta(&current, target, true, move |joined, entity| {
                    let owner = relation(entity, &scope, meta)?;
                    let conditions = key_conditions(&joined, target, owner, meta, &pairs)?;
                    Ok(joined.where_clause(|_| conditions))
                })?;
                meta = target;
            } else if let Some(fkt) = meta.foreign_key_target(key) {
                let source = fkt.source.meta();
                let fk = source.foreign_key(&fkt.foreign_key).ok_or_else(|| {
                    OrmError::UnknownRelation {
                        table: source.name.clone(),
                        path: fkt.foreign_key.clone(),
                    }
                })?;
                let primary_keys = meta.primary_keys();
                if primary_keys.len() != fk.columns.len() {
                    return Err(OrmError::KeyLengthMismatch {
                        table: source.name.clone(),
                        foreign_key: fk.name.clone(),
                        target: meta.name.clone(),
                        columns: fk.columns.len(),
                        primary_keys: primary_keys.len(),
                    });
                }
                let pairs: Vec<(String, String)> = fk
                    .columns
                    .iter()
                    .cloned()
                    .zip(primary_keys.iter().map(|pk| pk.property_key.clone()))
                    .collect();
                let scope = parent.clone();
                graph = graph.join_meta(&current, source, false, move |joined, entity| {
                    let owner = relation(entity, &scope, meta)?;
                    let conditions = key_conditions(&joined, source, owner, meta, &pairs)?;
                    Ok(joined.where_clause(|_| conditions))
                })?;
                meta = source;
            } else {
                return Err(OrmError::UnknownRelation {
                    table: meta.name.clone(),
                    path: current,
                });
            }

            parent = current;
        }
        Ok(graph)
    }

    /// Orders by a column reached through relations, such as
    /// `"company.owner.name"`, including the relations first when they are
    /// not joined yet.
    pub fn order_by_path(self, path: &str, direction: OrderDirection) -> Result<Self> {
        let mut graph = self;
        if let Some((relations, _)) = path.rsplit_once('.') {
            if graph.entity.try_rel(relations).is_none() {
                graph = graph.include(relations)?;
            }
        }
        let unit = graph
            .entity
            .try_col(path)
            .cloned()
            .ok_or_else(|| OrmError::UnknownColumn {
                table: graph.label(),
                key: path.to_string(),
            })?;
        graph.push_order(unit.into_value(), direction)?;
        Ok(graph)
    }
}

fn relation<'a>(entity: &'a Entity, path: &str, meta: &TableMeta) -> Result<&'a Entity> {
    entity.chain(path).ok_or_else(|| OrmError::UnknownRelation {
        table: meta.name.clone(),
        path: path.to_string(),
    })
}

/// `joined.<left> = owner.<right>` for every key pair.
fn key_conditions(
    joined: &QueryGraph<Value>,
    joined_meta: &TableMeta,
    owner: &Entity,
    owner_meta: &TableMeta,
    pairs: &[(String, String)],
) -> Result<Vec<Predicate>> {
    pairs
        .iter()
        .map(|(left, right)| {
            let left = column(joined.entity(), joined_meta, left)?;
            let right = column(owner, owner_meta, right)?;
            Ok(Predicate::new(vec![
                left.into_value(),
                QueryValue::raw(" = "),
                right.into_value(),
            ]))
        })
        .collect()
}

fn column(entity: &Entity, meta: &TableMeta, key: &str) -> Result<QueryUnit> {
    entity
        .try_col(key)
        .cloned()
        .ok_or_else(|| OrmError::UnknownColumn {
            table: meta.name.clone(),
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use tessera_core::query::FromSource;
    use tessera_core::{QueryCompiler, SelectDef};

    use super::super::tests::{employees, sql, Company, Employee};
    use super::*;
    use crate::expr;
    use crate::scope::QueryScope;

    fn companies() -> QueryGraph<Company> {
        QueryGraph::new(std::sync::Arc::new(
            QueryScope::default().database("Main").schema("dbo"),
        ))
    }

    #[test]
    fn test_include_foreign_key_is_left_outer_join() {
        let graph = employees().include("company").unwrap();
        assert_eq!(
            sql(&graph),
            "SELECT\n  [TBL].[id] as [id],\n  [TBL].[fullName] as [name],\n  \
             [TBL].[age] as [age],\n  [TBL].[companyId] as [companyId],\n  \
             [TBL.company].[id] as [company.id],\n  [TBL.company].[name] as [company.name]\n\
             FROM [Main].[dbo].[Employee] as [TBL]\n\
             LEFT OUTER JOIN [Main].[dbo].[Company] as [TBL.company] \
             ON ([TBL.company].[id] = [TBL].[companyId])"
        );
        assert_eq!(
            graph.entity().relations(),
            vec![(String::from("company"), true)]
        );
    }

    #[test]
    fn test_include_foreign_key_target_is_collection() {
        let graph = companies().include("employees").unwrap();
        assert_eq!(
            graph.entity().relations(),
            vec![(String::from("employees"), false)]
        );
        assert_eq!(
            graph.entity().col("employees.name"),
            QueryUnit::raw(tessera_core::ValueType::String, "[TBL.employees].[fullName]")
        );
        assert!(sql(&graph).contains(
            "ON ([TBL.employees].[companyId] = [TBL].[id])"
        ));
    }

    #[test]
    fn test_include_chains_paths() {
        let graph = companies().include("employees.company").unwrap();
        let def = graph.select_def().unwrap();
        assert_eq!(def.joins.len(), 2);
        assert_eq!(def.joins[1].alias.as_deref(), Some("[TBL.employees.company]"));
        assert_eq!(
            graph.entity().col("employees.company.name"),
            QueryUnit::raw(
                tessera_core::ValueType::String,
                "[TBL.employees.company].[name]"
            )
        );
    }

    #[test]
    fn test_include_twice_is_noop() {
        let once = employees().include("company").unwrap();
        let twice = once.clone().include("company").unwrap();
        assert_eq!(
            once.select_def().unwrap(),
            twice.select_def().unwrap()
        );
    }

    #[test]
    fn test_include_unknown_relation_fails() {
        let result = employees().include("manager");
        assert!(matches!(result, Err(OrmError::UnknownRelation { path, .. }) if path == "manager"));
    }

    #[test]
    fn test_include_after_wrap_fails() {
        let result = employees().wrap().unwrap().include("company");
        assert!(matches!(result, Err(OrmError::IncludeAfterWrap)));
    }

    #[test]
    fn test_shaped_join_is_outer_apply() {
        let graph = companies()
            .join_single::<Employee, _, _>("oldest", |joined, company| {
                joined
                    .where_clause(|e| vec![expr::equal(e.col("companyId"), company.col("id"))])
                    .order_by(|e| e.col("age"), OrderDirection::Desc)
                    .map(|graph| graph.top(1))
            })
            .unwrap();
        assert_eq!(
            graph.entity().col("oldest.name"),
            QueryUnit::raw(tessera_core::ValueType::String, "[TBL.oldest].[name]")
        );
        let text = sql(&graph);
        assert!(text.contains("OUTER APPLY (\n  SELECT TOP 1\n"));
        assert!(text.contains("[TBL.oldest].[fullName] as [name]"));
        assert!(text.contains(") as [TBL.oldest]"));
    }

    #[test]
    fn test_join_union_is_distinct() {
        let graph = companies()
            .join_union::<Employee, _, _>("people", |base, company| {
                let young = base
                    .clone()
                    .where_clause(|e| vec![expr::less_than(e.col("age"), 30)]);
                let linked = base.where_clause(|e| {
                    vec![expr::equal(e.col("companyId"), company.col("id"))]
                });
                Ok(vec![young, linked])
            })
            .unwrap();
        let def = graph.select_def().unwrap();
        let join: &SelectDef = &def.joins[0];
        assert!(join.distinct);
        assert!(matches!(&join.from, Some(FromSource::Union(members)) if members.len() == 2));
        assert_eq!(
            graph.entity().col("people.name"),
            QueryUnit::raw(tessera_core::ValueType::String, "[TBL.people].[name]")
        );
        assert!(QueryCompiler::mssql().select(&def).is_ok());
    }

    #[test]
    fn test_limit_with_collection_join_fails() {
        let result = companies()
            .include("employees")
            .unwrap()
            .order_by(|e| e.col("id"), OrderDirection::Asc)
            .unwrap()
            .limit(0, 10)
            .select_def();
        assert!(matches!(result, Err(OrmError::LimitWithCollectionJoin)));
    }

    #[test]
    fn test_limit_with_nested_collection_join_fails() {
        let graph = employees()
            .join_single::<Company, _, _>("employer", |joined, employee| {
                joined
                    .where_clause(|c| vec![expr::equal(c.col("id"), employee.col("companyId"))])
                    .include("employees")
            })
            .unwrap()
            .order_by(|e| e.col("id"), OrderDirection::Asc)
            .unwrap();
        assert!(graph.select_def().is_ok());

        let result = graph.limit(0, 10).select_def();
        assert!(matches!(result, Err(OrmError::LimitWithCollectionJoin)));
    }

    #[test]
    fn test_limit_with_single_joins_is_allowed() {
        let result = employees()
            .include("company")
            .unwrap()
            .order_by(|e| e.col("id"), OrderDirection::Asc)
            .unwrap()
            .limit(0, 10)
            .select_def();
        assert!(result.is_ok());
    }

    #[test]
    fn test_order_by_path_includes_relation() {
        let graph = employees()
            .order_by_path("company.name", OrderDirection::Asc)
            .unwrap();
        let def = graph.select_def().unwrap();
        assert_eq!(def.joins.len(), 1);
        assert_eq!(
            def.order_by,
            vec![(QueryValue::raw("[TBL.company].[name]"), OrderDirection::Asc)]
        );
    }
}
