//! Persistent query graphs.
//!
//! A [`QueryGraph`] describes a select over one table (or a wrapped or unioned
//! source) together with its joined relations. Every builder method returns a
//! new graph; the previous one is unchanged and can be reused. The graph
//! produces definitions ([`SelectDef`], write definitions) and runs them
//! through a [`DbContext`](crate::DbContext).
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::schema::{ColumnMeta, TableMeta, ValueType};
//! use tessera_core::QueryCompiler;
//! use tessera_orm::expr;
//! use tessera_orm::graph::QueryGraph;
//! use tessera_orm::scope::QueryScope;
//!
//! let meta: &'static TableMeta = Box::leak(Box::new(
//!     TableMeta::builder("Employee")
//!         .schema("dbo")
//!         .column(ColumnMeta::new("id", ValueType::Number).primary_key(1))
//!         .column(ColumnMeta::new("name", ValueType::String))
//!         .build(),
//! ));
//!
//! let graph = QueryGraph::from_meta(Arc::new(QueryScope::default()), meta)
//!     .where_clause(|e| vec![expr::equal(e.col("name"), "kim")]);
//! let sql = QueryCompiler::mssql().select(&graph.select_def().unwrap()).unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT\n  [TBL].[id] as [id],\n  [TBL].[name] as [name]\n\
//!      FROM [dbo].[Employee] as [TBL]\nWHERE ([TBL].[name] = N'kim')"
//! );
//! ```

mod exec;
mod join;
mod search;
mod wrap;
mod write;

use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use tessera_core::query::{FromSource, Limit};
use tessera_core::schema::{Model, TableMeta};
use tessera_core::{OrderDirection, QueryCompiler, QueryValue, SelectDef};

use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::expr::{self, Predicate, QueryUnit};
use crate::scope::QueryScope;

/// A join attached to a graph.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JoinEntry {
    pub(crate) def: SelectDef,
    pub(crate) single: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Clauses {
    pub(crate) from: Option<FromSource>,
    pub(crate) joins: Vec<JoinEntry>,
    pub(crate) where_clause: Option<Vec<QueryValue>>,
    pub(crate) distinct: bool,
    pub(crate) top: Option<u64>,
    pub(crate) group_by: Vec<QueryValue>,
    pub(crate) having: Option<Vec<QueryValue>>,
    pub(crate) order_by: Vec<(QueryValue, OrderDirection)>,
    pub(crate) limit: Option<Limit>,
}

/// An immutable, chainable select over a table and its relations.
///
/// `T` is the type rows are deserialized into when the graph is executed;
/// it defaults to [`serde_json::Value`].
#[derive(Debug)]
pub struct QueryGraph<T = Value> {
    scope: Arc<QueryScope>,
    table: Option<&'static TableMeta>,
    alias: Option<String>,
    entity: Arc<Entity>,
    clauses: Arc<Clauses>,
    custom: bool,
    _marker: PhantomData<fn() -> T>,
}

// Manual Clone implementation to avoid a T: Clone bound
impl<T> Clone for QueryGraph<T> {
    fn clone(&self) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
            table: self.table,
            alias: self.alias.clone(),
            entity: Arc::clone(&self.entity),
            clauses: Arc::clone(&self.clauses),
            custom: self.custom,
            _marker: PhantomData,
        }
    }
}

impl<T: Model> QueryGraph<T> {
    /// Creates a graph over the table of model `T`.
    #[must_use]
    pub fn new(scope: Arc<QueryScope>) -> Self {
        Self::at(scope, T::table_meta(), None)
    }
}

impl QueryGraph<Value> {
    /// Creates an untyped graph over a table.
    #[must_use]
    pub fn from_meta(scope: Arc<QueryScope>, meta: &'static TableMeta) -> Self {
        Self::at(scope, meta, None)
    }
}

impl<T> QueryGraph<T> {
    /// Creates a graph over `meta` whose alias is `TBL.<alias>`.
    pub(crate) fn at(scope: Arc<QueryScope>, meta: &'static TableMeta, alias: Option<String>) -> Self {
        let entity = Entity::from_table(&scope, meta, alias.as_deref());
        let clauses = Clauses {
            from: Some(FromSource::Table(scope.table_name(meta))),
            ..Clauses::default()
        };
        Self {
            scope,
            table: Some(meta),
            alias,
            entity: Arc::new(entity),
            clauses: Arc::new(clauses),
            custom: false,
            _marker: PhantomData,
        }
    }

    /// The current shape.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Table metadata, absent after an untyped wrap or a union.
    #[must_use]
    pub const fn table_meta(&self) -> Option<&'static TableMeta> {
        self.table
    }

    /// The scope names are resolved against.
    #[must_use]
    pub fn scope(&self) -> &Arc<QueryScope> {
        &self.scope
    }

    /// Join path of this graph; `None` for a root graph.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Returns `true` once the shape was replaced by [`QueryGraph::select`].
    #[must_use]
    pub const fn is_custom(&self) -> bool {
        self.custom
    }

    /// Changes the row type without touching the query.
    #[must_use]
    pub fn cast<R>(self) -> QueryGraph<R> {
        QueryGraph {
            scope: self.scope,
            table: self.table,
            alias: self.alias,
            entity: self.entity,
            clauses: self.clauses,
            custom: self.custom,
            _marker: PhantomData,
        }
    }

    fn clauses_mut(&mut self) -> &mut Clauses {
        Arc::make_mut(&mut self.clauses)
    }

    fn entity_mut(&mut self) -> &mut Entity {
        Arc::make_mut(&mut self.entity)
    }

    fn quoted_alias(&self) -> String {
        self.scope.alias(self.alias.as_deref())
    }

    fn render(&self, value: &QueryValue) -> String {
        QueryCompiler::new(Arc::clone(self.scope.dialect()))
            .value(value)
            .unwrap_or_else(|_| format!("{value:?}"))
    }

    /// Replaces the shape. The graph becomes custom: writes are rejected
    /// and the result rows follow the new entity.
    #[must_use]
    pub fn select<F>(self, f: F) -> QueryGraph<Value>
    where
        F: FnOnce(&Entity) -> Entity,
    {
        let entity = f(&self.entity);
        let mut graph = self.cast();
        graph.entity = Arc::new(entity);
        graph.custom = true;
        graph
    }

    /// Adds conditions, all of which must hold.
    #[must_use]
    pub fn where_clause<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Entity) -> Vec<Predicate>,
    {
        let predicates = f(&self.entity);
        self.push_where(predicates);
        self
    }

    pub(crate) fn push_where(&mut self, predicates: Vec<Predicate>) {
        let clauses = self.clauses_mut();
        clauses.where_clause = Some(combine(clauses.where_clause.take(), predicates));
    }

    pub(crate) fn push_having(&mut self, predicates: Vec<Predicate>) {
        let clauses = self.clauses_mut();
        clauses.having = Some(combine(clauses.having.take(), predicates));
    }

    /// SELECT DISTINCT.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.clauses_mut().distinct = true;
        self
    }

    /// SELECT TOP n.
    #[must_use]
    pub fn top(mut self, count: u64) -> Self {
        self.clauses_mut().top = Some(count);
        self
    }

    /// Skips `skip` rows and returns at most `take`. Requires an ordering.
    #[must_use]
    pub fn limit(mut self, skip: u64, take: u64) -> Self {
        self.clauses_mut().limit = Some(Limit { skip, take });
        self
    }

    /// Appends an ordering expression.
    ///
    /// Ordering twice by the same expression is an error.
    pub fn order_by<F>(mut self, f: F, direction: OrderDirection) -> Result<Self>
    where
        F: FnOnce(&Entity) -> QueryUnit,
    {
        let unit = f(&self.entity);
        self.push_order(unit.into_value(), direction)?;
        Ok(self)
    }

    pub(crate) fn push_order(&mut self, value: QueryValue, direction: OrderDirection) -> Result<()> {
        if self.clauses.order_by.iter().any(|(v, _)| *v == value) {
            return Err(OrmError::DuplicateOrderBy(self.render(&value)));
        }
        self.clauses_mut().order_by.push((value, direction));
        Ok(())
    }

    /// Removes every ordering expression.
    #[must_use]
    pub fn clear_order_by(mut self) -> Self {
        if !self.clauses.order_by.is_empty() {
            self.clauses_mut().order_by.clear();
        }
        self
    }

    /// Groups by the given expressions. NULL literals are ignored.
    #[must_use]
    pub fn group_by<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Entity) -> Vec<QueryUnit>,
    {
        let values = f(&self.entity)
            .into_iter()
            .filter(|unit| !unit.is_null())
            .map(QueryUnit::into_value)
            .collect();
        self.clauses_mut().group_by = values;
        self
    }

    /// Adds group conditions, all of which must hold.
    #[must_use]
    pub fn having<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Entity) -> Vec<Predicate>,
    {
        let predicates = f(&self.entity);
        self.push_having(predicates);
        self
    }

    /// Uses this graph as a scalar subquery, for instance inside
    /// [`QueryGraph::select`]. It must select exactly one column with
    /// `top(1)`.
    pub fn scalar(&self) -> Result<QueryUnit> {
        if self.clauses.top != Some(1) {
            return Err(OrmError::ScalarSubqueryWithoutTop);
        }
        let units = self.entity.flatten();
        if units.len() != 1 {
            return Err(OrmError::ScalarSubqueryColumns(units.len()));
        }
        let value_type = units[0].1.value_type();
        let def = self.select_def()?;
        Ok(QueryUnit::new(value_type, def))
    }

    /// The select definition of this graph.
    ///
    /// Validates that HAVING comes with GROUP BY, that LIMIT comes with
    /// ORDER BY, and that LIMIT is not applied over a collection join, at
    /// any depth, unless the rows are grouped or custom-selected.
    pub fn select_def(&self) -> Result<SelectDef> {
        let clauses = &*self.clauses;
        if clauses.having.is_some() && clauses.group_by.is_empty() {
            return Err(OrmError::HavingWithoutGroupBy);
        }
        if clauses.limit.is_some()
            && self.entity.relations().iter().any(|(_, single)| !single)
            && clauses.group_by.is_empty()
            && !self.custom
        {
            return Err(OrmError::LimitWithCollectionJoin);
        }
        if clauses.limit.is_some() && clauses.order_by.is_empty() {
            return Err(OrmError::LimitWithoutOrderBy);
        }

        let select: IndexMap<String, QueryValue> = self
            .entity
            .flatten()
            .into_iter()
            .map(|(key, unit)| (self.scope.quote(&key), unit.value().clone()))
            .collect();

        Ok(SelectDef {
            from: clauses.from.clone(),
            alias: Some(self.quoted_alias()),
            select: Some(select),
            joins: clauses.joins.iter().map(|join| join.def.clone()).collect(),
            where_clause: clauses.where_clause.clone(),
            distinct: clauses.distinct,
            top: clauses.top,
            group_by: clauses.group_by.clone(),
            having: clauses.having.clone(),
            order_by: clauses.order_by.clone(),
            limit: clauses.limit,
        })
    }
}

fn combine(existing: Option<Vec<QueryValue>>, predicates: Vec<Predicate>) -> Vec<QueryValue> {
    let added = expr::and(predicates);
    match existing {
        Some(tokens) => expr::and(vec![Predicate::new(tokens), added]).into_tokens(),
        None => added.into_tokens(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tessera_core::schema::{ColumnMeta, ForeignKeyMeta, ForeignKeyTargetMeta, ModelRef, ValueType};

    use super::*;

    pub(crate) struct Company;
    pub(crate) struct Employee;

    impl Model for Company {
        fn table_meta() -> &'static TableMeta {
            static META: std::sync::OnceLock<TableMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| {
                TableMeta::builder("Company")
                    .schema("dbo")
                    .column(ColumnMeta::new("id", ValueType::Number).primary_key(1).auto_increment())
                    .column(ColumnMeta::new("name", ValueType::String))
                    .foreign_key_target(ForeignKeyTargetMeta::new(
                        "employees",
                        "company",
                        ModelRef::of::<Employee>(),
                    ))
                    .build()
            })
        }
    }

    impl Model for Employee {
        fn table_meta() -> &'static TableMeta {
            static META: std::sync::OnceLock<TableMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| {
                TableMeta::builder("Employee")
                    .schema("dbo")
                    .column(ColumnMeta::new("id", ValueType::Number).primary_key(1).auto_increment())
                    .column(ColumnMeta::new("name", ValueType::String).name("fullName"))
                    .column(ColumnMeta::new("age", ValueType::Number).nullable(true))
                    .column(ColumnMeta::new("companyId", ValueType::Number).nullable(true))
                    .foreign_key(ForeignKeyMeta::new(
                        "company",
                        &["companyId"],
                        ModelRef::of::<Company>(),
                    ))
                    .build()
            })
        }
    }

    pub(crate) fn employees() -> QueryGraph<Employee> {
        QueryGraph::new(Arc::new(QueryScope::default().database("Main").schema("dbo")))
    }

    pub(crate) fn sql(graph: &QueryGraph<impl Sized>) -> String {
        QueryCompiler::mssql()
            .select(&graph.select_def().unwrap())
            .unwrap()
    }

    #[test]
    fn test_entity_uses_physical_names() {
        let graph = employees();
        assert_eq!(
            graph.entity().col("name"),
            QueryUnit::raw(ValueType::String, "[TBL].[fullName]")
        );
    }

    #[test]
    fn test_select_text() {
        let graph = employees()
            .where_clause(|e| vec![expr::greater_than(e.col("age"), 20)])
            .order_by(|e| e.col("name"), OrderDirection::Asc)
            .unwrap()
            .limit(0, 10);
        assert_eq!(
            sql(&graph),
            "SELECT\n  [TBL].[id] as [id],\n  [TBL].[fullName] as [name],\n  \
             [TBL].[age] as [age],\n  [TBL].[companyId] as [companyId]\n\
             FROM [Main].[dbo].[Employee] as [TBL]\n\
             WHERE ([TBL].[age] > 20)\n\
             ORDER BY [TBL].[fullName] ASC\n\
             OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_where_clauses_are_anded() {
        let graph = employees()
            .where_clause(|e| vec![expr::equal(e.col("age"), 1)])
            .where_clause(|e| vec![expr::equal(e.col("age"), 2)]);
        let def = graph.select_def().unwrap();
        let text = QueryCompiler::mssql()
            .tokens(def.where_clause.as_ref().unwrap())
            .unwrap();
        assert_eq!(text, "(([TBL].[age] = 1)) AND (([TBL].[age] = 2))");
    }

    #[test]
    fn test_builders_leave_source_untouched() {
        let base = employees();
        let filtered = base.clone().distinct().top(3);
        assert!(!base.select_def().unwrap().distinct);
        assert!(filtered.select_def().unwrap().distinct);
    }

    #[test]
    fn test_duplicate_order_by_fails() {
        let result = employees()
            .order_by(|e| e.col("name"), OrderDirection::Asc)
            .unwrap()
            .order_by(|e| e.col("name"), OrderDirection::Desc);
        assert!(matches!(result, Err(OrmError::DuplicateOrderBy(v)) if v == "[TBL].[fullName]"));
    }

    #[test]
    fn test_limit_without_order_fails() {
        let result = employees().limit(0, 5).select_def();
        assert!(matches!(result, Err(OrmError::LimitWithoutOrderBy)));
    }

    #[test]
    fn test_having_without_group_fails() {
        let result = employees()
            .having(|_| vec![expr::greater_than(expr::count(), 1)])
            .select_def();
        assert!(matches!(result, Err(OrmError::HavingWithoutGroupBy)));
    }

    #[test]
    fn test_group_by_ignores_null() {
        let def = employees()
            .group_by(|e| vec![e.col("name"), QueryUnit::null()])
            .select_def()
            .unwrap();
        assert_eq!(def.group_by, vec![QueryValue::raw("[TBL].[fullName]")]);
    }

    #[test]
    fn test_custom_select() {
        let graph = employees().select(|e| {
            Entity::new()
                .with("name", e.col("name"))
                .with("older", expr::is(expr::greater_than(e.col("age"), 40)))
        });
        assert!(graph.is_custom());
        assert_eq!(
            sql(&graph),
            "SELECT\n  [TBL].[fullName] as [name],\n  \
             (CASE WHEN ([TBL].[age] > 40) THEN 1 ELSE 0 END) as [older]\n\
             FROM [Main].[dbo].[Employee] as [TBL]"
        );
    }

    #[test]
    fn test_scalar_subquery_rules() {
        let names = employees().select(|e| Entity::new().with("name", e.col("name")));
        assert!(matches!(names.scalar(), Err(OrmError::ScalarSubqueryWithoutTop)));
        assert!(matches!(
            employees().top(1).scalar(),
            Err(OrmError::ScalarSubqueryColumns(4))
        ));
        let unit = names.top(1).scalar().unwrap();
        assert_eq!(unit.value_type(), Some(ValueType::String));
        assert!(matches!(unit.value(), QueryValue::Select(_)));
    }
}
