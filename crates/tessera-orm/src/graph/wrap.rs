use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;

use tessera_core::query::FromSource;
use tessera_core::schema::Model;
use tessera_core::{OrderDirection, QueryValue, SelectDef};

use super::{Clauses, QueryGraph};
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::scope::QueryScope;

impl<T> QueryGraph<T> {
    /// Nests this graph as the source of a fresh graph.
    ///
    /// The new graph exposes the same keys, so joins keep reconstructing
    /// after the wrap. Ordering moves outward through `__order_<n>` columns;
    /// the inner select only keeps it when TOP or LIMIT depend on it. The
    /// wrapped graph has no table metadata and accepts no writes.
    pub fn wrap(self) -> Result<Self> {
        let (sub, order_by) = self.wrapped_select(&self.entity, false)?;
        let entity = self.entity.repoint(&self.scope, self.alias.as_deref());
        Ok(self.rebuild(None, entity, sub, order_by))
    }

    /// Nests this graph's scalar columns as a distinct source shaped as
    /// model `M`. Relations of `M` can be included again afterwards.
    pub fn wrap_as<M: Model>(self) -> Result<QueryGraph<M>> {
        let scalars = self.entity.scalars();
        let (sub, order_by) = self.wrapped_select(&scalars, true)?;
        let entity = scalars.repoint(&self.scope, self.alias.as_deref());
        Ok(self
            .rebuild(Some(M::table_meta()), entity, sub, order_by)
            .cast())
    }

    fn wrapped_select(
        &self,
        entity: &Entity,
        distinct: bool,
    ) -> Result<(SelectDef, Vec<(QueryValue, OrderDirection)>)> {
        let mut sub = QueryGraph::<T> {
            entity: Arc::new(entity.clone()),
            ..self.clone()
        }
        .select_def()?;
        sub.distinct |= distinct;

        let order_by = std::mem::take(&mut sub.order_by);
        let select = sub.select.get_or_insert_with(IndexMap::new);
        let mut outer = Vec::with_capacity(order_by.len());
        for (index, (value, direction)) in order_by.iter().enumerate() {
            let key = format!("__order_{}", index + 1);
            select.insert(self.scope.quote(&key), value.clone());
            outer.push((
                QueryValue::raw(self.scope.column_ref(self.alias.as_deref(), &key)),
                *direction,
            ));
        }
        if sub.limit.is_some() || sub.top.is_some() {
            sub.order_by = order_by;
        }
        Ok((sub, outer))
    }

    fn rebuild(
        self,
        table: Option<&'static tessera_core::TableMeta>,
        entity: Entity,
        sub: SelectDef,
        order_by: Vec<(QueryValue, OrderDirection)>,
    ) -> Self {
        Self {
            scope: self.scope,
            table,
            alias: self.alias,
            entity: Arc::new(entity),
            clauses: Arc::new(Clauses {
                from: Some(FromSource::Select(Box::new(sub))),
                order_by,
                ..Clauses::default()
            }),
            custom: true,
            _marker: PhantomData,
        }
    }
}

impl QueryGraph {
    /// Unions `graphs` (UNION ALL) into one source aliased at the root.
    ///
    /// Each member is wrapped with its ordering cleared. The result takes the
    /// first member's shape and has no table metadata.
    pub fn union<T>(graphs: Vec<QueryGraph<T>>) -> Result<Self> {
        Self::union_at(graphs, None)
    }

    pub(crate) fn union_at<T>(graphs: Vec<QueryGraph<T>>, alias: Option<String>) -> Result<Self> {
        let mut members = Vec::with_capacity(graphs.len());
        let mut first: Option<(Arc<QueryScope>, Entity)> = None;
        for graph in graphs {
            let wrapped = graph.wrap()?.clear_order_by();
            members.push(wrapped.select_def()?);
            if first.is_none() {
                first = Some((Arc::clone(&wrapped.scope), wrapped.entity.as_ref().clone()));
            }
        }
        let (scope, entity) = first.ok_or(OrmError::EmptyUnion)?;

        // Member units are already exposed under their full dotted keys.
        let entity = entity.repoint(&scope, alias.as_deref());
        Ok(Self {
            scope,
            table: None,
            alias,
            entity: Arc::new(entity),
            clauses: Arc::new(Clauses {
                from: Some(FromSource::Union(members)),
                ..Clauses::default()
            }),
            custom: true,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::QueryCompiler;

    use super::super::tests::{employees, sql};
    use super::*;
    use crate::expr;

    #[test]
    fn test_wrap_moves_ordering_outward() {
        let graph = employees()
            .order_by(|e| e.col("name"), OrderDirection::Desc)
            .unwrap()
            .wrap()
            .unwrap();
        assert!(graph.table_meta().is_none());
        assert_eq!(
            sql(&graph),
            "SELECT\n  [TBL].[id] as [id],\n  [TBL].[name] as [name],\n  \
             [TBL].[age] as [age],\n  [TBL].[companyId] as [companyId]\n\
             FROM (\n  SELECT\n    [TBL].[id] as [id],\n    [TBL].[fullName] as [name],\n    \
             [TBL].[age] as [age],\n    [TBL].[companyId] as [companyId],\n    \
             [TBL].[fullName] as [__order_1]\n  \
             FROM [Main].[dbo].[Employee] as [TBL]\n) as [TBL]\n\
             ORDER BY [TBL].[__order_1] DESC"
        );
    }

    #[test]
    fn test_wrap_keeps_inner_order_with_limit() {
        let graph = employees()
            .order_by(|e| e.col("id"), OrderDirection::Asc)
            .unwrap()
            .limit(10, 5)
            .wrap()
            .unwrap();
        let def = graph.select_def().unwrap();
        let Some(FromSource::Select(sub)) = def.from else {
            panic!("expected a subquery source");
        };
        assert_eq!(sub.order_by.len(), 1);
        assert!(sub.limit.is_some());
        assert_eq!(def.order_by[0].0, QueryValue::raw("[TBL].[__order_1]"));
    }

    #[test]
    fn test_wrapped_graph_filters_on_exposed_keys() {
        let graph = employees()
            .wrap()
            .unwrap()
            .where_clause(|e| vec![expr::equal(e.col("name"), "kim")]);
        let def = graph.select_def().unwrap();
        assert_eq!(
            QueryCompiler::mssql()
                .tokens(def.where_clause.as_ref().unwrap())
                .unwrap(),
            "([TBL].[name] = N'kim')"
        );
    }

    #[test]
    fn test_wrap_as_keeps_scalars_and_meta() {
        let graph = employees()
            .include("company")
            .unwrap()
            .wrap_as::<super::super::tests::Employee>()
            .unwrap();
        assert!(graph.table_meta().is_some());
        assert!(graph.entity().relations().is_empty());
        let def = graph.select_def().unwrap();
        let Some(FromSource::Select(sub)) = def.from else {
            panic!("expected a subquery source");
        };
        assert!(sub.distinct);
        assert_eq!(sub.column_count(), Some(4));
    }

    #[test]
    fn test_union() {
        let a = employees().where_clause(|e| vec![expr::equal(e.col("age"), 1)]);
        let b = employees().where_clause(|e| vec![expr::equal(e.col("age"), 2)]);
        let graph = QueryGraph::union(vec![a, b]).unwrap();
        assert!(graph.is_custom());
        assert!(graph.table_meta().is_none());
        let def = graph.select_def().unwrap();
        assert!(matches!(&def.from, Some(FromSource::Union(members)) if members.len() == 2));
        assert!(sql(&graph).contains("UNION ALL"));
    }

    #[test]
    fn test_empty_union_fails() {
        let result = QueryGraph::union(Vec::<QueryGraph>::new());
        assert!(matches!(result, Err(OrmError::EmptyUnion)));
    }
}
