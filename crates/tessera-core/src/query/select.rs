//! Select definitions and join classification.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{FromSource, OrderDirection, QueryValue, TableName};

/// Row window rendered as `OFFSET ... FETCH NEXT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Rows to skip.
    pub skip: u64,
    /// Rows to return.
    pub take: u64,
}

/// A select statement, a subquery or a join.
///
/// Identifiers in the select map, group, order and alias positions are
/// already quoted for the target dialect. The `where_clause` and `having`
/// token lists are concatenated as-is; callers insert their own `AND`/`OR`
/// tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectDef {
    /// Source. `None` only for constant selects.
    pub from: Option<FromSource>,
    /// Alias bound to the source.
    pub alias: Option<String>,
    /// Output columns keyed by quoted alias. `None` selects `*`.
    pub select: Option<IndexMap<String, QueryValue>>,
    /// Joined definitions, each with its own alias.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<SelectDef>,
    /// WHERE tokens.
    pub where_clause: Option<Vec<QueryValue>>,
    /// SELECT DISTINCT.
    #[serde(default)]
    pub distinct: bool,
    /// SELECT TOP n.
    pub top: Option<u64>,
    /// GROUP BY expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<QueryValue>,
    /// HAVING tokens.
    pub having: Option<Vec<QueryValue>>,
    /// ORDER BY expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<(QueryValue, OrderDirection)>,
    /// OFFSET/FETCH window.
    pub limit: Option<Limit>,
}

impl SelectDef {
    /// Creates a definition selecting from a physical table.
    #[must_use]
    pub fn table(table: TableName) -> Self {
        Self {
            from: Some(FromSource::Table(table)),
            ..Self::default()
        }
    }

    /// Creates a definition selecting from a subquery.
    #[must_use]
    pub fn subquery(inner: Self) -> Self {
        Self {
            from: Some(FromSource::Select(Box::new(inner))),
            ..Self::default()
        }
    }

    /// Creates a definition selecting from the union of `members`.
    #[must_use]
    pub fn union(members: Vec<Self>) -> Self {
        Self {
            from: Some(FromSource::Union(members)),
            ..Self::default()
        }
    }

    /// Sets the alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an output column.
    #[must_use]
    pub fn column(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.select
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Adds a join.
    #[must_use]
    pub fn join(mut self, join: Self) -> Self {
        self.joins.push(join);
        self
    }

    /// Sets the WHERE tokens.
    #[must_use]
    pub fn where_tokens(mut self, tokens: Vec<QueryValue>) -> Self {
        self.where_clause = Some(tokens);
        self
    }

    /// Enables SELECT DISTINCT.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Sets SELECT TOP.
    #[must_use]
    pub const fn top(mut self, count: u64) -> Self {
        self.top = Some(count);
        self
    }

    /// Adds a GROUP BY expression.
    #[must_use]
    pub fn group_by(mut self, value: impl Into<QueryValue>) -> Self {
        self.group_by.push(value.into());
        self
    }

    /// Sets the HAVING tokens.
    #[must_use]
    pub fn having(mut self, tokens: Vec<QueryValue>) -> Self {
        self.having = Some(tokens);
        self
    }

    /// Adds an ORDER BY expression.
    #[must_use]
    pub fn order_by(mut self, value: impl Into<QueryValue>, direction: OrderDirection) -> Self {
        self.order_by.push((value.into(), direction));
        self
    }

    /// Sets the OFFSET/FETCH window.
    #[must_use]
    pub const fn limit(mut self, skip: u64, take: u64) -> Self {
        self.limit = Some(Limit { skip, take });
        self
    }

    /// Number of output columns, counting `*` as unknown.
    #[must_use]
    pub fn column_count(&self) -> Option<usize> {
        self.select.as_ref().map(IndexMap::len)
    }
}

/// How a join definition is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// `LEFT OUTER JOIN <source> as <alias> ON <where>`.
    LeftOuterJoin,
    /// `OUTER APPLY (<select>) as <alias>`.
    OuterApply,
}

impl JoinStrategy {
    /// Classifies a join definition.
    ///
    /// A join that only names a source, an alias and a condition is a plain
    /// outer join. Any projection, nested join, grouping, ordering or row
    /// restriction requires a correlated `OUTER APPLY`.
    #[must_use]
    pub fn classify(join: &SelectDef) -> Self {
        let plain = join.select.is_none()
            && join.joins.is_empty()
            && !join.distinct
            && join.top.is_none()
            && join.group_by.is_empty()
            && join.having.is_none()
            && join.order_by.is_empty()
            && join.limit.is_none();
        if plain {
            Self::LeftOuterJoin
        } else {
            Self::OuterApply
        }
    }
}
