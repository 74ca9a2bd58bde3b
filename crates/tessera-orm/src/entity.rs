//! The typed shape a graph selects.
//!
//! An [`Entity`] maps property keys to columns ([`Field::Unit`]) or to nested
//! entities attached by joins. Closures passed to
//! [`QueryGraph`](crate::graph::QueryGraph) receive the current entity and pick
//! columns with [`Entity::col`].

use indexmap::IndexMap;

use tessera_core::schema::{TableMeta, ValueType};

use crate::expr::{IntoUnit, QueryUnit};
use crate::scope::QueryScope;

/// A value of an [`Entity`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A column or computed expression.
    Unit(QueryUnit),
    /// An object attached by a single-row join.
    Single(Entity),
    /// An array attached by a collection join.
    Many(Entity),
}

impl Field {
    /// The unit, if the field is one.
    #[must_use]
    pub const fn as_unit(&self) -> Option<&QueryUnit> {
        match self {
            Self::Unit(unit) => Some(unit),
            _ => None,
        }
    }

    /// The nested entity of a join.
    #[must_use]
    pub const fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Unit(_) => None,
            Self::Single(entity) | Self::Many(entity) => Some(entity),
        }
    }

    fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Self::Unit(_) => None,
            Self::Single(entity) | Self::Many(entity) => Some(entity),
        }
    }
}

/// Ordered map of property keys to fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    fields: IndexMap<String, Field>,
}

impl Entity {
    /// Creates an empty entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One unit per column of `meta`, referenced through the alias at `path`.
    #[must_use]
    pub fn from_table(scope: &QueryScope, meta: &TableMeta, path: Option<&str>) -> Self {
        let fields = meta
            .columns
            .iter()
            .map(|column| {
                let unit = QueryUnit::raw(column.value_type, scope.column_ref(path, &column.name));
                (column.property_key.clone(), Field::Unit(unit))
            })
            .collect();
        Self { fields }
    }

    /// Adds a unit.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, unit: impl IntoUnit) -> Self {
        self.fields.insert(key.into(), Field::Unit(unit.into_unit()));
        self
    }

    /// Adds a nested object.
    #[must_use]
    pub fn with_single(mut self, key: impl Into<String>, entity: Self) -> Self {
        self.fields.insert(key.into(), Field::Single(entity));
        self
    }

    /// Adds a nested array.
    #[must_use]
    pub fn with_many(mut self, key: impl Into<String>, entity: Self) -> Self {
        self.fields.insert(key.into(), Field::Many(entity));
        self
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, key: impl Into<String>, field: Field) {
        self.fields.insert(key.into(), field);
    }

    /// Field at a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` when the entity has no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The unit at a dotted path, through joined entities.
    ///
    /// # Panics
    ///
    /// Panics if no unit exists at `path`. Use [`Entity::try_col`] for a
    /// fallible lookup.
    #[must_use]
    #[track_caller]
    pub fn col(&self, path: &str) -> QueryUnit {
        match self.try_col(path) {
            Some(unit) => unit.clone(),
            None => panic!("no column at '{path}'"),
        }
    }

    /// The unit at a dotted path, if any.
    #[must_use]
    pub fn try_col(&self, path: &str) -> Option<&QueryUnit> {
        let (parent, key) = match path.rsplit_once('.') {
            Some((parent, key)) => (self.chain(parent)?, key),
            None => (self, path),
        };
        parent.get(key)?.as_unit()
    }

    /// The joined entity at a dotted path.
    ///
    /// # Panics
    ///
    /// Panics if no joined entity exists at `path`.
    #[must_use]
    #[track_caller]
    pub fn rel(&self, path: &str) -> &Self {
        match self.try_rel(path) {
            Some(entity) => entity,
            None => panic!("no relation at '{path}'"),
        }
    }

    /// The joined entity at a dotted path, if any.
    #[must_use]
    pub fn try_rel(&self, path: &str) -> Option<&Self> {
        if path.is_empty() {
            return None;
        }
        self.chain(path)
    }

    /// Walks a dotted path of joined entities. The empty path is `self`.
    #[must_use]
    pub fn chain(&self, path: &str) -> Option<&Self> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for key in path.split('.') {
            current = current.get(key)?.as_entity()?;
        }
        Some(current)
    }

    /// Sets the field at a dotted path, walking joined entities. Returns
    /// `false` when an intermediate key is missing.
    pub(crate) fn set_chain(&mut self, path: &str, field: Field) -> bool {
        let (parent, key) = match path.rsplit_once('.') {
            Some((parent, key)) => (parent, key),
            None => {
                self.insert(path, field);
                return true;
            }
        };
        let mut current = self;
        for part in parent.split('.') {
            match current.fields.get_mut(part).and_then(Field::as_entity_mut) {
                Some(next) => current = next,
                None => return false,
            }
        }
        current.insert(key, field);
        true
    }

    /// Every unit keyed by its full dotted path, depth first.
    #[must_use]
    pub fn flatten(&self) -> Vec<(String, &QueryUnit)> {
        let mut out = Vec::new();
        self.flatten_into(None, &mut out);
        out
    }

    fn flatten_into<'a>(&'a self, prefix: Option<&str>, out: &mut Vec<(String, &'a QueryUnit)>) {
        for (key, field) in &self.fields {
            let full = join_key(prefix, key);
            match field {
                Field::Unit(unit) => out.push((full, unit)),
                Field::Single(entity) | Field::Many(entity) => {
                    entity.flatten_into(Some(&full), out);
                }
            }
        }
    }

    /// Every joined path with `true` for single-row joins.
    #[must_use]
    pub fn relations(&self) -> Vec<(String, bool)> {
        let mut out = Vec::new();
        self.relations_into(None, &mut out);
        out
    }

    fn relations_into(&self, prefix: Option<&str>, out: &mut Vec<(String, bool)>) {
        for (key, field) in &self.fields {
            let full = join_key(prefix, key);
            match field {
                Field::Unit(_) => {}
                Field::Single(entity) => {
                    out.push((full.clone(), true));
                    entity.relations_into(Some(&full), out);
                }
                Field::Many(entity) => {
                    out.push((full.clone(), false));
                    entity.relations_into(Some(&full), out);
                }
            }
        }
    }

    /// Every string-typed unit, including those of joined entities.
    #[must_use]
    pub fn string_units(&self) -> Vec<QueryUnit> {
        self.flatten()
            .into_iter()
            .filter(|(_, unit)| unit.value_type() == Some(ValueType::String))
            .map(|(_, unit)| unit.clone())
            .collect()
    }

    /// Only the top-level units.
    #[must_use]
    pub fn scalars(&self) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(_, field)| matches!(field, Field::Unit(_)))
            .map(|(key, field)| (key.clone(), field.clone()))
            .collect();
        Self { fields }
    }

    /// Re-points every unit at the column an enclosing select exposes it
    /// under: `[TBL.<root>].[<dotted key>]`. Joined shapes are preserved.
    #[must_use]
    pub fn repoint(&self, scope: &QueryScope, root: Option<&str>) -> Self {
        self.repoint_under(scope, root, None)
    }

    fn repoint_under(&self, scope: &QueryScope, root: Option<&str>, parent: Option<&str>) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|(key, field)| {
                let full = join_key(parent, key);
                let field = match field {
                    Field::Unit(unit) => Field::Unit(QueryUnit::new(
                        unit.value_type(),
                        scope.column_ref(root, &full),
                    )),
                    Field::Single(entity) => {
                        Field::Single(entity.repoint_under(scope, root, Some(&full)))
                    }
                    Field::Many(entity) => {
                        Field::Many(entity.repoint_under(scope, root, Some(&full)))
                    }
                };
                (key.clone(), field)
            })
            .collect();
        Self { fields }
    }
}

fn join_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_string(),
    }
}
