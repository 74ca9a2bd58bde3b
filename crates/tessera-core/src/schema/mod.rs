//! Schema metadata attached to model types.
//!
//! A model is a Rust type that implements [`Model`], usually through
//! `#[derive(Model)]`. Its [`TableMeta`] is built once and looked up by type
//! identity. Relations between models are held as [`ModelRef`] resolvers so
//! that models may reference each other in both directions.

mod table;
mod types;

use std::any::TypeId;

pub use table::{
    ColumnMeta, ForeignKeyMeta, ForeignKeyTargetMeta, IndexColumn, IndexMeta, ModelRef,
    TableMeta, TableMetaBuilder,
};
pub use types::{ColumnValue, DataType, Length, ValueType};

/// A type mapped to a table.
pub trait Model: 'static {
    /// Returns the table metadata. Built once per type.
    fn table_meta() -> &'static TableMeta;
}

/// A relation field type and the model it points at.
///
/// Lets `#[derive(Model)]` find the target of `company: Option<Company>` or
/// `employees: Vec<Employee>` without naming it twice.
pub trait Related {
    /// The model on the other side of the relation.
    type Target: Model;
}

impl<T: Model> Related for Option<T> {
    type Target = T;
}

impl<T: Model> Related for Vec<T> {
    type Target = T;
}

impl<T: Model> Related for Box<T> {
    type Target = T;
}

/// Ordered set of models known to a session.
///
/// Registration order is the order tables are created in during
/// initialization.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelRef>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { models: Vec::new() }
    }

    /// Registers `M`. Registering the same model twice keeps the first entry.
    #[must_use]
    pub fn register<M: Model>(mut self) -> Self {
        self.add(ModelRef::of::<M>());
        self
    }

    /// Registers a model reference in place.
    pub fn add(&mut self, model: ModelRef) {
        if !self.models.iter().any(|m| m == &model) {
            self.models.push(model);
        }
    }

    /// Looks up a registered model by type identity.
    #[must_use]
    pub fn get(&self, type_id: TypeId) -> Option<&'static TableMeta> {
        self.models
            .iter()
            .find(|m| m.type_id() == type_id)
            .map(ModelRef::meta)
    }

    /// Iterates over registered models in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelRef> {
        self.models.iter()
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
