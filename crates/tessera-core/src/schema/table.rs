//! Table, column, foreign key and index metadata.

use std::any::TypeId;
use std::fmt;

use super::types::{DataType, ValueType};
use super::Model;
use crate::query::OrderDirection;

/// Lazily resolved reference to another model's metadata.
///
/// Foreign keys point at models that may in turn point back, so the target is
/// held as a resolver function and only evaluated when a relation is walked.
#[derive(Clone, Copy)]
pub struct ModelRef {
    type_name: &'static str,
    meta: fn() -> &'static TableMeta,
    type_id: fn() -> TypeId,
}

impl ModelRef {
    /// Creates a reference to the model `M`.
    #[must_use]
    pub fn of<M: Model>() -> Self {
        Self {
            type_name: std::any::type_name::<M>(),
            meta: M::table_meta,
            type_id: TypeId::of::<M>,
        }
    }

    /// Resolves the referenced table metadata.
    #[must_use]
    pub fn meta(&self) -> &'static TableMeta {
        (self.meta)()
    }

    /// Type identity of the referenced model.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Rust type name of the referenced model.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelRef").field(&self.type_name).finish()
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    /// Field name on the model.
    pub property_key: String,
    /// Physical column name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Logical type.
    pub value_type: ValueType,
    /// Explicit SQL type, when the default for `value_type` is not wanted.
    pub data_type: Option<DataType>,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the database generates the value.
    pub auto_increment: bool,
    /// Position in the primary key, when part of it.
    pub primary_key: Option<u32>,
}

impl ColumnMeta {
    /// Creates a non-nullable column whose physical name is the property key.
    #[must_use]
    pub fn new(property_key: impl Into<String>, value_type: ValueType) -> Self {
        let property_key = property_key.into();
        Self {
            name: property_key.clone(),
            property_key,
            description: None,
            value_type,
            data_type: None,
            nullable: false,
            auto_increment: false,
            primary_key: None,
        }
    }

    /// Sets the physical column name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets an explicit SQL type.
    #[must_use]
    pub const fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Sets whether the column accepts NULL.
    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Marks the column as database generated.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Places the column in the primary key at the given position.
    #[must_use]
    pub const fn primary_key(mut self, ordinal: u32) -> Self {
        self.primary_key = Some(ordinal);
        self
    }
}

/// A foreign key declared on the owning model.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyMeta {
    /// Property key of the relation field; also the logical constraint name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Local column property keys, in target primary key order.
    pub columns: Vec<String>,
    /// Referenced model.
    pub target: ModelRef,
}

impl ForeignKeyMeta {
    /// Creates a foreign key over the given local column property keys.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str], target: ModelRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            target,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The inverse side of a [`ForeignKeyMeta`], exposing the referencing rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyTargetMeta {
    /// Property key of the collection field.
    pub property_key: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Name of the foreign key on `source` that this mirrors.
    pub foreign_key: String,
    /// Model declaring the foreign key.
    pub source: ModelRef,
}

impl ForeignKeyTargetMeta {
    /// Creates a target exposing the rows of `source` whose `foreign_key`
    /// points here.
    #[must_use]
    pub fn new(
        property_key: impl Into<String>,
        foreign_key: impl Into<String>,
        source: ModelRef,
    ) -> Self {
        Self {
            property_key: property_key.into(),
            description: None,
            foreign_key: foreign_key.into(),
            source,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One column of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column property key.
    pub property_key: String,
    /// Sort order.
    pub order: OrderDirection,
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Logical index name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<IndexColumn>,
}

/// Metadata describing a model's table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    /// Physical table name.
    pub name: String,
    /// Database qualifier.
    pub database: Option<String>,
    /// Schema qualifier.
    pub schema: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Columns in declaration order.
    pub columns: Vec<ColumnMeta>,
    /// Foreign keys declared by this table.
    pub foreign_keys: Vec<ForeignKeyMeta>,
    /// Foreign keys of other tables that point here.
    pub foreign_key_targets: Vec<ForeignKeyTargetMeta>,
    /// Indexes.
    pub indexes: Vec<IndexMeta>,
}

impl TableMeta {
    /// Starts building metadata for the named table.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TableMetaBuilder {
        TableMetaBuilder {
            meta: Self {
                name: name.into(),
                database: None,
                schema: None,
                description: None,
                columns: Vec::new(),
                foreign_keys: Vec::new(),
                foreign_key_targets: Vec::new(),
                indexes: Vec::new(),
            },
        }
    }

    /// Looks up a column by property key.
    #[must_use]
    pub fn column(&self, property_key: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.property_key == property_key)
    }

    /// Looks up a foreign key by name.
    #[must_use]
    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyMeta> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    /// Looks up a foreign key target by property key.
    #[must_use]
    pub fn foreign_key_target(&self, property_key: &str) -> Option<&ForeignKeyTargetMeta> {
        self.foreign_key_targets
            .iter()
            .find(|fkt| fkt.property_key == property_key)
    }

    /// Primary key columns ordered by ordinal.
    #[must_use]
    pub fn primary_keys(&self) -> Vec<&ColumnMeta> {
        let mut keys: Vec<&ColumnMeta> = self
            .columns
            .iter()
            .filter(|c| c.primary_key.is_some())
            .collect();
        keys.sort_by_key(|c| c.primary_key);
        keys
    }

    /// The database generated column, if any.
    #[must_use]
    pub fn auto_increment_column(&self) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.auto_increment)
    }
}

/// Builder for [`TableMeta`].
#[derive(Debug, Clone)]
pub struct TableMetaBuilder {
    meta: TableMeta,
}

impl TableMetaBuilder {
    /// Sets the database qualifier.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.meta.database = Some(database.into());
        self
    }

    /// Sets the schema qualifier.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.meta.schema = Some(schema.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnMeta) -> Self {
        self.meta.columns.push(column);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, foreign_key: ForeignKeyMeta) -> Self {
        self.meta.foreign_keys.push(foreign_key);
        self
    }

    /// Adds a foreign key target.
    #[must_use]
    pub fn foreign_key_target(mut self, target: ForeignKeyTargetMeta) -> Self {
        self.meta.foreign_key_targets.push(target);
        self
    }

    /// Adds an index. Columns are `(property_key, order)` pairs.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, columns: &[(&str, OrderDirection)]) -> Self {
        self.meta.indexes.push(IndexMeta {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(key, order)| IndexColumn {
                    property_key: (*key).to_string(),
                    order: *order,
                })
                .collect(),
        });
        self
    }

    /// Finishes the metadata.
    #[must_use]
    pub fn build(self) -> TableMeta {
        self.meta
    }
}
