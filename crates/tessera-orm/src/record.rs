//! Column values for writes.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use tessera_core::schema::{Model, TableMeta, ValueType};
use tessera_core::SqlValue;

use crate::error::{OrmError, Result};
use crate::expr::{IntoUnit, QueryUnit};

/// Property keys mapped to the values written to them.
///
/// Values are any [`IntoUnit`]: plain Rust values become literals, units
/// taken from the graph's entity write expressions such as
/// `[TBL].[count] + 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: IndexMap<String, QueryUnit>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl IntoUnit) -> Self {
        self.values.insert(key.into(), value.into_unit());
        self
    }

    /// Sets a value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl IntoUnit) {
        self.values.insert(key.into(), value.into_unit());
    }

    /// Value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&QueryUnit> {
        self.values.get(key)
    }

    /// Returns `true` if the key is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryUnit)> {
        self.values.iter()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` for an empty record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds a record from a serializable model.
    ///
    /// Only fields that are columns of the table are taken. NULL values are
    /// skipped, so an unset auto-increment key is left to the database.
    pub fn from_model<M: Model + Serialize>(model: &M) -> Result<Self> {
        match serde_json::to_value(model)? {
            Value::Object(map) => Self::from_json(M::table_meta(), &map),
            other => Err(OrmError::Config(format!(
                "a model must serialize to an object, got {other}"
            ))),
        }
    }

    /// Builds a record from a JSON object, converting each value by the
    /// column's logical type.
    pub fn from_json(meta: &TableMeta, object: &serde_json::Map<String, Value>) -> Result<Self> {
        let mut record = Self::new();
        for column in &meta.columns {
            let Some(value) = object.get(&column.property_key) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let sql = json_to_sql(value, column.value_type).ok_or_else(|| {
                OrmError::Config(format!(
                    "'{}.{}' cannot hold {value}",
                    meta.name, column.property_key
                ))
            })?;
            record.insert(column.property_key.clone(), sql);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: IntoUnit> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

fn json_to_sql(value: &Value, value_type: ValueType) -> Option<SqlValue> {
    Some(match (value_type, value) {
        (_, Value::Null) => SqlValue::Null,
        (ValueType::String, Value::String(s)) => SqlValue::Text(s.clone()),
        (ValueType::Number, Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Float(n.as_f64()?),
        },
        (ValueType::Boolean, Value::Bool(b)) => SqlValue::Bool(*b),
        (ValueType::DateTime, Value::String(s)) => {
            SqlValue::DateTime(s.parse::<NaiveDateTime>().ok()?)
        }
        (ValueType::DateOnly, Value::String(s)) => SqlValue::Date(s.parse::<NaiveDate>().ok()?),
        (ValueType::Time, Value::String(s)) => SqlValue::Time(s.parse::<NaiveTime>().ok()?),
        (ValueType::Uuid, Value::String(s)) => SqlValue::Uuid(Uuid::parse_str(s).ok()?),
        (ValueType::Bytes, Value::Array(items)) => SqlValue::Bytes(
            items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()?,
        ),
        _ => return None,
    })
}
