//! Rebuilds nested objects from flat result rows.
//!
//! A select over joined graphs returns one flat row per combination, keyed by
//! dotted paths such as `company.name`. [`parse_rows`] coerces every value by
//! its column's logical type, then nests and groups rows so that each parent
//! appears once with its collection joins as arrays and its single joins as
//! objects.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use tessera_core::schema::ValueType;

use crate::entity::Entity;

/// A result row as returned by an executor.
pub type Row = Map<String, Value>;

/// Type hints for one statement's result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOption {
    /// Logical type per dotted column key.
    pub columns: IndexMap<String, ValueType>,
    /// Joined paths, `true` for single-row joins.
    pub joins: IndexMap<String, bool>,
}

impl ParseOption {
    /// Hints for every unit and join of an entity.
    ///
    /// With `only`, columns and joins whose full key is not listed are left
    /// out.
    #[must_use]
    pub fn from_entity(entity: &Entity, only: Option<&[&str]>) -> Self {
        let keep = |key: &str| only.is_none_or(|only| only.contains(&key));
        let columns = entity
            .flatten()
            .into_iter()
            .filter(|(key, _)| keep(key.as_str()))
            .filter_map(|(key, unit)| unit.value_type().map(|t| (key, t)))
            .collect();
        let joins = entity
            .relations()
            .into_iter()
            .filter(|(key, _)| keep(key.as_str()))
            .collect();
        Self { columns, joins }
    }
}

/// Coerces and nests rows. Without hints rows are only stripped of NULLs.
#[must_use]
pub fn parse_rows(rows: Vec<Row>, option: Option<&ParseOption>) -> Vec<Value> {
    let data: Vec<Row> = rows
        .into_iter()
        .filter_map(|row| coerce_row(row, option))
        .collect();

    let all_joins: Vec<(String, bool)> = option
        .map(|o| o.joins.iter().map(|(k, v)| (k.clone(), *v)).collect())
        .unwrap_or_default();
    let root_joins: Vec<(String, bool)> = all_joins
        .iter()
        .filter(|(key, _)| !key.contains('.'))
        .cloned()
        .collect();

    let rows = if root_joins.is_empty() {
        data
    } else {
        nest(data, &root_joins, None, &all_joins)
    };
    rows.into_iter().map(Value::Object).collect()
}

fn coerce_row(row: Row, option: Option<&ParseOption>) -> Option<Row> {
    let out: Row = row
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value_type = option.and_then(|o| o.columns.get(&key)).copied();
            let value = coerce(value, value_type);
            (key, value)
        })
        .collect();
    (!out.is_empty()).then_some(out)
}

/// Converts a raw driver value to the representation of its logical type.
///
/// Values that cannot be interpreted are kept as they are.
#[must_use]
pub fn coerce(value: Value, value_type: Option<ValueType>) -> Value {
    match (value_type, value) {
        (Some(ValueType::Number), Value::String(s)) => parse_number(&s).unwrap_or(Value::String(s)),
        (Some(ValueType::Number), Value::Bool(b)) => Value::from(i64::from(b)),
        (Some(ValueType::Boolean), value) => Value::Bool(truthy(&value)),
        (Some(ValueType::DateTime), Value::String(s)) => parse_date_time(&s)
            .map_or(Value::String(s), |dt| Value::String(format_date_time(dt))),
        (Some(ValueType::DateOnly), Value::String(s)) => parse_date(&s)
            .map_or(Value::String(s), |d| Value::String(d.to_string())),
        (Some(ValueType::Time), Value::String(s)) => parse_time(&s)
            .map_or(Value::String(s), |t| Value::String(format_time(t))),
        (Some(ValueType::Uuid), Value::String(s)) => Uuid::parse_str(&s)
            .map_or(Value::String(s), |u| Value::String(u.to_string())),
        (_, value) => value,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok()
}

fn format_date_time(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M:%S%.f").to_string()
}

fn nest(
    source: Vec<Row>,
    joins: &[(String, bool)],
    parent: Option<&str>,
    all_joins: &[(String, bool)],
) -> Vec<Row> {
    let keys: Vec<&str> = joins.iter().map(|(key, _)| key.as_str()).collect();
    let grouped = group(split_joins(source, &keys), &keys);

    let mut out = Vec::new();
    for item in grouped {
        let mut split = vec![item];
        for (key, single) in joins {
            let full = match parent {
                Some(parent) => format!("{parent}.{key}"),
                None => key.clone(),
            };
            let children: Vec<(String, bool)> = all_joins
                .iter()
                .filter_map(|(k, s)| {
                    let rest = k.strip_prefix(&full)?.strip_prefix('.')?;
                    (!rest.contains('.')).then(|| (rest.to_string(), *s))
                })
                .collect();

            let mut next = Vec::new();
            for mut item in split {
                let values = match item.remove(key) {
                    Some(Value::Array(values)) => values,
                    _ => Vec::new(),
                };
                let values: Vec<Value> = if children.is_empty() {
                    values
                } else {
                    let rows = values
                        .into_iter()
                        .filter_map(|v| match v {
                            Value::Object(map) => Some(map),
                            _ => None,
                        })
                        .collect();
                    nest(rows, &children, Some(&full), all_joins)
                        .into_iter()
                        .map(Value::Object)
                        .collect()
                };

                if *single {
                    if values.is_empty() {
                        next.push(item);
                    } else {
                        for value in values {
                            let mut copy = item.clone();
                            copy.insert(key.clone(), value);
                            next.push(copy);
                        }
                    }
                } else {
                    item.insert(key.clone(), Value::Array(values));
                    next.push(item);
                }
            }
            split = next;
        }
        out.extend(split);
    }
    out
}

/// Moves `join.x` keys into a `join` object. A key belongs to the first join
/// it is prefixed by.
fn split_joins(source: Vec<Row>, joins: &[&str]) -> Vec<Row> {
    source
        .into_iter()
        .map(|row| {
            let mut out = Row::new();
            for (key, value) in row {
                let owner = joins.iter().find_map(|join| {
                    key.strip_prefix(join)
                        .and_then(|rest| rest.strip_prefix('.'))
                        .map(|rest| (*join, rest.to_string()))
                });
                match owner {
                    Some((join, rest)) => {
                        let entry = out
                            .entry(join.to_string())
                            .or_insert_with(|| Value::Object(Row::new()));
                        if let Value::Object(map) = entry {
                            map.insert(rest, value);
                        }
                    }
                    None => {
                        out.insert(key, value);
                    }
                }
            }
            out
        })
        .collect()
}

/// Merges rows sharing the same non-join values; join objects accumulate
/// into de-duplicated arrays.
fn group(source: Vec<Row>, joins: &[&str]) -> Vec<Row> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Row> = HashMap::new();

    for mut row in source {
        let mut join_values = Vec::with_capacity(joins.len());
        for join in joins {
            let value = row
                .remove(*join)
                .filter(|v| matches!(v, Value::Object(map) if map.values().any(|x| !x.is_null())));
            join_values.push(value);
        }
        let key = group_key(&row);

        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            let mut item = row;
            for join in joins {
                item.insert((*join).to_string(), Value::Array(Vec::new()));
            }
            item
        });
        for (join, value) in joins.iter().zip(join_values) {
            if let (Some(value), Some(Value::Array(values))) = (value, entry.get_mut(*join)) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

fn group_key(row: &Row) -> String {
    let mut keys: Vec<&String> = row.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| format!("{key}:{}", row[key.as_str()]))
        .collect::<Vec<_>>()
        .join("|")
}
