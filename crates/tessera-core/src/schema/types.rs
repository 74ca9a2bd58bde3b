//! Logical value types and explicit column data types.

use serde::{Deserialize, Serialize};

/// Logical type of a column or expression.
///
/// Drives the default SQL type of a column and the coercion applied to raw
/// driver values when results are reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Unicode text.
    String,
    /// Integer or decimal number.
    Number,
    /// Boolean stored as a bit.
    Boolean,
    /// Date and time.
    DateTime,
    /// Calendar date.
    DateOnly,
    /// Time of day.
    Time,
    /// Unique identifier.
    Uuid,
    /// Binary data.
    Bytes,
}

/// Length of a string or binary column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    /// Fixed maximum length.
    Fixed(u32),
    /// The dialect's maximum length.
    Max,
}

/// Explicit SQL data type overriding the default for a [`ValueType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Unbounded text.
    Text,
    /// Fixed precision decimal.
    Decimal {
        /// Total number of digits.
        precision: u32,
        /// Digits after the decimal point.
        digits: Option<u32>,
    },
    /// Bounded unicode string. `None` uses the default length.
    String(Option<Length>),
    /// Bounded binary. `None` uses the maximum length.
    Binary(Option<Length>),
}

/// Maps a Rust type to the logical type of the column that stores it.
///
/// Implemented for the scalar types a model field may have. `Option<T>` marks
/// the column nullable.
pub trait ColumnValue {
    /// Logical type of the column.
    const VALUE_TYPE: ValueType;
    /// Whether the column accepts NULL.
    const NULLABLE: bool = false;
}

macro_rules! column_value {
    ($kind:ident => $($ty:ty),*) => {
        $(
            impl ColumnValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::$kind;
            }
        )*
    };
}

column_value!(Number => i64, i32, i16, i8, u32, u16, u8, f64, f32);
column_value!(String => String);
column_value!(Boolean => bool);
column_value!(DateTime => chrono::NaiveDateTime);
column_value!(DateOnly => chrono::NaiveDate);
column_value!(Time => chrono::NaiveTime);
column_value!(Uuid => uuid::Uuid);
column_value!(Bytes => Vec<u8>);

impl<T: ColumnValue> ColumnValue for Option<T> {
    const VALUE_TYPE: ValueType = T::VALUE_TYPE;
    const NULLABLE: bool = true;
}
