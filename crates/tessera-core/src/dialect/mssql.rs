//! Microsoft SQL Server dialect.

use std::fmt::Write as _;

use super::Dialect;
use crate::schema::{DataType, Length, ValueType};
use crate::value::SqlValue;

/// SQL Server: bracket quoting, `N'...'` strings, bit booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Creates the dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn render_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => String::from("NULL"),
            SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => {
                // Escape single quotes by doubling them
                format!("N'{}'", s.replace('\'', "''"))
            }
            SqlValue::Bytes(b) => {
                let mut hex = String::with_capacity(2 + b.len() * 2);
                hex.push_str("0x");
                for byte in b {
                    let _ = write!(hex, "{byte:02x}");
                }
                hex
            }
            SqlValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            SqlValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            SqlValue::Time(t) => format!("'{}'", t.format("%H:%M:%S")),
            SqlValue::Uuid(u) => format!("'{u}'"),
        }
    }

    fn value_type_name(&self, value_type: ValueType) -> String {
        String::from(match value_type {
            ValueType::String => "NVARCHAR(255)",
            ValueType::Number => "BIGINT",
            ValueType::Boolean => "BIT",
            ValueType::DateTime => "DATETIME2",
            ValueType::DateOnly => "DATE",
            ValueType::Time => "TIME",
            ValueType::Uuid => "UNIQUEIDENTIFIER",
            ValueType::Bytes => "VARBINARY(MAX)",
        })
    }

    fn data_type_name(&self, data_type: &DataType) -> String {
        match data_type {
            DataType::Text => String::from("NTEXT"),
            DataType::Decimal { precision, digits } => match digits {
                Some(digits) => format!("DECIMAL({precision}, {digits})"),
                None => format!("DECIMAL({precision})"),
            },
            DataType::String(length) => match length {
                Some(Length::Fixed(n)) => format!("NVARCHAR({n})"),
                Some(Length::Max) => String::from("NVARCHAR(MAX)"),
                None => String::from("NVARCHAR(255)"),
            },
            DataType::Binary(length) => match length {
                Some(Length::Fixed(n)) => format!("VARBINARY({n})"),
                Some(Length::Max) | None => String::from("VARBINARY(MAX)"),
            },
        }
    }
}
