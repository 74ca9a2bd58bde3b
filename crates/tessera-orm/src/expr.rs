//! Typed expressions and predicate helpers.
//!
//! A [`QueryUnit`] is an expression with the logical type of the value it
//! produces. Columns of a graph's [`Entity`](crate::entity::Entity) are units,
//! and so is every value built by the helpers here. Plain Rust values become
//! escaped literals through [`IntoUnit`].
//!
//! Predicates are token lists. Nested predicates render in parentheses, so
//! `and`/`or` compose without precedence surprises.
//!
//! ```rust
//! use tessera_core::{QueryCompiler, ValueType};
//! use tessera_orm::expr::{self, QueryUnit};
//!
//! let name = QueryUnit::raw(ValueType::String, "[TBL].[name]");
//! let age = QueryUnit::raw(ValueType::Number, "[TBL].[age]");
//! let predicate = expr::and(vec![
//!     expr::equal(&name, "kim"),
//!     expr::greater_than(&age, 20),
//! ]);
//! let sql = QueryCompiler::mssql().tokens(predicate.tokens()).unwrap();
//! assert_eq!(sql, "([TBL].[name] = N'kim') AND ([TBL].[age] > 20)");
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use tessera_core::dialect::Dialect;
use tessera_core::schema::{ColumnValue, ValueType};
use tessera_core::{QueryValue, SqlValue, ToSqlValue};

/// An expression and the logical type of its value.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryUnit {
    value_type: Option<ValueType>,
    value: QueryValue,
}

impl QueryUnit {
    /// Creates a unit from an expression.
    #[must_use]
    pub fn new(value_type: Option<ValueType>, value: impl Into<QueryValue>) -> Self {
        Self {
            value_type,
            value: value.into(),
        }
    }

    /// Creates a unit from SQL text emitted verbatim.
    #[must_use]
    pub fn raw(value_type: ValueType, sql: impl Into<String>) -> Self {
        Self::new(Some(value_type), QueryValue::raw(sql))
    }

    /// The NULL literal.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            value_type: None,
            value: QueryValue::Literal(SqlValue::Null),
        }
    }

    /// Logical type, if known.
    #[must_use]
    pub const fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    /// The expression.
    #[must_use]
    pub const fn value(&self) -> &QueryValue {
        &self.value
    }

    /// Consumes the unit, returning the expression.
    #[must_use]
    pub fn into_value(self) -> QueryValue {
        self.value
    }

    /// Returns `true` when the unit is a plain value rather than an
    /// expression over columns.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self.value, QueryValue::Literal(_))
    }

    /// Returns `true` for the NULL literal.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.value.is_null()
    }

    fn group(value_type: Option<ValueType>, tokens: Vec<QueryValue>) -> Self {
        Self::new(value_type, QueryValue::Group(tokens))
    }
}

/// Conversion into a [`QueryUnit`].
///
/// Units pass through unchanged; Rust values become literals.
pub trait IntoUnit {
    /// Performs the conversion.
    fn into_unit(self) -> QueryUnit;
}

impl IntoUnit for QueryUnit {
    fn into_unit(self) -> QueryUnit {
        self
    }
}

impl IntoUnit for &QueryUnit {
    fn into_unit(self) -> QueryUnit {
        self.clone()
    }
}

impl IntoUnit for SqlValue {
    fn into_unit(self) -> QueryUnit {
        QueryUnit::new(self.value_type(), QueryValue::Literal(self))
    }
}

macro_rules! literal_unit {
    ($($ty:ty),*) => {
        $(
            impl IntoUnit for $ty {
                fn into_unit(self) -> QueryUnit {
                    self.to_sql_value().into_unit()
                }
            }
        )*
    };
}

literal_unit!(bool, i64, i32, i16, i8, u32, u16, u8, f64, f32, String, &str, Vec<u8>);
literal_unit!(NaiveDateTime, NaiveDate, NaiveTime, Uuid);

impl<T: ToSqlValue + ColumnValue> IntoUnit for Option<T> {
    fn into_unit(self) -> QueryUnit {
        QueryUnit::new(
            Some(T::VALUE_TYPE),
            QueryValue::Literal(self.to_sql_value()),
        )
    }
}

/// A boolean condition as a token list.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate(Vec<QueryValue>);

impl Predicate {
    /// Creates a predicate from raw tokens.
    #[must_use]
    pub const fn new(tokens: Vec<QueryValue>) -> Self {
        Self(tokens)
    }

    /// The tokens.
    #[must_use]
    pub fn tokens(&self) -> &[QueryValue] {
        &self.0
    }

    /// Consumes the predicate, returning its tokens.
    #[must_use]
    pub fn into_tokens(self) -> Vec<QueryValue> {
        self.0
    }

    /// Wraps the predicate into one parenthesized expression.
    #[must_use]
    pub fn group(self) -> QueryValue {
        QueryValue::Group(self.0)
    }
}

impl From<QueryUnit> for Predicate {
    fn from(unit: QueryUnit) -> Self {
        Self(vec![unit.value])
    }
}

fn tok(sql: &str) -> QueryValue {
    QueryValue::raw(sql)
}

fn binary(source: QueryUnit, operator: &str, target: QueryUnit) -> Predicate {
    Predicate(vec![source.value, tok(operator), target.value])
}

fn join_predicates(predicates: Vec<Predicate>, separator: &str) -> Predicate {
    let mut tokens = Vec::with_capacity(predicates.len() * 2);
    for predicate in predicates {
        if !tokens.is_empty() {
            tokens.push(tok(separator));
        }
        tokens.push(predicate.group());
    }
    Predicate(tokens)
}

/// All of `predicates`.
#[must_use]
pub fn and(predicates: Vec<Predicate>) -> Predicate {
    join_predicates(predicates, " AND ")
}

/// Any of `predicates`.
#[must_use]
pub fn or(predicates: Vec<Predicate>) -> Predicate {
    join_predicates(predicates, " OR ")
}

/// `source = target`.
///
/// A NULL target becomes `IS NULL`. Between two expressions the comparison
/// also holds when both sides are NULL.
pub fn equal(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    let source = source.into_unit();
    let target = target.into_unit();
    if target.is_null() {
        return is_null(source);
    }
    if !source.is_literal() && !target.is_literal() {
        return or(vec![
            and(vec![is_null(&source), is_null(&target)]),
            binary(source, " = ", target),
        ]);
    }
    binary(source, " = ", target)
}

/// `source != target`, treating NULL as a distinct value.
pub fn not_equal(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    let source = source.into_unit();
    let target = target.into_unit();
    if target.is_null() {
        return is_not_null(source);
    }
    if !source.is_literal() && !target.is_literal() {
        return or(vec![
            and(vec![is_null(&source), is_not_null(&target)]),
            and(vec![is_not_null(&source), is_null(&target)]),
            binary(source, " != ", target),
        ]);
    }
    or(vec![is_null(&source), binary(source, " != ", target)])
}

/// `source IS NULL`.
pub fn is_null(source: impl IntoUnit) -> Predicate {
    Predicate(vec![source.into_unit().value, tok(" IS NULL")])
}

/// `source IS NOT NULL`.
pub fn is_not_null(source: impl IntoUnit) -> Predicate {
    Predicate(vec![source.into_unit().value, tok(" IS NOT NULL")])
}

/// NULL or false.
pub fn is_false(source: impl IntoUnit) -> Predicate {
    let source = source.into_unit();
    or(vec![is_null(&source), equal(source, false)])
}

/// `source < target`.
pub fn less_than(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    binary(source.into_unit(), " < ", target.into_unit())
}

/// `source <= target`.
pub fn less_than_or_equal(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    binary(source.into_unit(), " <= ", target.into_unit())
}

/// `source > target`.
pub fn greater_than(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    binary(source.into_unit(), " > ", target.into_unit())
}

/// `source >= target`.
pub fn greater_than_or_equal(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    binary(source.into_unit(), " >= ", target.into_unit())
}

/// `from <= source < to`.
pub fn between(source: impl IntoUnit, from: impl IntoUnit, to: impl IntoUnit) -> Predicate {
    let source = source.into_unit();
    and(vec![
        greater_than_or_equal(&source, from),
        less_than(source, to),
    ])
}

/// `source LIKE pattern`.
pub fn like(source: impl IntoUnit, pattern: impl IntoUnit) -> Predicate {
    binary(source.into_unit(), " LIKE ", pattern.into_unit())
}

/// `source NOT LIKE pattern`.
pub fn not_like(source: impl IntoUnit, pattern: impl IntoUnit) -> Predicate {
    binary(source.into_unit(), " NOT LIKE ", pattern.into_unit())
}

/// Escapes the LIKE metacharacters `%`, `_` and `[` of `text` so it matches
/// literally inside a pattern.
///
/// ```rust
/// assert_eq!(tessera_orm::expr::escape_like("5%_[a]"), "5[%][_][[]a]");
/// ```
#[must_use]
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => out.push_str("[%]"),
            '_' => out.push_str("[_]"),
            '[' => out.push_str("[[]"),
            _ => out.push(c),
        }
    }
    out
}

/// `source` contains `target`.
pub fn includes(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    binary(
        source.into_unit(),
        " LIKE ",
        concat(vec!["%".into_unit(), target.into_unit(), "%".into_unit()]),
    )
}

/// `source` does not contain `target`.
pub fn not_includes(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    binary(
        source.into_unit(),
        " NOT LIKE ",
        concat(vec!["%".into_unit(), target.into_unit(), "%".into_unit()]),
    )
}

/// `source` starts with `target`.
pub fn starts_with(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    Predicate(vec![
        source.into_unit().value,
        tok(" LIKE "),
        target.into_unit().value,
        tok(" + '%'"),
    ])
}

/// `source` ends with `target`.
pub fn ends_with(source: impl IntoUnit, target: impl IntoUnit) -> Predicate {
    Predicate(vec![
        source.into_unit().value,
        tok(" LIKE '%' + "),
        target.into_unit().value,
    ])
}

fn value_list(items: Vec<QueryUnit>) -> QueryValue {
    let mut tokens = Vec::with_capacity(items.len() * 2);
    for item in items {
        if !tokens.is_empty() {
            tokens.push(tok(", "));
        }
        tokens.push(item.value);
    }
    QueryValue::Group(tokens)
}

/// `source IN (...)`. An empty list matches nothing; NULL items match NULL.
pub fn in_list<I>(source: impl IntoUnit, items: I) -> Predicate
where
    I: IntoIterator,
    I::Item: IntoUnit,
{
    let source = source.into_unit();
    let (nulls, values): (Vec<QueryUnit>, Vec<QueryUnit>) = items
        .into_iter()
        .map(IntoUnit::into_unit)
        .partition(QueryUnit::is_null);
    if nulls.is_empty() && values.is_empty() {
        return Predicate(vec![tok("1 = 0")]);
    }
    if values.is_empty() {
        return is_null(source);
    }
    let listed = Predicate(vec![source.value.clone(), tok(" IN "), value_list(values)]);
    if nulls.is_empty() {
        listed
    } else {
        or(vec![listed, is_null(source)])
    }
}

/// `source NOT IN (...)`. An empty list matches everything.
pub fn not_in_list<I>(source: impl IntoUnit, items: I) -> Predicate
where
    I: IntoIterator,
    I::Item: IntoUnit,
{
    let source = source.into_unit();
    let (nulls, values): (Vec<QueryUnit>, Vec<QueryUnit>) = items
        .into_iter()
        .map(IntoUnit::into_unit)
        .partition(QueryUnit::is_null);
    if nulls.is_empty() && values.is_empty() {
        return Predicate(vec![tok("1 = 1")]);
    }
    if values.is_empty() {
        return is_not_null(source);
    }
    let listed = Predicate(vec![source.value.clone(), tok(" NOT IN "), value_list(values)]);
    if nulls.is_empty() {
        or(vec![listed, is_null(source)])
    } else {
        listed
    }
}

/// Boolean value of a predicate.
pub fn is(predicate: Predicate) -> QueryUnit {
    case(predicate, true).otherwise(false)
}

/// Wraps a value, typing it.
pub fn val(value: impl IntoUnit) -> QueryUnit {
    value.into_unit()
}

/// An expression assembled from raw tokens.
#[must_use]
pub fn query(value_type: ValueType, tokens: Vec<QueryValue>) -> QueryUnit {
    QueryUnit::group(Some(value_type), tokens)
}

/// `COUNT(*)`.
#[must_use]
pub fn count() -> QueryUnit {
    QueryUnit::raw(ValueType::Number, "COUNT(*)")
}

/// `COUNT(DISTINCT(arg))`.
pub fn count_distinct(arg: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::Number),
        vec![tok("COUNT(DISTINCT("), arg.into_unit().value, tok("))")],
    )
}

/// `SUM(arg)`.
pub fn sum(arg: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::Number),
        vec![tok("SUM("), arg.into_unit().value, tok(")")],
    )
}

/// `MAX(arg)`.
pub fn max(arg: impl IntoUnit) -> QueryUnit {
    let arg = arg.into_unit();
    QueryUnit::group(arg.value_type, vec![tok("MAX("), arg.value, tok(")")])
}

/// `MIN(arg)`.
pub fn min(arg: impl IntoUnit) -> QueryUnit {
    let arg = arg.into_unit();
    QueryUnit::group(arg.value_type, vec![tok("MIN("), arg.value, tok(")")])
}

/// Whether any row has a non-NULL `arg`.
pub fn exists(arg: impl IntoUnit) -> QueryUnit {
    case(greater_than(if_null(count_distinct(arg), 0), 0), true).otherwise(false)
}

/// Whether no row has a non-NULL `arg`.
pub fn not_exists(arg: impl IntoUnit) -> QueryUnit {
    case(less_than_or_equal(if_null(count_distinct(arg), 0), 0), true).otherwise(false)
}

/// `ISNULL(source, fallback)`.
pub fn if_null(source: impl IntoUnit, fallback: impl IntoUnit) -> QueryUnit {
    let source = source.into_unit();
    let fallback = fallback.into_unit();
    QueryUnit::group(
        source.value_type.or(fallback.value_type),
        vec![
            tok("ISNULL("),
            source.value,
            tok(", "),
            fallback.value,
            tok(")"),
        ],
    )
}

/// Starts a `CASE WHEN predicate THEN then`.
pub fn case(predicate: Predicate, then: impl IntoUnit) -> CaseBuilder {
    CaseBuilder {
        value_type: None,
        tokens: vec![tok("CASE")],
    }
    .case(predicate, then)
}

/// Starts a `CASE` over the values of `arg`.
pub fn case_when(arg: impl IntoUnit) -> CaseWhenBuilder {
    CaseWhenBuilder {
        arg: arg.into_unit(),
        inner: CaseBuilder {
            value_type: None,
            tokens: vec![tok("CASE")],
        },
    }
}

/// Searched `CASE` expression under construction.
#[derive(Debug, Clone)]
#[must_use]
pub struct CaseBuilder {
    value_type: Option<ValueType>,
    tokens: Vec<QueryValue>,
}

impl CaseBuilder {
    /// Adds a `WHEN predicate THEN then` branch.
    pub fn case(mut self, predicate: Predicate, then: impl IntoUnit) -> Self {
        let then = then.into_unit();
        self.value_type = then.value_type.or(self.value_type);
        self.tokens.push(tok(" WHEN "));
        self.tokens.push(predicate.group());
        self.tokens.push(tok(" THEN "));
        self.tokens.push(then.value);
        self
    }

    /// Closes the expression with an `ELSE` branch.
    pub fn otherwise(mut self, value: impl IntoUnit) -> QueryUnit {
        let value = value.into_unit();
        let value_type = value.value_type.or(self.value_type);
        self.tokens.push(tok(" ELSE "));
        self.tokens.push(value.value);
        self.tokens.push(tok(" END"));
        QueryUnit::group(value_type, self.tokens)
    }
}

/// Simple `CASE` expression under construction.
#[derive(Debug, Clone)]
#[must_use]
pub struct CaseWhenBuilder {
    arg: QueryUnit,
    inner: CaseBuilder,
}

impl CaseWhenBuilder {
    /// Adds a branch taken when the argument equals `value`.
    pub fn when(mut self, value: impl IntoUnit, then: impl IntoUnit) -> Self {
        self.inner = self.inner.case(equal(&self.arg, value), then);
        self
    }

    /// Closes the expression with an `ELSE` branch.
    pub fn otherwise(self, value: impl IntoUnit) -> QueryUnit {
        self.inner.otherwise(value)
    }
}

/// Date part used by [`date_diff`] and [`date_add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    /// Year.
    Year,
    /// Quarter.
    Quarter,
    /// Month.
    Month,
    /// Day.
    Day,
    /// Week.
    Week,
    /// Hour.
    Hour,
    /// Minute.
    Minute,
    /// Second.
    Second,
    /// Millisecond.
    Millisecond,
}

impl DatePart {
    /// The SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Day => "day",
            Self::Week => "week",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
        }
    }
}

/// `DATEDIFF(part, from, to)`.
pub fn date_diff(part: DatePart, from: impl IntoUnit, to: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::Number),
        vec![
            tok("DATEDIFF("),
            tok(part.as_sql()),
            tok(", "),
            from.into_unit().value,
            tok(", "),
            to.into_unit().value,
            tok(")"),
        ],
    )
}

/// `DATEADD(part, value, from)`.
pub fn date_add(part: DatePart, from: impl IntoUnit, value: impl IntoUnit) -> QueryUnit {
    let from = from.into_unit();
    QueryUnit::group(
        from.value_type,
        vec![
            tok("DATEADD("),
            tok(part.as_sql()),
            tok(", "),
            value.into_unit().value,
            tok(", "),
            from.value,
            tok(")"),
        ],
    )
}

/// `CONVERT(type, source)`.
pub fn cast(dialect: &dyn Dialect, source: impl IntoUnit, target: ValueType) -> QueryUnit {
    QueryUnit::group(
        Some(target),
        vec![
            tok("CONVERT("),
            QueryValue::raw(dialect.value_type_name(target)),
            tok(", "),
            source.into_unit().value,
            tok(")"),
        ],
    )
}

/// `LEFT(source, count)`.
pub fn left(source: impl IntoUnit, count: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::String),
        vec![
            tok("LEFT("),
            source.into_unit().value,
            tok(", "),
            count.into_unit().value,
            tok(")"),
        ],
    )
}

/// `RIGHT(source, count)`.
pub fn right(source: impl IntoUnit, count: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::String),
        vec![
            tok("RIGHT("),
            source.into_unit().value,
            tok(", "),
            count.into_unit().value,
            tok(")"),
        ],
    )
}

/// `REPLACE(source, from, to)`.
pub fn replace(source: impl IntoUnit, from: impl IntoUnit, to: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::String),
        vec![
            tok("REPLACE("),
            source.into_unit().value,
            tok(", "),
            from.into_unit().value,
            tok(", "),
            to.into_unit().value,
            tok(")"),
        ],
    )
}

/// `LEN(source)`.
pub fn string_length(source: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::Number),
        vec![tok("LEN("), source.into_unit().value, tok(")")],
    )
}

/// `DATALENGTH(source)`.
pub fn data_length(source: impl IntoUnit) -> QueryUnit {
    QueryUnit::group(
        Some(ValueType::Number),
        vec![tok("DATALENGTH("), source.into_unit().value, tok(")")],
    )
}

/// `CONCAT(...)`.
#[must_use]
pub fn concat(args: Vec<QueryUnit>) -> QueryUnit {
    let mut tokens = vec![tok("CONCAT(")];
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            tokens.push(tok(", "));
        }
        tokens.push(arg.value);
    }
    tokens.push(tok(")"));
    QueryUnit::group(Some(ValueType::String), tokens)
}

#[cfg(test)]
mod tests {
    use tessera_core::{MssqlDialect, QueryCompiler};

    use super::*;

    fn render(predicate: &Predicate) -> String {
        QueryCompiler::mssql().tokens(predicate.tokens()).unwrap()
    }

    fn unit(value: &QueryUnit) -> String {
        QueryCompiler::mssql().value(value.value()).unwrap()
    }

    fn name() -> QueryUnit {
        QueryUnit::raw(ValueType::String, "[TBL].[name]")
    }

    fn other() -> QueryUnit {
        QueryUnit::raw(ValueType::String, "[TBL.c].[name]")
    }

    #[test]
    fn test_equal_literal() {
        assert_eq!(render(&equal(name(), "kim")), "[TBL].[name] = N'kim'");
    }

    #[test]
    fn test_equal_null_is_is_null() {
        assert_eq!(render(&equal(name(), None::<String>)), "[TBL].[name] IS NULL");
    }

    #[test]
    fn test_equal_between_columns_is_null_safe() {
        assert_eq!(
            render(&equal(name(), other())),
            "(([TBL].[name] IS NULL) AND ([TBL.c].[name] IS NULL)) OR ([TBL].[name] = [TBL.c].[name])"
        );
    }

    #[test]
    fn test_not_equal_literal_keeps_nulls() {
        assert_eq!(
            render(&not_equal(name(), "kim")),
            "([TBL].[name] IS NULL) OR ([TBL].[name] != N'kim')"
        );
    }

    #[test]
    fn test_in_list() {
        assert_eq!(render(&in_list(name(), Vec::<String>::new())), "1 = 0");
        assert_eq!(
            render(&in_list(name(), ["a", "b"])),
            "[TBL].[name] IN (N'a', N'b')"
        );
        assert_eq!(
            render(&in_list(name(), [Some(String::from("a")), None])),
            "([TBL].[name] IN (N'a')) OR ([TBL].[name] IS NULL)"
        );
        assert_eq!(render(&not_in_list(name(), Vec::<String>::new())), "1 = 1");
    }

    #[test]
    fn test_includes_uses_concat() {
        assert_eq!(
            render(&includes(name(), "im")),
            "[TBL].[name] LIKE (CONCAT(N'%', N'im', N'%'))"
        );
    }

    #[test]
    fn test_between_is_half_open() {
        let age = QueryUnit::raw(ValueType::Number, "[age]");
        assert_eq!(render(&between(age, 1, 5)), "([age] >= 1) AND ([age] < 5)");
    }

    #[test]
    fn test_case_types_follow_branches() {
        let value = case(equal(name(), "a"), 1).otherwise(0);
        assert_eq!(value.value_type(), Some(ValueType::Number));
        assert_eq!(
            unit(&value),
            "(CASE WHEN ([TBL].[name] = N'a') THEN 1 ELSE 0 END)"
        );
        let flag = is(is_null(name()));
        assert_eq!(flag.value_type(), Some(ValueType::Boolean));
    }

    #[test]
    fn test_case_when() {
        let value = case_when(name())
            .when("a", "x")
            .when("b", "y")
            .otherwise("z");
        assert_eq!(
            unit(&value),
            "(CASE WHEN ([TBL].[name] = N'a') THEN N'x' WHEN ([TBL].[name] = N'b') THEN N'y' ELSE N'z' END)"
        );
    }

    #[test]
    fn test_aggregates_keep_argument_type() {
        let created = QueryUnit::raw(ValueType::DateTime, "[TBL].[created]");
        assert_eq!(max(&created).value_type(), Some(ValueType::DateTime));
        assert_eq!(unit(&count()), "COUNT(*)");
        assert_eq!(unit(&count_distinct(name())), "(COUNT(DISTINCT([TBL].[name])))");
        assert_eq!(
            unit(&exists(name())),
            "(CASE WHEN ((ISNULL((COUNT(DISTINCT([TBL].[name]))), 0)) > 0) THEN 1 ELSE 0 END)"
        );
    }

    #[test]
    fn test_cast_uses_dialect_type_name() {
        let value = cast(&MssqlDialect, name(), ValueType::Number);
        assert_eq!(unit(&value), "(CONVERT(BIGINT, [TBL].[name]))");
    }

    #[test]
    fn test_date_functions() {
        let created = QueryUnit::raw(ValueType::DateTime, "[c]");
        assert_eq!(
            unit(&date_add(DatePart::Day, &created, 3)),
            "(DATEADD(day, 3, [c]))"
        );
        assert_eq!(
            unit(&date_diff(DatePart::Month, &created, &created)),
            "(DATEDIFF(month, [c], [c]))"
        );
    }
}
