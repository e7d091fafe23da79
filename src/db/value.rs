//! Bindable SQL values and identifier checks.
//!
//! Every runtime value reaches PostgreSQL as a bound parameter. Only
//! identifiers (table and column names, which are code constants) are ever
//! written into statement text, and those are validated first.

use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;

use super::DbError;

/// A single bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    /// Typed NULL for nullable text columns (e.g. an omitted email).
    NullText,
    Int(i32),
    BigInt(i64),
    Bool(bool),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map_or(Value::NullText, Value::Text)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Bind `value` as the next positional parameter of `query`.
pub(crate) fn bind_value(
    query: Query<'static, Postgres, PgArguments>,
    value: Value,
) -> Query<'static, Postgres, PgArguments> {
    match value {
        Value::Text(v) => query.bind(v),
        Value::NullText => query.bind(None::<String>),
        Value::Int(v) => query.bind(v),
        Value::BigInt(v) => query.bind(v),
        Value::Bool(v) => query.bind(v),
    }
}

/// Accept only plain identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn check_identifier(name: &str) -> Result<&str, DbError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}
