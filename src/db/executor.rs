//! Uniform CRUD primitives on top of the statement cache.
//!
//! Every operation takes a logical key (the cache identity of its statement
//! shape), a table, and a [`Predicate`] where filtering applies. Any
//! `sqlx::PgExecutor` is accepted: pass `&PgPool` to check out a connection
//! for just this call, or `&mut *tx` to run inside a caller's transaction.

use futures::{StreamExt, TryStreamExt};
use futures::stream::BoxStream;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgExecutor, Postgres, Row};
use std::sync::Arc;

use super::predicate::Predicate;
use super::query_cache::{PreparedStatement, QueryCache};
use super::value::{Value, bind_value, check_identifier};
use super::DbError;

/// A column name paired with the value to write into it.
pub type Assignment = (&'static str, Value);

/// Forward-only row cursor. Dropping it, on any exit path, releases the
/// underlying connection.
pub type RowCursor<'e> = BoxStream<'e, Result<PgRow, DbError>>;

#[derive(Clone)]
pub struct Executor {
    cache: Arc<QueryCache>,
}

impl Executor {
    /// Executor backed by the process-wide statement cache.
    pub fn new() -> Self {
        Self::with_cache(QueryCache::global())
    }

    pub fn with_cache(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// `SELECT columns FROM table WHERE predicate [LIMIT n]`, streamed.
    pub fn select_rows<'e, 'c: 'e, E>(
        &self,
        executor: E,
        key: &'static str,
        table: &'static str,
        columns: &[&'static str],
        predicate: Predicate,
        limit: Option<i64>,
    ) -> Result<RowCursor<'e>, DbError>
    where
        E: 'e + PgExecutor<'c>,
    {
        let stmt = self.cache.get_or_prepare(key, || {
            select_sql(table, columns, Some(&predicate), limit.is_some())
        })?;
        let mut values = Vec::with_capacity(stmt.param_count);
        predicate.collect_values(&mut values);
        if let Some(limit) = limit {
            values.push(Value::BigInt(limit));
        }
        let query = build_query(stmt, values)?;
        tracing::trace!(key, "select_rows");
        Ok(query.fetch(executor).map_err(DbError::from).boxed())
    }

    /// First row's single column. `None` means no row matched; `Some(None)`
    /// means the row holds NULL.
    pub async fn select_scalar<'c, E, T>(
        &self,
        executor: E,
        key: &'static str,
        table: &'static str,
        column: &'static str,
        predicate: Predicate,
    ) -> Result<Option<Option<T>>, DbError>
    where
        E: PgExecutor<'c>,
        T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + Send + Unpin,
    {
        let stmt = self.cache.get_or_prepare(key, || {
            select_sql(table, &[column], Some(&predicate), true)
        })?;
        let mut values = Vec::with_capacity(stmt.param_count);
        predicate.collect_values(&mut values);
        values.push(Value::BigInt(1));
        let row = build_query(stmt, values)?.fetch_optional(executor).await?;
        tracing::trace!(key, found = row.is_some(), "select_scalar");
        Ok(row.map(|r| r.try_get::<Option<T>, _>(0)).transpose()?)
    }

    /// `SELECT COUNT(*)`; a `None` predicate counts the whole table.
    pub async fn count<'c, E>(
        &self,
        executor: E,
        key: &'static str,
        table: &'static str,
        predicate: Option<Predicate>,
    ) -> Result<i64, DbError>
    where
        E: PgExecutor<'c>,
    {
        let stmt = self
            .cache
            .get_or_prepare(key, || count_sql(table, predicate.as_ref()))?;
        let mut values = Vec::with_capacity(stmt.param_count);
        if let Some(predicate) = predicate {
            predicate.collect_values(&mut values);
        }
        let row = build_query(stmt, values)?.fetch_one(executor).await?;
        let count: i64 = row.try_get(0)?;
        tracing::trace!(key, count, "count");
        Ok(count)
    }

    /// Insert exactly one row. A uniqueness conflict surfaces as
    /// [`DbError::ConstraintViolation`].
    pub async fn insert<'c, E>(
        &self,
        executor: E,
        key: &'static str,
        table: &'static str,
        row: Vec<Assignment>,
    ) -> Result<(), DbError>
    where
        E: PgExecutor<'c>,
    {
        let stmt = self.cache.get_or_prepare(key, || {
            let columns: Vec<&str> = row.iter().map(|(c, _)| *c).collect();
            insert_sql(table, &columns)
        })?;
        let values = row.into_iter().map(|(_, v)| v).collect();
        build_query(stmt, values)?.execute(executor).await?;
        tracing::trace!(key, "insert");
        Ok(())
    }

    /// Update every matching row and return how many matched. Zero is fine.
    pub async fn update<'c, E>(
        &self,
        executor: E,
        key: &'static str,
        table: &'static str,
        set: Vec<Assignment>,
        predicate: Predicate,
    ) -> Result<u64, DbError>
    where
        E: PgExecutor<'c>,
    {
        let stmt = self.cache.get_or_prepare(key, || {
            let columns: Vec<&str> = set.iter().map(|(c, _)| *c).collect();
            update_sql(table, &columns, &predicate)
        })?;
        let mut values: Vec<Value> = set.into_iter().map(|(_, v)| v).collect();
        predicate.collect_values(&mut values);
        let result = build_query(stmt, values)?.execute(executor).await?;
        tracing::trace!(key, rows = result.rows_affected(), "update");
        Ok(result.rows_affected())
    }

    /// Single-statement insert-or-update keyed by `conflict_column`.
    pub async fn upsert<'c, E>(
        &self,
        executor: E,
        key: &'static str,
        table: &'static str,
        conflict_column: &'static str,
        row: Vec<Assignment>,
    ) -> Result<(), DbError>
    where
        E: PgExecutor<'c>,
    {
        let stmt = self.cache.get_or_prepare(key, || {
            let columns: Vec<&str> = row.iter().map(|(c, _)| *c).collect();
            upsert_sql(table, conflict_column, &columns)
        })?;
        let values = row.into_iter().map(|(_, v)| v).collect();
        build_query(stmt, values)?.execute(executor).await?;
        tracing::trace!(key, "upsert");
        Ok(())
    }

    /// `column = column + delta` on the matching row, returning the new value
    /// in the same round trip. `None` if no row matched.
    pub async fn increment<'c, E>(
        &self,
        executor: E,
        key: &'static str,
        table: &'static str,
        column: &'static str,
        delta: i32,
        predicate: Predicate,
    ) -> Result<Option<i32>, DbError>
    where
        E: PgExecutor<'c>,
    {
        let stmt = self
            .cache
            .get_or_prepare(key, || increment_sql(table, column, &predicate))?;
        let mut values = vec![Value::Int(delta)];
        predicate.collect_values(&mut values);
        let row = build_query(stmt, values)?.fetch_optional(executor).await?;
        let updated = row.map(|r| r.try_get::<i32, _>(0)).transpose()?;
        tracing::trace!(key, ?updated, "increment");
        Ok(updated)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_query(
    stmt: &'static PreparedStatement,
    values: Vec<Value>,
) -> Result<Query<'static, Postgres, PgArguments>, DbError> {
    stmt.check_arity(values.len())?;
    let mut query = sqlx::query(stmt.sql);
    for value in values {
        query = bind_value(query, value);
    }
    Ok(query)
}

fn column_list(table: &str, columns: &[&str]) -> Result<String, DbError> {
    if columns.is_empty() {
        return Err(DbError::EmptyColumns(table.to_string()));
    }
    let checked = columns
        .iter()
        .map(|c| check_identifier(c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(checked.join(", "))
}

fn push_where(
    sql: &mut String,
    predicate: Option<&Predicate>,
    next: &mut usize,
) -> Result<(), DbError> {
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        predicate.render(sql, next)?;
    }
    Ok(())
}

// Shape builders return the SQL text and its placeholder count.

fn select_sql(
    table: &str,
    columns: &[&str],
    predicate: Option<&Predicate>,
    limit: bool,
) -> Result<(String, usize), DbError> {
    let mut sql = format!(
        "SELECT {} FROM {}",
        column_list(table, columns)?,
        check_identifier(table)?
    );
    let mut next = 1;
    push_where(&mut sql, predicate, &mut next)?;
    if limit {
        sql.push_str(&format!(" LIMIT ${}", next));
        next += 1;
    }
    Ok((sql, next - 1))
}

fn count_sql(table: &str, predicate: Option<&Predicate>) -> Result<(String, usize), DbError> {
    let mut sql = format!("SELECT COUNT(*) FROM {}", check_identifier(table)?);
    let mut next = 1;
    push_where(&mut sql, predicate, &mut next)?;
    Ok((sql, next - 1))
}

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|n| format!("${}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql(table: &str, columns: &[&str]) -> Result<(String, usize), DbError> {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        check_identifier(table)?,
        column_list(table, columns)?,
        placeholders(1, columns.len())
    );
    Ok((sql, columns.len()))
}

fn update_sql(
    table: &str,
    columns: &[&str],
    predicate: &Predicate,
) -> Result<(String, usize), DbError> {
    if columns.is_empty() {
        return Err(DbError::EmptyColumns(table.to_string()));
    }
    let mut sql = format!("UPDATE {} SET ", check_identifier(table)?);
    let mut next = 1;
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&format!("{} = ${}", check_identifier(column)?, next));
        next += 1;
    }
    push_where(&mut sql, Some(predicate), &mut next)?;
    Ok((sql, next - 1))
}

fn upsert_sql(
    table: &str,
    conflict_column: &str,
    columns: &[&str],
) -> Result<(String, usize), DbError> {
    let (insert, count) = insert_sql(table, columns)?;
    let conflict = check_identifier(conflict_column)?;
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != conflict)
        .map(|c| format!("{0} = EXCLUDED.{0}", c))
        .collect();
    let sql = if updates.is_empty() {
        format!("{} ON CONFLICT ({}) DO NOTHING", insert, conflict)
    } else {
        format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            insert,
            conflict,
            updates.join(", ")
        )
    };
    Ok((sql, count))
}

fn increment_sql(
    table: &str,
    column: &str,
    predicate: &Predicate,
) -> Result<(String, usize), DbError> {
    let column = check_identifier(column)?;
    let mut sql = format!(
        "UPDATE {} SET {1} = {1} + $1",
        check_identifier(table)?,
        column
    );
    let mut next = 2;
    push_where(&mut sql, Some(predicate), &mut next)?;
    sql.push_str(&format!(" RETURNING {}", column));
    Ok((sql, next - 1))
}
