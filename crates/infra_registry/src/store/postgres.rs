//! PostgreSQL store
//!
//! Statements are assembled at runtime with [`QueryBuilder`]: identifiers
//! come from the static entity schema (already validated by the registry)
//! and every value is pushed as a bind parameter. Rows are decoded into
//! [`Record`]s by column type name.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, PgConnection, Postgres, QueryBuilder, Row, Transaction, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreTransaction};
use crate::entity::Schema;
use crate::error::StorageError;
use crate::filter::{Filter, FilterOp, FilterSet, Query};
use crate::value::{FieldValue, Record};

/// Default bound on row lock waits
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Store`] backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Creates a store over an existing pool
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets the `lock_timeout` applied to every transaction
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters; the value is an integer we format ourselves
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;
        Ok(Box::new(PgStoreTransaction { tx: Some(tx) }))
    }

    async fn select(
        &self,
        schema: &'static Schema,
        query: &Query,
    ) -> Result<Vec<Record>, StorageError> {
        let mut qb = build_select(schema, query);
        debug!(sql = qb.sql(), "select");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(
        &self,
        schema: &'static Schema,
        filters: &FilterSet,
    ) -> Result<u64, StorageError> {
        let mut qb = build_count(schema, filters);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

/// An open PostgreSQL transaction
///
/// Dropping it without commit lets SQLx roll it back.
pub struct PgStoreTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStoreTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection, StorageError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StorageError::query("transaction already finished"))
    }

    fn take(&mut self) -> Result<Transaction<'static, Postgres>, StorageError> {
        self.tx
            .take()
            .ok_or_else(|| StorageError::query("transaction already finished"))
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert(
        &mut self,
        schema: &'static Schema,
        record: &Record,
    ) -> Result<Record, StorageError> {
        let mut qb = build_insert(schema, record);
        let row = qb.build().fetch_one(self.conn()?).await?;
        decode_row(&row)
    }

    async fn update(
        &mut self,
        schema: &'static Schema,
        id: Uuid,
        record: &Record,
    ) -> Result<Record, StorageError> {
        let mut qb = build_update(schema, id, record);
        match qb.build().fetch_optional(self.conn()?).await? {
            Some(row) => decode_row(&row),
            None => Err(StorageError::not_found(format!(
                "{} row {} does not exist",
                schema.table, id
            ))),
        }
    }

    async fn delete(&mut self, schema: &'static Schema, id: Uuid) -> Result<(), StorageError> {
        let mut qb = build_delete(schema, id);
        let result = qb.build().execute(self.conn()?).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!(
                "{} row {} does not exist",
                schema.table, id
            )));
        }
        Ok(())
    }

    async fn select(
        &mut self,
        schema: &'static Schema,
        query: &Query,
    ) -> Result<Vec<Record>, StorageError> {
        let mut qb = build_select(schema, query);
        debug!(sql = qb.sql(), "select in transaction");
        let rows = qb.build().fetch_all(self.conn()?).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(
        &mut self,
        schema: &'static Schema,
        filters: &FilterSet,
    ) -> Result<u64, StorageError> {
        let mut qb = build_count(schema, filters);
        let count: i64 = qb.build_query_scalar().fetch_one(self.conn()?).await?;
        Ok(count.max(0) as u64)
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.take()?.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.take()?.rollback().await?;
        Ok(())
    }
}

/// Double-quotes an identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes LIKE wildcards so user text matches literally
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Bool(b) => {
            qb.push_bind(*b);
        }
        FieldValue::Int(i) => {
            qb.push_bind(*i);
        }
        FieldValue::Decimal(d) => {
            qb.push_bind(*d);
        }
        FieldValue::Text(s) => {
            qb.push_bind(s.clone());
        }
        FieldValue::Uuid(u) => {
            qb.push_bind(*u);
        }
        FieldValue::Timestamp(t) => {
            qb.push_bind(*t);
        }
        FieldValue::Date(d) => {
            qb.push_bind(*d);
        }
        // Operand lists are expanded by the caller; loaded associations are never persisted
        FieldValue::Null | FieldValue::List(_) | FieldValue::One(_) | FieldValue::Many(_) => {
            qb.push("NULL");
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    let column = quote_ident(&filter.field);
    match (filter.op, &filter.value) {
        (FilterOp::IsEmpty, _) | (FilterOp::Equal, FieldValue::Null) => {
            qb.push(column).push(" IS NULL");
        }
        (FilterOp::IsNotEmpty, _) | (FilterOp::NotEqual, FieldValue::Null) => {
            qb.push(column).push(" IS NOT NULL");
        }
        (FilterOp::Contains, FieldValue::Text(needle)) => {
            qb.push(column).push(" ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(needle)));
        }
        (FilterOp::In, FieldValue::List(items)) if !items.is_empty() => {
            qb.push(column).push(" IN (");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, item);
            }
            qb.push(")");
        }
        (FilterOp::In, _) | (FilterOp::Contains, _) => {
            qb.push("FALSE");
        }
        (op, value) => {
            let operator = op.sql_operator().unwrap_or("=");
            qb.push(column).push(" ").push(operator).push(" ");
            push_value(qb, value);
        }
    }
}

fn push_where(qb: &mut QueryBuilder<'static, Postgres>, filters: &FilterSet) {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        push_filter(qb, filter);
    }
}

/// `SELECT * FROM t WHERE ... ORDER BY ... LIMIT ... OFFSET ... [FOR UPDATE]`
pub fn build_select(schema: &Schema, query: &Query) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT * FROM ");
    qb.push(quote_ident(schema.table));
    push_where(&mut qb, &query.filters);

    for (i, sort) in query.sorts.iter().enumerate() {
        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push(quote_ident(&sort.field)).push(" ").push(sort.order.sql());
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(offset) = query.offset {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
    if query.lock {
        qb.push(" FOR UPDATE");
    }
    qb
}

pub fn build_count(schema: &Schema, filters: &FilterSet) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM ");
    qb.push(quote_ident(schema.table));
    push_where(&mut qb, filters);
    qb
}

pub fn build_insert(schema: &Schema, record: &Record) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("INSERT INTO ");
    qb.push(quote_ident(schema.table)).push(" (");
    let columns: Vec<(&str, &FieldValue)> = record.scalars().collect();
    for (i, (column, _)) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(column));
    }
    qb.push(") VALUES (");
    for (i, (_, value)) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(") RETURNING *");
    qb
}

pub fn build_update(schema: &Schema, id: Uuid, record: &Record) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE ");
    qb.push(quote_ident(schema.table)).push(" SET ");
    let columns = record.scalars().filter(|(column, _)| *column != "id");
    for (i, (column, value)) in columns.enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(column)).push(" = ");
        push_value(&mut qb, value);
    }
    qb.push(" WHERE \"id\" = ");
    qb.push_bind(id);
    qb.push(" RETURNING *");
    qb
}

pub fn build_delete(schema: &Schema, id: Uuid) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("DELETE FROM ");
    qb.push(quote_ident(schema.table)).push(" WHERE \"id\" = ");
    qb.push_bind(id);
    qb
}

/// Decodes a row by column type name
pub fn decode_row(row: &PgRow) -> Result<Record, StorageError> {
    let mut record = Record::new();
    for column in row.columns() {
        let name = column.name();
        let index = column.ordinal();
        if row.try_get_raw(index)?.is_null() {
            record.set(name, FieldValue::Null);
            continue;
        }
        let value = match column.type_info().name() {
            "BOOL" => FieldValue::Bool(row.try_get(index)?),
            "INT2" => FieldValue::Int(i64::from(row.try_get::<i16, _>(index)?)),
            "INT4" => FieldValue::Int(i64::from(row.try_get::<i32, _>(index)?)),
            "INT8" => FieldValue::Int(row.try_get(index)?),
            "NUMERIC" => FieldValue::Decimal(row.try_get(index)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => FieldValue::Text(row.try_get(index)?),
            "UUID" => FieldValue::Uuid(row.try_get(index)?),
            "TIMESTAMPTZ" => FieldValue::Timestamp(row.try_get(index)?),
            "TIMESTAMP" => FieldValue::Timestamp(row.try_get::<NaiveDateTime, _>(index)?.and_utc()),
            "DATE" => FieldValue::Date(row.try_get(index)?),
            other => {
                return Err(StorageError::decode(format!(
                    "column '{}' has unsupported type {}",
                    name, other
                )))
            }
        };
        record.set(name, value);
    }
    Ok(record)
}
