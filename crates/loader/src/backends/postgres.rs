//! PostgreSQL execution primitive over a sqlx pool

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo, ValueRef};

use super::QueryExecutor;
use crate::error::{LoadError, LoadResult};
use crate::value::DatabaseValue;

/// [`QueryExecutor`] backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> LoadResult<Vec<Vec<DatabaseValue>>> {
        let mut query = sqlx::query(sql);

        for param in params {
            query = bind_database_value(query, param);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LoadError::Database(format!("Query fetch failed: {}", e)))?;

        rows.iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|i| postgres_value_to_database_value(row, i))
                    .collect()
            })
            .collect()
    }
}

/// Bind a DatabaseValue to a PostgreSQL query
fn bind_database_value<'a>(
    query: Query<'a, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> Query<'a, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float32(f) => query.bind(*f),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(*u),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Date(d) => query.bind(*d),
        DatabaseValue::Time(t) => query.bind(*t),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> LoadResult<DatabaseValue> {
    let fetch_error = |kind: &str, e: sqlx::Error| {
        LoadError::Database(format!("Failed to get {} value of column {}: {}", kind, index, e))
    };

    if row.try_get_raw(index).map_err(|e| fetch_error("raw", e))?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => DatabaseValue::Bool(row.try_get(index).map_err(|e| fetch_error("bool", e))?),
        "INT2" => {
            let value: i16 = row.try_get(index).map_err(|e| fetch_error("int16", e))?;
            DatabaseValue::Int32(value as i32)
        }
        "INT4" => DatabaseValue::Int32(row.try_get(index).map_err(|e| fetch_error("int32", e))?),
        "INT8" => DatabaseValue::Int64(row.try_get(index).map_err(|e| fetch_error("int64", e))?),
        "FLOAT4" => DatabaseValue::Float32(row.try_get(index).map_err(|e| fetch_error("float32", e))?),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index).map_err(|e| fetch_error("float64", e))?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            DatabaseValue::String(row.try_get(index).map_err(|e| fetch_error("string", e))?)
        }
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index).map_err(|e| fetch_error("bytes", e))?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index).map_err(|e| fetch_error("UUID", e))?),
        "TIMESTAMPTZ" => {
            DatabaseValue::DateTime(row.try_get(index).map_err(|e| fetch_error("datetime", e))?)
        }
        "TIMESTAMP" => {
            let value: chrono::NaiveDateTime = row.try_get(index).map_err(|e| fetch_error("datetime", e))?;
            DatabaseValue::DateTime(value.and_utc())
        }
        "DATE" => DatabaseValue::Date(row.try_get(index).map_err(|e| fetch_error("date", e))?),
        "TIME" => DatabaseValue::Time(row.try_get(index).map_err(|e| fetch_error("time", e))?),
        "JSON" | "JSONB" => {
            let value: JsonValue = row.try_get(index).map_err(|e| fetch_error("JSON", e))?;
            DatabaseValue::Json(value)
        }
        other => {
            let value: String = row.try_get(index).map_err(|e| {
                LoadError::Database(format!(
                    "Failed to get value as string for unknown type '{}': {}",
                    other, e
                ))
            })?;
            DatabaseValue::String(value)
        }
    };

    Ok(value)
}
