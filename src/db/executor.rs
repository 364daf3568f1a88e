use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::postgres::types::PgInterval;
use sqlx::{Column, PgPool, Row as _, TypeInfo, ValueRef};

use crate::error::ReportError;
use crate::value::{Row, Value};

/// Runs a statement with one positional parameter and returns its rows.
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, statement: &str, param: &str) -> Result<Vec<Row>, ReportError>;
}

#[derive(Clone)]
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QueryExecutor for PgQueryExecutor {
    #[tracing::instrument(
        name = "db.report.query",
        skip(self, statement),
        fields(db.statement = %statement, db.rows)
    )]
    async fn execute(&self, statement: &str, param: &str) -> Result<Vec<Row>, ReportError> {
        // fetch_all drains and releases the cursor before returning, on success or error.
        let rows = sqlx::query(statement)
            .bind(param)
            .fetch_all(&self.pool)
            .await?;

        let decoded: Vec<Row> = rows.iter().map(decode_row).collect();
        tracing::Span::current().record("db.rows", decoded.len());

        Ok(decoded)
    }
}

/// Postgres column types the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
    Numeric,
    Text,
    /// Postgres' internal single-byte `"char"`.
    Char,
    TimestampTz,
    Timestamp,
    Date,
    Time,
    Uuid,
    Json,
    Interval,
    Int2Array,
    Int4Array,
    Int8Array,
    Float8Array,
    BoolArray,
    TextArray,
    Unsupported,
}

impl ColumnKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "INT2" => ColumnKind::Int2,
            "INT4" => ColumnKind::Int4,
            "INT8" => ColumnKind::Int8,
            "FLOAT4" => ColumnKind::Float4,
            "FLOAT8" => ColumnKind::Float8,
            "BOOL" => ColumnKind::Bool,
            "NUMERIC" => ColumnKind::Numeric,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnKind::Text,
            "\"CHAR\"" => ColumnKind::Char,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            "UUID" => ColumnKind::Uuid,
            "JSON" | "JSONB" => ColumnKind::Json,
            "INTERVAL" => ColumnKind::Interval,
            "INT2[]" => ColumnKind::Int2Array,
            "INT4[]" => ColumnKind::Int4Array,
            "INT8[]" => ColumnKind::Int8Array,
            "FLOAT8[]" => ColumnKind::Float8Array,
            "BOOL[]" => ColumnKind::BoolArray,
            "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => ColumnKind::TextArray,
            _ => ColumnKind::Unsupported,
        }
    }
}

fn decode_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let idx = column.ordinal();
            let type_name = column.type_info().name();
            let value = match decode_column(row, idx, ColumnKind::from_type_name(type_name)) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        column = column.name(),
                        column_type = type_name,
                        error = %e,
                        "Column could not be decoded, using null"
                    );
                    Value::Null
                }
            };
            (column.name().to_string(), value)
        })
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match kind {
        ColumnKind::Int2 => Value::Int(i64::from(row.try_get::<i16, _>(idx)?)),
        ColumnKind::Int4 => Value::Int(i64::from(row.try_get::<i32, _>(idx)?)),
        ColumnKind::Int8 => Value::Int(row.try_get::<i64, _>(idx)?),
        ColumnKind::Float4 => Value::Float(f64::from(row.try_get::<f32, _>(idx)?)),
        ColumnKind::Float8 => Value::Float(row.try_get::<f64, _>(idx)?),
        ColumnKind::Bool => Value::Bool(row.try_get::<bool, _>(idx)?),
        // Text keeps the exact decimal digits.
        ColumnKind::Numeric => Value::Text(row.try_get::<Decimal, _>(idx)?.to_string()),
        ColumnKind::Text => Value::Text(row.try_get::<String, _>(idx)?),
        ColumnKind::Char => Value::Text(char::from(row.try_get::<i8, _>(idx)? as u8).to_string()),
        ColumnKind::TimestampTz => Value::Timestamp(row.try_get::<DateTime<Utc>, _>(idx)?),
        ColumnKind::Timestamp => Value::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?.and_utc()),
        ColumnKind::Date => Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        ColumnKind::Time => Value::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        ColumnKind::Uuid => Value::Text(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        ColumnKind::Json => Value::from_json(row.try_get::<serde_json::Value, _>(idx)?),
        ColumnKind::Interval => interval_value(row.try_get::<PgInterval, _>(idx)?),
        ColumnKind::Int2Array => Value::from(
            row.try_get::<Vec<i16>, _>(idx)?
                .into_iter()
                .map(i64::from)
                .collect::<Vec<_>>(),
        ),
        ColumnKind::Int4Array => Value::from(
            row.try_get::<Vec<i32>, _>(idx)?
                .into_iter()
                .map(i64::from)
                .collect::<Vec<_>>(),
        ),
        ColumnKind::Int8Array => Value::from(row.try_get::<Vec<i64>, _>(idx)?),
        ColumnKind::Float8Array => Value::from(row.try_get::<Vec<f64>, _>(idx)?),
        ColumnKind::BoolArray => Value::from(row.try_get::<Vec<bool>, _>(idx)?),
        ColumnKind::TextArray => Value::from(row.try_get::<Vec<String>, _>(idx)?),
        ColumnKind::Unsupported => {
            return Err(sqlx::Error::ColumnDecode {
                index: idx.to_string(),
                source: "unsupported column type, cast it in the statement (e.g. ::float8)"
                    .into(),
            });
        }
    };

    Ok(value)
}

fn interval_value(interval: PgInterval) -> Value {
    Value::Map(Row::from([
        ("months".to_string(), Value::from(interval.months)),
        ("days".to_string(), Value::from(interval.days)),
        ("microseconds".to_string(), Value::from(interval.microseconds)),
    ]))
}
