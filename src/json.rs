//! JSON <-> column value conversion.
//!
//! Event files and consumer output carry rows as JSON objects. Bytes are
//! base64 (standard alphabet), timestamps RFC 3339 strings (or epoch seconds
//! on input), decimals strings.

use anyhow::{anyhow, bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use mutation_types::{ColumnDefinition, ColumnType, Row, TableSchema, Value};
use serde_json::{Map, Number, Value as JsonValue};

/// Convert a JSON value to the column's type.
pub fn json_to_value(json: &JsonValue, column: &ColumnDefinition) -> anyhow::Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }

    let value = match column.column_type {
        ColumnType::Bool => json.as_bool().map(Value::Bool),
        ColumnType::Int32 => json
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Int32),
        ColumnType::Int64 => json.as_i64().map(Value::Int64),
        ColumnType::Float32 => json.as_f64().map(|f| Value::Float32(f as f32)),
        ColumnType::Float64 => json.as_f64().map(Value::Float64),
        ColumnType::Decimal => match json {
            JsonValue::String(s) => Some(Value::Decimal(s.clone())),
            JsonValue::Number(n) => Some(Value::Decimal(n.to_string())),
            _ => None,
        },
        ColumnType::Text => json.as_str().map(|s| Value::Text(s.to_string())),
        ColumnType::Bytes => match json.as_str() {
            Some(encoded) => Some(Value::Bytes(BASE64.decode(encoded).with_context(|| {
                format!("Column '{}' is not valid base64", column.name)
            })?)),
            None => None,
        },
        ColumnType::Timestamp => match json {
            JsonValue::String(s) => Some(Value::Timestamp(
                DateTime::parse_from_rfc3339(s)
                    .with_context(|| {
                        format!("Column '{}' is not an RFC 3339 timestamp", column.name)
                    })?
                    .with_timezone(&Utc),
            )),
            JsonValue::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .map(Value::Timestamp),
            _ => None,
        },
    };

    value.ok_or_else(|| {
        anyhow!(
            "Column '{}' expects {}, got {}",
            column.name,
            column.column_type,
            json
        )
    })
}

/// Convert a JSON object to a row of `schema`.
///
/// Keys must be columns of the table. Columns missing from the object stay
/// absent from the row.
pub fn json_to_row(object: &Map<String, JsonValue>, schema: &TableSchema) -> anyhow::Result<Row> {
    let mut row = Row::new();
    for (name, json) in object {
        let Some(column) = schema.column(name) else {
            bail!(
                "Column '{}' is not part of table {}.{}",
                name,
                schema.database,
                schema.table
            );
        };
        row.insert(name.clone(), json_to_value(json, column)?);
    }
    Ok(row)
}

pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int32(i) => JsonValue::from(*i),
        Value::Int64(i) => JsonValue::from(*i),
        Value::Float32(f) => Number::from_f64(*f as f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Float64(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Decimal(s) | Value::Text(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => JsonValue::String(BASE64.encode(b)),
        Value::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
    }
}

pub fn row_to_json(row: &Row) -> Map<String, JsonValue> {
    row.iter()
        .map(|(column, value)| (column.to_string(), value_to_json(value)))
        .collect()
}
