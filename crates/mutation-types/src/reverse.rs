//! Reverse conversion: record body bytes → Mutation.
//!
//! The decoder walks the envelope written by [`crate::forward`] and decodes
//! each `Row` message against the table schema. The operation kind is not in
//! the body; it comes from the subject the frame's schema id resolves to.

use crate::error::{Error, Result};
use crate::forward::{FIELD_DATABASE, FIELD_NEW_ROW, FIELD_ROW, FIELD_TABLE};
use crate::record::{DeleteMutation, InsertMutation, Mutation, UpdateMutation};
use crate::schema::{ColumnType, TableSchema};
use crate::subject::OperationKind;
use crate::value::{Row, Value};
use protobuf::CodedInputStream;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_FIXED32: u32 = 5;

/// Decode a record body into the mutation variant for `kind`.
pub fn decode_mutation(kind: OperationKind, schema: &TableSchema, body: &[u8]) -> Result<Mutation> {
    let mut stream = CodedInputStream::from_bytes(body);
    let mut database = None;
    let mut table = None;
    let mut row = None;
    let mut new_row = None;

    loop {
        if stream
            .eof()
            .map_err(|e| Error::ProtobufDecode(e.to_string()))?
        {
            break;
        }

        let tag = stream
            .read_raw_varint32()
            .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
        let (field_number, wire_type) = (tag >> 3, tag & 0x7);
        if wire_type != WIRE_LENGTH_DELIMITED {
            return Err(Error::ProtobufDecode(format!(
                "Unexpected wire type {wire_type} for envelope field {field_number}"
            )));
        }

        match field_number {
            FIELD_DATABASE => {
                database = Some(
                    stream
                        .read_string()
                        .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
                );
            }
            FIELD_TABLE => {
                table = Some(
                    stream
                        .read_string()
                        .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
                );
            }
            FIELD_ROW | FIELD_NEW_ROW => {
                let bytes = stream
                    .read_bytes()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                let decoded = decode_row(&bytes, schema)?;
                if field_number == FIELD_ROW {
                    row = Some(decoded);
                } else {
                    new_row = Some(decoded);
                }
            }
            other => {
                return Err(Error::ProtobufDecode(format!(
                    "Unknown field number: {other} in mutation envelope"
                )));
            }
        }
    }

    let database = database.ok_or_else(|| Error::MissingField("database".to_string()))?;
    let table = table.ok_or_else(|| Error::MissingField("table".to_string()))?;
    if database != schema.database || table != schema.table {
        return Err(Error::ProtobufDecode(format!(
            "Record for {database}.{table} does not match schema of {}.{}",
            schema.database, schema.table
        )));
    }
    let row = row.ok_or_else(|| Error::MissingField("row".to_string()))?;

    let mutation = match kind {
        OperationKind::Insert => Mutation::Insert(InsertMutation { database, table, row }),
        OperationKind::Delete => Mutation::Delete(DeleteMutation { database, table, row }),
        OperationKind::Update => {
            let new = new_row.ok_or_else(|| Error::MissingField("new_row".to_string()))?;
            Mutation::Update(UpdateMutation {
                database,
                table,
                old: row,
                new,
            })
        }
    };

    Ok(mutation)
}

/// Decode one `Row` message.
///
/// Nullable columns absent from the message decode to [`Value::Null`];
/// absent non-nullable columns are an error.
pub fn decode_row(bytes: &[u8], schema: &TableSchema) -> Result<Row> {
    let mut stream = CodedInputStream::from_bytes(bytes);
    let mut row = Row::new();

    loop {
        if stream
            .eof()
            .map_err(|e| Error::ProtobufDecode(e.to_string()))?
        {
            break;
        }

        let tag = stream
            .read_raw_varint32()
            .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
        let (field_number, wire_type) = (tag >> 3, tag & 0x7);

        let column = schema.column_by_field(field_number).ok_or_else(|| {
            Error::ProtobufDecode(format!(
                "Unknown field number: {} in row of {}.{}",
                field_number, schema.database, schema.table
            ))
        })?;

        let expected = wire_type_for(column.column_type);
        if wire_type != expected {
            return Err(Error::ProtobufDecode(format!(
                "Column '{}' of type {} expects wire type {}, got {}",
                column.name, column.column_type, expected, wire_type
            )));
        }

        let value = decode_value(column.column_type, &mut stream)?;
        row.insert(column.name.clone(), value);
    }

    for column in &schema.columns {
        if !row.contains(&column.name) {
            if !column.nullable {
                return Err(Error::MissingField(column.name.clone()));
            }
            row.insert(column.name.clone(), Value::Null);
        }
    }

    Ok(row)
}

fn wire_type_for(column_type: ColumnType) -> u32 {
    match column_type {
        ColumnType::Bool | ColumnType::Int32 | ColumnType::Int64 => WIRE_VARINT,
        ColumnType::Float32 => WIRE_FIXED32,
        ColumnType::Float64 => WIRE_FIXED64,
        ColumnType::Decimal | ColumnType::Text | ColumnType::Bytes | ColumnType::Timestamp => {
            WIRE_LENGTH_DELIMITED
        }
    }
}

fn decode_value(column_type: ColumnType, stream: &mut CodedInputStream) -> Result<Value> {
    let value = match column_type {
        ColumnType::Bool => Value::Bool(
            stream
                .read_bool()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Int32 => Value::Int32(
            stream
                .read_int32()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Int64 => Value::Int64(
            stream
                .read_int64()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Float32 => Value::Float32(
            stream
                .read_float()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Float64 => Value::Float64(
            stream
                .read_double()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Decimal => Value::Decimal(
            stream
                .read_string()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Text => Value::Text(
            stream
                .read_string()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Bytes => Value::Bytes(
            stream
                .read_bytes()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
        ),
        ColumnType::Timestamp => {
            let bytes = stream
                .read_bytes()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
            Value::Timestamp(decode_timestamp(&bytes)?)
        }
    };

    Ok(value)
}

fn decode_timestamp(bytes: &[u8]) -> Result<chrono::DateTime<chrono::Utc>> {
    let mut stream = CodedInputStream::from_bytes(bytes);
    let mut seconds = None;
    let mut nanos = 0u32;

    while !stream
        .eof()
        .map_err(|e| Error::ProtobufDecode(e.to_string()))?
    {
        let tag = stream
            .read_raw_varint32()
            .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
        match tag >> 3 {
            1 => {
                seconds = Some(
                    stream
                        .read_int64()
                        .map_err(|e| Error::ProtobufDecode(e.to_string()))?,
                );
            }
            2 => {
                nanos = stream
                    .read_int32()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))? as u32;
            }
            other => {
                return Err(Error::ProtobufDecode(format!(
                    "Unknown field number: {other} in google.protobuf.Timestamp"
                )));
            }
        }
    }

    let seconds = seconds.ok_or_else(|| Error::MissingField("seconds".to_string()))?;
    chrono::DateTime::<chrono::Utc>::from_timestamp(seconds, nanos)
        .ok_or(Error::InvalidTimestamp { seconds, nanos })
}
