//! Forward conversion: Mutation → record body bytes.
//!
//! Record bodies use the proto3 wire format:
//!
//! ```text
//! message Envelope {
//!   string database = 1;
//!   string table    = 2;
//!   Row    row      = 3;  // insert/delete row, update old image
//!   Row    new_row  = 4;  // update new image only
//! }
//! ```
//!
//! A `Row` message numbers its fields by column position in the table schema
//! (first column = field 1). Null values are not written.

use crate::error::{Error, Result};
use crate::record::Mutation;
use crate::schema::TableSchema;
use crate::value::{Row, Value};
use protobuf::CodedOutputStream;

pub(crate) const FIELD_DATABASE: u32 = 1;
pub(crate) const FIELD_TABLE: u32 = 2;
pub(crate) const FIELD_ROW: u32 = 3;
pub(crate) const FIELD_NEW_ROW: u32 = 4;

/// Encode a mutation's record body against its table schema.
///
/// Every row image is validated first; nothing is encoded for a row that
/// does not match the schema.
pub fn encode_mutation(mutation: &Mutation, schema: &TableSchema) -> Result<Vec<u8>> {
    if mutation.database() != schema.database || mutation.table() != schema.table {
        return Err(Error::SchemaViolation {
            table: format!("{}.{}", mutation.database(), mutation.table()),
            column: String::new(),
            message: format!(
                "mutation cannot be encoded with the schema of {}.{}",
                schema.database, schema.table
            ),
        });
    }

    let rows: Vec<(u32, &Row)> = match mutation {
        Mutation::Insert(m) => vec![(FIELD_ROW, &m.row)],
        Mutation::Update(m) => vec![(FIELD_ROW, &m.old), (FIELD_NEW_ROW, &m.new)],
        Mutation::Delete(m) => vec![(FIELD_ROW, &m.row)],
    };

    let mut buffer = Vec::new();
    {
        let mut stream = CodedOutputStream::vec(&mut buffer);
        stream
            .write_string(FIELD_DATABASE, mutation.database())
            .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        stream
            .write_string(FIELD_TABLE, mutation.table())
            .map_err(|e| Error::ProtobufEncode(e.to_string()))?;

        for (field_number, row) in rows {
            let row_bytes = encode_row(row, schema)?;
            stream
                .write_bytes(field_number, &row_bytes)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }

        stream
            .flush()
            .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
    }

    Ok(buffer)
}

/// Encode one row image as a `Row` message.
pub fn encode_row(row: &Row, schema: &TableSchema) -> Result<Vec<u8>> {
    validate_row(row, schema)?;

    let mut buffer = Vec::new();
    {
        let mut stream = CodedOutputStream::vec(&mut buffer);

        for (idx, column) in schema.columns.iter().enumerate() {
            if let Some(value) = row.get(&column.name) {
                encode_value(&mut stream, idx as u32 + 1, value)?;
            }
        }

        stream
            .flush()
            .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
    }

    Ok(buffer)
}

/// Check a row image against the schema.
///
/// Rejects unknown columns, missing or null non-nullable columns, and values
/// whose type does not match the column type exactly.
pub fn validate_row(row: &Row, schema: &TableSchema) -> Result<()> {
    let violation = |column: &str, message: String| Error::SchemaViolation {
        table: format!("{}.{}", schema.database, schema.table),
        column: column.to_string(),
        message,
    };

    for column in row.columns() {
        if schema.column(column).is_none() {
            return Err(violation(column, "column is not part of the schema".to_string()));
        }
    }

    for column in &schema.columns {
        match row.get(&column.name) {
            None | Some(Value::Null) if !column.nullable => {
                return Err(violation(
                    &column.name,
                    "value is required for a non-nullable column".to_string(),
                ));
            }
            None | Some(Value::Null) => {}
            Some(value) if value.column_type() != Some(column.column_type) => {
                return Err(violation(
                    &column.name,
                    format!(
                        "expected {}, got {}",
                        column.column_type,
                        value.type_name()
                    ),
                ));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Encode a single value with its field number.
pub fn encode_value(
    stream: &mut CodedOutputStream,
    field_number: u32,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Null => {
            // Absent field decodes back to null
        }
        Value::Bool(b) => {
            stream
                .write_bool(field_number, *b)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Value::Int32(i) => {
            stream
                .write_int32(field_number, *i)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Value::Int64(i) => {
            stream
                .write_int64(field_number, *i)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Value::Float32(f) => {
            stream
                .write_float(field_number, *f)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Value::Float64(f) => {
            stream
                .write_double(field_number, *f)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Value::Decimal(s) | Value::Text(s) => {
            stream
                .write_string(field_number, s)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Value::Bytes(b) => {
            stream
                .write_bytes(field_number, b)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Value::Timestamp(ts) => {
            // google.protobuf.Timestamp as a nested message
            let mut timestamp_bytes = Vec::new();
            {
                let mut ts_stream = CodedOutputStream::vec(&mut timestamp_bytes);
                ts_stream
                    .write_int64(1, ts.timestamp())
                    .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
                ts_stream
                    .write_int32(2, ts.timestamp_subsec_nanos() as i32)
                    .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
                ts_stream
                    .flush()
                    .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
            }
            stream
                .write_bytes(field_number, &timestamp_bytes)
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
    }

    Ok(())
}

/// Get the transport partition key for a mutation.
///
/// Primary-key values of the key row are joined with `|`. Tables without a
/// primary key are keyed by `database.table`, which keeps all their
/// mutations on one partition and therefore in order.
pub fn message_key(mutation: &Mutation, schema: &TableSchema) -> Vec<u8> {
    if schema.primary_key.is_empty() {
        return format!("{}.{}", schema.database, schema.table).into_bytes();
    }

    let row = mutation.key_row();
    let mut key = Vec::new();
    for (idx, column) in schema.primary_key.iter().enumerate() {
        if idx > 0 {
            key.push(b'|');
        }
        if let Some(value) = row.get(column) {
            key.extend_from_slice(&value.to_key_bytes());
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InsertMutation, UpdateMutation};
    use crate::schema::{ColumnDefinition, ColumnType};
    use protobuf::CodedInputStream;

    fn user_schema() -> TableSchema {
        TableSchema::new(
            "mypipe",
            "user",
            vec!["id".to_string()],
            vec![
                ColumnDefinition::new("id", ColumnType::Int32),
                ColumnDefinition::new("username", ColumnType::Text),
                ColumnDefinition::new("login_count", ColumnType::Int32),
                ColumnDefinition::nullable("bio", ColumnType::Bytes),
            ],
        )
    }

    fn bob() -> Row {
        Row::new()
            .with("id", 1)
            .with("username", "bob")
            .with("login_count", 5)
            .with("bio", b"hi".to_vec())
    }

    #[test]
    fn test_encode_row_field_numbers() {
        let encoded = encode_row(&bob(), &user_schema()).unwrap();
        let mut stream = CodedInputStream::from_bytes(&encoded);

        // id (field 1)
        let tag = stream.read_raw_varint32().unwrap();
        assert_eq!(tag >> 3, 1);
        assert_eq!(stream.read_int32().unwrap(), 1);

        // username (field 2)
        let tag = stream.read_raw_varint32().unwrap();
        assert_eq!(tag >> 3, 2);
        assert_eq!(stream.read_string().unwrap(), "bob");
    }

    #[test]
    fn test_encode_mutation_envelope() {
        let mutation = Mutation::Insert(InsertMutation::new("mypipe", "user", bob()));
        let encoded = encode_mutation(&mutation, &user_schema()).unwrap();
        let mut stream = CodedInputStream::from_bytes(&encoded);

        let tag = stream.read_raw_varint32().unwrap();
        assert_eq!(tag >> 3, FIELD_DATABASE);
        assert_eq!(stream.read_string().unwrap(), "mypipe");
        let tag = stream.read_raw_varint32().unwrap();
        assert_eq!(tag >> 3, FIELD_TABLE);
        assert_eq!(stream.read_string().unwrap(), "user");
        let tag = stream.read_raw_varint32().unwrap();
        assert_eq!(tag >> 3, FIELD_ROW);
    }

    #[test]
    fn test_validate_rejects_type_mismatch() {
        let row = bob().with("login_count", 5i64);
        let err = encode_row(&row, &user_schema()).unwrap_err();
        assert!(
            matches!(&err, Error::SchemaViolation { column, .. } if column == "login_count"),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("expected int32, got int64"));
    }

    #[test]
    fn test_validate_rejects_unknown_column() {
        let row = bob().with("password", "secret");
        assert!(matches!(
            validate_row(&row, &user_schema()),
            Err(Error::SchemaViolation { column, .. }) if column == "password"
        ));
    }

    #[test]
    fn test_validate_nullability() {
        let schema = user_schema();

        let without_bio = Row::new()
            .with("id", 1)
            .with("username", "bob")
            .with("login_count", 5);
        assert!(validate_row(&without_bio, &schema).is_ok());

        let null_username = bob().with("username", None::<String>);
        assert!(validate_row(&null_username, &schema).is_err());
    }

    #[test]
    fn test_encode_rejects_foreign_schema() {
        let mutation = Mutation::Insert(InsertMutation::new("mypipe", "post", bob()));
        assert!(matches!(
            encode_mutation(&mutation, &user_schema()),
            Err(Error::SchemaViolation { .. })
        ));
    }

    #[test]
    fn test_message_key() {
        let schema = user_schema();
        let update = Mutation::Update(UpdateMutation::new(
            "mypipe",
            "user",
            bob(),
            bob().with("id", 2),
        ));
        assert_eq!(message_key(&update, &schema), b"1".to_vec());

        let mut composite = schema.clone();
        composite.primary_key = vec!["id".to_string(), "username".to_string()];
        let insert = Mutation::Insert(InsertMutation::new("mypipe", "user", bob()));
        assert_eq!(message_key(&insert, &composite), b"1|bob".to_vec());

        let mut keyless = schema;
        keyless.primary_key.clear();
        assert_eq!(message_key(&insert, &keyless), b"mypipe.user".to_vec());
    }
}
