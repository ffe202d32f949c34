//! Error types for the mutation-types crate.

use crate::registry::SchemaId;
use crate::subject::Subject;
use thiserror::Error;

/// Errors raised by schema registration, framing and record encoding.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Subject {0} is already registered with a different schema")]
    DuplicateSubjectConflict(Subject),

    #[error("Unknown schema id: {0}")]
    UnknownSchemaId(SchemaId),

    #[error("Unknown subject: {0}")]
    UnknownSubject(Subject),

    #[error("Schema id space exhausted after {0} registrations")]
    RegistryExhausted(usize),

    #[error("Frame too short: got {len} bytes, header needs {header}")]
    FrameTooShort { len: usize, header: usize },

    #[error("Schema violation in '{table}.{column}': {message}")]
    SchemaViolation {
        table: String,
        column: String,
        message: String,
    },

    #[error("Invalid schema for table '{table}': {message}")]
    InvalidSchema { table: String, message: String },

    #[error("Unknown operation kind: {0}")]
    UnknownOperation(String),

    #[error("Protobuf encoding error: {0}")]
    ProtobufEncode(String),

    #[error("Protobuf decoding error: {0}")]
    ProtobufDecode(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid timestamp: seconds={seconds}, nanos={nanos}")]
    InvalidTimestamp { seconds: i64, nanos: u32 },

    #[error("Failed to read schema catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for mutation-types operations.
pub type Result<T> = std::result::Result<T, Error>;
