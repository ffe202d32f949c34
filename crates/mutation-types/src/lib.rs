//! Schema-tagged wire format for row mutations.
//!
//! This crate defines the mutation records exchanged between mypipe producers
//! and consumers, the schema repository that assigns each record shape a
//! compact id, and the binary framing that carries that id in front of every
//! record body.
//!
//! # Architecture
//!
//! ```text
//! Forward (producer):  Mutation → record body (protobuf) → schema id || body
//! Reverse (consumer):  schema id || body → RegisteredSchema → Mutation
//! ```
//!
//! # Modules
//!
//! - [`subject`] - Operation kinds and (database, table, kind) subjects
//! - [`schema`] / [`catalog`] - Table schemas and the YAML catalog they load from
//! - [`value`] / [`record`] - Column values, row images and mutation records
//! - [`registry`] - Subject <-> schema id repository
//! - [`frame`] - The two-byte schema id header
//! - [`forward`] / [`reverse`] - Record body encoding and decoding
//!
//! # Examples
//!
//! ```ignore
//! use mutation_types::{frame, forward, reverse, SchemaRepository};
//!
//! let id = repository.register(mutation.subject(), schema.clone())?;
//! let payload = frame::encode(id, &forward::encode_mutation(&mutation, &schema)?);
//!
//! let frame = frame::decode(&payload)?;
//! let registered = repository.schema_for(frame.schema_id)?;
//! let decoded = reverse::decode_mutation(registered.subject.kind, &registered.schema, frame.body)?;
//! ```

pub mod catalog;
pub mod error;
pub mod forward;
pub mod frame;
pub mod record;
pub mod registry;
pub mod reverse;
pub mod schema;
pub mod subject;
pub mod value;

// Re-export main types for convenient access
pub use catalog::SchemaCatalog;
pub use error::{Error, Result};
pub use forward::{encode_mutation, encode_row, message_key, validate_row};
pub use frame::Frame;
pub use record::{DeleteMutation, InsertMutation, Mutation, UpdateMutation};
pub use registry::{RegisteredSchema, SchemaId, SchemaRepository};
pub use reverse::{decode_mutation, decode_row};
pub use schema::{ColumnDefinition, ColumnType, TableSchema};
pub use subject::{OperationKind, Subject};
pub use value::{Row, Value};
