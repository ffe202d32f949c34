//! Subjects: the registry key for a mutation schema.
//!
//! A subject names one kind of mutation on one table, e.g. `mypipe.user.insert`.
//! Subjects are only used inside the registry; they never appear on the wire.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of row mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// All operation kinds, in registration order.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(OperationKind::Insert),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(Error::UnknownOperation(s.to_string())),
        }
    }
}

/// Identity of a schema registration: (database, table, operation kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject {
    pub database: String,
    pub table: String,
    pub kind: OperationKind,
}

impl Subject {
    pub fn new(database: impl Into<String>, table: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            kind,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.table, self.kind)
    }
}
