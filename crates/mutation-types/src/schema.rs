//! Table schema definitions.
//!
//! A [`TableSchema`] is the structural definition registered for every subject
//! of a table. Column order matters: the position of a column determines its
//! field number in the encoded record body (first column = field 1).
//!
//! # YAML Format
//!
//! ```yaml
//! database: mypipe
//! table: user
//! primary_key: [id]
//! columns:
//!   - name: id
//!     type: int32
//!   - name: username
//!     type: text
//!   - name: bio
//!     type: bytes
//!     nullable: true
//! ```

use crate::error::{Error, Result};
use crate::subject::{OperationKind, Subject};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Column type of a mutation record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Exact decimal carried as its string rendering
    Decimal,
    Text,
    /// Binary or text blob carried as raw bytes
    Bytes,
    /// UTC timestamp
    Timestamp,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::Decimal => "decimal",
            ColumnType::Text => "text",
            ColumnType::Bytes => "bytes",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether this column accepts nulls
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnDefinition {
    /// Create a new non-nullable column definition.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    /// Create a new nullable column definition.
    pub fn nullable(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }
}

/// Structural definition of a table's mutation records.
///
/// Two schemas are the same schema when they compare equal field by field;
/// the registry relies on this to detect conflicting re-registrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Database name
    pub database: String,

    /// Table name
    pub table: String,

    /// Columns forming the row key, used as the transport partition key
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Columns in field-number order
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        primary_key: Vec<String>,
        columns: Vec<ColumnDefinition>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            primary_key,
            columns,
        }
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get a column by its field number (1-based).
    pub fn column_by_field(&self, field_number: u32) -> Option<&ColumnDefinition> {
        (field_number as usize)
            .checked_sub(1)
            .and_then(|idx| self.columns.get(idx))
    }

    /// Get all column names in field order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The subject this table's mutations of `kind` are registered under.
    pub fn subject(&self, kind: OperationKind) -> Subject {
        Subject::new(self.database.clone(), self.table.clone(), kind)
    }

    /// Check the schema is internally consistent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Error::InvalidSchema {
            table: format!("{}.{}", self.database, self.table),
            message,
        };

        if self.database.is_empty() || self.table.is_empty() {
            return Err(invalid("database and table names must be set".to_string()));
        }
        if self.columns.is_empty() {
            return Err(invalid("at least one column is required".to_string()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(invalid(format!("duplicate column '{}'", column.name)));
            }
        }

        for key in &self.primary_key {
            match self.column(key) {
                None => {
                    return Err(invalid(format!(
                        "primary key column '{key}' is not a column"
                    )))
                }
                Some(column) if column.nullable => {
                    return Err(invalid(format!(
                        "primary key column '{key}' must not be nullable"
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> TableSchema {
        TableSchema::new(
            "mypipe",
            "user",
            vec!["id".to_string()],
            vec![
                ColumnDefinition::new("id", ColumnType::Int32),
                ColumnDefinition::new("username", ColumnType::Text),
                ColumnDefinition::nullable("bio", ColumnType::Bytes),
            ],
        )
    }

    #[test]
    fn test_column_by_field_number() {
        let schema = user_schema();
        assert!(schema.column_by_field(0).is_none());
        assert_eq!(schema.column_by_field(1).unwrap().name, "id");
        assert_eq!(schema.column_by_field(3).unwrap().name, "bio");
        assert!(schema.column_by_field(4).is_none());
    }

    #[test]
    fn test_validate_rejects_unknown_primary_key() {
        let mut schema = user_schema();
        assert!(schema.validate().is_ok());

        schema.primary_key = vec!["uid".to_string()];
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("'uid'"));
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let mut schema = user_schema();
        schema
            .columns
            .push(ColumnDefinition::new("username", ColumnType::Text));
        assert!(matches!(
            schema.validate(),
            Err(Error::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_yaml_column_type_names() {
        let yaml = r#"
database: mypipe
table: user
columns:
  - name: id
    type: int64
  - name: created_at
    type: timestamp
    nullable: true
"#;
        let schema: TableSchema = serde_yaml::from_str(yaml).unwrap();
        assert!(schema.primary_key.is_empty());
        assert_eq!(schema.columns[0].column_type, ColumnType::Int64);
        assert_eq!(schema.columns[1].column_type, ColumnType::Timestamp);
        assert!(schema.columns[1].nullable);
    }
}
