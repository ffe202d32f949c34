//! Schema catalog loaded from YAML.
//!
//! The catalog lists every table a producer may publish and a consumer may
//! decode. Registering a catalog into a [`SchemaRepository`](crate::SchemaRepository)
//! walks the tables in file order, so the same catalog file always yields the
//! same schema ids.
//!
//! ```yaml
//! tables:
//!   - database: mypipe
//!     table: user
//!     primary_key: [id]
//!     columns:
//!       - { name: id, type: int32 }
//!       - { name: username, type: text }
//! ```

use crate::error::{Error, Result};
use crate::schema::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Ordered collection of table schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    /// Build a catalog from table schemas, validating each one.
    pub fn new(tables: Vec<TableSchema>) -> Result<Self> {
        let catalog = Self { tables };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a catalog from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let catalog: SchemaCatalog = serde_yaml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Get a table schema by database and table name.
    pub fn get_table(&self, database: &str, table: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.database == database && t.table == table)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !seen.insert((table.database.as_str(), table.table.as_str())) {
                return Err(Error::InvalidSchema {
                    table: format!("{}.{}", table.database, table.table),
                    message: "table is declared more than once".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use std::io::Write;

    const CATALOG: &str = r#"
tables:
  - database: mypipe
    table: user
    primary_key: [id]
    columns:
      - { name: id, type: int32 }
      - { name: username, type: text }
      - { name: login_count, type: int32 }
      - { name: bio, type: bytes, nullable: true }
  - database: mypipe
    table: post
    primary_key: [id]
    columns:
      - { name: id, type: int64 }
      - { name: title, type: text }
"#;

    #[test]
    fn test_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = SchemaCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.tables.len(), 2);

        let user = catalog.get_table("mypipe", "user").unwrap();
        assert_eq!(user.primary_key, vec!["id".to_string()]);
        assert_eq!(user.column("bio").unwrap().column_type, ColumnType::Bytes);
        assert!(catalog.get_table("mypipe", "comment").is_none());
    }

    #[test]
    fn test_catalog_rejects_duplicate_tables() {
        let yaml = r#"
tables:
  - database: mypipe
    table: user
    columns: [{ name: id, type: int32 }]
  - database: mypipe
    table: user
    columns: [{ name: id, type: int64 }]
"#;
        let err = SchemaCatalog::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_catalog_missing_file() {
        let err = SchemaCatalog::from_file("/nonexistent/catalog.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
