//! In-memory schema repository.
//!
//! Maps subjects to compact numeric schema ids and back. Producers register
//! subjects before publishing; consumers resolve the id carried in every frame.
//!
//! The repository is shared between producers and consumers (`Arc`), so it is
//! guarded by a reader/writer lock: lookups on the decode path only take the
//! read lock, and the write lock is held just long enough to assign an id.
//! Ids start at [`SchemaRepository::FIRST_ID`] and increase by one per new
//! subject. An id never changes its schema for the lifetime of the repository.

use crate::catalog::SchemaCatalog;
use crate::error::{Error, Result};
use crate::schema::TableSchema;
use crate::subject::{OperationKind, Subject};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Compact schema identifier carried in every frame header.
pub type SchemaId = u16;

/// A schema together with the subject and id it was registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredSchema {
    pub id: SchemaId,
    pub subject: Subject,
    pub schema: TableSchema,
}

#[derive(Debug)]
struct Inner {
    by_id: HashMap<SchemaId, Arc<RegisteredSchema>>,
    by_subject: HashMap<Subject, SchemaId>,
    next_id: u32,
}

/// Thread-safe subject <-> schema id mapping.
#[derive(Debug)]
pub struct SchemaRepository {
    inner: RwLock<Inner>,
}

impl SchemaRepository {
    /// The id given to the first registered subject.
    pub const FIRST_ID: SchemaId = 1;

    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_id: HashMap::new(),
                by_subject: HashMap::new(),
                next_id: Self::FIRST_ID as u32,
            }),
        }
    }

    /// Create a repository holding every subject of every catalog table.
    ///
    /// Tables are registered in catalog order, insert/update/delete for each,
    /// so a given catalog file always produces the same ids.
    pub fn from_catalog(catalog: &SchemaCatalog) -> Result<Self> {
        let repository = Self::new();
        for table in &catalog.tables {
            repository.register_table(table)?;
        }
        Ok(repository)
    }

    /// Register the insert, update and delete subjects of a table.
    pub fn register_table(&self, schema: &TableSchema) -> Result<Vec<(OperationKind, SchemaId)>> {
        OperationKind::ALL
            .iter()
            .map(|kind| {
                self.register(schema.subject(*kind), schema.clone())
                    .map(|id| (*kind, id))
            })
            .collect()
    }

    /// Register a subject, returning its schema id.
    ///
    /// Registering a known subject with an equal schema returns the existing
    /// id and changes nothing. A known subject with a different schema fails
    /// with [`Error::DuplicateSubjectConflict`].
    pub fn register(&self, subject: Subject, schema: TableSchema) -> Result<SchemaId> {
        if subject.database != schema.database || subject.table != schema.table {
            return Err(Error::InvalidSchema {
                table: format!("{}.{}", schema.database, schema.table),
                message: format!("schema cannot be registered under subject {subject}"),
            });
        }

        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(id) = inner.by_subject.get(&subject) {
                return Self::existing(&inner, *id, subject, &schema);
            }
        }

        schema.validate()?;

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have registered the subject between the two locks.
        if let Some(id) = inner.by_subject.get(&subject) {
            return Self::existing(&inner, *id, subject, &schema);
        }

        let id = SchemaId::try_from(inner.next_id)
            .map_err(|_| Error::RegistryExhausted(inner.by_id.len()))?;
        inner.next_id += 1;

        debug!("Registered schema {} for subject {}", id, subject);
        inner.by_subject.insert(subject.clone(), id);
        inner.by_id.insert(
            id,
            Arc::new(RegisteredSchema {
                id,
                subject,
                schema,
            }),
        );

        Ok(id)
    }

    fn existing(
        inner: &Inner,
        id: SchemaId,
        subject: Subject,
        schema: &TableSchema,
    ) -> Result<SchemaId> {
        match inner.by_id.get(&id) {
            Some(registered) if registered.schema == *schema => Ok(id),
            _ => Err(Error::DuplicateSubjectConflict(subject)),
        }
    }

    /// Resolve a schema id.
    pub fn schema_for(&self, id: SchemaId) -> Result<Arc<RegisteredSchema>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_id
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownSchemaId(id))
    }

    /// Look up the id a subject was registered under.
    pub fn id_for(&self, subject: &Subject) -> Result<SchemaId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_subject
            .get(subject)
            .copied()
            .ok_or_else(|| Error::UnknownSubject(subject.clone()))
    }

    /// Number of registered subjects.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SchemaRepository {
    fn default() -> Self {
        Self::new()
    }
}
