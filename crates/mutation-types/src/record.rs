//! Mutation records.
//!
//! A [`Mutation`] is one insert, update or delete on one row. Inserts and
//! deletes carry a single row image; updates carry the row before and after
//! the change.

use crate::subject::{OperationKind, Subject};
use crate::value::{Row, Value};
use std::collections::BTreeSet;

/// A row was inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertMutation {
    pub database: String,
    pub table: String,
    pub row: Row,
}

impl InsertMutation {
    pub fn new(database: impl Into<String>, table: impl Into<String>, row: Row) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            row,
        }
    }
}

/// A row was updated; `old` and `new` are the full before/after images.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMutation {
    pub database: String,
    pub table: String,
    pub old: Row,
    pub new: Row,
}

impl UpdateMutation {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        old: Row,
        new: Row,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            old,
            new,
        }
    }

    /// The (old, new) pair for a column.
    pub fn change(&self, column: &str) -> Option<(&Value, &Value)> {
        Some((self.old.get(column)?, self.new.get(column)?))
    }

    /// Names of the columns whose value differs between the two images.
    ///
    /// A column missing from one image reads as null there.
    pub fn changed_columns(&self) -> Vec<&str> {
        let columns: BTreeSet<&str> = self.old.columns().chain(self.new.columns()).collect();
        columns
            .into_iter()
            .filter(|column| self.old.value(column) != self.new.value(column))
            .collect()
    }
}

/// A row was deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMutation {
    pub database: String,
    pub table: String,
    pub row: Row,
}

impl DeleteMutation {
    pub fn new(database: impl Into<String>, table: impl Into<String>, row: Row) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            row,
        }
    }
}

/// One row mutation, tagged by operation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert(InsertMutation),
    Update(UpdateMutation),
    Delete(DeleteMutation),
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Insert(_) => OperationKind::Insert,
            Mutation::Update(_) => OperationKind::Update,
            Mutation::Delete(_) => OperationKind::Delete,
        }
    }

    pub fn database(&self) -> &str {
        match self {
            Mutation::Insert(m) => &m.database,
            Mutation::Update(m) => &m.database,
            Mutation::Delete(m) => &m.database,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Mutation::Insert(m) => &m.table,
            Mutation::Update(m) => &m.table,
            Mutation::Delete(m) => &m.table,
        }
    }

    /// The registry subject for this mutation.
    pub fn subject(&self) -> Subject {
        Subject::new(self.database(), self.table(), self.kind())
    }

    /// The row image that identifies the affected row.
    ///
    /// For updates this is the old image, so a primary key change still keys
    /// the event by the row it was applied to.
    pub fn key_row(&self) -> &Row {
        match self {
            Mutation::Insert(m) => &m.row,
            Mutation::Update(m) => &m.old,
            Mutation::Delete(m) => &m.row,
        }
    }
}

impl From<InsertMutation> for Mutation {
    fn from(m: InsertMutation) -> Self {
        Mutation::Insert(m)
    }
}

impl From<UpdateMutation> for Mutation {
    fn from(m: UpdateMutation) -> Self {
        Mutation::Update(m)
    }
}

impl From<DeleteMutation> for Mutation {
    fn from(m: DeleteMutation) -> Self {
        Mutation::Delete(m)
    }
}
