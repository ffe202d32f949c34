//! Mutation event files.
//!
//! One JSON object per line:
//!
//! ```text
//! {"op":"insert","database":"mypipe","table":"user","row":{"id":1,"username":"bob"}}
//! {"op":"update","database":"mypipe","table":"user","old":{..},"new":{..}}
//! {"op":"delete","database":"mypipe","table":"user","row":{..}}
//! ```
//!
//! The consumer prints mutations in the same shape, so its output can be
//! replayed.

use crate::json::{json_to_row, row_to_json};
use anyhow::{anyhow, Context};
use mutation_types::{
    DeleteMutation, InsertMutation, Mutation, SchemaCatalog, TableSchema, UpdateMutation,
};
use mypipe_kafka::MutationSink;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

type JsonRow = Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MutationEvent {
    Insert {
        database: String,
        table: String,
        row: JsonRow,
    },
    Update {
        database: String,
        table: String,
        old: JsonRow,
        new: JsonRow,
    },
    Delete {
        database: String,
        table: String,
        row: JsonRow,
    },
}

impl MutationEvent {
    pub fn database(&self) -> &str {
        match self {
            MutationEvent::Insert { database, .. }
            | MutationEvent::Update { database, .. }
            | MutationEvent::Delete { database, .. } => database,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            MutationEvent::Insert { table, .. }
            | MutationEvent::Update { table, .. }
            | MutationEvent::Delete { table, .. } => table,
        }
    }

    /// Convert the JSON rows to typed rows of the event's catalog table.
    pub fn to_mutation(&self, catalog: &SchemaCatalog) -> anyhow::Result<Mutation> {
        let schema = self.schema(catalog)?;
        let mutation = match self {
            MutationEvent::Insert {
                database,
                table,
                row,
            } => InsertMutation::new(database, table, json_to_row(row, schema)?).into(),
            MutationEvent::Update {
                database,
                table,
                old,
                new,
            } => UpdateMutation::new(
                database,
                table,
                json_to_row(old, schema).context("Invalid old row image")?,
                json_to_row(new, schema).context("Invalid new row image")?,
            )
            .into(),
            MutationEvent::Delete {
                database,
                table,
                row,
            } => DeleteMutation::new(database, table, json_to_row(row, schema)?).into(),
        };
        Ok(mutation)
    }

    fn schema<'a>(&self, catalog: &'a SchemaCatalog) -> anyhow::Result<&'a TableSchema> {
        catalog
            .get_table(self.database(), self.table())
            .ok_or_else(|| {
                anyhow!(
                    "Table {}.{} is not in the schema catalog",
                    self.database(),
                    self.table()
                )
            })
    }
}

impl From<&Mutation> for MutationEvent {
    fn from(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Insert(m) => MutationEvent::Insert {
                database: m.database.clone(),
                table: m.table.clone(),
                row: row_to_json(&m.row),
            },
            Mutation::Update(m) => MutationEvent::Update {
                database: m.database.clone(),
                table: m.table.clone(),
                old: row_to_json(&m.old),
                new: row_to_json(&m.new),
            },
            Mutation::Delete(m) => MutationEvent::Delete {
                database: m.database.clone(),
                table: m.table.clone(),
                row: row_to_json(&m.row),
            },
        }
    }
}

/// Read a JSON-lines event file. Blank lines are ignored.
pub fn read_events<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<MutationEvent>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut events = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: MutationEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on line {} of {}", idx + 1, path.display()))?;
        events.push(event);
    }

    debug!("Read {} events from {}", events.len(), path.display());
    Ok(events)
}

/// Convert every event and hand it to `sink`, in file order.
///
/// Stops at the first event that cannot be converted or delivered.
pub async fn replay(
    events: &[MutationEvent],
    catalog: &SchemaCatalog,
    sink: &dyn MutationSink,
) -> anyhow::Result<usize> {
    for (idx, event) in events.iter().enumerate() {
        let mutation = event
            .to_mutation(catalog)
            .with_context(|| format!("Failed to convert event {}", idx + 1))?;
        sink.on_mutation(mutation)
            .await
            .with_context(|| format!("Failed to deliver event {}", idx + 1))?;
    }

    info!("Replayed {} mutation events", events.len());
    Ok(events.len())
}
