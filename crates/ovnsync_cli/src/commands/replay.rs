//! Replay command implementation.

use super::load_schema;
use ovnsync_engine::{inserted_uuids, Client, ClientConfig, RowEvent, TableRows};
use ovnsync_memstore::MemStore;
use ovnsync_protocol::{DatabaseId, DatabaseSchema, Operation, OperationResult, RowId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Replay result.
#[derive(Debug, Serialize)]
pub struct ReplayResult {
    /// Database name.
    pub database: String,
    /// One result per operation.
    pub results: Vec<OperationResult>,
    /// Row ids allocated by inserts, in operation order.
    pub inserted: Vec<RowId>,
    /// Row events the client observed, initial load included.
    pub events: usize,
    /// The client's mirror after the transaction.
    pub tables: BTreeMap<String, TableRows>,
}

/// Runs `operations` through a client connected to a fresh in-memory store.
pub fn replay_operations(
    schema: DatabaseSchema,
    database: DatabaseId,
    operations: &[Operation],
) -> Result<ReplayResult, Box<dyn std::error::Error>> {
    if schema.name != database.name() {
        return Err(format!(
            "Schema describes {}, not {}",
            schema.name,
            database.name()
        )
        .into());
    }

    let store = Arc::new(MemStore::with_schemas([schema])?);
    let events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&events);
    let config = ClientConfig::new(database, format!("memory:{}", database.name()))
        .with_signal_handler(move |_: &RowEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let client = Client::connect(config, store)?;
    let results = client.transact(operations)?;
    let inserted = inserted_uuids(operations, &results)?;

    let tables = client
        .tables()
        .into_iter()
        .filter_map(|t| client.snapshot(&t).map(|rows| (t, rows)))
        .collect();
    client.close();

    Ok(ReplayResult {
        database: database.name().to_string(),
        results,
        inserted,
        events: events.load(Ordering::SeqCst),
        tables,
    })
}

/// Runs the replay command.
pub fn run(
    schema_path: &Path,
    db: Option<&str>,
    ops_path: &Path,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (schema, database) = load_schema(schema_path, db)?;
    let text = std::fs::read_to_string(ops_path)
        .map_err(|e| format!("Cannot read operations {:?}: {}", ops_path, e))?;
    let operations: Vec<Operation> = serde_json::from_str(&text)?;
    info!("Replaying {} operations from {:?}", operations.len(), ops_path);

    let result = replay_operations(schema, database, &operations)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("Database: {}", result.database);
            println!("Inserted rows: {}", result.inserted.len());
            for id in &result.inserted {
                println!("  {}", id);
            }
            println!("Row events: {}", result.events);
            for (table, rows) in &result.tables {
                if rows.is_empty() {
                    continue;
                }
                println!("{} ({} rows)", table, rows.len());
                for (id, row) in rows {
                    println!("  {} {}", id, serde_json::to_string(row)?);
                }
            }
        }
    }
    Ok(())
}
