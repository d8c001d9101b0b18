//! Negotiate command implementation.

use super::load_schema;
use ovnsync_engine::{build_monitor_requests, negotiate, TableColumns};
use ovnsync_protocol::{DatabaseId, DatabaseSchema, MonitorRequests};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Negotiation result.
#[derive(Debug, Serialize)]
pub struct NegotiateResult {
    /// Database name.
    pub database: String,
    /// Schema version.
    pub schema_version: String,
    /// Tables a client would monitor, in canonical order.
    pub tables: Vec<String>,
    /// Schema tables the client would leave alone.
    pub ignored: Vec<String>,
    /// Monitor requests a client would send.
    pub monitor_requests: MonitorRequests,
}

/// Parses `--table` arguments: `NAME` or `NAME=col1,col2`.
pub fn parse_restriction(tables: &[String]) -> TableColumns {
    tables
        .iter()
        .map(|arg| match arg.split_once('=') {
            Some((table, columns)) => (
                table.to_string(),
                columns
                    .split(',')
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => (arg.clone(), Vec::new()),
        })
        .collect()
}

/// Computes what a client would monitor for `schema`.
pub fn negotiate_schema(
    schema: &DatabaseSchema,
    database: DatabaseId,
    tables: &[String],
) -> Result<NegotiateResult, Box<dyn std::error::Error>> {
    let restriction = parse_restriction(tables);
    let negotiated = negotiate(database, schema, Some(&restriction))?;
    let requests = build_monitor_requests(&negotiated);
    let monitored: Vec<String> = negotiated.into_iter().map(|(t, _)| t).collect();
    let ignored = schema
        .table_names()
        .filter(|t| !monitored.iter().any(|m| m.as_str() == *t))
        .map(str::to_string)
        .collect();

    Ok(NegotiateResult {
        database: database.name().to_string(),
        schema_version: schema.version.clone(),
        tables: monitored,
        ignored,
        monitor_requests: requests,
    })
}

/// Runs the negotiate command.
pub fn run(
    schema_path: &Path,
    db: Option<&str>,
    tables: &[String],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Negotiating tables for {:?}", schema_path);
    let (schema, database) = load_schema(schema_path, db)?;
    let result = negotiate_schema(&schema, database, tables)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }
    Ok(())
}

fn print_text(result: &NegotiateResult) {
    println!("Database: {} (schema {})", result.database, result.schema_version);
    println!("Monitored tables ({}):", result.tables.len());
    for table in &result.tables {
        println!("  {}", table);
    }
    if !result.ignored.is_empty() {
        println!("Ignored tables ({}):", result.ignored.len());
        for table in &result.ignored {
            println!("  {}", table);
        }
    }
}
