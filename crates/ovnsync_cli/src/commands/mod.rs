//! CLI command implementations.

pub mod negotiate;
pub mod replay;

use ovnsync_protocol::{DatabaseId, DatabaseSchema};
use std::path::Path;

/// Reads a schema file and resolves which database it describes.
///
/// Without an explicit `db`, the schema's own name decides.
pub fn load_schema(
    path: &Path,
    db: Option<&str>,
) -> Result<(DatabaseSchema, DatabaseId), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read schema {:?}: {}", path, e))?;
    let schema = DatabaseSchema::from_json(&text)?;
    let database: DatabaseId = db.unwrap_or(&schema.name).parse()?;
    Ok((schema, database))
}
