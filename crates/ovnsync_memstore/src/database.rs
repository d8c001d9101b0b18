//! One hosted database: schema plus committed rows.

use ovnsync_protocol::{
    ColumnSchema, DatabaseSchema, MonitorRequest, Row, RowId, RowUpdate, TableUpdates, Value,
};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashSet};

/// Rows of one table keyed by uuid.
pub type Rows = BTreeMap<RowId, Row>;

/// A hosted database.
#[derive(Debug, Clone)]
pub struct Database {
    schema: DatabaseSchema,
    pub(crate) tables: BTreeMap<String, Rows>,
}

impl Database {
    /// Creates an empty database with one table per schema table.
    pub fn new(schema: DatabaseSchema) -> Self {
        let tables = schema
            .tables
            .keys()
            .map(|name| (name.clone(), Rows::new()))
            .collect();
        Self { schema, tables }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Database schema.
    pub fn schema(&self) -> &DatabaseSchema {
        &self.schema
    }

    /// Committed rows of a table.
    pub fn rows(&self, table: &str) -> Option<&Rows> {
        self.tables.get(table)
    }

    /// Initial monitor reply: every row of every requested table whose
    /// subscription wants initial contents.
    pub fn snapshot(&self, requests: &BTreeMap<String, MonitorRequest>) -> TableUpdates {
        let mut updates = TableUpdates::new();
        for (table, request) in requests {
            if !request.select.initial {
                continue;
            }
            let Some(rows) = self.tables.get(table) else {
                continue;
            };
            for (id, row) in rows {
                updates.push(table.clone(), id.clone(), RowUpdate::insert(row.clone()));
            }
        }
        updates
    }

    /// The value a column holds when an insert leaves it out.
    pub(crate) fn default_value(column: &ColumnSchema) -> Value {
        if column.is_map() {
            return Value::Map(Vec::new());
        }
        if column.is_set() {
            return Value::Set(Vec::new());
        }
        let key = match &column.column_type {
            Json::Object(fields) => fields.get("key"),
            other => Some(other),
        };
        let type_name = match key {
            Some(Json::String(name)) => name.as_str(),
            Some(Json::Object(base)) => base.get("type").and_then(Json::as_str).unwrap_or(""),
            _ => "",
        };
        match type_name {
            "integer" => Value::Integer(0),
            "real" => Value::Real(0.0),
            "boolean" => Value::Boolean(false),
            "string" => Value::string(""),
            _ => Value::Set(Vec::new()),
        }
    }

    /// Checks index uniqueness and row limits over `tables`.
    pub(crate) fn check_constraints(&self, tables: &BTreeMap<String, Rows>) -> Result<(), String> {
        for (name, table) in &self.schema.tables {
            let Some(rows) = tables.get(name) else {
                continue;
            };
            if let Some(max) = table.max_rows {
                if rows.len() as u64 > max {
                    return Err(format!("table {name} exceeds its limit of {max} rows"));
                }
            }
            for index in &table.indexes {
                let mut seen: Vec<Vec<&Value>> = Vec::new();
                for row in rows.values() {
                    let key: Option<Vec<&Value>> = index.iter().map(|c| row.get(c)).collect();
                    // Rows missing an indexed column do not take part.
                    let Some(key) = key else {
                        continue;
                    };
                    if seen.contains(&key) {
                        return Err(format!(
                            "duplicate value for index ({}) in table {name}",
                            index.join(", ")
                        ));
                    }
                    seen.push(key);
                }
            }
        }
        Ok(())
    }

    /// Diffs `tables` against committed state for the touched tables.
    ///
    /// Modifications carry the changed columns' previous values as the old
    /// image and the full row as the new image.
    pub(crate) fn diff(&self, tables: &BTreeMap<String, Rows>, touched: &HashSet<String>) -> TableUpdates {
        let mut updates = TableUpdates::new();
        let empty = Rows::new();
        let mut names: Vec<&String> = touched.iter().collect();
        names.sort();

        for name in names {
            let before = self.tables.get(name).unwrap_or(&empty);
            let after = tables.get(name).unwrap_or(&empty);

            for (id, new) in after {
                match before.get(id) {
                    None => updates.push(name.clone(), id.clone(), RowUpdate::insert(new.clone())),
                    Some(old) if old != new => {
                        let changed: Row = old
                            .iter()
                            .filter(|(col, value)| new.get(*col) != Some(*value))
                            .map(|(col, value)| (col.clone(), value.clone()))
                            .collect();
                        updates.push(name.clone(), id.clone(), RowUpdate::modify(changed, new.clone()));
                    }
                    Some(_) => {}
                }
            }
            for (id, old) in before {
                if !after.contains_key(id) {
                    updates.push(name.clone(), id.clone(), RowUpdate::delete(old.clone()));
                }
            }
        }
        updates
    }
}
