//! Database schema as advertised by the store.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Columns every table carries implicitly.
const IMPLICIT_COLUMNS: &[&str] = &["_uuid", "_version"];

/// Schema of one database, in `.ovsschema` form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Database name, e.g. `OVN_Northbound`.
    pub name: String,
    /// Schema version string.
    #[serde(default)]
    pub version: String,
    /// Tables by name.
    pub tables: BTreeMap<String, TableSchema>,
}

/// Schema of one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns by name (implicit `_uuid`/`_version` are not listed).
    pub columns: BTreeMap<String, ColumnSchema>,
    /// Uniqueness constraints, each a list of column names.
    #[serde(default)]
    pub indexes: Vec<Vec<String>>,
    /// Whether rows survive without being referenced.
    #[serde(default, rename = "isRoot")]
    pub is_root: bool,
    /// Maximum number of rows, if bounded.
    #[serde(default, rename = "maxRows", skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u64>,
}

/// Schema of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// The column type in OVSDB notation (an atomic type name or a type object).
    #[serde(rename = "type")]
    pub column_type: Json,
    /// Whether the column is ephemeral (not persisted by the store).
    #[serde(default)]
    pub ephemeral: bool,
    /// Whether the column can change after insertion.
    #[serde(default = "default_mutable")]
    pub mutable: bool,
}

fn default_mutable() -> bool {
    true
}

impl DatabaseSchema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            tables: BTreeMap::new(),
        }
    }

    /// Adds a table.
    pub fn with_table(mut self, name: impl Into<String>, table: TableSchema) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Sets the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Parses an `.ovsschema` document.
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        let schema: DatabaseSchema = serde_json::from_str(text)?;
        if schema.name.is_empty() {
            return Err(ProtocolError::InvalidSchema("schema has no name".into()));
        }
        for (table, def) in &schema.tables {
            for index in &def.indexes {
                if let Some(missing) = index.iter().find(|c| !def.has_column(c)) {
                    return Err(ProtocolError::InvalidSchema(format!(
                        "index on table {table} names unknown column {missing}"
                    )));
                }
            }
        }
        Ok(schema)
    }

    /// Returns a table schema by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Returns true if the table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns table names in lexical order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl TableSchema {
    /// Creates an empty table schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    pub fn with_column(mut self, name: impl Into<String>, column: ColumnSchema) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Adds a uniqueness index.
    pub fn with_index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Marks the table as a root table.
    pub fn root(mut self) -> Self {
        self.is_root = true;
        self
    }

    /// Returns true if the column exists, counting the implicit columns.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name) || IMPLICIT_COLUMNS.contains(&name)
    }
}

impl ColumnSchema {
    /// A single-valued column of the given atomic type (`"string"`, `"integer"`...).
    pub fn atomic(type_name: &str) -> Self {
        Self {
            column_type: Json::String(type_name.to_string()),
            ephemeral: false,
            mutable: true,
        }
    }

    /// An unbounded set column of the given atomic type.
    pub fn set_of(type_name: &str) -> Self {
        Self {
            column_type: serde_json::json!({"key": type_name, "min": 0, "max": "unlimited"}),
            ephemeral: false,
            mutable: true,
        }
    }

    /// An unbounded map column.
    pub fn map_of(key_type: &str, value_type: &str) -> Self {
        Self {
            column_type: serde_json::json!({
                "key": key_type,
                "value": value_type,
                "min": 0,
                "max": "unlimited"
            }),
            ephemeral: false,
            mutable: true,
        }
    }

    /// Returns true if the column holds a map.
    pub fn is_map(&self) -> bool {
        self.column_type.get("value").is_some()
    }

    /// Returns true if the column can hold more than one atom.
    pub fn is_set(&self) -> bool {
        if self.is_map() {
            return false;
        }
        match self.column_type.get("max") {
            Some(Json::String(s)) => s == "unlimited",
            Some(Json::Number(n)) => n.as_u64().is_some_and(|max| max > 1),
            _ => matches!(self.column_type.get("min"), Some(Json::Number(n)) if n.as_u64() == Some(0)),
        }
    }
}
