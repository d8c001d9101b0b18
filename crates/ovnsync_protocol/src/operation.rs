//! Row operations submitted in a transaction.

use crate::value::{Row, RowId, Value};
use serde::{Deserialize, Serialize};

/// Comparison used in a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionFunction {
    /// Equal.
    #[serde(rename = "==")]
    Equal,
    /// Not equal.
    #[serde(rename = "!=")]
    NotEqual,
    /// Less than (integers and reals).
    #[serde(rename = "<")]
    LessThan,
    /// Less than or equal.
    #[serde(rename = "<=")]
    LessThanOrEqual,
    /// Greater than.
    #[serde(rename = ">")]
    GreaterThan,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    /// Set/map column contains every given element.
    #[serde(rename = "includes")]
    Includes,
    /// Set/map column contains none of the given elements.
    #[serde(rename = "excludes")]
    Excludes,
}

/// One clause of a `where` list: `[column, function, value]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, ConditionFunction, Value)", into = "(String, ConditionFunction, Value)")]
pub struct Condition {
    /// Column to test.
    pub column: String,
    /// Comparison.
    pub function: ConditionFunction,
    /// Operand.
    pub value: Value,
}

impl Condition {
    /// Creates a condition.
    pub fn new(column: impl Into<String>, function: ConditionFunction, value: Value) -> Self {
        Self {
            column: column.into(),
            function,
            value,
        }
    }

    /// `column == value`.
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, ConditionFunction::Equal, value.into())
    }

    /// `_uuid == uuid`, the usual way to address one row.
    pub fn uuid_is(row_id: impl Into<RowId>) -> Self {
        Self::new("_uuid", ConditionFunction::Equal, Value::Uuid(row_id.into()))
    }
}

impl From<(String, ConditionFunction, Value)> for Condition {
    fn from((column, function, value): (String, ConditionFunction, Value)) -> Self {
        Self {
            column,
            function,
            value,
        }
    }
}

impl From<Condition> for (String, ConditionFunction, Value) {
    fn from(c: Condition) -> Self {
        (c.column, c.function, c.value)
    }
}

/// Mutation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutator {
    /// Integer/real addition.
    #[serde(rename = "+=")]
    Add,
    /// Integer/real subtraction.
    #[serde(rename = "-=")]
    Subtract,
    /// Integer/real multiplication.
    #[serde(rename = "*=")]
    Multiply,
    /// Integer/real division.
    #[serde(rename = "/=")]
    Divide,
    /// Integer remainder.
    #[serde(rename = "%=")]
    Modulo,
    /// Add elements to a set or pairs to a map.
    #[serde(rename = "insert")]
    Insert,
    /// Remove elements from a set, or keys/pairs from a map.
    #[serde(rename = "delete")]
    Delete,
}

/// One mutation: `[column, mutator, value]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, Mutator, Value)", into = "(String, Mutator, Value)")]
pub struct Mutation {
    /// Column to mutate.
    pub column: String,
    /// Operator.
    pub mutator: Mutator,
    /// Operand.
    pub value: Value,
}

impl Mutation {
    /// Creates a mutation.
    pub fn new(column: impl Into<String>, mutator: Mutator, value: Value) -> Self {
        Self {
            column: column.into(),
            mutator,
            value,
        }
    }
}

impl From<(String, Mutator, Value)> for Mutation {
    fn from((column, mutator, value): (String, Mutator, Value)) -> Self {
        Self {
            column,
            mutator,
            value,
        }
    }
}

impl From<Mutation> for (String, Mutator, Value) {
    fn from(m: Mutation) -> Self {
        (m.column, m.mutator, m.value)
    }
}

/// A row operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    /// Insert a new row; the store allocates its UUID.
    Insert {
        /// Target table.
        table: String,
        /// Initial column values.
        row: Row,
        /// Name by which later operations in the transaction can reference the row.
        #[serde(rename = "uuid-name", default, skip_serializing_if = "Option::is_none")]
        uuid_name: Option<String>,
    },
    /// Overwrite columns of every matching row.
    Update {
        /// Target table.
        table: String,
        /// Row selection.
        #[serde(rename = "where", default)]
        conditions: Vec<Condition>,
        /// Columns to set.
        row: Row,
    },
    /// Delete every matching row.
    Delete {
        /// Target table.
        table: String,
        /// Row selection.
        #[serde(rename = "where", default)]
        conditions: Vec<Condition>,
    },
    /// Apply mutations to every matching row.
    Mutate {
        /// Target table.
        table: String,
        /// Row selection.
        #[serde(rename = "where", default)]
        conditions: Vec<Condition>,
        /// Mutations applied in order.
        mutations: Vec<Mutation>,
    },
}

impl Operation {
    /// Creates an insert.
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Operation::Insert {
            table: table.into(),
            row,
            uuid_name: None,
        }
    }

    /// Creates an insert whose row can be referenced as `["named-uuid", name]`.
    pub fn insert_named(table: impl Into<String>, row: Row, uuid_name: impl Into<String>) -> Self {
        Operation::Insert {
            table: table.into(),
            row,
            uuid_name: Some(uuid_name.into()),
        }
    }

    /// Creates an update.
    pub fn update(table: impl Into<String>, conditions: Vec<Condition>, row: Row) -> Self {
        Operation::Update {
            table: table.into(),
            conditions,
            row,
        }
    }

    /// Creates a delete.
    pub fn delete(table: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Operation::Delete {
            table: table.into(),
            conditions,
        }
    }

    /// Creates a mutate.
    pub fn mutate(
        table: impl Into<String>,
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Operation::Mutate {
            table: table.into(),
            conditions,
            mutations,
        }
    }

    /// The table this operation targets.
    pub fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Delete { table, .. }
            | Operation::Mutate { table, .. } => table,
        }
    }

    /// Returns true if the store allocates a row identifier for this operation.
    pub fn allocates_row(&self) -> bool {
        matches!(self, Operation::Insert { .. })
    }

    /// Short name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Mutate { .. } => "mutate",
        }
    }
}

/// Outcome of one operation in a transaction reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationResult {
    /// Rows affected (update/delete/mutate).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Allocated row identifier (insert).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "uuid_datum")]
    pub uuid: Option<RowId>,
    /// Error tag if the operation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human readable error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl OperationResult {
    /// Result of a successful insert.
    pub fn inserted(uuid: impl Into<RowId>) -> Self {
        Self {
            uuid: Some(uuid.into()),
            ..Self::default()
        }
    }

    /// Result of a successful update, delete or mutate.
    pub fn counted(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Self::default()
        }
    }

    /// A failed operation.
    pub fn failed(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            details: Some(details.into()),
            ..Self::default()
        }
    }

    /// Returns true if this entry reports an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Serializes an optional row id as an OVSDB `["uuid", ...]` datum.
mod uuid_datum {
    use crate::value::{RowId, Value};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<RowId>, serializer: S) -> Result<S::Ok, S::Error> {
        id.as_ref()
            .map(|id| Value::Uuid(id.clone()))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RowId>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Value::Uuid(id)) => Ok(Some(id)),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected uuid datum, got {other:?}"
            ))),
        }
    }
}

/// A bundle of row operations built for one logical change.
///
/// Entity builders return a `Command`; several commands submitted together
/// are flattened into one atomic transaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    operations: Vec<Operation>,
}

impl Command {
    /// Creates a command from operations.
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// Appends an operation.
    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Returns the operations.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the command has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Flattens commands into one operation list, preserving order.
    pub fn flatten(commands: &[Command]) -> Vec<Operation> {
        commands
            .iter()
            .flat_map(|c| c.operations.iter().cloned())
            .collect()
    }
}

impl From<Operation> for Command {
    fn from(operation: Operation) -> Self {
        Self::new(vec![operation])
    }
}
