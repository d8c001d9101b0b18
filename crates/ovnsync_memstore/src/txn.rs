//! Transaction evaluation.
//!
//! Operations run in order against a working copy of the database. The
//! copy replaces committed state only if every operation and the final
//! constraint check succeed, so a failed transaction leaves no trace.

use crate::database::{Database, Rows};
use ovnsync_protocol::{
    Condition, ConditionFunction, Mutation, Mutator, Operation, OperationResult, Row, RowId,
    TableSchema, TableUpdates, Value,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Outcome of one transaction.
#[derive(Debug)]
pub struct TxnOutcome {
    /// One result per executed operation; ends with an error entry on failure.
    pub results: Vec<OperationResult>,
    /// Committed changes, `None` if the transaction failed.
    pub changes: Option<TableUpdates>,
}

struct OpError {
    error: &'static str,
    details: String,
}

impl OpError {
    fn syntax(details: impl Into<String>) -> Self {
        Self {
            error: "syntax error",
            details: details.into(),
        }
    }

    fn constraint(details: impl Into<String>) -> Self {
        Self {
            error: "constraint violation",
            details: details.into(),
        }
    }

    fn domain(details: impl Into<String>) -> Self {
        Self {
            error: "domain error",
            details: details.into(),
        }
    }

    fn range(details: impl Into<String>) -> Self {
        Self {
            error: "range error",
            details: details.into(),
        }
    }

    fn into_result(self) -> OperationResult {
        OperationResult::failed(self.error, self.details)
    }
}

type OpResult<T> = Result<T, OpError>;

/// Runs `operations` against `db`, committing on success.
pub fn execute(db: &mut Database, operations: &[Operation]) -> TxnOutcome {
    let mut work = db.tables.clone();
    let mut touched = HashSet::new();
    let mut results = Vec::with_capacity(operations.len());

    // Named uuids may be referenced before the insert that defines them.
    let mut names: HashMap<String, RowId> = HashMap::new();
    for op in operations {
        if let Operation::Insert {
            uuid_name: Some(name),
            ..
        } = op
        {
            names
                .entry(name.clone())
                .or_insert_with(|| Uuid::new_v4().to_string());
        }
    }

    let mut defined: HashSet<&str> = HashSet::new();
    for op in operations {
        let outcome = match op {
            Operation::Insert {
                uuid_name: Some(name),
                ..
            } if !defined.insert(name.as_str()) => {
                Err(OpError::syntax(format!("duplicate uuid-name {name}")))
            }
            _ => apply(db, &mut work, &names, op),
        };
        match outcome {
            Ok(result) => {
                touched.insert(op.table().to_string());
                results.push(result);
            }
            Err(e) => {
                results.push(e.into_result());
                return TxnOutcome {
                    results,
                    changes: None,
                };
            }
        }
    }

    if let Err(details) = db.check_constraints(&work) {
        results.push(OpError::constraint(details).into_result());
        return TxnOutcome {
            results,
            changes: None,
        };
    }

    let changes = db.diff(&work, &touched);
    db.tables = work;
    TxnOutcome {
        results,
        changes: Some(changes),
    }
}

fn apply(
    db: &Database,
    work: &mut BTreeMap<String, Rows>,
    names: &HashMap<String, RowId>,
    op: &Operation,
) -> OpResult<OperationResult> {
    let table_name = op.table();
    let schema = db
        .schema()
        .table(table_name)
        .ok_or_else(|| OpError::syntax(format!("no table named {table_name}")))?;
    let rows = work
        .get_mut(table_name)
        .ok_or_else(|| OpError::syntax(format!("no table named {table_name}")))?;

    match op {
        Operation::Insert { row, uuid_name, .. } => {
            check_columns(schema, table_name, row.keys())?;
            let id = match uuid_name {
                Some(name) => names
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                None => Uuid::new_v4().to_string(),
            };
            let mut stored: Row = schema
                .columns
                .iter()
                .map(|(col, column)| (col.clone(), Database::default_value(column)))
                .collect();
            for (col, value) in row {
                stored.insert(col.clone(), resolve(value, names)?);
            }
            rows.insert(id.clone(), stored);
            Ok(OperationResult::inserted(id))
        }
        Operation::Update {
            conditions, row, ..
        } => {
            check_columns(schema, table_name, row.keys())?;
            if let Some(col) = row
                .keys()
                .find(|c| schema.columns.get(*c).is_some_and(|s| !s.mutable))
            {
                return Err(OpError::constraint(format!(
                    "column {col} of table {table_name} is not mutable"
                )));
            }
            let resolved: Row = row
                .iter()
                .map(|(c, v)| Ok((c.clone(), resolve(v, names)?)))
                .collect::<OpResult<_>>()?;
            let matching = select(schema, table_name, rows, conditions, names)?;
            for id in &matching {
                if let Some(existing) = rows.get_mut(id) {
                    existing.extend(resolved.iter().map(|(c, v)| (c.clone(), v.clone())));
                }
            }
            Ok(OperationResult::counted(matching.len() as u64))
        }
        Operation::Delete { conditions, .. } => {
            let matching = select(schema, table_name, rows, conditions, names)?;
            for id in &matching {
                rows.remove(id);
            }
            Ok(OperationResult::counted(matching.len() as u64))
        }
        Operation::Mutate {
            conditions,
            mutations,
            ..
        } => {
            check_columns(schema, table_name, mutations.iter().map(|m| &m.column))?;
            let matching = select(schema, table_name, rows, conditions, names)?;
            for id in &matching {
                let Some(existing) = rows.get_mut(id) else {
                    continue;
                };
                for mutation in mutations {
                    let operand = resolve(&mutation.value, names)?;
                    let current = existing
                        .get(&mutation.column)
                        .cloned()
                        .or_else(|| schema.columns.get(&mutation.column).map(Database::default_value))
                        .unwrap_or(Value::Set(Vec::new()));
                    let mutated = mutate(&current, mutation, &operand)?;
                    existing.insert(mutation.column.clone(), mutated);
                }
            }
            Ok(OperationResult::counted(matching.len() as u64))
        }
    }
}

fn check_columns<'a, I>(schema: &TableSchema, table: &str, columns: I) -> OpResult<()>
where
    I: IntoIterator<Item = &'a String>,
{
    for col in columns {
        if col.starts_with('_') {
            return Err(OpError::constraint(format!("column {col} is read-only")));
        }
        if !schema.columns.contains_key(col) {
            return Err(OpError::syntax(format!("no column {col} in table {table}")));
        }
    }
    Ok(())
}

/// Replaces named uuids with the uuids allocated for them.
fn resolve(value: &Value, names: &HashMap<String, RowId>) -> OpResult<Value> {
    Ok(match value {
        Value::NamedUuid(name) => names
            .get(name)
            .map(|id| Value::Uuid(id.clone()))
            .ok_or_else(|| OpError::syntax(format!("unknown uuid-name {name}")))?,
        Value::Set(items) => Value::Set(
            items
                .iter()
                .map(|v| resolve(v, names))
                .collect::<OpResult<_>>()?,
        ),
        Value::Map(pairs) => Value::Map(
            pairs
                .iter()
                .map(|(k, v)| Ok((resolve(k, names)?, resolve(v, names)?)))
                .collect::<OpResult<_>>()?,
        ),
        atom => atom.clone(),
    })
}

/// Ids of the rows matching every condition.
fn select(
    schema: &TableSchema,
    table: &str,
    rows: &Rows,
    conditions: &[Condition],
    names: &HashMap<String, RowId>,
) -> OpResult<Vec<RowId>> {
    let mut resolved = Vec::with_capacity(conditions.len());
    for condition in conditions {
        if !schema.has_column(&condition.column) {
            return Err(OpError::syntax(format!(
                "no column {} in table {table}",
                condition.column
            )));
        }
        resolved.push((condition, resolve(&condition.value, names)?));
    }

    let mut matching = Vec::new();
    for (id, row) in rows {
        let mut all = true;
        for (condition, expected) in &resolved {
            let actual = match condition.column.as_str() {
                "_uuid" => Value::Uuid(id.clone()),
                col => row.get(col).cloned().unwrap_or(Value::Set(Vec::new())),
            };
            if !evaluate(condition.function, &actual, expected)? {
                all = false;
                break;
            }
        }
        if all {
            matching.push(id.clone());
        }
    }
    Ok(matching)
}

fn evaluate(function: ConditionFunction, actual: &Value, expected: &Value) -> OpResult<bool> {
    use ConditionFunction::*;
    Ok(match function {
        Equal => datum_eq(actual, expected),
        NotEqual => !datum_eq(actual, expected),
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            let ordering = single(actual)
                .compare_atom(single(expected))
                .ok_or_else(|| OpError::syntax("ordering requires comparable atoms"))?;
            match function {
                LessThan => ordering == Ordering::Less,
                LessThanOrEqual => ordering != Ordering::Greater,
                GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
        Includes => includes(actual, expected, true),
        Excludes => includes(actual, expected, false),
    })
}

/// A one-element set is the same datum as its element.
fn single(value: &Value) -> &Value {
    match value {
        Value::Set(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn datum_eq(a: &Value, b: &Value) -> bool {
    match (single(a), single(b)) {
        (Value::Set(x), Value::Set(y)) => x.len() == y.len() && x.iter().all(|v| y.contains(v)),
        (Value::Map(x), Value::Map(y)) => x.len() == y.len() && x.iter().all(|p| y.contains(p)),
        (x, y) => x == y,
    }
}

/// With `all`, true if every element of `expected` is in `actual`;
/// otherwise true if none is.
fn includes(actual: &Value, expected: &Value, all: bool) -> bool {
    match (actual, expected) {
        (Value::Map(have), Value::Map(want)) => {
            let mut hits = want.iter().map(|pair| have.contains(pair));
            if all {
                hits.all(|hit| hit)
            } else {
                !hits.any(|hit| hit)
            }
        }
        _ => {
            let have = actual.set_elements().unwrap_or(&[]);
            let want = expected.set_elements().unwrap_or(&[]);
            let mut hits = want.iter().map(|v| have.contains(v));
            if all {
                hits.all(|hit| hit)
            } else {
                !hits.any(|hit| hit)
            }
        }
    }
}

fn mutate(current: &Value, mutation: &Mutation, operand: &Value) -> OpResult<Value> {
    let column = &mutation.column;
    match mutation.mutator {
        Mutator::Insert => match (current, operand) {
            (Value::Map(have), Value::Map(add)) => {
                let mut out = have.clone();
                for (k, v) in add {
                    // Existing keys keep their value.
                    if !out.iter().any(|(existing, _)| existing == k) {
                        out.push((k.clone(), v.clone()));
                    }
                }
                Ok(Value::Map(out))
            }
            (Value::Map(_), _) => Err(OpError::syntax(format!("insert into map {column} needs a map"))),
            _ => {
                let have = current.set_elements().unwrap_or(&[]);
                let add = operand
                    .set_elements()
                    .ok_or_else(|| OpError::syntax(format!("insert into set {column} needs a set")))?;
                Ok(Value::set(have.iter().chain(add).cloned()))
            }
        },
        Mutator::Delete => match (current, operand) {
            (Value::Map(have), Value::Map(remove)) => Ok(Value::Map(
                have.iter().filter(|p| !remove.contains(p)).cloned().collect(),
            )),
            (Value::Map(have), keys) => {
                let keys = keys.set_elements().unwrap_or(&[]);
                Ok(Value::Map(
                    have.iter().filter(|(k, _)| !keys.contains(k)).cloned().collect(),
                ))
            }
            _ => {
                let have = current.set_elements().unwrap_or(&[]);
                let remove = operand.set_elements().unwrap_or(&[]);
                Ok(Value::Set(
                    have.iter().filter(|v| !remove.contains(v)).cloned().collect(),
                ))
            }
        },
        arithmetic => arithmetic_mutation(column, arithmetic, single(current), single(operand)),
    }
}

fn arithmetic_mutation(column: &str, mutator: Mutator, current: &Value, operand: &Value) -> OpResult<Value> {
    match (current, operand) {
        (Value::Integer(a), Value::Integer(b)) => {
            let (a, b) = (*a, *b);
            if matches!(mutator, Mutator::Divide | Mutator::Modulo) && b == 0 {
                return Err(OpError::domain(format!("division by zero on {column}")));
            }
            let result = match mutator {
                Mutator::Add => a.checked_add(b),
                Mutator::Subtract => a.checked_sub(b),
                Mutator::Multiply => a.checked_mul(b),
                Mutator::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| OpError::range(format!("integer overflow on {column}")))
        }
        (Value::Real(a), Value::Real(b)) => {
            let (a, b) = (*a, *b);
            let result = match mutator {
                Mutator::Add => a + b,
                Mutator::Subtract => a - b,
                Mutator::Multiply => a * b,
                Mutator::Divide if b == 0.0 => {
                    return Err(OpError::domain(format!("division by zero on {column}")))
                }
                Mutator::Divide => a / b,
                _ => return Err(OpError::syntax(format!("%= is not defined for real column {column}"))),
            };
            Ok(Value::Real(result))
        }
        _ => Err(OpError::syntax(format!(
            "arithmetic on {column} needs numbers of the same type"
        ))),
    }
}
