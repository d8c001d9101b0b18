//! In-memory mirror of the monitored tables.

use crate::error::{ClientError, ClientResult};
use crate::events::{EventKind, RowEvent};
use ovnsync_protocol::{Row, RowId, RowUpdate, TableUpdates};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Rows of one table keyed by row id.
pub type TableRows = BTreeMap<RowId, Row>;

/// Mirror of the monitored tables.
///
/// A single reader/writer lock guards all tables. Each notification batch
/// is applied under the write lock as a whole, so readers observe either
/// none or all of it. Every change replaces or removes one whole row.
#[derive(Debug, Default)]
pub struct CacheStore {
    tables: RwLock<HashMap<String, TableRows>>,
}

impl CacheStore {
    /// Creates an empty cache with no subscribed tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the cache from the initial monitor reply.
    ///
    /// `tables` becomes the subscribed set. Contents are replaced by the
    /// snapshot and the difference with what was cached before is returned
    /// as events: rows identical to the cached image produce nothing, and
    /// rows missing from the snapshot are reported deleted. On a first
    /// connect every row is a `Create`.
    pub fn load(&self, tables: &[String], snapshot: &TableUpdates) -> ClientResult<Vec<RowEvent>> {
        if let Some(unknown) = snapshot.tables.keys().find(|t| !tables.contains(*t)) {
            return Err(ClientError::Protocol(format!(
                "initial snapshot contains unmonitored table {unknown}"
            )));
        }

        let mut fresh: HashMap<String, TableRows> = tables
            .iter()
            .map(|t| (t.clone(), TableRows::new()))
            .collect();
        for (table, update) in &snapshot.tables {
            let rows = fresh.entry(table.clone()).or_default();
            for (id, row_update) in &update.rows {
                if let Some(new) = live_image(row_update) {
                    rows.insert(id.clone(), new.clone());
                }
            }
        }

        let mut guard = self.tables.write();
        let mut events = Vec::new();

        for table in tables {
            let old = guard.get(table);
            let Some(new_rows) = fresh.get(table) else {
                continue;
            };
            for (id, row) in new_rows {
                match old.and_then(|rows| rows.get(id)) {
                    Some(existing) if existing == row => {}
                    Some(_) => events.push(RowEvent::new(EventKind::Update, table, id, row.clone())),
                    None => events.push(RowEvent::new(EventKind::Create, table, id, row.clone())),
                }
            }
        }

        let mut previous: Vec<_> = guard.iter().collect();
        previous.sort_by(|a, b| a.0.cmp(b.0));
        for (table, rows) in previous {
            let survivors = fresh.get(table);
            for (id, row) in rows {
                if !survivors.is_some_and(|s| s.contains_key(id)) {
                    events.push(RowEvent::new(EventKind::Delete, table, id, row.clone()));
                }
            }
        }

        *guard = fresh;
        Ok(events)
    }

    /// Applies one notification batch atomically.
    ///
    /// A batch naming a table outside the subscribed set is rejected whole
    /// and nothing is applied: the mirror can no longer be trusted.
    pub fn apply(&self, updates: &TableUpdates) -> ClientResult<Vec<RowEvent>> {
        let mut guard = self.tables.write();

        if let Some(unknown) = updates.tables.keys().find(|t| !guard.contains_key(*t)) {
            return Err(ClientError::Protocol(format!(
                "update for unmonitored table {unknown}"
            )));
        }

        let mut events = Vec::with_capacity(updates.row_count());
        for (table, update) in &updates.tables {
            let Some(rows) = guard.get_mut(table) else {
                continue;
            };
            for (id, row_update) in &update.rows {
                if let Some(event) = apply_one(rows, table, id, row_update) {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    /// Applies a single row change.
    pub fn apply_row(
        &self,
        table: &str,
        row_id: &str,
        update: &RowUpdate,
    ) -> ClientResult<Option<RowEvent>> {
        let mut guard = self.tables.write();
        let rows = guard.get_mut(table).ok_or_else(|| {
            ClientError::Protocol(format!("update for unmonitored table {table}"))
        })?;
        Ok(apply_one(rows, table, row_id, update))
    }

    /// Returns a copy of one table, or `None` if it is not monitored.
    pub fn snapshot(&self, table: &str) -> Option<TableRows> {
        self.tables.read().get(table).cloned()
    }

    /// Returns a copy of one row.
    pub fn row(&self, table: &str, row_id: &str) -> Option<Row> {
        self.tables.read().get(table)?.get(row_id).cloned()
    }

    /// Returns copies of the rows matching `predicate`, ordered by row id.
    pub fn find<F>(&self, table: &str, predicate: F) -> Vec<(RowId, Row)>
    where
        F: Fn(&str, &Row) -> bool,
    {
        let guard = self.tables.read();
        guard
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|(id, row)| predicate(id, row))
                    .map(|(id, row)| (id.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the subscribed table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true if the table is subscribed.
    pub fn is_monitored(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }

    /// Number of rows cached for a table (0 if not monitored).
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }
}

/// The row image an update leaves behind, if any.
fn live_image(update: &RowUpdate) -> Option<&Row> {
    update.new.as_ref().filter(|row| !row.is_empty())
}

fn apply_one(rows: &mut TableRows, table: &str, row_id: &str, update: &RowUpdate) -> Option<RowEvent> {
    match live_image(update) {
        Some(new) => {
            let kind = match rows.get(row_id) {
                Some(existing) if existing == new => return None,
                Some(_) => EventKind::Update,
                None => EventKind::Create,
            };
            rows.insert(row_id.to_string(), new.clone());
            Some(RowEvent::new(kind, table, row_id, new.clone()))
        }
        // Deleting an unknown row is a no-op.
        None => rows
            .remove(row_id)
            .map(|old| RowEvent::new(EventKind::Delete, table, row_id, old)),
    }
}
