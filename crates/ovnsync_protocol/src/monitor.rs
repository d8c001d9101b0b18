//! Monitor subscriptions and the update notifications they produce.

use crate::value::{Row, RowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Change classes delivered for a monitored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSelect {
    /// Deliver the existing rows in the initial reply.
    pub initial: bool,
    /// Deliver inserted rows.
    pub insert: bool,
    /// Deliver deleted rows.
    pub delete: bool,
    /// Deliver modified rows.
    pub modify: bool,
}

impl MonitorSelect {
    /// Every change class.
    pub const ALL: MonitorSelect = MonitorSelect {
        initial: true,
        insert: true,
        delete: true,
        modify: true,
    };

    /// Returns true if an update of this kind should be delivered.
    pub fn wants(&self, kind: RowUpdateKind) -> bool {
        match kind {
            RowUpdateKind::Insert => self.insert,
            RowUpdateKind::Modify => self.modify,
            RowUpdateKind::Delete => self.delete,
        }
    }
}

impl Default for MonitorSelect {
    fn default() -> Self {
        Self::ALL
    }
}

/// Subscription for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRequest {
    /// Columns to monitor; empty means every column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    /// Change classes to deliver.
    pub select: MonitorSelect,
}

impl MonitorRequest {
    /// Full-row subscription with every change class.
    pub fn all_columns() -> Self {
        Self {
            columns: Vec::new(),
            select: MonitorSelect::ALL,
        }
    }
}

/// Subscription set keyed by table name.
pub type MonitorRequests = BTreeMap<String, MonitorRequest>;

/// Classification of a single row update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowUpdateKind {
    /// Row is new to the receiver (insert or initial dump).
    Insert,
    /// Row changed.
    Modify,
    /// Row was removed.
    Delete,
}

/// Old/new images of one row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowUpdate {
    /// Previous content (for modify: the changed columns; for delete: the row).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
    /// New content; absent for a delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Row>,
}

impl RowUpdate {
    /// An insert (or initial) update.
    pub fn insert(new: Row) -> Self {
        Self {
            old: None,
            new: Some(new),
        }
    }

    /// A modify update.
    pub fn modify(old: Row, new: Row) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }

    /// A delete update.
    pub fn delete(old: Row) -> Self {
        Self {
            old: Some(old),
            new: None,
        }
    }

    /// Classifies the update. An empty `new` image counts as a delete.
    pub fn kind(&self) -> RowUpdateKind {
        match (&self.old, &self.new) {
            (_, None) => RowUpdateKind::Delete,
            (_, Some(new)) if new.is_empty() => RowUpdateKind::Delete,
            (None, Some(_)) => RowUpdateKind::Insert,
            (Some(_), Some(_)) => RowUpdateKind::Modify,
        }
    }
}

/// Row updates for one table, keyed by row id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdate {
    /// Updates by row id.
    pub rows: BTreeMap<RowId, RowUpdate>,
}

/// A notification batch: table name to table update.
///
/// The same shape carries the initial reply of a monitor request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdates {
    /// Updates by table name.
    pub tables: BTreeMap<String, TableUpdate>,
}

impl TableUpdates {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one row update.
    pub fn push(&mut self, table: impl Into<String>, row_id: impl Into<RowId>, update: RowUpdate) {
        self.tables
            .entry(table.into())
            .or_default()
            .rows
            .insert(row_id.into(), update);
    }

    /// Builder form of [`push`](Self::push).
    pub fn with_row(
        mut self,
        table: impl Into<String>,
        row_id: impl Into<RowId>,
        update: RowUpdate,
    ) -> Self {
        self.push(table, row_id, update);
        self
    }

    /// Returns true if the batch carries no row updates.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|t| t.rows.is_empty())
    }

    /// Total number of row updates.
    pub fn row_count(&self) -> usize {
        self.tables.values().map(|t| t.rows.len()).sum()
    }
}
