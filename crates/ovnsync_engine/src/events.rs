//! Row-level change events and the callbacks that observe them.
//!
//! Handlers run on the notification delivery path, after the cache has
//! applied the change and with no cache lock held. They must return
//! quickly and must not submit transactions synchronously: the store may
//! still be delivering the batch that triggered them.

use ovnsync_protocol::{Row, RowId};

/// Kind of row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A row appeared in the cache.
    Create,
    /// A cached row changed.
    Update,
    /// A row left the cache.
    Delete,
}

/// One applied row change.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEvent {
    /// Kind of change.
    pub kind: EventKind,
    /// Table name.
    pub table: String,
    /// Row identifier.
    pub row_id: RowId,
    /// The row after the change; for a delete, the last cached image.
    pub row: Row,
}

impl RowEvent {
    /// Creates an event.
    pub fn new(kind: EventKind, table: impl Into<String>, row_id: impl Into<RowId>, row: Row) -> Self {
        Self {
            kind,
            table: table.into(),
            row_id: row_id.into(),
            row,
        }
    }
}

/// Observer of applied row changes.
pub trait SignalHandler: Send + Sync {
    /// Called once per applied row change.
    fn on_change(&self, event: &RowEvent);
}

impl<F> SignalHandler for F
where
    F: Fn(&RowEvent) + Send + Sync,
{
    fn on_change(&self, event: &RowEvent) {
        self(event)
    }
}

/// Observer of transport loss.
pub trait DisconnectHandler: Send + Sync {
    /// Called whenever the transport to the store is lost.
    fn on_disconnect(&self);
}

impl<F> DisconnectHandler for F
where
    F: Fn() + Send + Sync,
{
    fn on_disconnect(&self) {
        self()
    }
}
