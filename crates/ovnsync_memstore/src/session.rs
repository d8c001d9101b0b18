//! Client sessions on the in-memory store.

use crate::error::StoreError;
use crate::store::StoreInner;
use ovnsync_engine::{ClientResult, NotificationHandler, RpcSession};
use ovnsync_protocol::{
    DatabaseSchema, MonitorRequests, Operation, OperationResult, Row, TableUpdates,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// One client session.
pub struct MemSession {
    id: u64,
    store: Weak<StoreInner>,
    connected: AtomicBool,
    handler: Mutex<Option<Arc<dyn NotificationHandler>>>,
    monitor: Mutex<Option<(String, MonitorRequests)>>,
}

impl MemSession {
    pub(crate) fn new(id: u64, store: Weak<StoreInner>) -> Self {
        Self {
            id,
            store,
            connected: AtomicBool::new(true),
            handler: Mutex::new(None),
            monitor: Mutex::new(None),
        }
    }

    /// Session identifier, unique within the store.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true until the session is closed or severed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn store(&self) -> Result<Arc<StoreInner>, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::SessionClosed);
        }
        self.store.upgrade().ok_or(StoreError::SessionClosed)
    }

    /// Forwards the part of a commit this session subscribed to.
    pub(crate) fn deliver(&self, database: &str, changes: &TableUpdates) {
        if !self.is_connected() {
            return;
        }
        let filtered = {
            let monitor = self.monitor.lock();
            let Some((monitored_db, requests)) = monitor.as_ref() else {
                return;
            };
            if monitored_db != database {
                return;
            }
            let mut filtered = TableUpdates::new();
            for (table, update) in &changes.tables {
                let Some(request) = requests.get(table) else {
                    continue;
                };
                for (id, row_update) in &update.rows {
                    if !request.select.wants(row_update.kind()) {
                        continue;
                    }
                    let mut row_update = row_update.clone();
                    if !request.columns.is_empty() {
                        row_update.old = row_update.old.map(|r| project(r, &request.columns));
                        row_update.new = row_update.new.map(|r| project(r, &request.columns));
                    }
                    filtered.push(table.clone(), id.clone(), row_update);
                }
            }
            filtered
        };
        if filtered.is_empty() {
            return;
        }
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler.update(filtered);
        }
    }

    /// Severs the session and tells its handler.
    pub(crate) fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let handler = self.handler.lock().take();
        if let Some(handler) = handler {
            handler.disconnected();
        }
    }
}

fn project(row: Row, columns: &[String]) -> Row {
    row.into_iter().filter(|(col, _)| columns.contains(col)).collect()
}

impl RpcSession for MemSession {
    fn fetch_schema(&self, database: &str) -> ClientResult<DatabaseSchema> {
        Ok(self.store()?.schema(database)?)
    }

    fn monitor(&self, database: &str, requests: &MonitorRequests) -> ClientResult<TableUpdates> {
        let store = self.store()?;
        // Snapshot and subscription are taken together; later commits
        // reach this session through `deliver`.
        let snapshot = store.snapshot_with(database, requests, || {
            *self.monitor.lock() = Some((database.to_string(), requests.clone()));
        })?;
        debug!(
            "Session {} monitoring {} tables of {}",
            self.id,
            requests.len(),
            database
        );
        let mut projected = TableUpdates::new();
        for (table, update) in snapshot.tables {
            let columns = requests.get(&table).map(|r| r.columns.as_slice()).unwrap_or(&[]);
            for (id, mut row_update) in update.rows {
                if !columns.is_empty() {
                    row_update.new = row_update.new.map(|r| project(r, columns));
                }
                projected.push(table.clone(), id, row_update);
            }
        }
        Ok(projected)
    }

    fn register_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.handler.lock() = Some(handler);
    }

    fn transact(&self, database: &str, operations: &[Operation]) -> ClientResult<Vec<OperationResult>> {
        Ok(self.store()?.transact(database, operations)?)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.handler.lock().take();
        if let Some(store) = self.store.upgrade() {
            store.remove_session(self.id);
        }
    }
}
