//! The in-memory store and its connector.

use crate::database::{Database, Rows};
use crate::error::{StoreError, StoreResult};
use crate::session::MemSession;
use crate::txn::{self, TxnOutcome};
use ovnsync_engine::{ClientResult, Connector, RpcSession, TlsConfig};
use ovnsync_protocol::{DatabaseSchema, MonitorRequests, Operation, OperationResult, TableUpdates};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) struct StoreInner {
    databases: RwLock<BTreeMap<String, Database>>,
    sessions: Mutex<Vec<Arc<MemSession>>>,
    available: AtomicBool,
    /// Held from commit until fan-out finishes, so sessions see commits in order.
    delivery: Mutex<()>,
    connects: AtomicUsize,
    commits: AtomicU64,
    next_session: AtomicU64,
}

impl StoreInner {
    pub(crate) fn schema(&self, database: &str) -> StoreResult<DatabaseSchema> {
        self.databases
            .read()
            .get(database)
            .map(|db| db.schema().clone())
            .ok_or_else(|| StoreError::UnknownDatabase(database.to_string()))
    }

    /// Takes the initial snapshot and runs `subscribe` before any later
    /// commit can start.
    pub(crate) fn snapshot_with<F: FnOnce()>(
        &self,
        database: &str,
        requests: &MonitorRequests,
        subscribe: F,
    ) -> StoreResult<TableUpdates> {
        let databases = self.databases.read();
        let db = databases
            .get(database)
            .ok_or_else(|| StoreError::UnknownDatabase(database.to_string()))?;
        if let Some(table) = requests.keys().find(|t| db.rows(t).is_none()) {
            return Err(StoreError::UnknownTable {
                table: table.clone(),
                database: database.to_string(),
            });
        }
        let snapshot = db.snapshot(requests);
        subscribe();
        Ok(snapshot)
    }

    pub(crate) fn transact(
        &self,
        database: &str,
        operations: &[Operation],
    ) -> StoreResult<Vec<OperationResult>> {
        let mut databases = self.databases.write();
        let db = databases
            .get_mut(database)
            .ok_or_else(|| StoreError::UnknownDatabase(database.to_string()))?;

        let TxnOutcome { results, changes } = txn::execute(db, operations);
        let Some(changes) = changes else {
            debug!("Transaction on {} rejected", database);
            return Ok(results);
        };
        self.commits.fetch_add(1, Ordering::SeqCst);
        if changes.is_empty() {
            return Ok(results);
        }

        let _delivery = self.delivery.lock();
        drop(databases);
        let sessions = self.sessions.lock().clone();
        for session in sessions {
            session.deliver(database, &changes);
        }
        Ok(results)
    }

    pub(crate) fn remove_session(&self, id: u64) {
        self.sessions.lock().retain(|s| s.id() != id);
    }
}

/// An OVSDB store held entirely in memory.
///
/// Hosts any number of databases, accepts sessions through [`Connector`],
/// evaluates transactions atomically and fans committed changes out to
/// monitoring sessions in commit order. Availability can be toggled and
/// sessions severed to exercise a client's reconnection path.
///
/// # Example
///
/// ```
/// use ovnsync_memstore::MemStore;
/// use ovnsync_protocol::{DatabaseSchema, TableSchema};
///
/// let store = MemStore::new();
/// store
///     .add_database(DatabaseSchema::new("OVN_Northbound").with_table("ACL", TableSchema::new()))
///     .unwrap();
/// assert_eq!(store.database_names(), vec!["OVN_Northbound".to_string()]);
/// ```
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<StoreInner>,
}

impl MemStore {
    /// Creates an empty, available store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                databases: RwLock::new(BTreeMap::new()),
                sessions: Mutex::new(Vec::new()),
                available: AtomicBool::new(true),
                delivery: Mutex::new(()),
                connects: AtomicUsize::new(0),
                commits: AtomicU64::new(0),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a store hosting one database per schema.
    pub fn with_schemas<I>(schemas: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = DatabaseSchema>,
    {
        let store = Self::new();
        for schema in schemas {
            store.add_database(schema)?;
        }
        Ok(store)
    }

    /// Hosts a new, empty database.
    pub fn add_database(&self, schema: DatabaseSchema) -> StoreResult<()> {
        let mut databases = self.inner.databases.write();
        if databases.contains_key(&schema.name) {
            return Err(StoreError::DuplicateDatabase(schema.name));
        }
        info!("Hosting database {} ({} tables)", schema.name, schema.tables.len());
        databases.insert(schema.name.clone(), Database::new(schema));
        Ok(())
    }

    /// Names of the hosted databases.
    pub fn database_names(&self) -> Vec<String> {
        self.inner.databases.read().keys().cloned().collect()
    }

    /// Copy of the committed rows of a table.
    pub fn rows(&self, database: &str, table: &str) -> Option<Rows> {
        self.inner.databases.read().get(database)?.rows(table).cloned()
    }

    /// Runs a transaction outside any session, as another writer would.
    pub fn transact(&self, database: &str, operations: &[Operation]) -> StoreResult<Vec<OperationResult>> {
        self.inner.transact(database, operations)
    }

    /// Makes new connection attempts succeed or fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if new connections are accepted.
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Severs every session as a network failure would. Returns how many.
    pub fn drop_connections(&self) -> usize {
        let sessions = std::mem::take(&mut *self.inner.sessions.lock());
        for session in &sessions {
            session.sever();
        }
        if !sessions.is_empty() {
            info!("Dropped {} sessions", sessions.len());
        }
        sessions.len()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Number of connection attempts, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of committed transactions.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MemStore {
    fn connect(&self, address: &str, tls: Option<&TlsConfig>) -> ClientResult<Arc<dyn RpcSession>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if !self.is_available() {
            return Err(StoreError::Unavailable(address.to_string()).into());
        }
        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(MemSession::new(id, Arc::downgrade(&self.inner)));
        self.inner.sessions.lock().push(Arc::clone(&session));
        debug!(
            "Session {} opened on {}{}",
            id,
            address,
            if tls.is_some() { " (tls)" } else { "" }
        );
        Ok(session)
    }
}
