//! Transport layer abstraction for the store's RPC protocol.
//!
//! The engine never speaks the wire protocol itself. A [`Connector`] opens
//! sessions and a [`RpcSession`] carries the four calls the engine needs:
//! schema fetch, monitor, transact and notification delivery. This keeps
//! the engine testable against an in-memory store or the scripted
//! [`MockConnector`].

use crate::config::TlsConfig;
use crate::error::{ClientError, ClientResult};
use ovnsync_protocol::{DatabaseSchema, MonitorRequests, Operation, OperationResult, TableUpdates};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receives asynchronous traffic from a session.
///
/// `update` may wait for the subscribing [`RpcSession::monitor`] call to
/// return, so a transport must not deliver updates from inside `monitor`
/// on the calling thread. `disconnected` never waits and may be called
/// from any thread, including from inside `monitor`.
pub trait NotificationHandler: Send + Sync {
    /// A batch of committed changes for monitored tables.
    fn update(&self, updates: TableUpdates);

    /// The session was lost. Called at most once per session.
    fn disconnected(&self);
}

/// One live session with the store.
pub trait RpcSession: Send + Sync {
    /// Fetches the schema of `database`.
    fn fetch_schema(&self, database: &str) -> ClientResult<DatabaseSchema>;

    /// Subscribes to `requests` and returns the initial snapshot.
    fn monitor(&self, database: &str, requests: &MonitorRequests) -> ClientResult<TableUpdates>;

    /// Installs the receiver of notifications for this session.
    fn register_handler(&self, handler: Arc<dyn NotificationHandler>);

    /// Submits `operations` as one atomic transaction.
    fn transact(&self, database: &str, operations: &[Operation]) -> ClientResult<Vec<OperationResult>>;

    /// Closes the session. Does not invoke the notification handler.
    fn disconnect(&self);
}

/// Opens sessions to a store.
pub trait Connector: Send + Sync + 'static {
    /// Dials `address`.
    fn connect(&self, address: &str, tls: Option<&TlsConfig>) -> ClientResult<Arc<dyn RpcSession>>;
}

#[derive(Default)]
struct MockState {
    schema: Mutex<DatabaseSchema>,
    snapshot: Mutex<TableUpdates>,
    fail_next: Mutex<u32>,
    connects: AtomicUsize,
    current: Mutex<Option<Arc<MockSession>>>,
    transactions: Mutex<Vec<Vec<Operation>>>,
    monitors: Mutex<Vec<MonitorRequests>>,
    transact_response: Mutex<Option<Vec<OperationResult>>>,
    transact_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    lose_during_monitor: Mutex<Option<bool>>,
    severed: Mutex<Vec<Arc<dyn NotificationHandler>>>,
}

/// A scripted connector for testing.
///
/// Serves a fixed schema and initial snapshot, records every transaction
/// and lets tests push notifications or sever the current session.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Creates a mock serving `schema` with an empty snapshot.
    pub fn new(schema: DatabaseSchema) -> Self {
        let connector = Self::default();
        *connector.state.schema.lock() = schema;
        connector
    }

    /// Sets the snapshot returned by the next monitor calls.
    pub fn set_snapshot(&self, snapshot: TableUpdates) {
        *self.state.snapshot.lock() = snapshot;
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        *self.state.fail_next.lock() = count;
    }

    /// Sets a fixed transaction response. Without one, row-allocating
    /// operations get a fresh uuid and others a count of 1.
    pub fn set_transact_response(&self, results: Vec<OperationResult>) {
        *self.state.transact_response.lock() = Some(results);
    }

    /// Severs the session inside the next monitor call, before it returns.
    ///
    /// The handler hears `disconnected` on the subscribing thread. With
    /// `still_reply` the call then returns the snapshot anyway, as a reply
    /// already in flight would; otherwise it fails.
    pub fn lose_during_next_monitor(&self, still_reply: bool) {
        *self.state.lose_during_monitor.lock() = Some(still_reply);
    }

    /// Delays every transaction by `delay`.
    pub fn set_transact_delay(&self, delay: Duration) {
        *self.state.transact_delay.lock() = delay;
    }

    /// Number of connection attempts, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Transactions received so far.
    pub fn transactions(&self) -> Vec<Vec<Operation>> {
        self.state.transactions.lock().clone()
    }

    /// Monitor requests received so far.
    pub fn monitor_requests(&self) -> Vec<MonitorRequests> {
        self.state.monitors.lock().clone()
    }

    /// Highest number of transactions observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Returns true if a session is open.
    pub fn is_connected(&self) -> bool {
        self.state.current.lock().is_some()
    }

    /// Delivers `updates` to the current session's handler.
    ///
    /// Returns false if there is no session or no handler.
    pub fn notify(&self, updates: TableUpdates) -> bool {
        let handler = self
            .state
            .current
            .lock()
            .as_ref()
            .and_then(|session| session.handler.lock().clone());
        match handler {
            Some(handler) => {
                handler.update(updates);
                true
            }
            None => false,
        }
    }

    /// Severs the current session as if the network failed.
    pub fn drop_connection(&self) {
        let Some(session) = self.state.current.lock().take() else {
            return;
        };
        session.sever();
    }

    /// Delivers `updates` to the handlers of severed sessions, as packets
    /// still queued behind a dead connection would be.
    ///
    /// Returns the number of handlers reached.
    pub fn notify_severed(&self, updates: TableUpdates) -> usize {
        let handlers = self.state.severed.lock().clone();
        for handler in &handlers {
            handler.update(updates.clone());
        }
        handlers.len()
    }
}

impl Connector for MockConnector {
    fn connect(&self, address: &str, _tls: Option<&TlsConfig>) -> ClientResult<Arc<dyn RpcSession>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        {
            let mut fail = self.state.fail_next.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(ClientError::transport_retryable(format!(
                    "connection refused: {address}"
                )));
            }
        }
        let session = Arc::new(MockSession {
            state: Arc::clone(&self.state),
            handler: Mutex::new(None),
            connected: AtomicBool::new(true),
        });
        *self.state.current.lock() = Some(Arc::clone(&session));
        Ok(session)
    }
}

struct MockSession {
    state: Arc<MockState>,
    handler: Mutex<Option<Arc<dyn NotificationHandler>>>,
    connected: AtomicBool,
}

impl MockSession {
    fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let handler = self.handler.lock().take();
        if let Some(handler) = handler {
            self.state.severed.lock().push(Arc::clone(&handler));
            handler.disconnected();
        }
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::transport_retryable("session closed"))
        }
    }
}

impl RpcSession for MockSession {
    fn fetch_schema(&self, _database: &str) -> ClientResult<DatabaseSchema> {
        self.ensure_connected()?;
        Ok(self.state.schema.lock().clone())
    }

    fn monitor(&self, _database: &str, requests: &MonitorRequests) -> ClientResult<TableUpdates> {
        self.ensure_connected()?;
        self.state.monitors.lock().push(requests.clone());

        let lose = self.state.lose_during_monitor.lock().take();
        if let Some(still_reply) = lose {
            {
                let mut current = self.state.current.lock();
                if current.as_ref().is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), self)) {
                    current.take();
                }
            }
            self.sever();
            if !still_reply {
                return Err(ClientError::transport_retryable("connection reset during monitor"));
            }
        }
        Ok(self.state.snapshot.lock().clone())
    }

    fn register_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.handler.lock() = Some(handler);
    }

    fn transact(&self, _database: &str, operations: &[Operation]) -> ClientResult<Vec<OperationResult>> {
        self.ensure_connected()?;

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.state.transact_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.state.transactions.lock().push(operations.to_vec());
        let results = match self.state.transact_response.lock().clone() {
            Some(results) => results,
            None => {
                let base = self.state.transactions.lock().len();
                operations
                    .iter()
                    .enumerate()
                    .map(|(i, op)| {
                        if op.allocates_row() {
                            OperationResult::inserted(format!("00000000-0000-4000-8000-{:012}", base * 100 + i))
                        } else {
                            OperationResult::counted(1)
                        }
                    })
                    .collect()
            }
        };

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(results)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.handler.lock().take();
        let mut current = self.state.current.lock();
        if current.as_ref().is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), self)) {
            current.take();
        }
    }
}
