//! Connection lifecycle: connect, subscribe, mirror, lose, reconnect, close.
//!
//! A [`ConnectionManager`] owns at most one live session. Every successful
//! connect runs the same sequence: fetch the schema, negotiate tables,
//! subscribe, and seed the cache from the initial snapshot. Each attempt
//! gets a fresh generation number, and traffic tagged with an older
//! generation is ignored, so a late notification from a dead session can
//! never touch the mirror or fire a second disconnect callback.

use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::RowEvent;
use crate::monitor::build_monitor_requests;
use crate::reconnect::{FailureLog, ReconnectTask, RetryLog};
use crate::schema::{negotiate, NegotiatedTables};
use crate::transport::{Connector, NotificationHandler, RpcSession};
use ovnsync_protocol::{DatabaseSchema, TableUpdates};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// State of the connection to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no reconnection in progress.
    Disconnected,
    /// A connection attempt is in progress, first or retried.
    Connecting,
    /// Session live and cache seeded.
    Connected,
    /// Session lost; the background task waits between attempts.
    Reconnecting,
    /// Closed by the caller. Terminal.
    Closed,
}

/// Counters describing the connection's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Successful connects, initial one included.
    pub connects: u64,
    /// Sessions lost.
    pub disconnects: u64,
    /// Background reconnection attempts.
    pub reconnect_attempts: u64,
    /// Notification batches applied to the cache.
    pub update_batches: u64,
    /// Row events handed to the signal handler.
    pub row_events: u64,
}

type LiveSession = (u64, Arc<dyn RpcSession>);

struct Shared<C: Connector> {
    config: ClientConfig,
    connector: Arc<C>,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<LiveSession>>,
    schema: RwLock<Option<DatabaseSchema>>,
    tables: RwLock<NegotiatedTables>,
    cache: CacheStore,
    reconnect: Mutex<Option<ReconnectTask>>,
    closed: AtomicBool,
    generation: AtomicU64,
    /// Highest generation whose session reported a loss.
    lost: AtomicU64,
    stats: Mutex<ConnectionStats>,
    /// Serializes connection attempts.
    connect_lock: Mutex<()>,
    /// Serializes cache seeding and notification application.
    apply_lock: Mutex<()>,
}

/// Owns the session, the cache and the reconnection task.
pub struct ConnectionManager<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager. Nothing is dialed until [`connect`](Self::connect).
    pub fn new(config: ClientConfig, connector: Arc<C>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                schema: RwLock::new(None),
                tables: RwLock::new(Vec::new()),
                cache: CacheStore::new(),
                reconnect: Mutex::new(None),
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                lost: AtomicU64::new(0),
                stats: Mutex::new(ConnectionStats::default()),
                connect_lock: Mutex::new(()),
                apply_lock: Mutex::new(()),
            }),
        }
    }

    /// Connects, subscribes and seeds the cache.
    ///
    /// Failure here is returned to the caller and never starts the
    /// reconnection task: that only runs after a session was lost.
    pub fn connect(&self) -> ClientResult<()> {
        establish(&self.shared)
    }

    /// Returns the live session or `NotConnected`.
    pub fn session(&self) -> ClientResult<Arc<dyn RpcSession>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        self.shared
            .session
            .lock()
            .as_ref()
            .map(|(_, session)| Arc::clone(session))
            .ok_or_else(|| ClientError::NotConnected(self.shared.config.address.clone()))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// The cache mirror.
    pub fn cache(&self) -> &CacheStore {
        &self.shared.cache
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Schema fetched on the most recent connect.
    pub fn schema(&self) -> Option<DatabaseSchema> {
        self.shared.schema.read().clone()
    }

    /// Returns true if the most recent schema has `table`, or if no schema
    /// has been fetched yet.
    pub fn knows_table(&self, table: &str) -> bool {
        self.shared
            .schema
            .read()
            .as_ref()
            .is_none_or(|schema| schema.has_table(table))
    }

    /// Tables monitored since the most recent connect, in canonical order.
    pub fn monitored_tables(&self) -> Vec<String> {
        self.shared.tables.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Connection counters.
    pub fn stats(&self) -> ConnectionStats {
        *self.shared.stats.lock()
    }

    /// Returns true if the reconnection task is running.
    pub fn is_reconnecting(&self) -> bool {
        self.shared
            .reconnect
            .lock()
            .as_ref()
            .is_some_and(ReconnectTask::is_running)
    }

    /// Stops reconnection and tears down the session.
    ///
    /// Idempotent. Does not invoke the disconnect callback.
    pub fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let task = shared.reconnect.lock().take();
        if let Some(mut task) = task {
            task.stop();
        }

        let session = shared.session.lock().take();
        shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some((_, session)) = session {
            session.disconnect();
        }
        *shared.state.lock() = ConnectionState::Closed;
        info!("Closed connection to {}", shared.config.address);
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_state<C: Connector>(shared: &Shared<C>, state: ConnectionState) {
    let mut current = shared.state.lock();
    if *current != ConnectionState::Closed {
        *current = state;
    }
}

fn establish<C: Connector>(shared: &Arc<Shared<C>>) -> ClientResult<()> {
    let _attempt = shared.connect_lock.lock();
    if shared.closed.load(Ordering::SeqCst) {
        return Err(ClientError::Closed);
    }

    let reconnecting = {
        let mut state = shared.state.lock();
        let reconnecting = *state == ConnectionState::Reconnecting;
        *state = ConnectionState::Connecting;
        reconnecting
    };

    let config = &shared.config;
    let outcome = shared
        .connector
        .connect(&config.address, config.tls.as_ref())
        .and_then(|session| match subscribe(shared, &session) {
            Ok((generation, events)) => Ok((generation, session, events)),
            Err(e) => {
                shared.generation.fetch_add(1, Ordering::SeqCst);
                session.disconnect();
                Err(e)
            }
        });

    let failed = |e: ClientError| -> ClientResult<()> {
        set_state(
            shared,
            if reconnecting {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            },
        );
        Err(e)
    };

    let (generation, session, events) = match outcome {
        Ok(established) => established,
        Err(e) => return failed(e),
    };

    let replaced = {
        let mut slot = shared.session.lock();
        if shared.closed.load(Ordering::SeqCst) {
            drop(slot);
            session.disconnect();
            return Err(ClientError::Closed);
        }
        // Lost before it could be installed: nobody else will clean it up.
        if shared.lost.load(Ordering::SeqCst) >= generation {
            shared.generation.fetch_add(1, Ordering::SeqCst);
            drop(slot);
            session.disconnect();
            return failed(ClientError::transport_retryable(format!(
                "session to {} lost while subscribing",
                config.address
            )));
        }
        slot.replace((generation, session))
    };
    if let Some((_, previous)) = replaced {
        previous.disconnect();
    }
    set_state(shared, ConnectionState::Connected);
    shared.stats.lock().connects += 1;

    info!(
        "Connected to {} ({}), monitoring {} tables",
        config.address,
        config.database,
        shared.tables.read().len()
    );
    dispatch(shared, &events);
    Ok(())
}

/// Negotiates, subscribes and seeds the cache on a fresh session.
fn subscribe<C: Connector>(
    shared: &Arc<Shared<C>>,
    session: &Arc<dyn RpcSession>,
) -> ClientResult<(u64, Vec<RowEvent>)> {
    let config = &shared.config;
    let database = config.database.name();

    let schema = session.fetch_schema(database)?;
    let tables = negotiate(config.database, &schema, config.restriction())?;
    let requests = build_monitor_requests(&tables);

    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

    // Notifications for this generation wait here until the cache is seeded.
    let _apply = shared.apply_lock.lock();
    session.register_handler(Arc::new(SessionHandler {
        shared: Arc::downgrade(shared),
        generation,
    }));
    let snapshot = session.monitor(database, &requests)?;
    let names: Vec<String> = tables.iter().map(|(t, _)| t.clone()).collect();
    let events = shared.cache.load(&names, &snapshot)?;

    debug!(
        "Seeded cache for {} with {} rows",
        database,
        snapshot.row_count()
    );
    *shared.schema.write() = Some(schema);
    *shared.tables.write() = tables;
    Ok((generation, events))
}

fn dispatch<C: Connector>(shared: &Shared<C>, events: &[RowEvent]) {
    if events.is_empty() {
        return;
    }
    if let Some(handler) = &shared.config.signal_handler {
        for event in events {
            handler.on_change(event);
        }
        shared.stats.lock().row_events += events.len() as u64;
    }
}

fn deliver<C: Connector>(shared: &Arc<Shared<C>>, generation: u64, updates: TableUpdates) {
    // Stale sessions must not wait on a connect in progress.
    if shared.generation.load(Ordering::SeqCst) != generation {
        return;
    }
    let applied = {
        let _apply = shared.apply_lock.lock();
        if shared.generation.load(Ordering::SeqCst) != generation {
            debug!("Dropping update from stale session (generation {})", generation);
            return;
        }
        shared.cache.apply(&updates)
    };

    match applied {
        Ok(events) => {
            shared.stats.lock().update_batches += 1;
            dispatch(shared, &events);
        }
        Err(e) => {
            error!("Cache can no longer be trusted, dropping session: {}", e);
            handle_loss(shared, generation);
        }
    }
}

fn handle_loss<C: Connector>(shared: &Arc<Shared<C>>, generation: u64) {
    let session = {
        let mut slot = shared.session.lock();
        match slot.as_ref() {
            Some((live, _)) if *live == generation => {
                // Late traffic from this session is now stale.
                shared.generation.fetch_add(1, Ordering::SeqCst);
                slot.take().map(|(_, s)| s)
            }
            _ => None,
        }
    };
    // Stale or already handled.
    let Some(session) = session else {
        return;
    };
    session.disconnect();
    shared.stats.lock().disconnects += 1;

    if shared.closed.load(Ordering::SeqCst) {
        return;
    }

    let config = &shared.config;
    warn!("Lost connection to {}", config.address);
    set_state(
        shared,
        if config.reconnect {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        },
    );

    if let Some(handler) = &config.disconnect_handler {
        handler.on_disconnect();
    }

    // The callback may have closed the manager.
    if config.reconnect && !shared.closed.load(Ordering::SeqCst) {
        start_reconnect(shared);
    }
}

fn start_reconnect<C: Connector>(shared: &Arc<Shared<C>>) {
    let weak = Arc::downgrade(shared);
    let policy = shared.config.reconnect_policy.clone();
    let mut log = RetryLog::new(policy.max_logged_failures);

    let task = ReconnectTask::spawn(policy.interval, move |_| {
        let Some(shared) = weak.upgrade() else {
            return true;
        };
        if shared.closed.load(Ordering::SeqCst) {
            return true;
        }
        shared.stats.lock().reconnect_attempts += 1;

        let address = &shared.config.address;
        match establish(&shared) {
            Ok(()) => {
                info!(
                    "Reconnected to {} after {} failed attempts",
                    address,
                    log.failures()
                );
                true
            }
            Err(ClientError::Closed) => true,
            Err(e) => {
                match log.on_failure() {
                    FailureLog::Report => {
                        warn!("Failed to reconnect to {} (retry {}): {}", address, log.failures(), e)
                    }
                    FailureLog::Suppress => warn!(
                        "Still unable to reconnect to {}, continuing to retry with logging suppressed",
                        address
                    ),
                    FailureLog::Silent => {}
                }
                false
            }
        }
    });

    match task {
        Ok(task) => {
            let previous = shared.reconnect.lock().replace(task);
            if let Some(mut previous) = previous {
                previous.stop();
            }
        }
        Err(e) => error!("Cannot reconnect to {}: {}", shared.config.address, e),
    }
}

struct SessionHandler<C: Connector> {
    shared: Weak<Shared<C>>,
    generation: u64,
}

impl<C: Connector> NotificationHandler for SessionHandler<C> {
    fn update(&self, updates: TableUpdates) {
        if let Some(shared) = self.shared.upgrade() {
            deliver(&shared, self.generation, updates);
        }
    }

    fn disconnected(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        // May run on the thread that is still subscribing, so no locks of the
        // connect path are taken here. `establish` checks the mark before
        // installing the session.
        shared.lost.fetch_max(self.generation, Ordering::SeqCst);
        handle_loss(&shared, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectPolicy;
    use crate::events::EventKind;
    use crate::transport::MockConnector;
    use ovnsync_protocol::{
        ColumnSchema, DatabaseId, Row, RowUpdate, TableSchema, Value,
    };
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn schema() -> DatabaseSchema {
        let table = TableSchema::new().with_column("name", ColumnSchema::atomic("string"));
        DatabaseSchema::new("OVN_Northbound")
            .with_table("Logical_Switch", table.clone())
            .with_table("ACL", table)
    }

    fn named(name: &str) -> Row {
        let mut row = Row::new();
        row.insert("name".into(), Value::string(name));
        row
    }

    fn config() -> ClientConfig {
        ClientConfig::new(DatabaseId::Northbound, "tcp:127.0.0.1:6641").with_reconnect_policy(
            ReconnectPolicy::new().with_interval(Duration::from_millis(5)),
        )
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn connect_seeds_cache_and_fires_creates() {
        let mock = Arc::new(MockConnector::new(schema()));
        mock.set_snapshot(
            TableUpdates::new().with_row("Logical_Switch", "ls1", RowUpdate::insert(named("sw0"))),
        );
        let creates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&creates);
        let config = config().with_signal_handler(move |e: &RowEvent| {
            if e.kind == EventKind::Create {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let manager = ConnectionManager::new(config, Arc::clone(&mock));
        manager.connect().unwrap();

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.cache().row("Logical_Switch", "ls1"), Some(named("sw0")));
        assert_eq!(manager.monitored_tables(), vec!["Logical_Switch", "ACL"]);
        assert_eq!(creates.load(Ordering::SeqCst), 1);
        assert_eq!(mock.monitor_requests().len(), 1);
    }

    #[test]
    fn failed_initial_connect_does_not_reconnect() {
        let mock = Arc::new(MockConnector::new(schema()));
        mock.fail_next_connects(1);
        let manager = ConnectionManager::new(config().with_reconnect(true), Arc::clone(&mock));

        assert!(manager.connect().unwrap_err().is_retryable());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_reconnecting());
    }

    #[test]
    fn unknown_restricted_table_fails_connect() {
        let mock = Arc::new(MockConnector::new(schema()));
        let manager = ConnectionManager::new(config().with_tables(["Load_Balancer"]), Arc::clone(&mock));

        let err = manager.connect().unwrap_err();
        assert!(matches!(err, ClientError::UnknownTable { .. }));
        assert!(!mock.is_connected());
        assert!(manager.session().is_err());
    }

    #[test]
    fn notifications_update_cache() {
        let mock = Arc::new(MockConnector::new(schema()));
        let manager = ConnectionManager::new(config(), Arc::clone(&mock));
        manager.connect().unwrap();

        mock.notify(TableUpdates::new().with_row("ACL", "a1", RowUpdate::insert(named("allow"))));
        assert_eq!(manager.cache().row_count("ACL"), 1);
        assert_eq!(manager.stats().update_batches, 1);
    }

    #[test]
    fn loss_without_reconnect_fires_callback_once() {
        let mock = Arc::new(MockConnector::new(schema()));
        let losses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&losses);
        let config = config().with_disconnect_handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let manager = ConnectionManager::new(config, Arc::clone(&mock));
        manager.connect().unwrap();

        mock.drop_connection();
        mock.drop_connection();

        assert_eq!(losses.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(manager.session(), Err(ClientError::NotConnected(_))));
        assert!(!manager.is_reconnecting());
    }

    #[test]
    fn loss_with_reconnect_resubscribes() {
        let mock = Arc::new(MockConnector::new(schema()));
        let manager = ConnectionManager::new(config().with_reconnect(true), Arc::clone(&mock));
        manager.connect().unwrap();

        mock.fail_next_connects(3);
        mock.drop_connection();

        assert!(wait_for(|| manager.state() == ConnectionState::Connected));
        assert_eq!(mock.connect_count(), 5);
        assert_eq!(mock.monitor_requests().len(), 2);
        assert_eq!(mock.monitor_requests()[0], mock.monitor_requests()[1]);
        assert_eq!(manager.stats().connects, 2);
    }

    #[test]
    fn reload_after_reconnect_reconciles_deletes() {
        let mock = Arc::new(MockConnector::new(schema()));
        mock.set_snapshot(
            TableUpdates::new().with_row("ACL", "gone", RowUpdate::insert(named("old"))),
        );
        let deletes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&deletes);
        let config = config().with_reconnect(true).with_signal_handler(move |e: &RowEvent| {
            if e.kind == EventKind::Delete {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let manager = ConnectionManager::new(config, Arc::clone(&mock));
        manager.connect().unwrap();

        mock.set_snapshot(TableUpdates::new());
        mock.drop_connection();

        assert!(wait_for(|| manager.state() == ConnectionState::Connected));
        assert_eq!(manager.cache().row_count("ACL"), 0);
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_for_unmonitored_table_drops_session() {
        let mock = Arc::new(MockConnector::new(schema()));
        let manager = ConnectionManager::new(config(), Arc::clone(&mock));
        manager.connect().unwrap();

        mock.notify(TableUpdates::new().with_row("Chassis", "c1", RowUpdate::insert(named("hv1"))));

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!mock.is_connected());
        assert_eq!(manager.stats().disconnects, 1);
    }

    #[test]
    fn close_stops_reconnection() {
        let mock = Arc::new(MockConnector::new(schema()));
        let manager = ConnectionManager::new(config().with_reconnect(true), Arc::clone(&mock));
        manager.connect().unwrap();

        mock.fail_next_connects(u32::MAX);
        mock.drop_connection();
        assert!(wait_for(|| mock.connect_count() > 2));

        manager.close();
        let attempts = mock.connect_count();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(mock.connect_count(), attempts);
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(matches!(manager.session(), Err(ClientError::Closed)));
        assert!(matches!(manager.connect(), Err(ClientError::Closed)));
    }

    #[test]
    fn loss_inside_monitor_fails_connect() {
        let mock = Arc::new(MockConnector::new(schema()));
        mock.lose_during_next_monitor(false);
        let losses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&losses);
        let config = config().with_disconnect_handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let manager = Arc::new(ConnectionManager::new(config, Arc::clone(&mock)));

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&manager);
        std::thread::spawn(move || {
            let _ = tx.send(worker.connect());
        });
        let result = rx.recv_timeout(Duration::from_secs(5)).expect("connect returned");

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(manager.session(), Err(ClientError::NotConnected(_))));
        assert_eq!(losses.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn loss_racing_monitor_reply_is_not_installed() {
        let mock = Arc::new(MockConnector::new(schema()));
        mock.lose_during_next_monitor(true);
        let manager = ConnectionManager::new(config(), Arc::clone(&mock));

        assert!(manager.connect().unwrap_err().is_retryable());
        assert!(!mock.is_connected());
        assert!(manager.session().is_err());

        manager.connect().unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.session().is_ok());
    }

    #[test]
    fn reconnect_survives_loss_inside_monitor() {
        let mock = Arc::new(MockConnector::new(schema()));
        let manager = ConnectionManager::new(config().with_reconnect(true), Arc::clone(&mock));
        manager.connect().unwrap();

        mock.lose_during_next_monitor(false);
        mock.drop_connection();

        assert!(wait_for(|| manager.state() == ConnectionState::Connected));
        assert_eq!(mock.monitor_requests().len(), 3);
        assert_eq!(manager.stats().connects, 2);
    }

    #[test]
    fn late_update_from_severed_session_is_ignored() {
        let mock = Arc::new(MockConnector::new(schema()));
        let manager = ConnectionManager::new(config(), Arc::clone(&mock));
        manager.connect().unwrap();

        mock.drop_connection();
        let reached = mock.notify_severed(
            TableUpdates::new().with_row("ACL", "late1", RowUpdate::insert(named("late"))),
        );

        assert_eq!(reached, 1);
        assert_eq!(manager.cache().row_count("ACL"), 0);
        assert_eq!(manager.stats().update_batches, 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn close_from_disconnect_callback_skips_reconnect() {
        let mock = Arc::new(MockConnector::new(schema()));
        let slot: Arc<Mutex<Weak<ConnectionManager<MockConnector>>>> =
            Arc::new(Mutex::new(Weak::new()));
        let closer = Arc::clone(&slot);
        let config = config().with_reconnect(true).with_disconnect_handler(move || {
            if let Some(manager) = closer.lock().upgrade() {
                manager.close();
            }
        });
        let manager = Arc::new(ConnectionManager::new(config, Arc::clone(&mock)));
        *slot.lock() = Arc::downgrade(&manager);
        manager.connect().unwrap();

        mock.drop_connection();
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(!manager.is_reconnecting());
        assert_eq!(mock.connect_count(), 1);
    }

    /// Records the manager's state at every dial.
    struct Observing {
        inner: MockConnector,
        manager: Mutex<Weak<ConnectionManager<Observing>>>,
        seen: Mutex<Vec<ConnectionState>>,
    }

    impl Connector for Observing {
        fn connect(
            &self,
            address: &str,
            tls: Option<&crate::config::TlsConfig>,
        ) -> ClientResult<Arc<dyn RpcSession>> {
            if let Some(manager) = self.manager.lock().upgrade() {
                self.seen.lock().push(manager.state());
            }
            self.inner.connect(address, tls)
        }
    }

    #[test]
    fn reconnect_attempts_pass_through_connecting() {
        let mock = MockConnector::new(schema());
        let connector = Arc::new(Observing {
            inner: mock.clone(),
            manager: Mutex::new(Weak::new()),
            seen: Mutex::new(Vec::new()),
        });
        let manager = Arc::new(ConnectionManager::new(
            config().with_reconnect(true),
            Arc::clone(&connector),
        ));
        *connector.manager.lock() = Arc::downgrade(&manager);
        manager.connect().unwrap();

        mock.fail_next_connects(2);
        mock.drop_connection();
        assert!(wait_for(|| manager.state() == ConnectionState::Connected));

        let seen = connector.seen.lock().clone();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|s| *s == ConnectionState::Connecting));
    }

    #[test]
    fn close_is_idempotent_and_silent() {
        let mock = Arc::new(MockConnector::new(schema()));
        let losses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&losses);
        let config = config().with_disconnect_handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let manager = ConnectionManager::new(config, Arc::clone(&mock));
        manager.connect().unwrap();

        manager.close();
        manager.close();
        assert!(!mock.is_connected());
        assert_eq!(losses.load(Ordering::SeqCst), 0);
    }
}
