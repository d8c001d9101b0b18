//! Integration tests: a real client against the in-memory store.

use ovnsync_engine::{
    Client, ClientConfig, ClientError, ConnectionState, EventKind, ReconnectPolicy, RowEvent,
};
use ovnsync_memstore::MemStore;
use ovnsync_protocol::{
    ColumnSchema, Command, Condition, DatabaseId, DatabaseSchema, Mutation, Mutator, Operation,
    Row, TableSchema, Value,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NB: &str = "OVN_Northbound";

fn northbound() -> DatabaseSchema {
    let switch = TableSchema::new()
        .with_column("name", ColumnSchema::atomic("string"))
        .with_column("ports", ColumnSchema::set_of("uuid"))
        .with_column("external_ids", ColumnSchema::map_of("string", "string"))
        .root();
    let port = TableSchema::new()
        .with_column("name", ColumnSchema::atomic("string"))
        .with_column("addresses", ColumnSchema::set_of("string"))
        .with_index(["name"]);
    let acl = TableSchema::new()
        .with_column("priority", ColumnSchema::atomic("integer"))
        .with_column("action", ColumnSchema::atomic("string"));
    DatabaseSchema::new(NB)
        .with_version("7.3.0")
        .with_table("NB_Global", TableSchema::new().root())
        .with_table("Logical_Switch", switch)
        .with_table("Logical_Switch_Port", port)
        .with_table("ACL", acl)
}

fn southbound() -> DatabaseSchema {
    let chassis = TableSchema::new()
        .with_column("name", ColumnSchema::atomic("string"))
        .with_column("hostname", ColumnSchema::atomic("string"));
    DatabaseSchema::new("OVN_Southbound")
        .with_table("Chassis", chassis)
        .with_table("Encap", TableSchema::new().with_column("ip", ColumnSchema::atomic("string")))
}

fn store() -> Arc<MemStore> {
    Arc::new(MemStore::with_schemas([northbound(), southbound()]).unwrap())
}

fn config() -> ClientConfig {
    ClientConfig::new(DatabaseId::Northbound, "unix:/run/ovn/ovnnb_db.sock")
        .with_reconnect_policy(ReconnectPolicy::new().with_interval(Duration::from_millis(5)))
}

fn named(name: &str) -> Row {
    let mut row = Row::new();
    row.insert("name".into(), Value::string(name));
    row
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

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(EventKind, String, String)>>,
}

impl Recorder {
    fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|(k, _, _)| *k == kind).count()
    }
}

fn recording(config: ClientConfig) -> (ClientConfig, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let sink = Arc::clone(&recorder);
    let config = config.with_signal_handler(move |e: &RowEvent| {
        sink.events
            .lock()
            .push((e.kind, e.table.clone(), e.row_id.clone()));
    });
    (config, recorder)
}

#[test]
fn connect_mirrors_existing_rows() {
    let store = store();
    store
        .transact(NB, &[Operation::insert("Logical_Switch", named("sw0"))])
        .unwrap();

    let (config, recorder) = recording(config());
    let client = Client::connect(config, Arc::clone(&store)).unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(
        client.tables(),
        vec!["NB_Global", "Logical_Switch", "Logical_Switch_Port", "ACL"]
    );
    assert_eq!(client.snapshot("Logical_Switch").unwrap().len(), 1);
    assert_eq!(recorder.count(EventKind::Create), 1);
    assert_eq!(client.schema().unwrap().version, "7.3.0");
}

#[test]
fn client_writes_come_back_through_monitor() {
    let store = store();
    let client = Client::connect(config(), Arc::clone(&store)).unwrap();

    let mut switch = named("sw0");
    switch.insert("ports".into(), Value::set([Value::NamedUuid("p0".into())]));
    let command = Command::new(vec![
        Operation::insert("Logical_Switch", switch),
        Operation::insert_named("Logical_Switch_Port", named("lsp0"), "p0"),
    ]);
    let uuids = client.execute_returning_uuids(&[command]).unwrap();
    assert_eq!(uuids.len(), 2);

    let switch = client.row("Logical_Switch", &uuids[0]).unwrap();
    assert_eq!(switch["ports"], Value::Set(vec![Value::Uuid(uuids[1].clone())]));
    assert!(client.row("Logical_Switch_Port", &uuids[1]).is_some());
}

#[test]
fn other_writers_update_the_mirror() {
    let store = store();
    let (config, recorder) = recording(config());
    let client = Client::connect(config, Arc::clone(&store)).unwrap();

    let results = store
        .transact(NB, &[Operation::insert("ACL", Row::new())])
        .unwrap();
    let id = results[0].uuid.clone().unwrap();
    store
        .transact(
            NB,
            &[Operation::mutate(
                "ACL",
                vec![Condition::uuid_is(id.clone())],
                vec![Mutation::new("priority", Mutator::Add, Value::Integer(1001))],
            )],
        )
        .unwrap();

    assert_eq!(client.row("ACL", &id).unwrap()["priority"], Value::Integer(1001));
    assert_eq!(recorder.count(EventKind::Update), 1);

    store
        .transact(NB, &[Operation::delete("ACL", vec![Condition::uuid_is(id.clone())])])
        .unwrap();
    assert!(client.row("ACL", &id).is_none());
    assert_eq!(recorder.count(EventKind::Delete), 1);
}

#[test]
fn failed_operation_reports_index() {
    let store = store();
    let client = Client::connect(config(), Arc::clone(&store)).unwrap();

    let mut bogus = Row::new();
    bogus.insert("no_such_column".into(), Value::string("x"));
    let ops = vec![
        Operation::insert("Logical_Switch_Port", named("dup")),
        Operation::insert("Logical_Switch_Port", Row::new()),
        Operation::insert("Logical_Switch_Port", bogus),
    ];
    let err = client.transact(&ops).unwrap_err();
    assert!(matches!(err, ClientError::OperationFailed { index: 2, ref error, .. } if error == "syntax error"));
    assert_eq!(client.snapshot("Logical_Switch_Port").unwrap().len(), 0);

    let dup = vec![
        Operation::insert("Logical_Switch_Port", named("dup")),
        Operation::insert("Logical_Switch_Port", named("dup")),
    ];
    let err = client.transact(&dup).unwrap_err();
    assert!(matches!(err, ClientError::OperationFailed { index: 2, ref error, .. } if error == "constraint violation"));
}

#[test]
fn unknown_table_never_reaches_store() {
    let store = store();
    let client = Client::connect(config(), Arc::clone(&store)).unwrap();

    let ops = vec![
        Operation::insert("Logical_Switch", named("sw0")),
        Operation::insert("No_Such_Table", Row::new()),
    ];
    assert!(matches!(client.transact(&ops), Err(ClientError::Transaction(_))));
    assert_eq!(store.commit_count(), 0);
    assert_eq!(client.transactions_submitted(), 0);
    assert_eq!(client.snapshot("Logical_Switch").unwrap().len(), 0);
}

#[test]
fn empty_transaction_touches_nothing() {
    let store = store();
    let client = Client::connect(config(), Arc::clone(&store)).unwrap();
    assert!(client.execute(&[]).unwrap().is_empty());
    assert_eq!(store.commit_count(), 0);
}

#[test]
fn concurrent_transactions_all_commit() {
    let store = store();
    let client = Arc::new(Client::connect(config(), Arc::clone(&store)).unwrap());

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let client = Arc::clone(&client);
            scope.spawn(move || {
                for i in 0..10 {
                    let op = Operation::insert("Logical_Switch_Port", named(&format!("lsp-{worker}-{i}")));
                    client.transact(&[op]).unwrap();
                }
            });
        }
    });

    assert_eq!(store.commit_count(), 40);
    assert_eq!(client.snapshot("Logical_Switch_Port").unwrap().len(), 40);
    assert_eq!(client.transactions_submitted(), 40);
}

#[test]
fn restricted_client_ignores_other_tables() {
    let store = store();
    let client = Client::connect(config().with_tables(["Logical_Switch"]), Arc::clone(&store)).unwrap();
    assert_eq!(client.tables(), vec!["Logical_Switch"]);

    store
        .transact(NB, &[Operation::insert("ACL", Row::new())])
        .unwrap();
    store
        .transact(NB, &[Operation::insert("Logical_Switch", named("sw1"))])
        .unwrap();

    assert!(client.snapshot("ACL").is_none());
    assert_eq!(client.snapshot("Logical_Switch").unwrap().len(), 1);
}

#[test]
fn restriction_errors_fail_connect() {
    let store = store();

    let err = Client::connect(config().with_tables(["Chassis"]), Arc::clone(&store))
        .err()
        .unwrap();
    assert!(matches!(err, ClientError::UnknownTable { .. }));

    let mut columns = ovnsync_engine::TableColumns::new();
    columns.insert("ACL".into(), vec!["priority".into()]);
    let err = Client::connect(config().with_table_columns(columns), Arc::clone(&store))
        .err()
        .unwrap();
    assert!(matches!(err, ClientError::UnsupportedColumns { .. }));
    assert_eq!(store.session_count(), 0);
}

#[test]
fn southbound_client() {
    let store = store();
    store
        .transact("OVN_Southbound", &[Operation::insert("Chassis", named("hv1"))])
        .unwrap();

    let config = ClientConfig::for_database_name("OVN_Southbound", "tcp:10.0.0.1:6642").unwrap();
    let client = Client::connect(config, Arc::clone(&store)).unwrap();
    assert_eq!(client.database(), DatabaseId::Southbound);
    assert_eq!(client.tables(), vec!["Chassis", "Encap"]);
    assert_eq!(client.snapshot("Chassis").unwrap().len(), 1);
}

#[test]
fn loss_without_reconnect() {
    let store = store();
    let losses = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&losses);
    let config = config().with_disconnect_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let client = Client::connect(config, Arc::clone(&store)).unwrap();

    store.drop_connections();

    assert_eq!(losses.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let op = Operation::insert("ACL", Row::new());
    assert!(matches!(client.transact(&[op]), Err(ClientError::NotConnected(_))));
    // The mirror keeps its last contents.
    assert!(client.snapshot("ACL").is_some());
}

#[test]
fn reconnect_reconciles_missed_changes() {
    let store = store();
    let kept = store
        .transact(NB, &[Operation::insert("Logical_Switch", named("kept"))])
        .unwrap()[0]
        .uuid
        .clone()
        .unwrap();
    let doomed = store
        .transact(NB, &[Operation::insert("Logical_Switch", named("doomed"))])
        .unwrap()[0]
        .uuid
        .clone()
        .unwrap();

    let (config, recorder) = recording(config().with_reconnect(true));
    let client = Client::connect(config, Arc::clone(&store)).unwrap();

    store.set_available(false);
    store.drop_connections();
    assert!(matches!(
        client.state(),
        ConnectionState::Reconnecting | ConnectionState::Connecting
    ));

    // Changes made while the client is away.
    store
        .transact(NB, &[Operation::delete("Logical_Switch", vec![Condition::uuid_is(doomed.clone())])])
        .unwrap();
    store
        .transact(NB, &[Operation::insert("Logical_Switch", named("fresh"))])
        .unwrap();

    assert!(wait_for(|| client.stats().reconnect_attempts >= 2));
    store.set_available(true);
    assert!(wait_for(|| client.state() == ConnectionState::Connected));

    let switches = client.snapshot("Logical_Switch").unwrap();
    assert_eq!(switches.len(), 2);
    assert!(switches.contains_key(&kept));
    assert!(!switches.contains_key(&doomed));
    assert_eq!(recorder.count(EventKind::Delete), 1);
    assert_eq!(recorder.count(EventKind::Create), 3);
    assert_eq!(client.stats().connects, 2);

    // The new session is live.
    store
        .transact(NB, &[Operation::insert("ACL", Row::new())])
        .unwrap();
    assert_eq!(client.snapshot("ACL").unwrap().len(), 1);
}

#[test]
fn close_stops_reconnecting() {
    let store = store();
    let client = Client::connect(config().with_reconnect(true), Arc::clone(&store)).unwrap();

    store.set_available(false);
    store.drop_connections();
    assert!(wait_for(|| store.connect_count() > 2));

    client.close();
    let attempts = store.connect_count();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(store.connect_count(), attempts);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[test]
fn dropping_client_closes_session() {
    let store = store();
    {
        let _client = Client::connect(config(), Arc::clone(&store)).unwrap();
        assert_eq!(store.session_count(), 1);
    }
    assert_eq!(store.session_count(), 0);
}
