//! The client facade.

use crate::cache::TableRows;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState, ConnectionStats};
use crate::error::ClientResult;
use crate::transaction::{check_operations, TransactionExecutor};
use crate::transport::Connector;
use ovnsync_protocol::{Command, DatabaseId, DatabaseSchema, Operation, OperationResult, Row, RowId};
use std::sync::Arc;

/// A connected client for one OVN database.
///
/// Reads are served from the local mirror and never block on the network.
/// Writes go to the store through a serialized executor; their effects
/// reach the mirror through the monitor, not through the reply.
///
/// # Example
///
/// ```no_run
/// use ovnsync_engine::{Client, ClientConfig, MockConnector};
/// use ovnsync_protocol::{DatabaseId, DatabaseSchema};
/// use std::sync::Arc;
///
/// let connector = Arc::new(MockConnector::new(DatabaseSchema::new("OVN_Northbound")));
/// let config = ClientConfig::new(DatabaseId::Northbound, "unix:/run/ovn/ovnnb_db.sock")
///     .with_reconnect(true);
/// let client = Client::connect(config, connector)?;
/// let switches = client.snapshot("Logical_Switch");
/// # Ok::<(), ovnsync_engine::ClientError>(())
/// ```
pub struct Client<C: Connector> {
    connection: ConnectionManager<C>,
    executor: TransactionExecutor,
}

impl<C: Connector> Client<C> {
    /// Validates `config`, connects and seeds the mirror.
    pub fn connect(config: ClientConfig, connector: Arc<C>) -> ClientResult<Self> {
        config.validate()?;
        let connection = ConnectionManager::new(config, connector);
        connection.connect()?;
        Ok(Self {
            connection,
            executor: TransactionExecutor::new(),
        })
    }

    /// Runs the commands' operations, in order, as one transaction.
    pub fn execute(&self, commands: &[Command]) -> ClientResult<Vec<OperationResult>> {
        self.transact(&Command::flatten(commands))
    }

    /// Like [`execute`](Self::execute), returning the ids of created rows.
    pub fn execute_returning_uuids(&self, commands: &[Command]) -> ClientResult<Vec<RowId>> {
        let operations = Command::flatten(commands);
        check_operations(&operations, |t| self.connection.knows_table(t))?;
        self.executor
            .execute_returning_uuids(self.database().name(), &operations, || {
                self.connection.session()
            })
    }

    /// Runs `operations` as one transaction.
    ///
    /// Operations naming a table the store's schema lacks are rejected
    /// with [`ClientError::Transaction`](crate::ClientError::Transaction)
    /// and nothing is sent.
    pub fn transact(&self, operations: &[Operation]) -> ClientResult<Vec<OperationResult>> {
        check_operations(operations, |t| self.connection.knows_table(t))?;
        self.executor
            .execute(self.database().name(), operations, || self.connection.session())
    }

    /// Copy of a monitored table, or `None` if it is not monitored.
    pub fn snapshot(&self, table: &str) -> Option<TableRows> {
        self.connection.cache().snapshot(table)
    }

    /// Copy of one cached row.
    pub fn row(&self, table: &str, row_id: &str) -> Option<Row> {
        self.connection.cache().row(table, row_id)
    }

    /// Cached rows of `table` matching `predicate`, ordered by id.
    pub fn find<F>(&self, table: &str, predicate: F) -> Vec<(RowId, Row)>
    where
        F: Fn(&str, &Row) -> bool,
    {
        self.connection.cache().find(table, predicate)
    }

    /// Tables monitored, in canonical order.
    pub fn tables(&self) -> Vec<String> {
        self.connection.monitored_tables()
    }

    /// Schema fetched on the most recent connect.
    pub fn schema(&self) -> Option<DatabaseSchema> {
        self.connection.schema()
    }

    /// Database this client is bound to.
    pub fn database(&self) -> DatabaseId {
        self.connection.config().database
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Returns true while a session is live.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connection counters.
    pub fn stats(&self) -> ConnectionStats {
        self.connection.stats()
    }

    /// Transactions sent to the store.
    pub fn transactions_submitted(&self) -> u64 {
        self.executor.submitted()
    }

    /// Stops reconnection and closes the session. Idempotent.
    pub fn close(&self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::transport::MockConnector;
    use ovnsync_protocol::{ColumnSchema, RowUpdate, TableSchema, TableUpdates, Value};

    fn connector() -> Arc<MockConnector> {
        let table = TableSchema::new().with_column("name", ColumnSchema::atomic("string"));
        let mock = MockConnector::new(
            DatabaseSchema::new("OVN_Northbound")
                .with_table("Logical_Switch", table.clone())
                .with_table("Logical_Switch_Port", table),
        );
        let mut row = Row::new();
        row.insert("name".into(), Value::string("sw0"));
        mock.set_snapshot(TableUpdates::new().with_row("Logical_Switch", "ls1", RowUpdate::insert(row)));
        Arc::new(mock)
    }

    fn config() -> ClientConfig {
        ClientConfig::new(DatabaseId::Northbound, "tcp:127.0.0.1:6641")
    }

    #[test]
    fn invalid_config_never_dials() {
        let mock = connector();
        let config = ClientConfig::new(DatabaseId::Northbound, "");
        assert!(matches!(
            Client::connect(config, Arc::clone(&mock)),
            Err(ClientError::Configuration(_))
        ));
        assert_eq!(mock.connect_count(), 0);
    }

    #[test]
    fn reads_come_from_mirror() {
        let client = Client::connect(config(), connector()).unwrap();
        assert_eq!(client.snapshot("Logical_Switch").map(|t| t.len()), Some(1));
        assert!(client.row("Logical_Switch", "ls1").is_some());
        assert!(client.snapshot("ACL").is_none());
        assert_eq!(client.tables(), vec!["Logical_Switch", "Logical_Switch_Port"]);
        assert_eq!(
            client.find("Logical_Switch", |_, r| r.contains_key("name")).len(),
            1
        );
        assert!(client.schema().is_some());
    }

    #[test]
    fn commands_are_flattened_in_order() {
        let mock = connector();
        let client = Client::connect(config(), Arc::clone(&mock)).unwrap();

        let first = Command::new(vec![Operation::insert("Logical_Switch", Row::new())]);
        let second = Command::new(vec![
            Operation::delete("Logical_Switch_Port", Vec::new()),
            Operation::insert("Logical_Switch_Port", Row::new()),
        ]);
        let uuids = client.execute_returning_uuids(&[first, second]).unwrap();

        assert_eq!(uuids.len(), 2);
        let sent = mock.transactions();
        assert_eq!(sent.len(), 1);
        let kinds: Vec<_> = sent[0].iter().map(Operation::kind).collect();
        assert_eq!(kinds, vec!["insert", "delete", "insert"]);
    }

    #[test]
    fn empty_execute_sends_nothing() {
        let mock = connector();
        let client = Client::connect(config(), Arc::clone(&mock)).unwrap();
        assert!(client.execute(&[]).unwrap().is_empty());
        assert!(client.execute(&[Command::default()]).unwrap().is_empty());
        assert!(mock.transactions().is_empty());
        assert_eq!(client.transactions_submitted(), 0);
    }

    #[test]
    fn transact_after_close_fails() {
        let client = Client::connect(config(), connector()).unwrap();
        client.close();
        let ops = vec![Operation::insert("Logical_Switch", Row::new())];
        assert!(matches!(client.transact(&ops), Err(ClientError::Closed)));
        assert!(!client.is_connected());
    }
}
