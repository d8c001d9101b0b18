//! Configuration for the client.

use crate::error::{ClientError, ClientResult};
use crate::events::{DisconnectHandler, SignalHandler};
use ovnsync_protocol::DatabaseId;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Caller restriction: table name to column list (empty list = all columns).
pub type TableColumns = BTreeMap<String, Vec<String>>;

/// Transport security material handed to the connector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// CA certificate used to verify the store.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate.
    pub client_cert: Option<PathBuf>,
    /// Client private key.
    pub client_key: Option<PathBuf>,
    /// Name expected in the store's certificate.
    pub server_name: Option<String>,
}

impl TlsConfig {
    /// Creates an empty TLS configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CA certificate.
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Sets the client certificate and key.
    pub fn with_client_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    /// Sets the expected server name.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// Reconnection behavior after a transport loss.
///
/// Retries run at a constant interval and never give up. Failures are
/// logged until `max_logged_failures` is reached, then retried silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay between attempts.
    pub interval: Duration,
    /// Number of failed attempts that are logged individually.
    pub max_logged_failures: u32,
}

impl ReconnectPolicy {
    /// Creates the default policy: 500 ms interval, 10 logged failures.
    pub fn new() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_logged_failures: 10,
        }
    }

    /// Sets the retry interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how many failures are logged before suppression.
    pub fn with_max_logged_failures(mut self, max: u32) -> Self {
        self.max_logged_failures = max;
        self
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for one client connection.
#[derive(Clone)]
pub struct ClientConfig {
    /// Database identity.
    pub database: DatabaseId,
    /// Store address (e.g. `unix:/var/run/ovn/ovnnb_db.sock`, `ssl:10.0.0.1:6641`).
    pub address: String,
    /// Optional transport security material.
    pub tls: Option<TlsConfig>,
    /// Optional table/column restriction. `None` or empty monitors every known table.
    pub table_columns: Option<TableColumns>,
    /// Whether to reconnect after a transport loss.
    pub reconnect: bool,
    /// Reconnection timing.
    pub reconnect_policy: ReconnectPolicy,
    /// Observer of applied row changes.
    pub signal_handler: Option<Arc<dyn SignalHandler>>,
    /// Observer of transport loss.
    pub disconnect_handler: Option<Arc<dyn DisconnectHandler>>,
}

impl ClientConfig {
    /// Creates a configuration for the given database and address.
    pub fn new(database: DatabaseId, address: impl Into<String>) -> Self {
        Self {
            database,
            address: address.into(),
            tls: None,
            table_columns: None,
            reconnect: false,
            reconnect_policy: ReconnectPolicy::default(),
            signal_handler: None,
            disconnect_handler: None,
        }
    }

    /// Creates a configuration from a database name.
    ///
    /// Accepts `OVN_Northbound`, `OVN_Southbound` and their short forms; an
    /// empty name selects the northbound database.
    pub fn for_database_name(name: &str, address: impl Into<String>) -> ClientResult<Self> {
        let database: DatabaseId = name.parse()?;
        Ok(Self::new(database, address))
    }

    /// Sets the TLS configuration.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Restricts monitoring to the given tables.
    pub fn with_table_columns(mut self, table_columns: TableColumns) -> Self {
        self.table_columns = Some(table_columns);
        self
    }

    /// Restricts monitoring to the given tables, all columns each.
    pub fn with_tables<I, S>(self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let map = tables.into_iter().map(|t| (t.into(), Vec::new())).collect();
        self.with_table_columns(map)
    }

    /// Enables or disables reconnection.
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the reconnection timing.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Registers the row change observer.
    pub fn with_signal_handler(mut self, handler: impl SignalHandler + 'static) -> Self {
        self.signal_handler = Some(Arc::new(handler));
        self
    }

    /// Registers the transport loss observer.
    pub fn with_disconnect_handler(mut self, handler: impl DisconnectHandler + 'static) -> Self {
        self.disconnect_handler = Some(Arc::new(handler));
        self
    }

    /// Returns the restriction if one was given and is non-empty.
    pub fn restriction(&self) -> Option<&TableColumns> {
        self.table_columns.as_ref().filter(|t| !t.is_empty())
    }

    /// Checks the fields that can be validated without talking to the store.
    pub fn validate(&self) -> ClientResult<()> {
        if self.address.trim().is_empty() {
            return Err(ClientError::Configuration("store address is empty".into()));
        }
        if self.reconnect && self.reconnect_policy.interval.is_zero() {
            return Err(ClientError::Configuration(
                "reconnect interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("database", &self.database)
            .field("address", &self.address)
            .field("tls", &self.tls)
            .field("table_columns", &self.table_columns)
            .field("reconnect", &self.reconnect)
            .field("reconnect_policy", &self.reconnect_policy)
            .field("signal_handler", &self.signal_handler.is_some())
            .field("disconnect_handler", &self.disconnect_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RowEvent;

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new(DatabaseId::Southbound, "unix:/run/ovn/ovnsb_db.sock")
            .with_tables(["Chassis", "Encap"])
            .with_reconnect(true)
            .with_tls(TlsConfig::new().with_ca_cert("/etc/ovn/ca.pem"))
            .with_signal_handler(|_: &RowEvent| {});

        assert_eq!(config.database, DatabaseId::Southbound);
        assert!(config.reconnect);
        assert_eq!(config.restriction().map(|r| r.len()), Some(2));
        assert!(config.signal_handler.is_some());
        assert!(config.disconnect_handler.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn database_name_parsing() {
        let config = ClientConfig::for_database_name("", "tcp:127.0.0.1:6641").unwrap();
        assert_eq!(config.database, DatabaseId::Northbound);

        let err = ClientConfig::for_database_name("Open_vSwitch", "tcp:127.0.0.1:6640").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn empty_restriction_is_none() {
        let config = ClientConfig::new(DatabaseId::Northbound, "tcp:1.2.3.4:6641")
            .with_table_columns(TableColumns::new());
        assert!(config.restriction().is_none());
    }

    #[test]
    fn validation() {
        assert!(ClientConfig::new(DatabaseId::Northbound, " ").validate().is_err());

        let config = ClientConfig::new(DatabaseId::Northbound, "tcp:1.2.3.4:6641")
            .with_reconnect(true)
            .with_reconnect_policy(ReconnectPolicy::new().with_interval(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_reconnect_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert_eq!(policy.max_logged_failures, 10);
    }

    #[test]
    fn debug_hides_handlers() {
        let config = ClientConfig::new(DatabaseId::Northbound, "tcp:1.2.3.4:6641")
            .with_disconnect_handler(|| {});
        let text = format!("{config:?}");
        assert!(text.contains("disconnect_handler: true"));
    }
}
