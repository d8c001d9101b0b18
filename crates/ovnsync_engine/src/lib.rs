//! # ovnsync engine
//!
//! Client-side synchronization layer for the OVN Northbound and Southbound
//! databases.
//!
//! This crate provides:
//! - Schema negotiation against the store's live schema
//! - Monitor subscription and an in-memory mirror of the monitored tables
//! - Row change and disconnect callbacks
//! - Automatic reconnection with log suppression
//! - Serialized transaction submission
//!
//! ## Architecture
//!
//! The engine follows a **subscribe-then-mirror** model:
//! 1. Fetch the schema and negotiate the table set
//! 2. Subscribe to every change class and seed the cache from the reply
//! 3. Apply each notification batch atomically, then notify observers
//!
//! The wire protocol lives behind the [`Connector`] and [`RpcSession`]
//! traits, so the engine runs unchanged against a real store, the
//! in-memory store, or the scripted [`MockConnector`].
//!
//! ## Key Invariants
//!
//! - The cache only ever holds monitored tables
//! - Readers never observe half of a notification batch
//! - Callbacks run with no cache lock held
//! - One disconnect callback per lost session
//! - Transactions never overlap on the wire

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod cache;
mod client;
mod config;
mod connection;
mod error;
mod events;
mod monitor;
mod reconnect;
mod schema;
mod transaction;
mod transport;

pub use cache::{CacheStore, TableRows};
pub use client::Client;
pub use config::{ClientConfig, ReconnectPolicy, TableColumns, TlsConfig};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStats};
pub use error::{ClientError, ClientResult};
pub use events::{DisconnectHandler, EventKind, RowEvent, SignalHandler};
pub use monitor::build_monitor_requests;
pub use reconnect::{FailureLog, ReconnectTask, RetryLog, StopSignal};
pub use schema::{negotiate, supported_tables, NegotiatedTables};
pub use transaction::{check_operations, check_results, inserted_uuids, TransactionExecutor};
pub use transport::{Connector, MockConnector, NotificationHandler, RpcSession};
