//! # ovnsync memstore
//!
//! In-memory OVSDB store for ovnsync clients.
//!
//! This crate provides:
//! - Databases hosted from `.ovsschema` schemas
//! - Atomic transaction evaluation (insert, update, delete, mutate,
//!   named uuids, conditions, index and row-limit checks)
//! - Monitor subscriptions with commit-ordered notification fan-out
//! - Availability toggling and session severing for reconnection tests
//!
//! # Architecture
//!
//! [`MemStore`] implements the engine's `Connector`, so a client connects
//! to it exactly as it would to a real store. Each session is a
//! [`MemSession`]. Transactions run against a working copy of the
//! database and replace committed state only when every operation and
//! the final constraint check succeed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod database;
mod error;
mod session;
mod store;
mod txn;

pub use database::{Database, Rows};
pub use error::{StoreError, StoreResult};
pub use session::MemSession;
pub use store::MemStore;
pub use txn::{execute as execute_transaction, TxnOutcome};
