//! # ovnsync protocol
//!
//! Data model shared by the ovnsync client and the in-memory store.
//!
//! This crate provides:
//! - [`Value`] and [`Row`] for OVSDB datums in JSON notation
//! - [`DatabaseSchema`] parsed from `.ovsschema` documents
//! - [`DatabaseId`] and the canonical table order of each database
//! - Monitor requests and [`TableUpdates`] notifications
//! - Row [`Operation`]s, [`OperationResult`]s and [`Command`] bundles
//!
//! This is a pure protocol crate with no I/O operations. Framing and
//! JSON-RPC correlation live in the transport, not here.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod database;
mod error;
mod monitor;
mod operation;
mod schema;
mod value;

pub use database::{DatabaseId, NB_TABLES_ORDER, SB_TABLES_ORDER};
pub use error::{ProtocolError, ProtocolResult};
pub use monitor::{
    MonitorRequest, MonitorRequests, MonitorSelect, RowUpdate, RowUpdateKind, TableUpdate,
    TableUpdates,
};
pub use operation::{
    Command, Condition, ConditionFunction, Mutation, Mutator, Operation, OperationResult,
};
pub use schema::{ColumnSchema, DatabaseSchema, TableSchema};
pub use value::{Row, RowId, Value};
