//! Serialized transaction submission.

use crate::error::{ClientError, ClientResult};
use crate::transport::RpcSession;
use ovnsync_protocol::{Operation, OperationResult, RowId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Submits transactions one at a time.
///
/// The write lock is held from submission until the reply is checked, so
/// two callers' transactions never overlap on the wire.
#[derive(Debug, Default)]
pub struct TransactionExecutor {
    write_lock: Mutex<()>,
    submitted: AtomicU64,
}

impl TransactionExecutor {
    /// Creates an executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions sent to the store.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Submits `operations` as one transaction.
    ///
    /// An empty list succeeds immediately without touching the session.
    /// Any per-operation error fails the whole call.
    pub fn execute<F>(
        &self,
        database: &str,
        operations: &[Operation],
        session: F,
    ) -> ClientResult<Vec<OperationResult>>
    where
        F: FnOnce() -> ClientResult<Arc<dyn RpcSession>>,
    {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let _write = self.write_lock.lock();
        let session = session()?;

        debug!("Submitting {} operations to {}", operations.len(), database);
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let results = session.transact(database, operations)?;

        check_results(operations, results).inspect_err(|e| {
            warn!("Transaction on {} failed: {}", database, e);
        })
    }

    /// Submits `operations` and returns the ids of the rows they created,
    /// in operation order.
    pub fn execute_returning_uuids<F>(
        &self,
        database: &str,
        operations: &[Operation],
        session: F,
    ) -> ClientResult<Vec<RowId>>
    where
        F: FnOnce() -> ClientResult<Arc<dyn RpcSession>>,
    {
        let results = self.execute(database, operations, session)?;
        inserted_uuids(operations, &results)
    }
}

/// Rejects a transaction that names a table the store does not have,
/// before anything is sent.
pub fn check_operations<F>(operations: &[Operation], known_table: F) -> ClientResult<()>
where
    F: Fn(&str) -> bool,
{
    match operations.iter().enumerate().find(|(_, op)| !known_table(op.table())) {
        Some((index, op)) => Err(ClientError::Transaction(format!(
            "operation {index} ({}) names unknown table {}",
            op.kind(),
            op.table()
        ))),
        None => Ok(()),
    }
}

/// Validates a transaction reply against the submitted operations.
///
/// The store may append one extra result carrying a commit-level error,
/// reported with an index equal to the operation count.
pub fn check_results(
    operations: &[Operation],
    mut results: Vec<OperationResult>,
) -> ClientResult<Vec<OperationResult>> {
    if let Some((index, failed)) = results.iter().enumerate().find(|(_, r)| r.is_error()) {
        return Err(ClientError::OperationFailed {
            index,
            error: failed.error.clone().unwrap_or_default(),
            details: failed.details.clone().unwrap_or_default(),
        });
    }
    if results.len() < operations.len() {
        return Err(ClientError::Protocol(format!(
            "store returned {} results for {} operations",
            results.len(),
            operations.len()
        )));
    }
    results.truncate(operations.len());
    Ok(results)
}

/// Collects the row ids assigned to row-allocating operations.
pub fn inserted_uuids(operations: &[Operation], results: &[OperationResult]) -> ClientResult<Vec<RowId>> {
    operations
        .iter()
        .zip(results)
        .enumerate()
        .filter(|(_, (op, _))| op.allocates_row())
        .map(|(index, (_, result))| {
            result.uuid.clone().ok_or_else(|| {
                ClientError::Protocol(format!("insert at operation {index} returned no uuid"))
            })
        })
        .collect()
}
