//! Builds monitor subscriptions from negotiated tables.

use crate::schema::NegotiatedTables;
use ovnsync_protocol::{MonitorRequest, MonitorRequests, MonitorSelect};

/// Builds one full-change-class subscription per table.
///
/// Deterministic: the same tables always produce the same request set,
/// so a reconnect re-subscribes identically.
pub fn build_monitor_requests(tables: &NegotiatedTables) -> MonitorRequests {
    tables
        .iter()
        .map(|(table, columns)| {
            (
                table.clone(),
                MonitorRequest {
                    columns: columns.clone(),
                    select: MonitorSelect::ALL,
                },
            )
        })
        .collect()
}
