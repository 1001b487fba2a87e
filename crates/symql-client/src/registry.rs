//! Process-wide registry of open connections.
//!
//! Entries are weak: the registry never keeps a connection alive and never
//! closes one. It exists to list open sessions and to spot leaks.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use crate::connection::{ConnectionState, Shared};

/// Snapshot of one open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection identifier.
    pub id: u64,
    /// Backend engine name.
    pub backend: String,
    /// State at the time of the snapshot.
    pub state: ConnectionState,
}

fn entries() -> &'static DashMap<u64, Weak<Shared>> {
    static ENTRIES: OnceLock<DashMap<u64, Weak<Shared>>> = OnceLock::new();
    ENTRIES.get_or_init(DashMap::new)
}

pub(crate) fn register(shared: &Arc<Shared>) {
    entries().insert(shared.id(), Arc::downgrade(shared));
}

pub(crate) fn deregister(id: u64) {
    entries().remove(&id);
}

/// List every connection that is open and still reachable.
pub fn live_connections() -> Vec<ConnectionInfo> {
    let mut live: Vec<ConnectionInfo> = entries()
        .iter()
        .filter_map(|entry| entry.value().upgrade())
        .map(|shared| ConnectionInfo {
            id: shared.id(),
            backend: shared.backend_name().to_string(),
            state: shared.state(),
        })
        .collect();
    live.sort_by_key(|info| info.id);
    live
}

/// Check if a connection is registered as open.
pub fn is_registered(id: u64) -> bool {
    entries()
        .get(&id)
        .map(|entry| entry.value().strong_count() > 0)
        .unwrap_or(false)
}
