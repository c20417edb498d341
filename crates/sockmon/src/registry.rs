//! Lock-free registry of monitored sockets.
//!
//! The mapping from socket identifier to stats cell is an immutable
//! `HashMap` snapshot held behind an [`ArcSwap`]. Structural changes clone
//! the current map, apply the change, and install the copy with a
//! compare-and-swap retry loop. The poll thread therefore always reads one
//! consistent snapshot, and registering threads never block it or each
//! other; a lost race is handled by retrying from the fresh snapshot.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use arc_swap::ArcSwap;

use crate::ident::socket_identifier;
use crate::table::TableEntry;

/// Cycle stamp meaning "never touched by a poll".
const NEVER_POLLED: u64 = u64::MAX;

/// Counter value meaning "not yet observed in the table".
const UNSET: i64 = -1;

/// Notified when a socket durably enters or leaves the registry.
///
/// Callbacks fire exactly once per successful transition, never for
/// idempotent no-ops, and always after the structural change has won its
/// compare-and-swap race. `socket_monitoring_stopped` may be invoked from
/// either an unregistering thread or the poll thread (stale purge).
pub trait LifecycleListener: Send + Sync {
    fn socket_monitoring_started(&self, address: SocketAddrV4);
    fn socket_monitoring_stopped(&self, address: SocketAddrV4);
}

pub(crate) type SocketMap = HashMap<u64, Arc<BufferStats>>;

/// Registry of sockets some caller has asked to monitor.
///
/// Shared between the poll loop and any number of registering threads via
/// `Arc`; every method takes `&self`.
pub struct SocketRegistry {
    sockets: ArcSwap<SocketMap>,
    lifecycle: Arc<dyn LifecycleListener>,
}

impl SocketRegistry {
    pub fn new(lifecycle: Arc<dyn LifecycleListener>) -> Self {
        Self {
            sockets: ArcSwap::from_pointee(SocketMap::new()),
            lifecycle,
        }
    }

    /// Begin monitoring `address`.
    ///
    /// Idempotent: returns `false` without any notification if the address
    /// is already registered. Otherwise installs a fresh stats cell and
    /// fires `socket_monitoring_started` exactly once, on whichever thread
    /// won the installation race.
    pub fn register(&self, address: SocketAddrV4) -> bool {
        let identifier = socket_identifier(address);
        let cell = Arc::new(BufferStats::new(address));
        loop {
            let current = self.sockets.load_full();
            if current.contains_key(&identifier) {
                return false;
            }
            let mut updated = SocketMap::clone(&current);
            updated.insert(identifier, Arc::clone(&cell));
            if self.install(&current, updated) {
                self.lifecycle.socket_monitoring_started(address);
                return true;
            }
        }
    }

    /// Stop monitoring `address`.
    ///
    /// Idempotent: returns `false` without any notification if the address
    /// is not registered.
    pub fn unregister(&self, address: SocketAddrV4) -> bool {
        let identifier = socket_identifier(address);
        loop {
            let current = self.sockets.load_full();
            if !current.contains_key(&identifier) {
                return false;
            }
            let mut updated = SocketMap::clone(&current);
            updated.remove(&identifier);
            if self.install(&current, updated) {
                self.lifecycle.socket_monitoring_stopped(address);
                return true;
            }
        }
    }

    /// Whether `address` is currently registered.
    pub fn is_monitored(&self, address: SocketAddrV4) -> bool {
        self.sockets
            .load()
            .contains_key(&socket_identifier(address))
    }

    /// Number of registered sockets.
    pub fn len(&self) -> usize {
        self.sockets.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.load().is_empty()
    }

    /// Current mapping snapshot for one poll cycle to read against.
    /// O(1) and lock-free; never blocks a concurrent writer.
    pub(crate) fn snapshot(&self) -> Arc<SocketMap> {
        self.sockets.load_full()
    }

    /// Bulk-remove `identifiers`, firing one `socket_monitoring_stopped`
    /// per key that was actually present once the swap has won.
    pub(crate) fn purge(&self, identifiers: &[u64]) {
        loop {
            let current = self.sockets.load_full();
            let mut updated = SocketMap::clone(&current);
            let mut removed = Vec::with_capacity(identifiers.len());
            for identifier in identifiers {
                if let Some(cell) = updated.remove(identifier) {
                    removed.push(cell.address());
                }
            }
            if self.install(&current, updated) {
                for address in removed {
                    self.lifecycle.socket_monitoring_stopped(address);
                }
                return;
            }
        }
    }

    /// Try to replace `current` with `updated`; `false` means another
    /// writer got there first and the caller must retry.
    fn install(&self, current: &Arc<SocketMap>, updated: SocketMap) -> bool {
        let previous = self.sockets.compare_and_swap(current, Arc::new(updated));
        ptr::eq(Arc::as_ptr(&previous), Arc::as_ptr(current))
    }
}

/// Mutable per-socket counters.
///
/// Owned structurally by the registry and shared by reference into every
/// snapshot that contains it. Counter fields are only ever written by the
/// single poll thread, so relaxed atomics suffice; cross-thread publication
/// of the cell itself happens through the registry's map swap.
pub(crate) struct BufferStats {
    address: SocketAddrV4,
    receive_queue_depth: AtomicI64,
    second_counter: AtomicI64,
    changed: AtomicBool,
    last_cycle: AtomicU64,
}

impl BufferStats {
    fn new(address: SocketAddrV4) -> Self {
        Self {
            address,
            receive_queue_depth: AtomicI64::new(UNSET),
            second_counter: AtomicI64::new(UNSET),
            changed: AtomicBool::new(false),
            last_cycle: AtomicU64::new(NEVER_POLLED),
        }
    }

    pub(crate) fn address(&self) -> SocketAddrV4 {
        self.address
    }

    /// Fold one parsed table row into the cell, recording whether either
    /// tracked counter differs from the previous cycle; [`Self::has_changed`]
    /// reports the outcome. The first observation always counts as changed
    /// (counters start at a sentinel).
    pub(crate) fn update_from(&self, entry: &TableEntry) {
        let receive = entry.receive_queue_depth as i64;
        let second = entry.second_counter as i64;
        let changed = self.receive_queue_depth.load(Ordering::Relaxed) != receive
            || self.second_counter.load(Ordering::Relaxed) != second;
        self.receive_queue_depth.store(receive, Ordering::Relaxed);
        self.second_counter.store(second, Ordering::Relaxed);
        self.changed.store(changed, Ordering::Relaxed);
    }

    /// Whether the last [`Self::update_from`] moved either counter.
    pub(crate) fn has_changed(&self) -> bool {
        self.changed.load(Ordering::Relaxed)
    }

    /// Stamp the cell with the cycle that observed it.
    pub(crate) fn touch(&self, cycle: u64) {
        self.last_cycle.store(cycle, Ordering::Relaxed);
    }

    pub(crate) fn last_cycle(&self) -> u64 {
        self.last_cycle.load(Ordering::Relaxed)
    }
}
