//! The poll loop over one kernel socket table.
//!
//! One [`SocketMonitor`] instance watches one table (`/proc/net/udp` or
//! `/proc/net/tcp`). A single driving thread calls [`SocketMonitor::poll`]
//! on a schedule of its choosing; other threads register and unregister
//! sockets through the shared [`SocketRegistry`] at any time. Each cycle
//! re-reads the whole table into a reusable grow-only buffer, streams it
//! through the tokenizer chain, updates the stats cells of registered
//! sockets, and purges sockets whose rows vanished from the table.

use std::fs::File;
use std::marker::PhantomData;
use std::net::SocketAddrV4;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::Result;
use crate::registry::{LifecycleListener, SocketRegistry};
use crate::table::{ProtocolCounter, RowBuilder, SocketTable, TableEntry, Tcp, Udp};
use crate::tokenize::DelimitedTokenizer;

/// Initial read buffer capacity (one page of typical tables); doubles
/// whenever the table outgrows it and never shrinks.
const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// One statistics update for a monitored socket whose tracked counters
/// changed since the previous poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatisticsUpdate {
    /// The address the caller registered.
    pub address: SocketAddrV4,
    /// Registry identifier of the socket.
    pub identifier: u64,
    /// Inode backing the socket, as reported by the table.
    pub inode: u64,
    /// Bytes waiting in the receive queue.
    pub receive_queue_depth: u64,
    /// The protocol-specific second counter.
    pub counter: ProtocolCounter,
}

/// Receives per-socket updates during one [`SocketMonitor::poll`] call.
///
/// Implemented for any `FnMut(&StatisticsUpdate)` closure.
pub trait StatisticsHandler {
    fn on_statistics_updated(&mut self, update: &StatisticsUpdate);
}

impl<F: FnMut(&StatisticsUpdate)> StatisticsHandler for F {
    fn on_statistics_updated(&mut self, update: &StatisticsUpdate) {
        self(update)
    }
}

/// Polls one kernel socket table and reports per-socket buffer changes.
///
/// `T` selects the table; use the [`UdpSocketMonitor`] and
/// [`TcpSocketMonitor`] aliases. The monitor exclusively owns its file
/// handle and read buffer; `poll` is kept non-reentrant by `&mut self`.
pub struct SocketMonitor<T> {
    registry: Arc<SocketRegistry>,
    path: PathBuf,
    file: Option<File>,
    buffer: Vec<u8>,
    cycle: u64,
    stale: Vec<u64>,
    _table: PhantomData<T>,
}

/// Monitor over the UDP table; the second counter is the drop count.
pub type UdpSocketMonitor = SocketMonitor<Udp>;

/// Monitor over the TCP table; the second counter is the transmit-queue
/// depth.
pub type TcpSocketMonitor = SocketMonitor<Tcp>;

impl<T: SocketTable> SocketMonitor<T> {
    /// Monitor the table at its default procfs location.
    pub fn new(lifecycle: Arc<dyn LifecycleListener>) -> Self {
        Self::with_path(lifecycle, T::PROC_PATH)
    }

    /// Monitor a table at a non-default location (tests, or a procfs
    /// bind-mounted from another namespace).
    pub fn with_path(lifecycle: Arc<dyn LifecycleListener>, path: impl AsRef<Path>) -> Self {
        Self {
            registry: Arc::new(SocketRegistry::new(lifecycle)),
            path: path.as_ref().to_path_buf(),
            file: None,
            buffer: vec![0; INITIAL_BUFFER_CAPACITY],
            cycle: 0,
            stale: Vec::new(),
            _table: PhantomData,
        }
    }

    /// The shared registry. Clone the `Arc` to register and unregister
    /// sockets from other threads while polls are in flight.
    pub fn registry(&self) -> &Arc<SocketRegistry> {
        &self.registry
    }

    /// Register interest in a socket. See [`SocketRegistry::register`].
    pub fn begin_monitoring_of(&self, address: SocketAddrV4) {
        self.registry.register(address);
    }

    /// Drop interest in a socket. See [`SocketRegistry::unregister`].
    pub fn end_monitoring_of(&self, address: SocketAddrV4) {
        self.registry.unregister(address);
    }

    /// Run one poll cycle.
    ///
    /// Re-reads the table, fires `handler` for every registered socket
    /// whose counters changed, then purges registered sockets whose rows
    /// are gone (the socket closed), firing their lifecycle notification.
    /// An I/O failure aborts the cycle and is returned to the caller; no
    /// internal retry is attempted. A malformed row merely skips that row.
    pub fn poll(&mut self, handler: &mut dyn StatisticsHandler) -> Result<()> {
        let snapshot = self.registry.snapshot();
        let cycle = self.cycle;

        let length = self.read_table()?;

        let mut rows = DelimitedTokenizer::new(
            b'\n',
            true,
            DelimitedTokenizer::new(
                b' ',
                true,
                RowBuilder::<T, _>::new(|entry: TableEntry| {
                    // Rows for sockets nobody registered are not tracked at
                    // all; change detection is only paid for matches.
                    let Some(cell) = snapshot.get(&entry.identifier) else {
                        return;
                    };
                    cell.update_from(&entry);
                    cell.touch(cycle);
                    if cell.has_changed() {
                        handler.on_statistics_updated(&StatisticsUpdate {
                            address: cell.address(),
                            identifier: entry.identifier,
                            inode: entry.inode,
                            receive_queue_depth: entry.receive_queue_depth,
                            counter: T::counter(entry.second_counter),
                        });
                    }
                }),
            ),
        );
        rows.parse(&self.buffer, 0, length);
        drop(rows);

        // Anything the cycle did not touch has no row left in the table.
        self.stale.clear();
        for (identifier, cell) in snapshot.iter() {
            if cell.last_cycle() != cycle {
                self.stale.push(*identifier);
            }
        }
        if !self.stale.is_empty() {
            debug!(
                table = T::NAME,
                count = self.stale.len(),
                "purging sockets whose rows left the table"
            );
            self.registry.purge(&self.stale);
        }

        self.cycle += 1;
        Ok(())
    }

    /// Read the whole table from the start into the reusable buffer,
    /// returning the number of bytes read.
    fn read_table(&mut self) -> Result<usize> {
        // The handle is opened lazily and kept; a failed cycle drops it so
        // the next cycle reopens from scratch.
        let file = match self.file.take() {
            Some(file) => file,
            None => File::open(&self.path)?,
        };

        // procfs reports a zero length for the socket tables, so the
        // metadata check only helps for regular files; the read loop below
        // also grows the buffer whenever the table fills it.
        let size = file.metadata()?.len() as usize;
        while self.buffer.len() < size {
            self.grow_buffer();
        }

        let mut total = 0;
        loop {
            if total == self.buffer.len() {
                self.grow_buffer();
            }
            let read = file.read_at(&mut self.buffer[total..], total as u64)?;
            if read == 0 {
                break;
            }
            total += read;
        }

        self.file = Some(file);
        Ok(total)
    }

    fn grow_buffer(&mut self) {
        let doubled = self.buffer.len() * 2;
        trace!(
            table = T::NAME,
            capacity = doubled,
            "table outgrew read buffer"
        );
        self.buffer.resize(doubled, 0);
    }
}
