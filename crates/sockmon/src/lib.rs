//! Per-socket buffer monitoring from the Linux `/proc/net` socket tables.
//!
//! Low-latency network applications need to see receive-queue buildup (a
//! packet-loss risk) on the sockets they care about, without a syscall per
//! socket or a full table diff per sample. This crate polls the kernel's
//! textual UDP and TCP socket tables, tracks the buffer counters of
//! registered sockets only, and reports *changes*: a callback fires when a
//! socket's counters differ from the previous cycle, and a lifecycle
//! notification fires when a socket's row disappears (the socket closed).
//!
//! Registration is lock-free: any thread may register or unregister
//! sockets while a poll is in flight, and the poll always reads one
//! consistent registry snapshot. Parsing is zero-copy: the table bytes are
//! read into a reusable buffer and split by offset, with no per-row
//! allocation.
//!
//! # Example
//!
//! ```ignore
//! use std::net::{Ipv4Addr, SocketAddrV4};
//! use std::sync::Arc;
//!
//! use sockmon::{LifecycleListener, StatisticsUpdate, UdpSocketMonitor};
//!
//! struct LogLifecycle;
//!
//! impl LifecycleListener for LogLifecycle {
//!     fn socket_monitoring_started(&self, address: SocketAddrV4) {
//!         println!("watching {address}");
//!     }
//!     fn socket_monitoring_stopped(&self, address: SocketAddrV4) {
//!         println!("{address} closed");
//!     }
//! }
//!
//! fn main() -> sockmon::Result<()> {
//!     let mut monitor = UdpSocketMonitor::new(Arc::new(LogLifecycle));
//!     monitor.begin_monitoring_of(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5000));
//!
//!     // Typically driven by a fixed-rate timer on one thread.
//!     monitor.poll(&mut |update: &StatisticsUpdate| {
//!         println!("{} rx_queue={}", update.address, update.receive_queue_depth);
//!     })?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ident;
pub mod monitor;
pub mod registry;
pub mod table;
pub mod tokenize;

pub use error::{Error, Result};
pub use ident::{hex_column_for, socket_identifier};
pub use monitor::{
    SocketMonitor, StatisticsHandler, StatisticsUpdate, TcpSocketMonitor, UdpSocketMonitor,
};
pub use registry::{LifecycleListener, SocketRegistry};
pub use table::{ProtocolCounter, SocketTable, Tcp, Udp};
