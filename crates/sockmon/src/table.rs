//! Row parsing for the `/proc/net/udp` and `/proc/net/tcp` tables.
//!
//! Data rows look like:
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
//!  388: 0100000A:1388 00000000:0000 07 00000000:00000190 00:00000000 00000000  1000        0 12345 2 ffff88063cd66e80 3
//! ```
//!
//! Only four columns matter here: the local `address:port`, the hex
//! `tx_queue:rx_queue` pair, the decimal inode, and (UDP only) the trailing
//! drop counter. Rows with malformed fields, including the header line, are
//! dropped without aborting the surrounding parse.

use std::marker::PhantomData;

use serde::Serialize;
use winnow::ascii::{dec_uint, hex_uint};
use winnow::combinator::separated_pair;
use winnow::prelude::*;

use crate::ident::{PResult, identifier_from_hex_column};
use crate::tokenize::TokenHandler;

const LOCAL_ADDRESS_COLUMN: usize = 1;
const QUEUES_COLUMN: usize = 4;
const INODE_COLUMN: usize = 9;
const DROPS_COLUMN: usize = 12;

/// One monitored kernel socket table.
///
/// Implemented by the [`Udp`] and [`Tcp`] markers. Picks the table file and
/// describes how the protocol-specific second counter is obtained: the drop
/// count for UDP, the transmit-queue depth for TCP.
pub trait SocketTable {
    /// Default location of the table under procfs.
    const PROC_PATH: &'static str;

    /// Table name, used in log events.
    const NAME: &'static str;

    /// Index of the column whose arrival completes a row.
    const FINAL_COLUMN: usize;

    /// Whether the table carries a trailing drop counter column.
    const HAS_DROPS: bool;

    /// Derive the second tracked counter from the parsed row fields.
    fn second_counter(transmit_queue_depth: u64, drops: u64) -> u64;

    /// Attach the protocol-specific meaning to the second counter.
    fn counter(value: u64) -> ProtocolCounter;
}

/// The `/proc/net/udp` table.
pub struct Udp;

/// The `/proc/net/tcp` table.
pub struct Tcp;

impl SocketTable for Udp {
    const PROC_PATH: &'static str = "/proc/net/udp";
    const NAME: &'static str = "udp";
    const FINAL_COLUMN: usize = DROPS_COLUMN;
    const HAS_DROPS: bool = true;

    fn second_counter(_transmit_queue_depth: u64, drops: u64) -> u64 {
        drops
    }

    fn counter(value: u64) -> ProtocolCounter {
        ProtocolCounter::Drops(value)
    }
}

impl SocketTable for Tcp {
    const PROC_PATH: &'static str = "/proc/net/tcp";
    const NAME: &'static str = "tcp";
    const FINAL_COLUMN: usize = INODE_COLUMN;
    const HAS_DROPS: bool = false;

    fn second_counter(transmit_queue_depth: u64, _drops: u64) -> u64 {
        transmit_queue_depth
    }

    fn counter(value: u64) -> ProtocolCounter {
        ProtocolCounter::TransmitQueueDepth(value)
    }
}

/// Protocol-specific meaning of the second tracked counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolCounter {
    /// Datagrams dropped by the kernel for lack of receive buffer space.
    Drops(u64),
    /// Bytes queued for transmission.
    TransmitQueueDepth(u64),
}

impl ProtocolCounter {
    /// The raw counter value, whatever its meaning.
    pub fn value(&self) -> u64 {
        match self {
            Self::Drops(value) | Self::TransmitQueueDepth(value) => *value,
        }
    }
}

/// Transient result of parsing one table row. Not stored anywhere; it only
/// lives long enough to update the matching stats cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    /// Registry identifier of the row's local address.
    pub identifier: u64,
    /// Inode backing the socket.
    pub inode: u64,
    /// Bytes waiting in the receive queue.
    pub receive_queue_depth: u64,
    /// Protocol-specific second counter (drops or transmit queue).
    pub second_counter: u64,
}

/// Builds [`TableEntry`] values from the column tokens of one row.
///
/// Fed by the column-level tokenizer; the line-level tokenizer resets it
/// before each row, so a malformed row never poisons the next one. Emits at
/// most one entry per row, when the table's final tracked column arrives.
pub struct RowBuilder<T, F> {
    column: usize,
    failed: bool,
    identifier: u64,
    transmit_queue_depth: u64,
    receive_queue_depth: u64,
    inode: u64,
    drops: u64,
    emit: F,
    _table: PhantomData<T>,
}

impl<T: SocketTable, F: FnMut(TableEntry)> RowBuilder<T, F> {
    pub fn new(emit: F) -> Self {
        Self {
            column: 0,
            failed: false,
            identifier: 0,
            transmit_queue_depth: 0,
            receive_queue_depth: 0,
            inode: 0,
            drops: 0,
            emit,
            _table: PhantomData,
        }
    }
}

impl<T: SocketTable, F: FnMut(TableEntry)> TokenHandler for RowBuilder<T, F> {
    fn handle_token(&mut self, buf: &[u8], start: usize, end: usize) {
        let column = self.column;
        self.column += 1;
        if self.failed {
            return;
        }

        let token = &buf[start..end];
        let ok = match column {
            LOCAL_ADDRESS_COLUMN => match identifier_from_hex_column(token) {
                Ok(identifier) => {
                    self.identifier = identifier;
                    true
                }
                Err(_) => false,
            },
            QUEUES_COLUMN => match parse_queue_pair.parse(token) {
                Ok((transmit, receive)) => {
                    self.transmit_queue_depth = transmit;
                    self.receive_queue_depth = receive;
                    true
                }
                Err(_) => false,
            },
            INODE_COLUMN => match parse_decimal.parse(token) {
                Ok(inode) => {
                    self.inode = inode;
                    true
                }
                Err(_) => false,
            },
            DROPS_COLUMN if T::HAS_DROPS => match parse_decimal.parse(token) {
                Ok(drops) => {
                    self.drops = drops;
                    true
                }
                Err(_) => false,
            },
            _ => true,
        };

        if !ok {
            self.failed = true;
            return;
        }

        if column == T::FINAL_COLUMN {
            (self.emit)(TableEntry {
                identifier: self.identifier,
                inode: self.inode,
                receive_queue_depth: self.receive_queue_depth,
                second_counter: T::second_counter(self.transmit_queue_depth, self.drops),
            });
        }
    }

    fn reset(&mut self) {
        self.column = 0;
        self.failed = false;
    }
}

/// Parse the hex `tx_queue:rx_queue` pair.
fn parse_queue_pair(input: &mut &[u8]) -> PResult<(u64, u64)> {
    separated_pair(hex_uint, b':', hex_uint).parse_next(input)
}

fn parse_decimal(input: &mut &[u8]) -> PResult<u64> {
    dec_uint.parse_next(input)
}
