//! Socket identifier codec.
//!
//! The registry keys sockets by a single 64-bit identifier derived from an
//! IPv4 address and a port. The same identifier must come out of both the
//! structured form used at registration time and the hexadecimal
//! `address:port` column of the kernel tables, so that sockets registered
//! by a caller match rows parsed from the table text.

use std::net::SocketAddrV4;

use winnow::ascii::hex_uint;
use winnow::combinator::separated_pair;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;

use crate::error::{Error, Result};

/// Result type for winnow parsers.
pub(crate) type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Derive the 64-bit registry identifier for a socket address.
///
/// The address value occupies bits 16..48 and the port bits 0..16, so the
/// encoding is bijective for every valid IPv4 address and port combination.
pub fn socket_identifier(address: SocketAddrV4) -> u64 {
    identifier_from_parts(u32::from(*address.ip()), address.port())
}

fn identifier_from_parts(address: u32, port: u16) -> u64 {
    (u64::from(address) << 16) | u64::from(port)
}

/// Parse the kernel's hex `address:port` column into the identifier
/// [`socket_identifier`] would produce for the same socket.
///
/// The kernel prints the address as the raw in-memory word of the
/// network-order address, so on little-endian hosts the hex digits appear
/// byte-reversed relative to the dotted form (`0100007F:1538` is
/// 127.0.0.1:5432). The port is printed in its natural order.
pub fn identifier_from_hex_column(token: &[u8]) -> Result<u64> {
    parse_hex_column.parse(token).map_err(|_| {
        Error::Parse(format!(
            "malformed address column: {}",
            String::from_utf8_lossy(token)
        ))
    })
}

fn parse_hex_column(input: &mut &[u8]) -> PResult<u64> {
    let (address, port): (u32, u16) =
        separated_pair(hex_uint, b':', hex_uint).parse_next(input)?;
    // to_be recovers the network-order value from the kernel's native word;
    // it is its own inverse, so this also holds on big-endian hosts.
    Ok(identifier_from_parts(address.to_be(), port))
}

/// Render an address the way the kernel table prints it. Test support for
/// building table fixtures; kept here so it cannot drift from the decoder.
pub fn hex_column_for(address: SocketAddrV4) -> String {
    format!(
        "{:08X}:{:04X}",
        u32::from(*address.ip()).to_be(),
        address.port()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_identifier_round_trip() {
        let address = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5000);
        let column = hex_column_for(address);
        assert_eq!(
            identifier_from_hex_column(column.as_bytes()).unwrap(),
            socket_identifier(address)
        );
    }

    #[test]
    fn test_kernel_encoding_of_localhost() {
        // 127.0.0.1:5432 as /proc/net prints it on little-endian hosts.
        let address = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0x1538);
        assert_eq!(
            identifier_from_hex_column(b"0100007F:1538").unwrap(),
            socket_identifier(address)
        );
    }

    #[test]
    fn test_identifiers_are_distinct() {
        // Address and port never overlap in the identifier, so distinct
        // pairs cannot collide.
        let a = socket_identifier(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5000));
        let b = socket_identifier(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5001));
        let c = socket_identifier(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 5000));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_identifier_layout() {
        let address = SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), 0xFFFF);
        assert_eq!(socket_identifier(address), 0xFFFF);

        let address = SocketAddrV4::new(Ipv4Addr::new(255, 255, 255, 255), 0);
        assert_eq!(socket_identifier(address), 0xFFFF_FFFF_0000);
    }

    #[test]
    fn test_malformed_columns_rejected() {
        assert!(identifier_from_hex_column(b"local_address").is_err());
        assert!(identifier_from_hex_column(b"0100007F").is_err());
        assert!(identifier_from_hex_column(b"0100007F:").is_err());
        assert!(identifier_from_hex_column(b":1538").is_err());
        assert!(identifier_from_hex_column(b"0100007F:1538 ").is_err());
        assert!(identifier_from_hex_column(b"").is_err());
    }
}
