//! Helpers for explicit byte-order conversions.
//!
//! Capture records arrive in whatever order the kernel collaborator wrote
//! them (usually host order), while HTTP/2 frame headers are always in network
//! order. These helpers keep Clippy expectations scoped to the conversion
//! points so decoding code can stay explicit about endianness.

use serde::Deserialize;

/// Byte order of the integer fields in a capture record header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Order of the machine running the decoder.
    #[default]
    Native,
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// Parse a `u32` from four bytes in this order.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamtap::byte_order::ByteOrder;
    ///
    /// assert_eq!(ByteOrder::Little.read_u32([1, 0, 0, 0]), 1);
    /// assert_eq!(ByteOrder::Big.read_u32([0, 0, 0, 1]), 1);
    /// ```
    #[must_use]
    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Native => u32::from_ne_bytes(bytes),
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => read_network_u32(bytes),
        }
    }

    /// Serialise a `u32` in this order.
    #[must_use]
    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            Self::Native => value.to_ne_bytes(),
            Self::Little => value.to_le_bytes(),
            Self::Big => write_network_u32(value),
        }
    }
}

/// Parse a network-order 24-bit integer, as used by the HTTP/2 frame length.
///
/// # Examples
///
/// ```
/// use streamtap::byte_order::read_network_u24;
///
/// assert_eq!(read_network_u24([0x00, 0x40, 0x00]), 16_384);
/// ```
#[must_use]
pub fn read_network_u24(bytes: [u8; 3]) -> u32 {
    let [a, b, c] = bytes;
    read_network_u32([0, a, b, c])
}

/// Serialise the low 24 bits of `value` in network byte order.
#[must_use]
pub fn write_network_u24(value: u32) -> [u8; 3] {
    let [_, a, b, c] = write_network_u32(value);
    [a, b, c]
}

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use streamtap::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use streamtap::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0x12, 0x34, 0x56, 0x78]), 0x1234_5678);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}
