//! HTTP/2 wire builders.

use streamtap::http2::frame::{FrameHeader, FrameType};

/// HEADERS block from RFC 7541 C.3.1. Adds `:authority: www.example.com`
/// to the dynamic table at index 62.
pub const FIRST_REQUEST_BLOCK: &[u8] = &[
    0x82, 0x86, 0x84, 0x41, 0x0f, b'w', b'w', b'w', b'.', b'e', b'x', b'a', b'm', b'p', b'l', b'e',
    b'.', b'c', b'o', b'm',
];

/// HEADERS block from RFC 7541 C.3.2. Refers back to index 62.
pub const SECOND_REQUEST_BLOCK: &[u8] = &[
    0x82, 0x86, 0x84, 0xbe, 0x58, 0x08, b'n', b'o', b'-', b'c', b'a', b'c', b'h', b'e',
];

/// Encode one frame with a 9-byte header.
///
/// # Panics
///
/// Panics if `payload` does not fit a 24-bit length.
#[must_use]
pub fn frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let length = u32::try_from(payload.len()).expect("payload length fits u32");
    assert!(length < 1 << 24, "payload length fits 24 bits");
    let header = FrameHeader {
        length,
        frame_type: FrameType::from(frame_type),
        flags,
        stream_id,
    };
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}
