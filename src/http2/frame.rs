//! HTTP/2 frame header layout (RFC 9113 section 4.1).

use std::fmt;

use crate::byte_order::{read_network_u24, read_network_u32, write_network_u24, write_network_u32};

/// Length of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest payload length a 24-bit length field can announce.
pub const MAX_FRAME_SIZE_LIMIT: u32 = (1 << 24) - 1;

/// DATA and HEADERS: last frame of the stream.
pub const END_STREAM: u8 = 0x1;
/// HEADERS and CONTINUATION: the header block is complete.
pub const END_HEADERS: u8 = 0x4;
/// DATA and HEADERS: a pad length byte leads the payload.
pub const PADDED: u8 = 0x8;
/// HEADERS: stream dependency and weight lead the fragment.
pub const PRIORITY: u8 = 0x20;

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

/// Frame types the decoder distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Continuation,
    /// Any other type, kept by its tag.
    Other(u8),
}

impl FrameType {
    /// Registered name for known tags.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Headers => "HEADERS",
            Self::Continuation => "CONTINUATION",
            Self::Other(0x2) => "PRIORITY",
            Self::Other(0x3) => "RST_STREAM",
            Self::Other(0x4) => "SETTINGS",
            Self::Other(0x5) => "PUSH_PROMISE",
            Self::Other(0x6) => "PING",
            Self::Other(0x7) => "GOAWAY",
            Self::Other(0x8) => "WINDOW_UPDATE",
            Self::Other(_) => "UNKNOWN",
        }
    }

    /// Wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Data => 0x0,
            Self::Headers => 0x1,
            Self::Continuation => 0x9,
            Self::Other(tag) => tag,
        }
    }
}

impl From<u8> for FrameType {
    fn from(tag: u8) -> Self {
        match tag {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x9 => Self::Continuation,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Decoded 9-byte frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length, excluding the header.
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    /// Stream identifier with the reserved bit cleared.
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse the header at the start of `bytes`, or `None` if fewer than
    /// nine bytes are available.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let head: &[u8; FRAME_HEADER_SIZE] = bytes.get(..FRAME_HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            length: read_network_u24([head[0], head[1], head[2]]),
            frame_type: FrameType::from(head[3]),
            flags: head[4],
            stream_id: read_network_u32([head[5], head[6], head[7], head[8]]) & STREAM_ID_MASK,
        })
    }

    /// Encode the header into its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let len = write_network_u24(self.length);
        let id = write_network_u32(self.stream_id & STREAM_ID_MASK);
        [
            len[0],
            len[1],
            len[2],
            self.frame_type.tag(),
            self.flags,
            id[0],
            id[1],
            id[2],
            id[3],
        ]
    }

    /// Whether `flag` is set.
    #[must_use]
    pub const fn has(&self, flag: u8) -> bool { self.flags & flag == flag }

    /// Payload length as a `usize`.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        usize::try_from(self.length).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_header_fields() {
        let header = FrameHeader::parse(&[0, 0, 5, 1, 0x25, 0x80, 0, 0, 3, 0xaa])
            .expect("nine bytes present");
        assert_eq!(header.length, 5);
        assert_eq!(header.frame_type, FrameType::Headers);
        assert!(header.has(END_HEADERS));
        assert!(header.has(PRIORITY));
        assert!(!header.has(PADDED));
        // reserved bit is dropped
        assert_eq!(header.stream_id, 3);
    }

    #[test]
    fn short_input_has_no_header() {
        assert_eq!(FrameHeader::parse(&[0; 8]), None);
    }

    #[test]
    fn to_bytes_inverts_parse() {
        let header = FrameHeader {
            length: 0x01_0203,
            frame_type: FrameType::Other(0x4),
            flags: 0x1,
            stream_id: 7,
        };
        assert_eq!(FrameHeader::parse(&header.to_bytes()), Some(header));
    }

    #[rstest]
    #[case(0x0, "DATA")]
    #[case(0x1, "HEADERS")]
    #[case(0x4, "SETTINGS")]
    #[case(0x9, "CONTINUATION")]
    #[case(0xf0, "UNKNOWN")]
    fn frame_type_names(#[case] tag: u8, #[case] name: &str) {
        let frame_type = FrameType::from(tag);
        assert_eq!(frame_type.as_str(), name);
        assert_eq!(frame_type.tag(), tag);
    }
}
