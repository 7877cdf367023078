//! HTTP/2 frame decoding over one finished connection buffer.
//!
//! [`decode_frames`] walks the buffer frame by frame. HEADERS blocks are
//! decompressed by a single [`HeaderDecoder`] that lives exactly as long as
//! the call, so every header block in the buffer shares one dynamic table
//! and no table outlives its buffer. The first parse error stops the walk;
//! frames decoded before it are still returned.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

pub mod frame;
pub mod hpack;

use frame::{
    END_HEADERS,
    FRAME_HEADER_SIZE,
    FrameHeader,
    FrameType,
    MAX_FRAME_SIZE_LIMIT,
    PADDED,
    PRIORITY,
};
use hpack::{DEFAULT_MAX_TABLE_SIZE, HeaderDecoder, HeaderField, HpackError};

/// Client connection preface (RFC 9113 section 3.4).
pub const CLIENT_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

// stream dependency (4) and weight (1)
const PRIORITY_FIELDS_LEN: usize = 5;

/// Failure that ends decoding of one buffer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Http2Error {
    /// Fewer than nine bytes remained for a frame header.
    #[error("truncated frame header: {available} bytes remain")]
    TruncatedHeader { available: usize },
    /// The payload ran past the end of the buffer.
    #[error("truncated frame: declared {declared} bytes, {available} remain")]
    TruncatedFrame { declared: usize, available: usize },
    /// The declared length exceeded the configured maximum frame size.
    #[error("frame length {length} exceeds maximum {max}")]
    FrameTooLarge { length: u32, max: u32 },
    /// Padding or priority fields did not fit in the payload.
    #[error("malformed padding or priority on stream {stream_id}")]
    InvalidPadding { stream_id: u32 },
    /// A CONTINUATION frame arrived with no open header block.
    #[error("unexpected CONTINUATION on stream {stream_id}")]
    UnexpectedContinuation { stream_id: u32 },
    /// A header block without END_HEADERS was not followed by its
    /// CONTINUATION frames.
    #[error("header block on stream {stream_id} not completed by CONTINUATION")]
    MissingContinuation { stream_id: u32 },
    /// Header decompression failed.
    #[error("header decompression failed: {0}")]
    Hpack(#[from] HpackError),
}

/// Limits applied by [`decode_frames`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Http2Options {
    max_frame_size: u32,
    max_table_size: usize,
}

impl Default for Http2Options {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE_LIMIT,
            max_table_size: DEFAULT_MAX_TABLE_SIZE,
        }
    }
}

impl Http2Options {
    /// Reject frames whose payload is longer than `size` bytes.
    #[must_use]
    pub const fn max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Bound the HPACK dynamic table at `size` bytes.
    #[must_use]
    pub const fn max_table_size(mut self, size: usize) -> Self {
        self.max_table_size = size;
        self
    }
}

/// Payload of a decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// DATA payload with padding removed.
    Data(Bytes),
    /// Decompressed header list of a HEADERS frame and its CONTINUATIONs.
    Headers(Vec<HeaderField>),
    /// Any other frame, uninterpreted.
    Other { type_tag: u8, payload: Bytes },
}

impl FrameKind {
    /// Registered frame type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data(_) => FrameType::Data.as_str(),
            Self::Headers(_) => FrameType::Headers.as_str(),
            Self::Other { type_tag, .. } => FrameType::from(*type_tag).as_str(),
        }
    }
}

/// One decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Http2Frame {
    pub stream_id: u32,
    /// Flags from the frame header. A HEADERS frame joined with its
    /// CONTINUATIONs reports `END_HEADERS`.
    pub flags: u8,
    pub kind: FrameKind,
}

/// Result of decoding one buffer: the frames parsed before the first error,
/// and that error if there was one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Http2Decode {
    pub frames: Vec<Http2Frame>,
    pub error: Option<Http2Error>,
}

/// Decode every frame in `buf`.
///
/// A leading client preface is skipped. Decoding stops at the end of the
/// buffer or at the first error.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use streamtap::http2::{FrameKind, Http2Options, decode_frames};
///
/// // DATA frame on stream 1 carrying "hi"
/// let buf = Bytes::from_static(&[0, 0, 2, 0, 1, 0, 0, 0, 1, b'h', b'i']);
/// let decoded = decode_frames(buf, &Http2Options::default());
/// assert!(decoded.error.is_none());
/// assert_eq!(decoded.frames[0].kind, FrameKind::Data(Bytes::from_static(b"hi")));
/// ```
#[must_use]
pub fn decode_frames(mut buf: Bytes, options: &Http2Options) -> Http2Decode {
    if buf.starts_with(CLIENT_PREFACE) {
        buf.advance(CLIENT_PREFACE.len());
    }

    let mut decoder = HeaderDecoder::new(options.max_table_size);
    let mut out = Http2Decode::default();
    while !buf.is_empty() {
        match next_frame(&mut buf, options, &mut decoder) {
            Ok(frame) => out.frames.push(frame),
            Err(error) => {
                out.error = Some(error);
                break;
            }
        }
    }
    out
}

fn next_frame(
    buf: &mut Bytes,
    options: &Http2Options,
    decoder: &mut HeaderDecoder,
) -> Result<Http2Frame, Http2Error> {
    let (header, payload) = split_frame(buf, options)?;
    let stream_id = header.stream_id;

    let kind = match header.frame_type {
        FrameType::Data => FrameKind::Data(strip_padding(&header, payload)?),
        FrameType::Headers => {
            let mut fragment = strip_padding(&header, payload)?;
            if header.has(PRIORITY) {
                if fragment.len() < PRIORITY_FIELDS_LEN {
                    return Err(Http2Error::InvalidPadding { stream_id });
                }
                fragment.advance(PRIORITY_FIELDS_LEN);
            }
            let block = if header.has(END_HEADERS) {
                fragment
            } else {
                join_continuations(buf, options, stream_id, fragment)?
            };
            FrameKind::Headers(decoder.decode(block)?)
        }
        FrameType::Continuation => return Err(Http2Error::UnexpectedContinuation { stream_id }),
        FrameType::Other(type_tag) => FrameKind::Other { type_tag, payload },
    };

    let flags = match kind {
        FrameKind::Headers(_) => header.flags | END_HEADERS,
        _ => header.flags,
    };
    Ok(Http2Frame {
        stream_id,
        flags,
        kind,
    })
}

/// Split one frame off the front of `buf`.
fn split_frame(buf: &mut Bytes, options: &Http2Options) -> Result<(FrameHeader, Bytes), Http2Error> {
    let header = FrameHeader::parse(buf).ok_or(Http2Error::TruncatedHeader {
        available: buf.len(),
    })?;
    if header.length > options.max_frame_size {
        return Err(Http2Error::FrameTooLarge {
            length: header.length,
            max: options.max_frame_size,
        });
    }
    let available = buf.len() - FRAME_HEADER_SIZE;
    let declared = header.payload_len();
    if declared > available {
        return Err(Http2Error::TruncatedFrame {
            declared,
            available,
        });
    }
    buf.advance(FRAME_HEADER_SIZE);
    Ok((header, buf.split_to(declared)))
}

/// Concatenate CONTINUATION fragments for `stream_id` onto `first` until one
/// carries END_HEADERS.
fn join_continuations(
    buf: &mut Bytes,
    options: &Http2Options,
    stream_id: u32,
    first: Bytes,
) -> Result<Bytes, Http2Error> {
    let mut block = BytesMut::from(first.as_ref());
    loop {
        let next = FrameHeader::parse(buf).ok_or(Http2Error::MissingContinuation { stream_id })?;
        if next.frame_type != FrameType::Continuation || next.stream_id != stream_id {
            return Err(Http2Error::MissingContinuation { stream_id });
        }
        let (header, fragment) = split_frame(buf, options)?;
        block.extend_from_slice(&fragment);
        if header.has(END_HEADERS) {
            return Ok(block.freeze());
        }
    }
}

fn strip_padding(header: &FrameHeader, mut payload: Bytes) -> Result<Bytes, Http2Error> {
    if !header.has(PADDED) {
        return Ok(payload);
    }
    let invalid = Http2Error::InvalidPadding {
        stream_id: header.stream_id,
    };
    let pad_len = usize::from(*payload.first().ok_or_else(|| invalid.clone())?);
    payload.advance(1);
    if pad_len > payload.len() {
        return Err(invalid);
    }
    payload.truncate(payload.len() - pad_len);
    Ok(payload)
}
