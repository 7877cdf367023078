//! Raw capture event decoding.
//!
//! The capture collaborator emits one record per observed syscall: a fixed
//! 16-byte header followed by a variable payload. [`decode_event`] parses a
//! single record into a [`RawEvent`]; [`EventFrameCodec`] splits a continuous
//! byte stream of concatenated records so recorded captures can be replayed
//! from any [`tokio::io::AsyncRead`].
//!
//! ```text
//! +-----------+-----------+------------------+--------------------+---------+
//! | kind (32) | conn (32) | declared len(32) | payload size (32)  | payload |
//! +-----------+-----------+------------------+--------------------+---------+
//! ```

use std::{fmt, io};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::{byte_order::ByteOrder, error::MalformedEventError, session::ConnectionId};

/// Size of the fixed record header in bytes.
pub const EVENT_HEADER_SIZE: usize = 16;

/// Default cap on a single record's payload (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

const PAYLOAD_SIZE_OFFSET: usize = 12;

/// Kind of socket activity a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A connection was accepted; the payload carries socket metadata.
    Opened,
    /// Bytes were written to the connection.
    Written,
    /// The connection was closed.
    Closed,
}

impl EventKind {
    /// Wire tag of this kind.
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::Opened => 1,
            Self::Written => 2,
            Self::Closed => 3,
        }
    }

    /// Lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Written => "written",
            Self::Closed => "closed",
        }
    }
}

impl TryFrom<u32> for EventKind {
    type Error = MalformedEventError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Opened),
            2 => Ok(Self::Written),
            3 => Ok(Self::Closed),
            other => Err(MalformedEventError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One decoded capture record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    kind: EventKind,
    conn_id: ConnectionId,
    declared_len: u32,
    payload: Bytes,
}

impl RawEvent {
    /// Construct an event whose declared length equals its payload length.
    #[must_use]
    pub fn new(kind: EventKind, conn_id: ConnectionId, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let declared_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self {
            kind,
            conn_id,
            declared_len,
            payload,
        }
    }

    /// Override the byte count the syscall reported.
    ///
    /// The capture layer truncates large writes, so this can exceed the
    /// payload length.
    #[must_use]
    pub fn with_declared_len(mut self, declared_len: u32) -> Self {
        self.declared_len = declared_len;
        self
    }

    /// Kind of activity recorded.
    #[must_use]
    pub const fn kind(&self) -> EventKind { self.kind }

    /// Connection the event belongs to.
    #[must_use]
    pub const fn conn_id(&self) -> ConnectionId { self.conn_id }

    /// Byte count reported by the syscall.
    #[must_use]
    pub const fn declared_len(&self) -> u32 { self.declared_len }

    /// Borrow the captured payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the event, returning the owned payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Number of bytes the syscall wrote that the capture layer did not keep.
    #[must_use]
    pub fn truncated_len(&self) -> usize {
        (self.declared_len as usize).saturating_sub(self.payload.len())
    }

    /// Append the wire representation of this event to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the payload is longer than `u32::MAX` bytes.
    pub fn encode(&self, order: ByteOrder, dst: &mut BytesMut) -> io::Result<()> {
        let size = u32::try_from(self.payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;
        dst.reserve(EVENT_HEADER_SIZE + self.payload.len());
        dst.put_slice(&order.write_u32(self.kind.tag()));
        dst.put_slice(&order.write_u32(self.conn_id.as_u32()));
        dst.put_slice(&order.write_u32(self.declared_len));
        dst.put_slice(&order.write_u32(size));
        dst.put_slice(&self.payload);
        Ok(())
    }
}

fn read_field(buf: &[u8], offset: usize, order: ByteOrder) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    let array = <[u8; 4]>::try_from(bytes).ok()?;
    Some(order.read_u32(array))
}

/// Decode one raw record.
///
/// Bytes past the declared payload are ignored.
///
/// # Errors
///
/// Returns [`MalformedEventError::Truncated`] when the buffer is shorter than
/// the header plus the declared payload size, and
/// [`MalformedEventError::UnknownKind`] when the kind tag is not recognised.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use streamtap::{
///     byte_order::ByteOrder,
///     event::{EventKind, RawEvent, decode_event},
///     session::ConnectionId,
/// };
///
/// let mut buf = BytesMut::new();
/// RawEvent::new(EventKind::Written, ConnectionId::new(3), &b"hi"[..])
///     .encode(ByteOrder::Little, &mut buf)
///     .expect("encode record");
/// let event = decode_event(buf.freeze(), ByteOrder::Little).expect("valid record");
/// assert_eq!(event.payload().as_ref(), b"hi");
/// ```
pub fn decode_event(buf: Bytes, order: ByteOrder) -> Result<RawEvent, MalformedEventError> {
    let truncated = |need| MalformedEventError::Truncated {
        have: buf.len(),
        need,
    };
    if buf.len() < EVENT_HEADER_SIZE {
        return Err(truncated(EVENT_HEADER_SIZE));
    }
    let field = |offset| read_field(&buf, offset, order).ok_or(truncated(EVENT_HEADER_SIZE));
    let kind_tag = field(0)?;
    let conn_id = ConnectionId::new(field(4)?);
    let declared_len = field(8)?;
    let payload_size = field(PAYLOAD_SIZE_OFFSET)? as usize;

    let need = EVENT_HEADER_SIZE.saturating_add(payload_size);
    if buf.len() < need {
        return Err(truncated(need));
    }
    let kind = EventKind::try_from(kind_tag)?;

    Ok(RawEvent {
        kind,
        conn_id,
        declared_len,
        payload: buf.slice(EVENT_HEADER_SIZE..need),
    })
}

/// One unit framed by [`EventFrameCodec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFrame {
    /// A complete record (header plus payload) ready for [`decode_event`].
    Record(Bytes),
    /// A record the codec stepped over without framing it.
    Skipped(MalformedEventError),
}

/// Splits a byte stream into whole capture records.
///
/// The kind tag is not inspected here, so a record with an unknown kind still
/// frames correctly and is rejected later in isolation. A record declaring a
/// payload above the configured maximum is reported as
/// [`EventFrame::Skipped`] as soon as its header arrives; its payload is then
/// discarded as it streams in and framing resumes at the next header.
#[derive(Clone, Copy, Debug)]
pub struct EventFrameCodec {
    order: ByteOrder,
    max_payload_size: usize,
    discarding: usize,
}

impl EventFrameCodec {
    /// Construct a codec reading header fields in `order`.
    #[must_use]
    pub fn new(order: ByteOrder, max_payload_size: usize) -> Self {
        Self {
            order,
            max_payload_size,
            discarding: 0,
        }
    }

    /// Maximum payload size accepted per record.
    #[must_use]
    pub const fn max_payload_size(&self) -> usize { self.max_payload_size }

    /// Bytes of an oversized record still to be dropped.
    #[must_use]
    pub const fn discarding(&self) -> usize { self.discarding }

    fn discard(&mut self, src: &mut BytesMut, len: usize) {
        let now = len.min(src.len());
        src.advance(now);
        self.discarding = len - now;
    }
}

impl Default for EventFrameCodec {
    fn default() -> Self { Self::new(ByteOrder::default(), DEFAULT_MAX_PAYLOAD_SIZE) }
}

impl Decoder for EventFrameCodec {
    type Item = EventFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.discarding > 0 {
            self.discard(src, self.discarding);
            if self.discarding > 0 {
                return Ok(None);
            }
        }

        let Some(payload_size) = read_field(src, PAYLOAD_SIZE_OFFSET, self.order) else {
            return Ok(None);
        };
        let payload_size = payload_size as usize;
        if payload_size > self.max_payload_size {
            self.discard(src, EVENT_HEADER_SIZE.saturating_add(payload_size));
            return Ok(Some(EventFrame::Skipped(
                MalformedEventError::PayloadTooLarge {
                    size: payload_size,
                    max: self.max_payload_size,
                },
            )));
        }

        let total = EVENT_HEADER_SIZE + payload_size;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        Ok(Some(EventFrame::Record(src.split_to(total).freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            // An oversized record cut short by EOF was already reported.
            self.discarding = 0;
            return Ok(None);
        }
        let need = read_field(src, PAYLOAD_SIZE_OFFSET, self.order)
            .map_or(EVENT_HEADER_SIZE, |size| EVENT_HEADER_SIZE + size as usize);
        let have = src.len();
        src.clear();
        Ok(Some(EventFrame::Skipped(MalformedEventError::Truncated {
            have,
            need,
        })))
    }
}
