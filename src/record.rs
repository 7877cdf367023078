//! Structured output records and the sinks that receive them.
//!
//! Decode workers turn each successfully decoded unit into a
//! [`DecodedRecord`] and hand it to a [`RecordSink`]. An HTTP/1 buffer yields
//! one record; an HTTP/2 buffer yields one record per frame.

use std::fmt;

use tokio::sync::mpsc;

use crate::{
    http1::Http1Message,
    http2::{FrameKind, Http2Frame},
    session::ConnectionId,
};

/// Summary of one decoded HTTP/1 response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Http1Record {
    pub conn_id: ConnectionId,
    pub status_code: u16,
    /// Declared `Content-Length`, if any.
    pub content_length: Option<usize>,
    pub content_type: Option<String>,
    /// Decoded body length.
    pub body_len: usize,
    /// Leading body bytes, lossily converted to UTF-8.
    pub body_preview: String,
}

impl Http1Record {
    /// Summarise `message`, keeping at most `preview_len` body bytes.
    #[must_use]
    pub fn from_message(conn_id: ConnectionId, message: &Http1Message, preview_len: usize) -> Self {
        let preview = &message.body[..message.body.len().min(preview_len)];
        Self {
            conn_id,
            status_code: message.status_code,
            content_length: message.content_length(),
            content_type: message.content_type().map(str::to_owned),
            body_len: message.body.len(),
            body_preview: String::from_utf8_lossy(preview).into_owned(),
        }
    }
}

/// Summary of one decoded HTTP/2 frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Http2Record {
    pub conn_id: ConnectionId,
    pub stream_id: u32,
    /// Registered frame type name, such as `HEADERS`.
    pub frame_kind: &'static str,
    /// Decompressed headers, for HEADERS frames.
    pub header_pairs: Option<Vec<(String, String)>>,
    /// Payload length, for DATA frames.
    pub data_len: Option<usize>,
}

impl Http2Record {
    #[must_use]
    pub fn from_frame(conn_id: ConnectionId, frame: &Http2Frame) -> Self {
        let (header_pairs, data_len) = match &frame.kind {
            FrameKind::Data(payload) => (None, Some(payload.len())),
            FrameKind::Headers(fields) => (
                Some(
                    fields
                        .iter()
                        .map(|f| {
                            (
                                String::from_utf8_lossy(f.name()).into_owned(),
                                String::from_utf8_lossy(f.value()).into_owned(),
                            )
                        })
                        .collect(),
                ),
                None,
            ),
            FrameKind::Other { .. } => (None, None),
        };
        Self {
            conn_id,
            stream_id: frame.stream_id,
            frame_kind: frame.kind.name(),
            header_pairs,
            data_len,
        }
    }
}

/// One unit of decoder output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedRecord {
    Http1(Http1Record),
    Http2(Http2Record),
}

impl DecodedRecord {
    /// Connection the record was decoded from.
    #[must_use]
    pub fn conn_id(&self) -> ConnectionId {
        match self {
            Self::Http1(record) => record.conn_id,
            Self::Http2(record) => record.conn_id,
        }
    }
}

impl fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http1(r) => {
                write!(f, "status={}", r.status_code)?;
                if let Some(len) = r.content_length {
                    write!(f, " len={len}")?;
                }
                if let Some(content_type) = &r.content_type {
                    write!(f, " content_type={content_type:?}")?;
                }
                write!(f, " body={:?}", r.body_preview)
            }
            Self::Http2(r) => {
                write!(f, "[{}] stream={}", r.frame_kind, r.stream_id)?;
                if let Some(len) = r.data_len {
                    write!(f, " len={len}")?;
                }
                for (name, value) in r.header_pairs.iter().flatten() {
                    write!(f, " {name:?}:{value:?}")?;
                }
                Ok(())
            }
        }
    }
}

/// Destination for decoded records.
///
/// Called concurrently from every decode worker.
pub trait RecordSink: Send + Sync + 'static {
    /// Publish one record.
    fn publish(&self, record: DecodedRecord);
}

impl<F> RecordSink for F
where
    F: Fn(DecodedRecord) + Send + Sync + 'static,
{
    fn publish(&self, record: DecodedRecord) { self(record); }
}

/// Emits each record as a structured `tracing` event at `info` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl RecordSink for LogSink {
    fn publish(&self, record: DecodedRecord) {
        tracing::info!(
            target: "streamtap::record",
            conn_id = record.conn_id().as_u32(),
            "{record}"
        );
    }
}

/// Forwards records into an unbounded channel.
///
/// Records published after the receiver is dropped are discarded.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DecodedRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes its records.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DecodedRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn publish(&self, record: DecodedRecord) {
        if let Err(err) = self.tx.send(record) {
            log::debug!("record receiver dropped: conn_id={}", err.0.conn_id());
        }
    }
}
