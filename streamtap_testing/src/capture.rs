//! Builders for raw capture records and helpers that replay them.

use std::future::pending;

use bytes::{Bytes, BytesMut};
use streamtap::{
    byte_order::ByteOrder,
    error::PipelineError,
    event::{EventKind, RawEvent},
    pipeline::Pipeline,
    session::ConnectionId,
};
use tokio::io::{AsyncWriteExt, duplex};

/// Encode one capture record.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX`.
#[must_use]
pub fn encode_event(kind: EventKind, conn: u32, payload: &[u8], order: ByteOrder) -> Bytes {
    let mut buf = BytesMut::new();
    RawEvent::new(kind, ConnectionId::new(conn), Bytes::copy_from_slice(payload))
        .encode(order, &mut buf)
        .expect("payload fits a capture record");
    buf.freeze()
}

/// Encode a `Written` record whose declared length exceeds its payload.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX`.
#[must_use]
pub fn encode_truncated_write(conn: u32, payload: &[u8], declared: u32, order: ByteOrder) -> Bytes {
    let mut buf = BytesMut::new();
    RawEvent::new(
        EventKind::Written,
        ConnectionId::new(conn),
        Bytes::copy_from_slice(payload),
    )
    .with_declared_len(declared)
    .encode(order, &mut buf)
    .expect("payload fits a capture record");
    buf.freeze()
}

/// Records for a whole connection: open, each write in order, then close.
#[must_use]
pub fn session_events(conn: u32, writes: &[impl AsRef<[u8]>], order: ByteOrder) -> Vec<Bytes> {
    let mut events = Vec::with_capacity(writes.len() + 2);
    events.push(encode_event(EventKind::Opened, conn, b"", order));
    events.extend(
        writes
            .iter()
            .map(|write| encode_event(EventKind::Written, conn, write.as_ref(), order)),
    );
    events.push(encode_event(EventKind::Closed, conn, b"", order));
    events
}

/// Concatenate records into a replayable capture.
#[must_use]
pub fn capture(events: impl IntoIterator<Item = Bytes>) -> Vec<u8> {
    events.into_iter().flat_map(|event| event.to_vec()).collect()
}

/// Replay `bytes` into `pipeline` through an in-memory pipe, writing at most
/// `chunk` bytes at a time so records straddle read boundaries.
///
/// # Errors
///
/// Returns whatever [`Pipeline::run_reader`] returns.
///
/// # Panics
///
/// Panics if `chunk` is zero or the pipe closes early.
pub async fn replay_chunked(
    pipeline: &mut Pipeline,
    bytes: Vec<u8>,
    chunk: usize,
) -> Result<(), PipelineError> {
    assert!(chunk > 0, "chunk size must be positive");
    let (mut writer, reader) = duplex(chunk);
    let write = async move {
        for piece in bytes.chunks(chunk) {
            writer.write_all(piece).await.expect("pipe open");
        }
        writer.shutdown().await.expect("pipe open");
    };
    let (_, result) = tokio::join!(write, pipeline.run_reader(reader, pending()));
    result
}
