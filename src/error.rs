//! Canonical error types for the pipeline.
//!
//! Every error in this module is recoverable at the boundary where it occurs:
//! a malformed event is skipped, an unknown connection is ignored, and a
//! protocol failure discards one connection's decode. Only
//! [`PipelineError`] surfaces to callers, and only for failures of the event
//! source itself.

use std::io;

use thiserror::Error;

use crate::{event::EventKind, http1::Http1Error, http2::Http2Error, session::ConnectionId};

/// A raw event buffer failed structural decoding.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum MalformedEventError {
    /// The buffer ended before the header or the declared payload.
    #[error("truncated event: have {have} bytes, need {need}")]
    Truncated {
        /// Bytes present in the buffer.
        have: usize,
        /// Bytes required by the header and declared payload size.
        need: usize,
    },
    /// The event kind tag is not one of the recognised values.
    #[error("unknown event kind: {0}")]
    UnknownKind(u32),
    /// The declared payload size exceeds the configured maximum.
    #[error("event payload too large: {size} > {max}")]
    PayloadTooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum accepted payload size.
        max: usize,
    },
}

/// A `Written` or `Closed` event named an identifier with no live entry.
///
/// This usually means the connection was opened before observation began or
/// was already reaped.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("{kind} event for unknown connection {conn_id}")]
pub struct UnknownConnectionError {
    /// Identifier carried by the event.
    pub conn_id: ConnectionId,
    /// Kind of the offending event.
    pub kind: EventKind,
}

/// A write would push a connection's buffer past the configured cap.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("buffer for {conn_id} exceeds limit: {attempted} > {limit}")]
pub struct ReassemblyError {
    /// Connection whose buffer was discarded.
    pub conn_id: ConnectionId,
    /// Buffer length the write would have produced.
    pub attempted: usize,
    /// Configured maximum buffer length.
    pub limit: usize,
}

/// Errors raised by [`ConnectionTable::on_write`](crate::session::ConnectionTable::on_write).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    /// No entry exists for the identifier.
    #[error(transparent)]
    Unknown(#[from] UnknownConnectionError),
    /// The write exceeded the buffer cap and the entry was dropped.
    #[error(transparent)]
    Limit(#[from] ReassemblyError),
}

/// A finished buffer could not be decoded as the configured protocol.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolParseError {
    /// HTTP/1.1 response decoding failed.
    #[error("http/1 parse error: {0}")]
    Http1(#[from] Http1Error),
    /// HTTP/2 frame decoding failed.
    #[error("http/2 parse error: {0}")]
    Http2(#[from] Http2Error),
}

/// The decode workers have stopped, so a finished stream was not queued.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("decode workers stopped; dropped finished stream for {0}")]
pub struct DispatchError(pub ConnectionId);

/// Failure of the event source feeding the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading raw events failed.
    #[error("event source error: {0}")]
    Io(#[from] io::Error),
    /// The decode pool stopped accepting finished streams.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http2::hpack::HpackError;

    #[test]
    fn unknown_connection_names_id_and_kind() {
        let err = UnknownConnectionError {
            conn_id: ConnectionId::new(99),
            kind: EventKind::Written,
        };
        assert_eq!(
            err.to_string(),
            "written event for unknown connection ConnectionId(99)"
        );
    }

    #[test]
    fn malformed_event_display() {
        assert_eq!(
            MalformedEventError::UnknownKind(7).to_string(),
            "unknown event kind: 7"
        );
    }

    #[test]
    fn hpack_error_reports_under_http2() {
        let err = ProtocolParseError::from(Http2Error::Hpack(HpackError::ZeroIndex));
        assert!(err.to_string().starts_with("http/2 parse error: "));
    }
}
