#![doc(html_root_url = "https://docs.rs/streamtap/latest")]
//! Public API for the `streamtap` library.
//!
//! This crate reassembles per-connection byte streams from a sequence of
//! socket events (`Opened`, `Written`, `Closed`) and decodes each finished
//! stream as either an HTTP/1.1 response or a sequence of HTTP/2 frames with
//! HPACK header decompression. Ingestion is strictly sequential; decoding
//! runs on a bounded pool of workers that publish records to a
//! [`RecordSink`].

pub mod byte_order;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod http1;
pub mod http2;
pub mod metrics;
pub mod panic;
pub mod pipeline;
pub mod record;
pub mod session;

pub use config::{PipelineConfig, ProtocolMode};
pub use error::{
    DispatchError,
    MalformedEventError,
    PipelineError,
    ProtocolParseError,
    UnknownConnectionError,
};
pub use event::{EventKind, RawEvent, decode_event};
pub use http1::{Http1Message, decode_response};
pub use http2::{Http2Decode, Http2Frame, decode_frames, hpack::HeaderDecoder};
pub use metrics::{CONNECTIONS_ACTIVE, DECODES_TOTAL, EVENTS_TOTAL};
pub use pipeline::{IngestStats, Pipeline};
pub use record::{ChannelSink, DecodedRecord, LogSink, RecordSink};
pub use session::{ConnectionId, ConnectionTable, FinishedStream};
