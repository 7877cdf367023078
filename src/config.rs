//! Pipeline configuration.
//!
//! [`PipelineConfig`] is supplied by whatever loads settings for the process:
//! the `streamtap` binary fills it from command-line flags, and embedders may
//! deserialise it with any `serde` format. Every field has a default, so a
//! partial document is accepted.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    byte_order::ByteOrder,
    event::DEFAULT_MAX_PAYLOAD_SIZE,
    http2::{Http2Options, frame::MAX_FRAME_SIZE_LIMIT, hpack::DEFAULT_MAX_TABLE_SIZE},
};

/// Application protocol carried by every captured connection.
///
/// Fixed for the life of a pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Decode each finished buffer as one HTTP/1.x response.
    #[default]
    Http1,
    /// Decode each finished buffer as a sequence of HTTP/2 frames.
    Http2,
}

/// Settings consumed by [`Pipeline`](crate::pipeline::Pipeline).
///
/// # Examples
///
/// ```
/// use streamtap::config::{PipelineConfig, ProtocolMode};
///
/// let config = PipelineConfig::default()
///     .protocol_mode(ProtocolMode::Http2)
///     .workers(8)
///     .output_enabled(false);
///
/// assert_eq!(config.workers, 8);
/// assert_eq!(config.queue_capacity, 64);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decoder applied to finished buffers.
    ///
    /// Default: [`ProtocolMode::Http1`].
    pub protocol_mode: ProtocolMode,

    /// Whether decoded records are published to the sink.
    ///
    /// Default: true.
    pub output_enabled: bool,

    /// Number of concurrent decode workers.
    ///
    /// Default: 4.
    pub workers: usize,

    /// Finished buffers that may wait for a worker before ingestion blocks.
    ///
    /// Default: 64.
    pub queue_capacity: usize,

    /// Byte order of the integer fields in raw event headers.
    ///
    /// Default: [`ByteOrder::Native`].
    pub byte_order: ByteOrder,

    /// Largest payload a single raw event may declare.
    ///
    /// Default: 1 MiB.
    pub max_payload_size: usize,

    /// Cap on one connection's reassembled buffer. `None` is unbounded.
    pub max_buffer_len: Option<usize>,

    /// Connections with no open or write for this long are discarded
    /// undecoded. `None` keeps them until closed.
    pub idle_timeout: Option<Duration>,

    /// HPACK dynamic table bound in bytes.
    ///
    /// Default: 2048.
    pub hpack_table_size: usize,

    /// Largest HTTP/2 frame payload accepted.
    ///
    /// Default: 2^24 - 1.
    pub max_frame_size: u32,

    /// Body bytes included in an HTTP/1 record's preview.
    ///
    /// Default: 256.
    pub body_preview_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            protocol_mode: ProtocolMode::default(),
            output_enabled: true,
            workers: 4,
            queue_capacity: 64,
            byte_order: ByteOrder::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_buffer_len: None,
            idle_timeout: None,
            hpack_table_size: DEFAULT_MAX_TABLE_SIZE,
            max_frame_size: MAX_FRAME_SIZE_LIMIT,
            body_preview_len: 256,
        }
    }
}

impl PipelineConfig {
    /// Set the protocol decoded from finished buffers.
    #[must_use]
    pub fn protocol_mode(mut self, mode: ProtocolMode) -> Self {
        self.protocol_mode = mode;
        self
    }

    /// Enable or disable record publication.
    #[must_use]
    pub fn output_enabled(mut self, enabled: bool) -> Self {
        self.output_enabled = enabled;
        self
    }

    /// Set the number of decode workers.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }

    /// Set the decode queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the raw event header byte order.
    #[must_use]
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Set the largest accepted raw event payload.
    #[must_use]
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Cap each connection's buffer at `limit` bytes.
    #[must_use]
    pub fn max_buffer_len(mut self, limit: usize) -> Self {
        self.max_buffer_len = Some(limit);
        self
    }

    /// Discard connections idle for `timeout`.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the HPACK dynamic table bound.
    #[must_use]
    pub fn hpack_table_size(mut self, size: usize) -> Self {
        self.hpack_table_size = size;
        self
    }

    /// Set the largest accepted HTTP/2 frame payload.
    #[must_use]
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the HTTP/1 body preview length.
    #[must_use]
    pub fn body_preview_len(mut self, len: usize) -> Self {
        self.body_preview_len = len;
        self
    }

    /// Raise zero worker and queue counts to one and clamp the frame size to
    /// what a 24-bit length can express.
    ///
    /// ```
    /// use streamtap::config::PipelineConfig;
    ///
    /// let config = PipelineConfig::default().workers(0).normalized();
    /// assert_eq!(config.workers, 1);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self.max_frame_size = self.max_frame_size.min(MAX_FRAME_SIZE_LIMIT);
        self
    }

    /// HTTP/2 decoder limits derived from this configuration.
    #[must_use]
    pub fn http2_options(&self) -> Http2Options {
        Http2Options::default()
            .max_frame_size(self.max_frame_size)
            .max_table_size(self.hpack_table_size)
    }
}
