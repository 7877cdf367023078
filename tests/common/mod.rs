//! Shared fixtures for integration tests.
//!
//! Builds pipelines wired to a [`ChannelSink`] so tests can collect every
//! published record after [`Pipeline::finish`].

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::sync::Arc;

use rstest::fixture;
use streamtap::{
    ChannelSink,
    DecodedRecord,
    Pipeline,
    PipelineConfig,
    byte_order::ByteOrder,
    config::ProtocolMode,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const ORDER: ByteOrder = ByteOrder::Little;

pub const OK_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello";

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn http1_config() -> PipelineConfig { PipelineConfig::default().byte_order(ORDER).workers(2) }

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn http2_config() -> PipelineConfig { http1_config().protocol_mode(ProtocolMode::Http2) }

/// Pipeline publishing into a channel, plus the receiving end.
pub fn channel_pipeline(config: PipelineConfig) -> (Pipeline, UnboundedReceiver<DecodedRecord>) {
    let (sink, rx) = ChannelSink::new();
    (Pipeline::new(config, Arc::new(sink)), rx)
}

/// Collect every record once the pipeline has finished.
pub async fn drain(mut rx: UnboundedReceiver<DecodedRecord>) -> Vec<DecodedRecord> {
    let mut out = Vec::new();
    while let Some(record) = rx.recv().await {
        out.push(record);
    }
    out
}
