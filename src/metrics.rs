//! Metric helpers for `streamtap`.
//!
//! This module defines metric names and thin wrappers around the
//! [`metrics`](https://docs.rs/metrics) macros. Without the `metrics`
//! feature the wrappers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::{config::ProtocolMode, event::EventKind};

/// Gauge of connections currently tracked by the table.
pub const CONNECTIONS_ACTIVE: &str = "streamtap_connections_active";
/// Counter of raw events applied to the table, labelled by `kind`.
pub const EVENTS_TOTAL: &str = "streamtap_events_total";
/// Counter of raw event buffers rejected by the event decoder.
pub const MALFORMED_EVENTS_TOTAL: &str = "streamtap_malformed_events_total";
/// Counter of events naming a connection with no live entry.
pub const UNKNOWN_CONNECTION_TOTAL: &str = "streamtap_unknown_connection_events_total";
/// Counter of finished buffers decoded, labelled by `protocol` and
/// `outcome`.
pub const DECODES_TOTAL: &str = "streamtap_decodes_total";
/// Counter of records handed to the sink.
pub const RECORDS_PUBLISHED: &str = "streamtap_records_published_total";

/// Result of one decode task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The buffer decoded completely.
    Ok,
    /// Decoding stopped on a protocol error.
    Error,
}

impl Outcome {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Error => "error",
        }
    }
}

#[cfg_attr(not(feature = "metrics"), allow(dead_code))]
fn protocol_label(mode: ProtocolMode) -> &'static str {
    match mode {
        ProtocolMode::Http1 => "http1",
        ProtocolMode::Http2 => "http2",
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge by `count`.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn dec_connections(count: usize) {
    #[cfg(feature = "metrics")]
    #[allow(clippy::cast_precision_loss, reason = "connection counts stay far below 2^52")]
    gauge!(CONNECTIONS_ACTIVE).decrement(count as f64);
}

/// Record an applied raw event.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn inc_events(kind: EventKind) {
    #[cfg(feature = "metrics")]
    counter!(EVENTS_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record a raw event that failed structural decoding.
pub fn inc_malformed() {
    #[cfg(feature = "metrics")]
    counter!(MALFORMED_EVENTS_TOTAL).increment(1);
}

/// Record an event for an unknown connection.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn inc_unknown_connection(kind: EventKind) {
    #[cfg(feature = "metrics")]
    counter!(UNKNOWN_CONNECTION_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record the outcome of one decode task.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn inc_decodes(mode: ProtocolMode, outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(
        DECODES_TOTAL,
        "protocol" => protocol_label(mode),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record `count` published records.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn add_records(count: usize) {
    #[cfg(feature = "metrics")]
    counter!(RECORDS_PUBLISHED).increment(u64::try_from(count).unwrap_or(u64::MAX));
}
