//! Test utilities for the `streamtap` crate.
//!
//! Builders for capture records and HTTP/2 frames, a chunked replay driver
//! that exercises the event codec across read boundaries, and a shared
//! [`logtest`] fixture.
//!
//! ```rust
//! use streamtap::byte_order::ByteOrder;
//! use streamtap_testing::{capture, session_events};
//!
//! let bytes = capture(session_events(7, &[b"HTTP/1.1 204 No Content\r\n\r\n"], ByteOrder::Little));
//! assert!(!bytes.is_empty());
//! ```

pub mod capture;
pub mod http2;
pub mod logging;
pub mod metrics;

pub use capture::{capture, encode_event, encode_truncated_write, replay_chunked, session_events};
pub use logging::{LoggerHandle, logger};
