//! Command line interface for the `streamtap` binary.
//!
//! Kept free of library types so the build script can include it to render
//! the man page.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, ValueEnum};

/// Byte order of raw event header fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ByteOrderArg {
    /// Host byte order.
    #[default]
    Native,
    Little,
    Big,
}

/// Replay a recorded socket event capture and decode each connection's
/// stream as HTTP/1.1 or HTTP/2.
#[derive(Debug, Parser)]
#[command(name = "streamtap", version, about = "Decode HTTP traffic from captured socket events")]
pub struct Cli {
    /// Capture file to read. Reads standard input when omitted.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Decode streams as HTTP/2 frames instead of HTTP/1.1 responses.
    #[arg(long)]
    pub http2: bool,

    /// Decode without printing records.
    #[arg(long)]
    pub no_print: bool,

    /// Number of concurrent decode workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Finished streams that may wait for a worker.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Byte order of record header fields.
    #[arg(long, value_enum, default_value_t = ByteOrderArg::Native)]
    pub byte_order: ByteOrderArg,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
