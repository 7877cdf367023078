//! Per-connection byte-stream reassembly.
//!
//! [`ConnectionTable`] maps a [`ConnectionId`] to the bytes written on that
//! connection so far. It is owned by the single ingestion consumer, so it is
//! a plain map rather than a concurrent one: every mutation happens in event
//! arrival order and no lock is needed. When a connection closes, its buffer
//! is moved out in a [`FinishedStream`] and the entry is removed; the table
//! never touches that buffer again.
//!
//! An `Opened` event for an identifier that is still live replaces the old
//! entry outright. The discarded bytes are reported to the caller but not
//! merged into the new stream.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    time::{Duration, Instant},
};

use bytes::{Bytes, BytesMut};

use crate::{
    error::{ReassemblyError, UnknownConnectionError, WriteError},
    event::EventKind,
};

/// Identifier naming one logical byte stream between open and close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl From<u32> for ConnectionId {
    fn from(value: u32) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u32) -> Self { Self(id) }

    /// Return the inner `u32` representation.
    #[must_use]
    pub const fn as_u32(&self) -> u32 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Lifecycle phase of a live connection.
///
/// `Closed` has no variant: a closed connection has no entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Opened, nothing written yet.
    Open,
    /// At least one write has been appended.
    Accumulating,
}

#[derive(Debug)]
struct ConnectionState {
    socket_meta: Bytes,
    buffer: BytesMut,
    phase: Phase,
    last_activity: Instant,
    truncated: usize,
}

impl ConnectionState {
    fn new(socket_meta: Bytes, opened_at: Instant) -> Self {
        Self {
            socket_meta,
            buffer: BytesMut::new(),
            phase: Phase::Open,
            last_activity: opened_at,
            truncated: 0,
        }
    }

    fn push(&mut self, bytes: &[u8], truncated: usize, now: Instant) {
        self.buffer.extend_from_slice(bytes);
        self.truncated += truncated;
        self.phase = Phase::Accumulating;
        self.last_activity = self.last_activity.max(now);
    }
}

/// A closed connection's complete byte stream.
///
/// Produced by [`ConnectionTable::on_close`]; the buffer is owned outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedStream {
    conn_id: ConnectionId,
    socket_meta: Bytes,
    buffer: Bytes,
    truncated: usize,
}

impl FinishedStream {
    /// Construct a finished stream directly.
    #[must_use]
    pub fn new(conn_id: ConnectionId, buffer: impl Into<Bytes>) -> Self {
        Self {
            conn_id,
            socket_meta: Bytes::new(),
            buffer: buffer.into(),
            truncated: 0,
        }
    }

    /// Connection that produced the stream.
    #[must_use]
    pub const fn conn_id(&self) -> ConnectionId { self.conn_id }

    /// Socket metadata captured when the connection opened.
    #[must_use]
    pub fn socket_meta(&self) -> &Bytes { &self.socket_meta }

    /// Borrow the reassembled bytes.
    #[must_use]
    pub fn buffer(&self) -> &Bytes { &self.buffer }

    /// Total bytes the capture layer dropped from this connection's writes.
    #[must_use]
    pub const fn truncated_len(&self) -> usize { self.truncated }

    /// Consume the stream, returning the owned bytes.
    #[must_use]
    pub fn into_buffer(self) -> Bytes { self.buffer }
}

/// Outcome of [`ConnectionTable::on_open`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// No entry existed for the identifier.
    Fresh,
    /// A live entry was replaced; its buffered bytes were discarded.
    Replaced {
        /// Length of the discarded buffer.
        discarded: usize,
    },
}

/// Owned map from connection identifier to accumulating stream state.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: HashMap<ConnectionId, ConnectionState>,
    max_buffer_len: Option<usize>,
}

impl ConnectionTable {
    /// Create an empty table with no buffer cap.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create an empty table that rejects buffers longer than `limit`.
    #[must_use]
    pub fn with_buffer_limit(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_buffer_len: Some(limit),
        }
    }

    /// Start tracking `conn_id` using the current time.
    pub fn on_open(&mut self, conn_id: ConnectionId, socket_meta: Bytes) -> OpenOutcome {
        self.on_open_at(conn_id, socket_meta, Instant::now())
    }

    /// Start tracking `conn_id` with an explicit clock reading.
    ///
    /// Any existing entry for the identifier is replaced without merging.
    pub fn on_open_at(
        &mut self,
        conn_id: ConnectionId,
        socket_meta: Bytes,
        now: Instant,
    ) -> OpenOutcome {
        match self
            .entries
            .insert(conn_id, ConnectionState::new(socket_meta, now))
        {
            Some(previous) => OpenOutcome::Replaced {
                discarded: previous.buffer.len(),
            },
            None => OpenOutcome::Fresh,
        }
    }

    /// Append `bytes` to the stream for `conn_id`.
    ///
    /// `truncated` is the number of bytes the syscall wrote beyond what was
    /// captured; it is tracked for diagnostics only.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Unknown`] without mutating the table when no
    /// entry exists, and [`WriteError::Limit`] when the write would exceed
    /// the configured buffer cap. In the latter case the entry is dropped.
    pub fn on_write(
        &mut self,
        conn_id: ConnectionId,
        bytes: &[u8],
        truncated: usize,
    ) -> Result<(), WriteError> {
        self.on_write_at(conn_id, bytes, truncated, Instant::now())
    }

    /// Append `bytes` with an explicit clock reading, marking the entry as
    /// active at `now`.
    ///
    /// # Errors
    ///
    /// As for [`ConnectionTable::on_write`].
    pub fn on_write_at(
        &mut self,
        conn_id: ConnectionId,
        bytes: &[u8],
        truncated: usize,
        now: Instant,
    ) -> Result<(), WriteError> {
        let Entry::Occupied(mut occupied) = self.entries.entry(conn_id) else {
            return Err(UnknownConnectionError {
                conn_id,
                kind: EventKind::Written,
            }
            .into());
        };

        if let Some(limit) = self.max_buffer_len {
            let attempted = occupied.get().buffer.len().saturating_add(bytes.len());
            if attempted > limit {
                occupied.remove();
                return Err(ReassemblyError {
                    conn_id,
                    attempted,
                    limit,
                }
                .into());
            }
        }

        occupied.get_mut().push(bytes, truncated, now);
        Ok(())
    }

    /// Stop tracking `conn_id` and hand over its buffer.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownConnectionError`] without mutating the table when no
    /// entry exists.
    pub fn on_close(
        &mut self,
        conn_id: ConnectionId,
    ) -> Result<FinishedStream, UnknownConnectionError> {
        let state = self
            .entries
            .remove(&conn_id)
            .ok_or(UnknownConnectionError {
                conn_id,
                kind: EventKind::Closed,
            })?;
        Ok(FinishedStream {
            conn_id,
            socket_meta: state.socket_meta,
            buffer: state.buffer.freeze(),
            truncated: state.truncated,
        })
    }

    /// Remove entries whose last open or write was at least `timeout`
    /// before `now`.
    ///
    /// Returns the identifiers that were evicted. Their buffers are dropped,
    /// not decoded.
    pub fn purge_idle_at(&mut self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        let mut evicted = Vec::new();
        self.entries.retain(|conn_id, state| {
            let expired = now.saturating_duration_since(state.last_activity) >= timeout;
            if expired {
                evicted.push(*conn_id);
            }
            !expired
        });
        evicted.sort_unstable();
        evicted
    }

    /// Phase of `conn_id`, or `None` if it is not live.
    #[must_use]
    pub fn phase(&self, conn_id: ConnectionId) -> Option<Phase> {
        self.entries.get(&conn_id).map(|state| state.phase)
    }

    /// Bytes buffered so far for `conn_id`.
    #[must_use]
    pub fn buffered(&self, conn_id: ConnectionId) -> Option<&[u8]> {
        self.entries.get(&conn_id).map(|state| state.buffer.as_ref())
    }

    /// Whether `conn_id` has a live entry.
    #[must_use]
    pub fn contains(&self, conn_id: ConnectionId) -> bool { self.entries.contains_key(&conn_id) }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
