//! The sequential ingestion loop.
//!
//! A [`Pipeline`] owns the [`ConnectionTable`] and applies raw events to it
//! strictly in arrival order. When a connection closes, its finished stream
//! is moved into the [`Dispatcher`]; the table never sees that buffer again.
//! Every per-event failure is logged and counted, then ingestion moves on to
//! the next event.

use std::{
    future::{Future, pending},
    sync::Arc,
    time::Instant,
};

use bytes::Bytes;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::{
    io::AsyncRead,
    select,
    sync::mpsc,
    time::{Interval, MissedTickBehavior, interval},
};
use tokio_util::codec::FramedRead;

use crate::{
    config::PipelineConfig,
    dispatch::Dispatcher,
    error::{MalformedEventError, PipelineError, UnknownConnectionError, WriteError},
    event::{EventFrame, EventFrameCodec, EventKind, RawEvent, decode_event},
    metrics,
    record::RecordSink,
    session::{ConnectionTable, OpenOutcome},
};

/// Running totals kept by the ingestion loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events that changed the connection table.
    pub applied: u64,
    /// Raw buffers rejected by the event decoder.
    pub malformed: u64,
    /// `Written` or `Closed` events for identifiers with no live entry.
    pub unknown: u64,
    /// Finished streams handed to the decode pool.
    pub dispatched: u64,
    /// Connections discarded undecoded by the buffer cap or idle timeout.
    pub evicted: u64,
}

/// Single consumer of the raw event stream.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::{Bytes, BytesMut};
/// use streamtap::{
///     byte_order::ByteOrder,
///     config::PipelineConfig,
///     event::{EventKind, RawEvent},
///     pipeline::Pipeline,
///     record::ChannelSink,
///     session::ConnectionId,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (sink, mut records) = ChannelSink::new();
/// let config = PipelineConfig::default().byte_order(ByteOrder::Little);
/// let mut pipeline = Pipeline::new(config, Arc::new(sink));
///
/// let id = ConnectionId::new(1);
/// for event in [
///     RawEvent::new(EventKind::Opened, id, Bytes::new()),
///     RawEvent::new(EventKind::Written, id, &b"HTTP/1.1 204 No Content\r\n\r\n"[..]),
///     RawEvent::new(EventKind::Closed, id, Bytes::new()),
/// ] {
///     let mut raw = BytesMut::new();
///     event.encode(ByteOrder::Little, &mut raw).expect("encode");
///     pipeline.apply(raw.freeze()).await.expect("apply");
/// }
/// pipeline.finish().await;
/// assert_eq!(records.recv().await.map(|r| r.conn_id()), Some(id));
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    table: ConnectionTable,
    dispatcher: Dispatcher,
    stats: IngestStats,
}

impl Pipeline {
    /// Build a pipeline and start its decode pool.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: PipelineConfig, sink: Arc<dyn RecordSink>) -> Self {
        let config = config.normalized();
        let table = match config.max_buffer_len {
            Some(limit) => ConnectionTable::with_buffer_limit(limit),
            None => ConnectionTable::new(),
        };
        let dispatcher = Dispatcher::spawn(&config, sink);
        Self {
            config,
            table,
            dispatcher,
            stats: IngestStats::default(),
        }
    }

    /// Decode one raw event buffer and apply it.
    ///
    /// Malformed buffers are logged, counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Dispatch`] if the decode pool has stopped.
    pub async fn apply(&mut self, raw: Bytes) -> Result<(), PipelineError> {
        let event = decode_event(raw, self.config.byte_order).and_then(|event| {
            let size = event.payload().len();
            if size > self.config.max_payload_size {
                return Err(MalformedEventError::PayloadTooLarge {
                    size,
                    max: self.config.max_payload_size,
                });
            }
            Ok(event)
        });
        match event {
            Ok(event) => self.apply_event(event).await,
            Err(err) => {
                self.record_malformed(&err);
                Ok(())
            }
        }
    }

    /// Apply one decoded event to the connection table.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Dispatch`] if the decode pool has stopped.
    pub async fn apply_event(&mut self, event: RawEvent) -> Result<(), PipelineError> {
        let conn_id = event.conn_id();
        let kind = event.kind();
        match kind {
            EventKind::Opened => match self.table.on_open(conn_id, event.into_payload()) {
                OpenOutcome::Fresh => metrics::inc_connections(),
                OpenOutcome::Replaced { discarded } => {
                    debug!(
                        "connection reopened, previous stream discarded: conn_id={conn_id}, \
                         discarded={discarded}"
                    );
                }
            },
            EventKind::Written => {
                match self
                    .table
                    .on_write(conn_id, event.payload(), event.truncated_len())
                {
                    Ok(()) => {}
                    Err(WriteError::Unknown(err)) => {
                        self.record_unknown(&err);
                        return Ok(());
                    }
                    Err(WriteError::Limit(err)) => {
                        warn!("connection discarded: {err}");
                        metrics::dec_connections(1);
                        self.stats.evicted += 1;
                        return Ok(());
                    }
                }
            }
            EventKind::Closed => match self.table.on_close(conn_id) {
                Ok(stream) => {
                    metrics::dec_connections(1);
                    if stream.truncated_len() > 0 {
                        debug!(
                            "stream closed with truncated writes: conn_id={conn_id}, missing={}",
                            stream.truncated_len()
                        );
                    }
                    self.dispatcher.submit(stream).await?;
                    self.stats.dispatched += 1;
                }
                Err(err) => {
                    self.record_unknown(&err);
                    return Ok(());
                }
            },
        }
        self.stats.applied += 1;
        metrics::inc_events(kind);
        Ok(())
    }

    /// Drain raw buffers from `rx` until it closes or `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Dispatch`] if the decode pool has stopped.
    pub async fn run<S>(&mut self, mut rx: mpsc::Receiver<Bytes>, shutdown: S) -> Result<(), PipelineError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut purge = self.purge_interval();
        loop {
            select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown requested, stopping ingestion");
                    break;
                }
                raw = rx.recv() => match raw {
                    Some(raw) => self.apply(raw).await?,
                    None => break,
                },
                () = tick(purge.as_mut()) => {
                    self.purge_idle();
                }
            }
        }
        Ok(())
    }

    /// Read concatenated raw records from `reader` until EOF or `shutdown`.
    ///
    /// Records declaring a payload above `max_payload_size` are stepped over,
    /// as is a partial record at EOF; both are logged and counted as
    /// malformed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if reading fails and
    /// [`PipelineError::Dispatch`] if the decode pool has stopped.
    pub async fn run_reader<R, S>(&mut self, reader: R, shutdown: S) -> Result<(), PipelineError>
    where
        R: AsyncRead + Unpin,
        S: Future<Output = ()>,
    {
        let codec = EventFrameCodec::new(self.config.byte_order, self.config.max_payload_size);
        let mut frames = FramedRead::new(reader, codec);
        tokio::pin!(shutdown);
        let mut purge = self.purge_interval();
        loop {
            select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown requested, stopping ingestion");
                    break;
                }
                frame = frames.next() => match frame {
                    Some(Ok(EventFrame::Record(raw))) => self.apply(raw).await?,
                    Some(Ok(EventFrame::Skipped(err))) => self.record_malformed(&err),
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                },
                () = tick(purge.as_mut()) => {
                    self.purge_idle();
                }
            }
        }
        Ok(())
    }

    /// Evict connections with no open or write within the configured idle
    /// timeout.
    ///
    /// Returns the number evicted. Does nothing without a timeout.
    pub fn purge_idle(&mut self) -> usize {
        let Some(timeout) = self.config.idle_timeout else {
            return 0;
        };
        let evicted = self.table.purge_idle_at(Instant::now(), timeout);
        if !evicted.is_empty() {
            warn!("idle connections discarded: count={}, ids={evicted:?}", evicted.len());
            metrics::dec_connections(evicted.len());
            self.stats.evicted += evicted.len() as u64;
        }
        evicted.len()
    }

    /// Totals so far.
    #[must_use]
    pub fn stats(&self) -> IngestStats { self.stats }

    /// The live connection table.
    #[must_use]
    pub fn table(&self) -> &ConnectionTable { &self.table }

    /// Stop ingesting and wait for every queued decode to finish.
    ///
    /// Connections still open are dropped undecoded. Dropping the pipeline
    /// instead of calling this abandons queued decodes.
    pub async fn finish(self) -> IngestStats {
        let Self {
            table,
            dispatcher,
            stats,
            ..
        } = self;
        if !table.is_empty() {
            debug!("dropping unclosed connections: count={}", table.len());
            metrics::dec_connections(table.len());
        }
        dispatcher.shutdown().await;
        info!(
            "ingestion finished: applied={}, malformed={}, unknown={}, dispatched={}, evicted={}",
            stats.applied, stats.malformed, stats.unknown, stats.dispatched, stats.evicted
        );
        stats
    }

    fn purge_interval(&self) -> Option<Interval> {
        self.config.idle_timeout.filter(|t| !t.is_zero()).map(|timeout| {
            let mut ticker = interval(timeout);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        })
    }

    fn record_malformed(&mut self, err: &MalformedEventError) {
        warn!("malformed event skipped: error={err}");
        metrics::inc_malformed();
        self.stats.malformed += 1;
    }

    fn record_unknown(&mut self, err: &UnknownConnectionError) {
        warn!("event ignored: {err}");
        metrics::inc_unknown_connection(err.kind);
        self.stats.unknown += 1;
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}
