//! Bounded decode worker pool.
//!
//! The ingestion loop hands every finished stream to [`Dispatcher::submit`].
//! Streams wait in a bounded queue until one of a fixed number of workers
//! takes them, so a burst of closes applies backpressure to ingestion instead
//! of spawning unbounded tasks. Each worker decodes its stream with the
//! configured protocol and publishes the resulting records. Workers share no
//! mutable state: each decode owns its buffer and, for HTTP/2, its own
//! header table.

use std::{panic::AssertUnwindSafe, sync::Arc};

use log::{debug, error, warn};
use tokio::sync::{Mutex, mpsc};
use tokio_util::task::TaskTracker;

use crate::{
    config::{PipelineConfig, ProtocolMode},
    error::{DispatchError, ProtocolParseError},
    http1::decode_response,
    http2::{Http2Options, decode_frames},
    metrics::{self, Outcome},
    panic::format_panic,
    record::{DecodedRecord, Http1Record, Http2Record, RecordSink},
    session::FinishedStream,
};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<FinishedStream>>>;

/// Everything a worker needs to turn a finished stream into records.
struct StreamDecoder {
    mode: ProtocolMode,
    http2: Http2Options,
    preview_len: usize,
    output_enabled: bool,
    sink: Arc<dyn RecordSink>,
}

impl StreamDecoder {
    fn decode(&self, stream: FinishedStream) {
        let conn_id = stream.conn_id();
        let outcome = match self.mode {
            ProtocolMode::Http1 => match decode_response(stream.into_buffer()) {
                Ok(message) => {
                    self.publish([DecodedRecord::Http1(Http1Record::from_message(
                        conn_id,
                        &message,
                        self.preview_len,
                    ))]);
                    Outcome::Ok
                }
                Err(err) => {
                    warn!("decode failed: conn_id={conn_id}, protocol=http1, error={err}");
                    Outcome::Error
                }
            },
            ProtocolMode::Http2 => {
                let decoded = decode_frames(stream.into_buffer(), &self.http2);
                self.publish(decoded.frames.iter().map(|frame| {
                    DecodedRecord::Http2(Http2Record::from_frame(conn_id, frame))
                }));
                match decoded.error {
                    None => Outcome::Ok,
                    Some(err) => {
                        let err = ProtocolParseError::from(err);
                        warn!(
                            "decode failed: conn_id={conn_id}, protocol=http2, frames={}, \
                             error={err}",
                            decoded.frames.len()
                        );
                        Outcome::Error
                    }
                }
            }
        };
        metrics::inc_decodes(self.mode, outcome);
    }

    fn publish(&self, records: impl IntoIterator<Item = DecodedRecord>) {
        if !self.output_enabled {
            return;
        }
        let mut count = 0;
        for record in records {
            self.sink.publish(record);
            count += 1;
        }
        metrics::add_records(count);
    }
}

/// Handle to the decode worker pool.
///
/// Dropping the handle closes the queue; workers finish what is already
/// queued only if the runtime keeps running. Call [`Dispatcher::shutdown`]
/// to wait for them.
#[derive(Debug)]
pub struct Dispatcher {
    tx: mpsc::Sender<FinishedStream>,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// Start `config.workers` decode workers behind a queue of
    /// `config.queue_capacity` streams.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(config: &PipelineConfig, sink: Arc<dyn RecordSink>) -> Self {
        let config = config.clone().normalized();
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let decoder = Arc::new(StreamDecoder {
            mode: config.protocol_mode,
            http2: config.http2_options(),
            preview_len: config.body_preview_len,
            output_enabled: config.output_enabled,
            sink,
        });

        let tracker = TaskTracker::new();
        for worker in 0..config.workers {
            tracker.spawn(run_worker(worker, rx.clone(), decoder.clone()));
        }
        tracker.close();
        debug!(
            "decode pool started: workers={}, queue_capacity={}, mode={:?}",
            config.workers, config.queue_capacity, config.protocol_mode
        );

        Self { tx, tracker }
    }

    /// Queue `stream` for decoding, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if every worker has exited.
    pub async fn submit(&self, stream: FinishedStream) -> Result<(), DispatchError> {
        let conn_id = stream.conn_id();
        self.tx.send(stream).await.map_err(|_| DispatchError(conn_id))
    }

    /// Streams currently waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize { self.tx.max_capacity() - self.tx.capacity() }

    /// Close the queue and wait until every queued stream has been decoded.
    pub async fn shutdown(self) {
        let Self { tx, tracker } = self;
        drop(tx);
        tracker.wait().await;
    }
}

async fn run_worker(worker: usize, rx: SharedReceiver, decoder: Arc<StreamDecoder>) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(stream) = next else { break };
        let conn_id = stream.conn_id();

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(stream)));
        if let Err(panic) = result {
            metrics::inc_decodes(decoder.mode, Outcome::Error);
            let panic_msg = format_panic(panic.as_ref());
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("decode task panicked: panic={panic_msg}, conn_id={conn_id}, worker={worker}");
            tracing::error!(panic = %panic_msg, conn_id = conn_id.as_u32(), worker, "decode task panicked");
        }
    }
    debug!("decode worker exiting: worker={worker}");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::{sync::Notify, time::timeout};

    use super::*;
    use crate::{record::ChannelSink, session::ConnectionId};

    fn stream(id: u32, raw: &'static [u8]) -> FinishedStream {
        FinishedStream::new(ConnectionId::new(id), Bytes::from_static(raw))
    }

    const OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";

    #[tokio::test]
    async fn decodes_http1_and_publishes() {
        let (sink, mut rx) = ChannelSink::new();
        let dispatcher = Dispatcher::spawn(&PipelineConfig::default(), Arc::new(sink));
        dispatcher.submit(stream(1, OK_RESPONSE)).await.expect("queued");
        dispatcher.shutdown().await;

        let Some(DecodedRecord::Http1(record)) = rx.recv().await else {
            panic!("expected an HTTP/1 record");
        };
        assert_eq!(record.conn_id, ConnectionId::new(1));
        assert_eq!(record.status_code, 200);
        assert_eq!(record.body_preview, "hello");
    }

    #[tokio::test]
    async fn parse_failure_publishes_nothing_and_pool_continues() {
        let (sink, mut rx) = ChannelSink::new();
        let dispatcher = Dispatcher::spawn(&PipelineConfig::default().workers(1), Arc::new(sink));
        dispatcher.submit(stream(1, b"garbage")).await.expect("queued");
        dispatcher.submit(stream(2, OK_RESPONSE)).await.expect("queued");
        dispatcher.shutdown().await;

        let record = rx.recv().await.expect("one record");
        assert_eq!(record.conn_id(), ConnectionId::new(2));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn output_disabled_publishes_nothing() {
        let (sink, mut rx) = ChannelSink::new();
        let config = PipelineConfig::default().output_enabled(false);
        let dispatcher = Dispatcher::spawn(&config, Arc::new(sink));
        dispatcher.submit(stream(1, OK_RESPONSE)).await.expect("queued");
        dispatcher.shutdown().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn http2_mode_publishes_one_record_per_frame() {
        let (sink, mut rx) = ChannelSink::new();
        let config = PipelineConfig::default().protocol_mode(ProtocolMode::Http2);
        let dispatcher = Dispatcher::spawn(&config, Arc::new(sink));
        // SETTINGS, then DATA "ok", then a truncated header
        let raw: &'static [u8] = &[
            0, 0, 0, 4, 0, 0, 0, 0, 0, //
            0, 0, 2, 0, 1, 0, 0, 0, 1, b'o', b'k', //
            0, 0,
        ];
        dispatcher.submit(stream(7, raw)).await.expect("queued");
        dispatcher.shutdown().await;

        let mut kinds = Vec::new();
        while let Some(DecodedRecord::Http2(record)) = rx.recv().await {
            kinds.push(record.frame_kind);
        }
        assert_eq!(kinds, ["SETTINGS", "DATA"]);
    }

    #[tokio::test]
    async fn panicking_sink_does_not_kill_worker() {
        let (forward, mut rx) = ChannelSink::new();
        let sink = move |record: DecodedRecord| {
            assert!(record.conn_id() != ConnectionId::new(1), "sink rejects connection 1");
            forward.publish(record);
        };
        let dispatcher = Dispatcher::spawn(&PipelineConfig::default().workers(1), Arc::new(sink));
        dispatcher.submit(stream(1, OK_RESPONSE)).await.expect("queued");
        dispatcher.submit(stream(2, OK_RESPONSE)).await.expect("queued");
        dispatcher.shutdown().await;

        assert_eq!(
            rx.recv().await.map(|r| r.conn_id()),
            Some(ConnectionId::new(2))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_queue_blocks_submit() {
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = std::sync::Mutex::new(gate_rx);
        let entered = Arc::new(Notify::new());
        let worker_entered = entered.clone();
        // the single worker blocks in the sink until released
        let sink = move |_record: DecodedRecord| {
            worker_entered.notify_one();
            let _ = gate_rx.lock().expect("gate lock").recv();
        };
        let config = PipelineConfig::default().workers(1).queue_capacity(1);
        let dispatcher = Dispatcher::spawn(&config, Arc::new(sink));

        dispatcher.submit(stream(1, OK_RESPONSE)).await.expect("taken by worker");
        timeout(Duration::from_secs(5), entered.notified())
            .await
            .expect("worker picks up the first stream");
        dispatcher.submit(stream(2, OK_RESPONSE)).await.expect("fills queue");
        assert_eq!(dispatcher.queued(), 1);

        let blocked = timeout(Duration::from_millis(50), dispatcher.submit(stream(3, OK_RESPONSE))).await;
        assert!(blocked.is_err(), "submit should wait for queue space");

        drop(gate_tx);
        dispatcher.shutdown().await;
    }
}
