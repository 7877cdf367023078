//! Lookups over a `metrics_util` debugging snapshot.

use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

/// Fresh recorder plus the snapshotter that reads it.
#[must_use]
pub fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Recorded values captured at one instant.
#[derive(Debug)]
pub struct MetricsSnapshot {
    entries: Vec<(CompositeKey, DebugValue)>,
}

impl MetricsSnapshot {
    /// Capture everything `snapshotter` has recorded so far.
    #[must_use]
    pub fn take(snapshotter: &Snapshotter) -> Self {
        let entries = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| (key, value))
            .collect();
        Self { entries }
    }

    /// Sum of counter `name` over entries carrying every label in `labels`.
    /// Zero if never recorded.
    #[must_use]
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.entries
            .iter()
            .filter(|(key, _)| {
                key.key().name() == name
                    && labels
                        .iter()
                        .all(|(k, v)| key.key().labels().any(|l| l.key() == *k && l.value() == *v))
            })
            .map(|(_, value)| match value {
                DebugValue::Counter(count) => *count,
                _ => 0,
            })
            .sum()
    }

    /// Value of gauge `name`, if recorded.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(key, _)| key.key().name() == name)
            .and_then(|(_, value)| match value {
                DebugValue::Gauge(value) => Some(value.into_inner()),
                _ => None,
            })
    }
}
