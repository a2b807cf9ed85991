use super::{EventReceiver, Kvs};
use crate::error::StmtError;
use std::sync::Mutex;
use std::time::Duration;

/// A receiver that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventReceiver;

impl EventReceiver for NullEventReceiver {}

/// One entry recorded by [`RecordingEventReceiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Event {
        name: String,
        kvs: Vec<(String, String)>,
    },
    Error {
        name: String,
        error: String,
        kvs: Vec<(String, String)>,
    },
    Timing {
        name: String,
        elapsed: Duration,
        kvs: Vec<(String, String)>,
    },
}

impl RecordedEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Event { name, .. } | Self::Error { name, .. } | Self::Timing { name, .. } => {
                name
            }
        }
    }
}

/// A receiver that keeps every event in memory, in arrival order.
///
/// Useful for asserting on transaction lifecycles and for lightweight auditing.
#[derive(Debug, Default)]
pub struct RecordingEventReceiver {
    entries: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    /// Names of plain events, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Event { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(name, error message)` of every error event, in order.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Error { name, error, .. } => Some((name.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Names of timing events, in order.
    pub fn timing_names(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Timing { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        // A poisoned log is still a valid log.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn push(&self, entry: RecordedEvent) {
        self.lock().push(entry);
    }
}

fn owned_kvs(kvs: Kvs<'_>) -> Vec<(String, String)> {
    kvs.iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

impl EventReceiver for RecordingEventReceiver {
    fn event_kv(&self, name: &str, kvs: Kvs<'_>) {
        self.push(RecordedEvent::Event {
            name: name.to_string(),
            kvs: owned_kvs(kvs),
        });
    }

    fn event_err_kv(&self, name: &str, err: StmtError, kvs: Kvs<'_>) -> StmtError {
        self.push(RecordedEvent::Error {
            name: name.to_string(),
            error: err.to_string(),
            kvs: owned_kvs(kvs),
        });
        err
    }

    fn timing_kv(&self, name: &str, elapsed: Duration, kvs: Kvs<'_>) {
        self.push(RecordedEvent::Timing {
            name: name.to_string(),
            elapsed,
            kvs: owned_kvs(kvs),
        });
    }
}
