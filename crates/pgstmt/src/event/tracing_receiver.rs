use super::{EventReceiver, Kvs, truncate_sql_bytes};
use crate::error::StmtError;
use std::time::Duration;
use tracing::Level;

/// A `tracing`-based receiver.
///
/// Events go out on target `pgstmt.event`: plain events at `DEBUG`, errors at
/// [`TracingEventReceiver::error_level`], timings at `DEBUG` (or `WARN` above the slow
/// threshold). A `sql` key/value is truncated to `max_sql_length`.
///
/// Enable via the crate feature: `pgstmt = { features = ["tracing"] }`.
#[derive(Debug, Clone)]
pub struct TracingEventReceiver {
    /// Level for error events.
    pub error_level: Level,
    /// Timings above this duration are logged at `WARN`.
    pub slow_threshold: Option<Duration>,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingEventReceiver {
    fn default() -> Self {
        Self {
            error_level: Level::ERROR,
            slow_threshold: None,
            max_sql_length: Some(200),
        }
    }
}

impl TracingEventReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the level used for error events.
    pub fn error_level(mut self, level: Level) -> Self {
        self.error_level = level;
        self
    }

    /// Log timings slower than `threshold` at `WARN`.
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn render_kvs(&self, kvs: Kvs<'_>) -> String {
        let mut out = String::new();
        for (i, (k, v)) in kvs.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(k);
            out.push('=');
            match self.max_sql_length {
                Some(max) if *k == "sql" && v.len() > max => {
                    out.push_str(truncate_sql_bytes(v, max));
                    out.push_str("...");
                }
                _ => out.push_str(v),
            }
        }
        out
    }
}

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            _ => tracing::trace!($($field)*),
        }
    };
}

impl EventReceiver for TracingEventReceiver {
    fn event_kv(&self, name: &str, kvs: Kvs<'_>) {
        let kvs = self.render_kvs(kvs);
        tracing::debug!(target: "pgstmt.event", event = name, kvs = %kvs);
    }

    fn event_err_kv(&self, name: &str, err: StmtError, kvs: Kvs<'_>) -> StmtError {
        let kvs = self.render_kvs(kvs);
        emit_at_level!(
            self.error_level,
            target: "pgstmt.event",
            event = name,
            error = %err,
            kvs = %kvs,
        );
        err
    }

    fn timing_kv(&self, name: &str, elapsed: Duration, kvs: Kvs<'_>) {
        let kvs = self.render_kvs(kvs);
        let elapsed_us = elapsed.as_micros() as u64;
        match self.slow_threshold {
            Some(threshold) if elapsed > threshold => tracing::warn!(
                target: "pgstmt.event",
                event = name,
                elapsed_us,
                slow = true,
                kvs = %kvs,
            ),
            _ => tracing::debug!(target: "pgstmt.event", event = name, elapsed_us, kvs = %kvs),
        }
    }
}
