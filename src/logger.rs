//! Log sinks.
//!
//! The engine hands every record to a [`Logger`]. [`TracingLogger`] is the default sink and
//! emits each record as a `tracing` event, so records end up wherever the application's
//! subscriber sends them.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn, Level};

use crate::types::{LogRecord, LogTag};

/// Destination for log records.
///
/// Implementations must be cheap and must not block: hooks call them inline on the request path.
///
/// # Examples
///
/// ```rust
/// use logtap::{LogRecord, Logger};
/// use tracing::Level;
///
/// struct StdoutLogger;
///
/// impl Logger for StdoutLogger {
///     fn log(&self, level: Level, record: LogRecord) {
///         println!("{level} {}", serde_json::Value::Object(record));
///     }
/// }
/// ```
pub trait Logger: Send + Sync + 'static {
    /// Emit `record` at `level`.
    fn log(&self, level: Level, record: LogRecord);

    fn info(&self, record: LogRecord) {
        self.log(Level::INFO, record);
    }

    fn error(&self, record: LogRecord) {
        self.log(Level::ERROR, record);
    }
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn log(&self, level: Level, record: LogRecord) {
        (**self).log(level, record);
    }
}

/// Emits records as `tracing` events with target `logtap`.
///
/// The record is serialized to JSON in the `record` field and its tag is repeated in `log_tag`
/// so subscribers can filter without parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, record: LogRecord) {
        let tag = record_tag(&record).unwrap_or_default().to_owned();
        let record = Value::Object(record);

        match level {
            Level::ERROR => error!(target: "logtap", log_tag = %tag, record = %record, "{}", tag),
            Level::WARN => warn!(target: "logtap", log_tag = %tag, record = %record, "{}", tag),
            Level::INFO => info!(target: "logtap", log_tag = %tag, record = %record, "{}", tag),
            Level::DEBUG => debug!(target: "logtap", log_tag = %tag, record = %record, "{}", tag),
            _ => trace!(target: "logtap", log_tag = %tag, record = %record, "{}", tag),
        }
    }
}

/// The tag of a record; error records carry it under `params`.
pub fn record_tag(record: &LogRecord) -> Option<&str> {
    record
        .get(LogTag::FIELD)
        .or_else(|| record.get("params").and_then(|p| p.get(LogTag::FIELD)))
        .and_then(Value::as_str)
}
