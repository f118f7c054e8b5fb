//! Relay records to a background task.
//!
//! [`BackgroundLogger`] takes records off the request path: `log` only pushes onto an unbounded
//! channel, and a spawned Tokio task drains it into the wrapped sink.

use tokio::sync::mpsc;
use tracing::{debug, error, Level};

use crate::logger::Logger;
use crate::types::LogRecord;

#[derive(Debug)]
struct LogEvent {
    level: Level,
    record: LogRecord,
}

/// Logger that forwards records to another logger running on a background task.
///
/// Records are delivered in the order they were logged. Must be created inside a Tokio runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use logtap::{BackgroundLogger, TracingLogger};
///
/// # #[tokio::main]
/// # async fn main() {
/// // Spawns the task that feeds TracingLogger
/// let logger = BackgroundLogger::spawn(TracingLogger);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackgroundLogger {
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl BackgroundLogger {
    /// Spawn the relay task feeding `sink`.
    pub fn spawn<L: Logger>(sink: L) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.log(event.level, event.record);
            }
            debug!("Log relay channel closed");
        });

        Self { tx }
    }
}

impl Logger for BackgroundLogger {
    fn log(&self, level: Level, record: LogRecord) {
        if let Err(e) = self.tx.send(LogEvent { level, record }) {
            error!(error = %e, "Failed to relay log record to background task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::testing::CapturingLogger;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_records_reach_sink_in_order() {
        let sink = CapturingLogger::default();
        let logger = BackgroundLogger::spawn(sink.clone());

        for n in 0..3 {
            let mut record = LogRecord::new();
            record.insert("n".into(), json!(n));
            logger.info(record);
        }

        let delivered = tokio::time::timeout(Duration::from_secs(1), async {
            while sink.len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(delivered.is_ok(), "records should be relayed");

        let order: Vec<_> = sink.records().into_iter().map(|(_, r)| r["n"].clone()).collect();
        assert_eq!(order, vec![json!(0), json!(1), json!(2)]);
    }
}
