//! Composite logger fanning records out to several sinks.
//!
//! # Example
//!
//! ```rust
//! use logtap::{MultiLogger, TracingLogger};
//!
//! let logger = MultiLogger::new()
//!     .with(TracingLogger);
//!
//! // Use with the adapter
//! // let adapter = Adapter::new(config, logger);
//! ```

use std::sync::Arc;
use tracing::Level;

use crate::logger::Logger;
use crate::types::LogRecord;

/// A logger that delegates every record to multiple inner loggers, in insertion order.
///
/// Each inner logger receives its own copy of the record.
#[derive(Clone, Default)]
pub struct MultiLogger {
    loggers: Vec<Arc<dyn Logger>>,
}

impl MultiLogger {
    /// Create a new empty MultiLogger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logger to the chain. Returns self for builder pattern.
    pub fn with<L: Logger>(mut self, logger: L) -> Self {
        self.loggers.push(Arc::new(logger));
        self
    }

    /// Returns true if no loggers have been added.
    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }

    /// Returns the number of loggers in the chain.
    pub fn len(&self) -> usize {
        self.loggers.len()
    }
}

impl Logger for MultiLogger {
    fn log(&self, level: Level, record: LogRecord) {
        let Some((last, rest)) = self.loggers.split_last() else {
            return;
        };
        for logger in rest {
            logger.log(level, record.clone());
        }
        last.log(level, record);
    }
}
