use crate::metric::Metric;
use crate::sink::{render_insert, Sink, SubmissionError};

/// Configuration for the console sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Table named in the rendered statements.
    pub table: String,
}

impl Default for ConsoleConfig {
    fn default() -> ConsoleConfig {
        ConsoleConfig {
            table: "metrics".to_string(),
        }
    }
}

/// Log each insert statement instead of running it. Used for dry runs when
/// no ClickHouse sink is configured. Never fails.
pub struct Console {
    table: String,
    written: usize,
}

impl Console {
    /// Create a new Console.
    pub fn new(config: ConsoleConfig) -> Console {
        Console {
            table: config.table,
            written: 0,
        }
    }

    /// Metrics written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Sink for Console {
    fn write(&mut self, metric: &Metric) -> Result<(), SubmissionError> {
        info!("{}", render_insert(&self.table, metric));
        self.written += 1;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), SubmissionError> {
        Ok(())
    }

    fn close(&mut self) {
        debug!("console sink closed after {} metrics", self.written);
    }
}
