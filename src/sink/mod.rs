//! The consuming end of the pipeline.
//!
//! Exactly one sink drains the ingestion queue. Every metric is rendered and
//! submitted on its own; batching is left to the backend's async insert
//! buffer. A failed submission loses that metric. What happens next is the
//! `FailurePolicy`.
use crate::metric::Metric;
use crate::mpsc;
use crate::ratelimit::ErrorLimiter;
use crate::shutdown::Shutdown;
use crate::time;
use std::time::Duration;

mod clickhouse;
mod console;

pub use self::clickhouse::{create_table, render_insert, ClickHouse, ClickHouseConfig};
pub use self::console::{Console, ConsoleConfig};

/// How often an idle sink checks for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// What the sink does after a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Close the connection and stop consuming for good. The process is
    /// expected to exit and be restarted by its supervisor.
    Stop,
    /// Close the connection, reconnect with backoff and carry on.
    Continue,
}

impl Default for FailurePolicy {
    fn default() -> FailurePolicy {
        FailurePolicy::Continue
    }
}

/// A failed submission. Only submission is checked; whatever the backend
/// does with the row afterwards is not observed.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The backend answered but refused the request.
    #[error("backend rejected request with {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Whatever the backend said about it.
        body: String,
    },
    /// The request never got an answer.
    #[error("transport failure: {0}")]
    Transport(#[from] hyper::Error),
    /// There is no open connection.
    #[error("connection is closed")]
    Closed,
}

/// Why `Sink::run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The shutdown signal fired.
    Cancelled,
    /// A submission failed under `FailurePolicy::Stop`.
    Failed,
    /// Every producer went away and the queue is drained.
    Disconnected,
}

/// A 'sink' is a sink for metrics.
pub trait Sink {
    /// Submit one metric.
    fn write(&mut self, metric: &Metric) -> Result<(), SubmissionError>;

    /// Open a fresh connection, replacing any closed one.
    fn reconnect(&mut self) -> Result<(), SubmissionError>;

    /// Close the connection. Writes fail with `Closed` until `reconnect`.
    fn close(&mut self);

    /// Consume `recv` until shutdown, a fatal failure or disconnection.
    fn run(
        &mut self,
        mut recv: mpsc::Receiver<Metric>,
        policy: FailurePolicy,
        max_backoff_ms: u64,
        shutdown: &Shutdown,
    ) -> Exit {
        let mut errors = ErrorLimiter::new("sink");
        // consecutive failures, so backoff keeps growing while the backend
        // accepts connections but rejects inserts
        let mut failures: u32 = 0;
        loop {
            if shutdown.is_cancelled() {
                return cancel(self, &recv);
            }
            let metric = match recv.recv_timeout(IDLE_POLL) {
                Ok(metric) => metric,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    // producers also stop on shutdown
                    if shutdown.is_cancelled() {
                        return cancel(self, &recv);
                    }
                    info!("all producers gone, sink stopping");
                    self.close();
                    return Exit::Disconnected;
                }
            };
            match self.write(&metric) {
                Ok(()) => {
                    errors.reset();
                    failures = 0;
                }
                Err(e) => match policy {
                    FailurePolicy::Stop => {
                        error!("unable to insert {}: {}, sink stopping", metric.name, e);
                        self.close();
                        return Exit::Failed;
                    }
                    FailurePolicy::Continue => {
                        errors.report(format_args!("unable to insert {}: {}", metric.name, e));
                        self.close();
                        failures = failures.saturating_add(1);
                        if !reconnect(self, &mut errors, &mut failures, max_backoff_ms, shutdown) {
                            return cancel(self, &recv);
                        }
                    }
                },
            }
        }
    }
}

/// Reconnect with capped exponential backoff. `failures` counts consecutive
/// failures, writes and reconnects alike, and grows with every refused
/// reconnect. Returns false if shutdown fired first.
fn reconnect<S>(
    sink: &mut S,
    errors: &mut ErrorLimiter,
    failures: &mut u32,
    max_backoff_ms: u64,
    shutdown: &Shutdown,
) -> bool
where
    S: Sink + ?Sized,
{
    loop {
        if shutdown.wait_timeout(time::backoff(*failures, max_backoff_ms)) {
            return false;
        }
        match sink.reconnect() {
            Ok(()) => {
                debug!("sink reconnected after {} consecutive failures", failures);
                return true;
            }
            Err(e) => {
                errors.report(format_args!("unable to reconnect: {}", e));
                *failures = failures.saturating_add(1);
            }
        }
    }
}

fn cancel<S>(sink: &mut S, recv: &mpsc::Receiver<Metric>) -> Exit
where
    S: Sink + ?Sized,
{
    let dropped = recv.len();
    sink.close();
    if dropped > 0 {
        warn!("sink cancelled, dropping {} queued metrics", dropped);
    } else {
        info!("sink cancelled");
    }
    Exit::Cancelled
}
