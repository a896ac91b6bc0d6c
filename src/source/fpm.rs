//! Poll PHP-FPM's process status page.
//!
//! FPM answers `GET <status path>?json` with a flat JSON object describing
//! one pool. Every tick that object is fetched and turned into seven
//! metrics, all tagged with the pool name. A failed tick is logged with the
//! target URL and skipped; the next tick proceeds on schedule.
//!
//! See <https://www.php.net/manual/en/fpm.status.php>.

use crate::metric::Metric;
use crate::mpsc;
use crate::scheduler::{self, Overlap};
use crate::shutdown::Shutdown;
use crate::source::{Source, TransportError};
use chrono::{DateTime, Utc};
use std::io::{self, Read};
use std::time::Duration;
use url::Url;

/// The subset of the FPM status page siphon reports on. Unknown fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FpmStatus {
    /// The name of the process pool.
    pub pool: String,
    /// Connections accepted since the pool started.
    #[serde(rename = "accepted conn")]
    pub accepted_conn: i64,
    /// Requests waiting for a free process.
    #[serde(rename = "listen queue")]
    pub listen_queue: i64,
    /// The longest the listen queue has been.
    #[serde(rename = "max listen queue")]
    pub max_listen_queue: i64,
    /// The most processes ever active at once.
    #[serde(rename = "max active processes")]
    pub max_active_processes: i64,
    /// Processes waiting for a request.
    #[serde(rename = "idle processes")]
    pub idle_processes: i64,
    /// Processes serving a request.
    #[serde(rename = "active processes")]
    pub active_processes: i64,
    /// Requests that hit `request_slowlog_timeout`.
    #[serde(rename = "slow requests")]
    pub slow_requests: i64,
}

/// Why a tick produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The request never got an answer.
    #[error("unable to get FPM stats: {0}")]
    Http(#[from] hyper::Error),
    /// The endpoint answered with something other than 2xx.
    #[error("FPM stats returned status {0}")]
    Status(hyper::status::StatusCode),
    /// The response body could not be read.
    #[error("unable to read body of FPM stats: {0}")]
    Io(#[from] io::Error),
    /// The body is not the JSON we expect.
    #[error("unable to parse FPM stats: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for one FPM poller.
#[derive(Debug, Clone, PartialEq)]
pub struct FpmConfig {
    /// The poller's name, used in logs and thread names.
    pub name: String,
    /// The status page, without the `?json` query.
    pub url: Url,
    /// Time between ticks. Never zero.
    pub interval: Duration,
    /// What to do with a tick while the last one is still in flight.
    pub overlap: Overlap,
}

/// Fetch and parse the status page at `url`.
pub fn poll_status(url: &Url) -> Result<FpmStatus, PollError> {
    let mut target = url.clone();
    target.set_query(Some("json"));

    let client = hyper::Client::new();
    let mut res = client.get(target).send()?;
    if !res.status.is_success() {
        return Err(PollError::Status(res.status));
    }
    let mut body = String::new();
    res.read_to_string(&mut body)?;
    Ok(serde_json::from_str(&body)?)
}

/// Map one status reading to metrics stamped `now`.
///
/// # Examples
///
/// ```
/// use siphon::source::fpm::{to_metrics, FpmStatus};
///
/// let status = FpmStatus {
///     pool: "www".to_string(),
///     accepted_conn: 100,
///     listen_queue: 2,
///     max_listen_queue: 5,
///     max_active_processes: 8,
///     idle_processes: 3,
///     active_processes: 4,
///     slow_requests: 1,
/// };
/// let metrics = to_metrics(&status, siphon::time::now());
///
/// assert_eq!(7, metrics.len());
/// assert!(metrics.iter().all(|m| m.tag1 == "www"));
/// ```
pub fn to_metrics(status: &FpmStatus, now: DateTime<Utc>) -> Vec<Metric> {
    let readings = [
        ("fpm_accepted_total", status.accepted_conn),
        ("fpm_slow", status.slow_requests),
        ("fpm_idle", status.idle_processes),
        ("fpm_active", status.active_processes),
        ("fpm_active_max", status.max_active_processes),
        ("fpm_queue", status.listen_queue),
        ("fpm_queue_max", status.max_listen_queue),
    ];
    readings
        .iter()
        .map(|&(name, value)| {
            Metric::new(name, value)
                .timestamp(now)
                .tags(Some(status.pool.as_str()))
        })
        .collect()
}

/// A scheduled FPM poller.
pub struct Fpm {
    config: FpmConfig,
}

impl Fpm {
    /// Create a new poller.
    pub fn new(config: FpmConfig) -> Fpm {
        Fpm { config }
    }

    /// Poll once and enqueue the result. Errors are logged and the tick is
    /// dropped.
    pub fn tick(url: &Url, chan: &mpsc::Sender<Metric>) {
        let status = match poll_status(url) {
            Ok(status) => status,
            Err(e) => {
                error!("[fpm {}] {}", url, e);
                return;
            }
        };
        for m in to_metrics(&status, crate::time::now()) {
            if chan.send(m).is_err() {
                debug!("[fpm {}] ingestion queue closed", url);
                return;
            }
        }
    }
}

impl Source for Fpm {
    fn run(&mut self, chan: mpsc::Sender<Metric>, shutdown: Shutdown) -> Result<(), TransportError> {
        info!(
            "fpm poller {} started on {} every {:?}",
            self.config.name, self.config.url, self.config.interval
        );
        let url = self.config.url.clone();
        scheduler::repeat_every_with(
            self.config.interval,
            self.config.overlap,
            move || Fpm::tick(&url, &chan),
            &shutdown,
        );
        info!("fpm poller {} shutting down", self.config.name);
        Ok(())
    }
}
