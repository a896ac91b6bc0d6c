use crate::metric::Metric;
use crate::sink::{FailurePolicy, Sink, SubmissionError};
use crate::time;
use hyper::header::Headers;
use hyper::Client;
use std::io::Read;
use std::time::Duration;
use url::Url;

/// Configuration for the ClickHouse sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseConfig {
    /// Host of the HTTP interface.
    pub host: String,
    /// Port of the HTTP interface.
    pub port: u16,
    /// Database holding `table`.
    pub database: String,
    /// Table metrics are inserted into.
    pub table: String,
    /// User to authenticate as.
    pub username: String,
    /// Password for `username`.
    pub password: String,
    /// Rows older than this many days are expired by the table's TTL.
    pub ttl_days: u32,
    /// What to do after a failed insert.
    pub on_error: FailurePolicy,
    /// Ceiling on the reconnect backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> ClickHouseConfig {
        ClickHouseConfig {
            host: "localhost".to_string(),
            port: 8123,
            database: "default".to_string(),
            table: "metrics".to_string(),
            username: "default".to_string(),
            password: String::new(),
            ttl_days: 15,
            on_error: FailurePolicy::default(),
            max_backoff_ms: time::DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl ClickHouseConfig {
    /// The root of the HTTP interface.
    pub fn endpoint(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}:{}/", self.host, self.port))
    }
}

/// Ships metrics to ClickHouse over its HTTP interface, one async insert per
/// metric.
pub struct ClickHouse {
    config: ClickHouseConfig,
    endpoint: Url,
    client: Option<Client>,
}

impl ClickHouse {
    /// Open a connection and check the server answers.
    pub fn connect(config: ClickHouseConfig) -> Result<ClickHouse, SubmissionError> {
        let endpoint = config.endpoint().map_err(hyper::Error::from)?;
        let mut ch = ClickHouse {
            config,
            endpoint,
            client: None,
        };
        ch.reconnect()?;
        Ok(ch)
    }

    /// Create the metrics table if it does not exist yet. Runs synchronously.
    pub fn migrate(&mut self) -> Result<(), SubmissionError> {
        let sql = create_table(&self.config.table, self.config.ttl_days);
        self.execute(&sql, &[])
    }

    fn authenticated(&self) -> Headers {
        let mut headers = Headers::new();
        headers.set_raw(
            "X-ClickHouse-User",
            vec![self.config.username.as_bytes().to_vec()],
        );
        headers.set_raw(
            "X-ClickHouse-Key",
            vec![self.config.password.as_bytes().to_vec()],
        );
        headers
    }

    fn execute(&self, sql: &str, settings: &[(&str, &str)]) -> Result<(), SubmissionError> {
        let client = self.client.as_ref().ok_or(SubmissionError::Closed)?;
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("database", &self.config.database);
            for &(key, value) in settings {
                query.append_pair(key, value);
            }
        }
        let res = client
            .post(url)
            .headers(self.authenticated())
            .body(sql)
            .send()?;
        check(res)
    }
}

fn check(mut res: hyper::client::Response) -> Result<(), SubmissionError> {
    if res.status.is_success() {
        return Ok(());
    }
    let mut body = String::new();
    if let Err(e) = res.read_to_string(&mut body) {
        body = format!("<unreadable body: {}>", e);
    }
    Err(SubmissionError::Rejected {
        status: res.status.to_u16(),
        body: body.trim().to_string(),
    })
}

impl Sink for ClickHouse {
    fn write(&mut self, metric: &Metric) -> Result<(), SubmissionError> {
        let sql = render_insert(&self.config.table, metric);
        self.execute(
            &sql,
            &[("async_insert", "1"), ("wait_for_async_insert", "0")],
        )
    }

    fn reconnect(&mut self) -> Result<(), SubmissionError> {
        let mut client = Client::new();
        client.set_read_timeout(Some(Duration::from_secs(30)));
        client.set_write_timeout(Some(Duration::from_secs(30)));

        let mut ping = self.endpoint.clone();
        ping.set_path("/ping");
        check(client.get(ping).headers(self.authenticated()).send()?)?;
        self.client = Some(client);
        Ok(())
    }

    fn close(&mut self) {
        self.client = None;
    }
}

/// The DDL for the metrics table.
pub fn create_table(table: &str, ttl_days: u32) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}
(
    timestamp DateTime('UTC') CODEC(Delta, ZSTD),
    metric LowCardinality(String),
    value Int64,
    tag1 String,
    tag2 String,
    tag3 String
)
ENGINE = MergeTree
ORDER BY (metric, timestamp)
TTL timestamp + INTERVAL {} DAY",
        table, ttl_days
    )
}

/// Render `metric` as a single-row insert into `table`.
///
/// # Examples
///
/// ```
/// use siphon::metric::Metric;
/// use siphon::sink::render_insert;
///
/// let m = Metric::new("cpu", 42)
///     .timestamp_secs(1_700_000_000)
///     .tags(vec!["host1"]);
///
/// assert_eq!(
///     "INSERT INTO metrics VALUES(1700000000,'cpu',42,'host1','','')",
///     render_insert("metrics", &m)
/// );
/// ```
pub fn render_insert(table: &str, metric: &Metric) -> String {
    format!(
        "INSERT INTO {} VALUES({},'{}',{},'{}','{}','{}')",
        table,
        metric.timestamp.timestamp(),
        escape(&metric.name),
        metric.value,
        escape(&metric.tag1),
        escape(&metric.tag2),
        escape(&metric.tag3),
    )
}

/// Escape a value for a single quoted string literal.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out
}
