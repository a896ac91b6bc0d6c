//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that
//! the server can consume and use as configuration data.

use crate::constants;
use crate::scheduler::Overlap;
use crate::sink::{ClickHouseConfig, ConsoleConfig, FailurePolicy};
use crate::source::{FpmConfig, ListenerConfig};
use clap::{App, Arg};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

/// Why a configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("unable to read {}: {}", .path.display(), .source)]
    Io {
        /// The config file.
        path: PathBuf,
        /// Underlying cause.
        source: io::Error,
    },
    /// The file is not TOML.
    #[error("unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A key holds a value siphon cannot use.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Longest accepted poll interval: one day.
const MAX_INTERVAL_SECS: i64 = 86_400;

/// Longest accepted reconnect backoff: one hour.
const MAX_BACKOFF_MS: i64 = 3_600_000;

fn invalid<K, R>(key: K, reason: R) -> ConfigError
where
    K: Into<String>,
    R: Into<String>,
{
    ConfigError::Invalid {
        key: key.into(),
        reason: reason.into(),
    }
}

/// Big configuration struct for the siphon executable
///
/// This struct is what we construct from parsing the siphon configuration. It
/// is not intended to be created by external clients. Please see
/// documentation on `parse_config_file` in this module for more details.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    /// The verbosity setting of siphon. The higher the value the more chatty
    /// siphon gets.
    pub verbose: u64,
    /// Siphon version string. This is set automatically.
    pub version: String,
    /// Bound on the ingestion queue.
    pub queue_capacity: usize,
    /// See `source::Listener` for more.
    pub udp: Option<ListenerConfig>,
    /// See `source::Fpm` for more. Sorted by name.
    pub fpms: Vec<FpmConfig>,
    /// See `sink::ClickHouse` for more.
    pub clickhouse: Option<ClickHouseConfig>,
    /// See `sink::Console` for more. Ignored when `clickhouse` is set.
    pub console: Option<ConsoleConfig>,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            verbose: 0,
            version: VERSION.unwrap_or("unknown").to_string(),
            queue_capacity: constants::QUEUE_CAPACITY,
            udp: None,
            fpms: Vec::new(),
            clickhouse: None,
            console: None,
        }
    }
}

/// Parse the command line, then the config file it names.
pub fn parse_args() -> Result<Args, ConfigError> {
    let args = App::new("siphon")
        .version(VERSION.unwrap_or("unknown"))
        .about("ships pushed and polled metrics to ClickHouse")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .required(true)
                .help("The config file to feed in.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let verb = args.occurrences_of("verbose");
    match args.value_of("config-file") {
        Some(filename) => load_config_file(filename, verb),
        // clap enforces `required`
        None => Err(invalid("--config", "missing")),
    }
}

/// Read and parse the config file at `path`.
pub fn load_config_file<P>(path: P, verbosity: u64) -> Result<Args, ConfigError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut buffer = String::new();
    File::open(path)
        .and_then(|mut fp| fp.read_to_string(&mut buffer))
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_config_file(&buffer, verbosity)
}

/// Parse a TOML config.
///
/// Every key is optional. At least one of `sinks.clickhouse` and
/// `sinks.console` must be present.
pub fn parse_config_file(buffer: &str, verbosity: u64) -> Result<Args, ConfigError> {
    let mut args = Args::default();
    let value: toml::Value = toml::from_str(buffer)?;

    args.verbose = verbosity;

    if let Some(cap) = value.get("queue-capacity") {
        args.queue_capacity = positive(cap, "queue-capacity")? as usize;
    }

    if let Some(sources) = value.get("sources") {
        let sources = table(sources, "sources")?;
        if let Some(udp) = sources.get("udp") {
            args.udp = Some(parse_udp(udp)?);
        }
        if let Some(fpms) = sources.get("fpm") {
            for (name, fpm) in table(fpms, "sources.fpm")? {
                args.fpms.push(parse_fpm(name, fpm)?);
            }
        }
    }

    if let Some(sinks) = value.get("sinks") {
        let sinks = table(sinks, "sinks")?;
        if let Some(ch) = sinks.get("clickhouse") {
            args.clickhouse = Some(parse_clickhouse(ch)?);
        }
        if let Some(console) = sinks.get("console") {
            args.console = Some(parse_console(console)?);
        }
    }
    if args.clickhouse.is_none() && args.console.is_none() {
        return Err(invalid(
            "sinks",
            "configure sinks.clickhouse or sinks.console",
        ));
    }

    Ok(args)
}

fn parse_udp(value: &toml::Value) -> Result<ListenerConfig, ConfigError> {
    let tbl = table(value, "sources.udp")?;
    let mut config = ListenerConfig::default();
    if let Some(host) = tbl.get("host") {
        config.host = string(host, "sources.udp.host")?;
    }
    if let Some(port) = tbl.get("port") {
        config.port = port_number(port, "sources.udp.port")?;
    }
    Ok(config)
}

fn parse_fpm(name: &str, value: &toml::Value) -> Result<FpmConfig, ConfigError> {
    let path = format!("sources.fpm.{}", name);
    let tbl = table(value, &path)?;

    let key = format!("{}.url", path);
    let raw = match tbl.get("url") {
        Some(url) => string(url, &key)?,
        None => return Err(invalid(key, "missing")),
    };
    let url = Url::parse(&raw).map_err(|e| invalid(key.as_str(), e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(key, "only http:// status pages are supported"));
    }

    let key = format!("{}.interval", path);
    let interval = match tbl.get("interval") {
        Some(interval) => bounded(interval, &key, MAX_INTERVAL_SECS)?,
        None => return Err(invalid(key, "missing")),
    };

    let key = format!("{}.overlap", path);
    let overlap = match tbl.get("overlap") {
        None => Overlap::default(),
        Some(overlap) => match string(overlap, &key)?.as_str() {
            "allow" => Overlap::Allow,
            "skip" => Overlap::Skip,
            other => {
                return Err(invalid(
                    key,
                    format!("expected \"allow\" or \"skip\", got {:?}", other),
                ))
            }
        },
    };

    Ok(FpmConfig {
        name: name.to_string(),
        url,
        interval: Duration::from_secs(interval as u64),
        overlap,
    })
}

fn parse_clickhouse(value: &toml::Value) -> Result<ClickHouseConfig, ConfigError> {
    let tbl = table(value, "sinks.clickhouse")?;
    let mut config = ClickHouseConfig::default();

    if let Some(host) = tbl.get("host") {
        config.host = string(host, "sinks.clickhouse.host")?;
    }
    if let Some(port) = tbl.get("port") {
        config.port = port_number(port, "sinks.clickhouse.port")?;
    }
    if let Some(database) = tbl.get("database") {
        config.database = string(database, "sinks.clickhouse.database")?;
    }
    if let Some(tbl_name) = tbl.get("table") {
        config.table = identifier(tbl_name, "sinks.clickhouse.table")?;
    }
    if let Some(username) = tbl.get("username") {
        config.username = string(username, "sinks.clickhouse.username")?;
    }
    if let Some(password) = tbl.get("password") {
        config.password = string(password, "sinks.clickhouse.password")?;
    }
    if let Some(ttl) = tbl.get("ttl-days") {
        let days = positive(ttl, "sinks.clickhouse.ttl-days")?;
        if days > i64::from(u32::max_value()) {
            return Err(invalid("sinks.clickhouse.ttl-days", "too large"));
        }
        config.ttl_days = days as u32;
    }
    if let Some(policy) = tbl.get("on-error") {
        config.on_error = match string(policy, "sinks.clickhouse.on-error")?.as_str() {
            "continue" => FailurePolicy::Continue,
            "stop" => FailurePolicy::Stop,
            other => {
                return Err(invalid(
                    "sinks.clickhouse.on-error",
                    format!("expected \"continue\" or \"stop\", got {:?}", other),
                ))
            }
        };
    }
    if let Some(backoff) = tbl.get("max-backoff-ms") {
        config.max_backoff_ms =
            bounded(backoff, "sinks.clickhouse.max-backoff-ms", MAX_BACKOFF_MS)? as u64;
    }

    config
        .endpoint()
        .map_err(|e| invalid("sinks.clickhouse.host", e.to_string()))?;
    Ok(config)
}

fn parse_console(value: &toml::Value) -> Result<ConsoleConfig, ConfigError> {
    let tbl = table(value, "sinks.console")?;
    let mut config = ConsoleConfig::default();
    if let Some(tbl_name) = tbl.get("table") {
        config.table = identifier(tbl_name, "sinks.console.table")?;
    }
    Ok(config)
}

fn table<'a>(value: &'a toml::Value, key: &str) -> Result<&'a toml::value::Table, ConfigError> {
    value.as_table().ok_or_else(|| invalid(key, "must be a table"))
}

fn string(value: &toml::Value, key: &str) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(key, "must be a string"))
}

/// An integer of at least one.
fn positive(value: &toml::Value, key: &str) -> Result<i64, ConfigError> {
    match value.as_integer() {
        Some(i) if i >= 1 => Ok(i),
        Some(i) => Err(invalid(key, format!("must be at least 1, got {}", i))),
        None => Err(invalid(key, "must be an integer")),
    }
}

/// An integer between one and `max`.
fn bounded(value: &toml::Value, key: &str, max: i64) -> Result<i64, ConfigError> {
    match positive(value, key)? {
        i if i <= max => Ok(i),
        i => Err(invalid(key, format!("must be at most {}, got {}", max, i))),
    }
}

fn port_number(value: &toml::Value, key: &str) -> Result<u16, ConfigError> {
    match value.as_integer() {
        Some(i) if i >= 0 && i <= i64::from(u16::max_value()) => Ok(i as u16),
        Some(i) => Err(invalid(key, format!("{} is not a port", i))),
        None => Err(invalid(key, "must be an integer")),
    }
}

/// Table names go into statements unquoted, so keep them plain.
fn identifier(value: &toml::Value, key: &str) -> Result<String, ConfigError> {
    let name = string(value, key)?;
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if plain {
        Ok(name)
    } else {
        Err(invalid(
            key,
            format!("{:?} is not a plain table name", name),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempdir::TempDir;

    fn invalid_key(res: Result<Args, ConfigError>) -> String {
        match res {
            Err(ConfigError::Invalid { key, .. }) => key,
            other => panic!("expected an invalid key, got {:?}", other),
        }
    }

    #[test]
    fn config_console_only_defaults() {
        let config = r#"
[sinks.console]
"#;
        let args = parse_config_file(config, 4).unwrap();

        assert_eq!(4, args.verbose);
        assert_eq!(1_000, args.queue_capacity);
        assert!(args.udp.is_none());
        assert!(args.fpms.is_empty());
        assert!(args.clickhouse.is_none());
        assert_eq!(Some(ConsoleConfig::default()), args.console);
    }

    #[test]
    fn config_no_sink_is_rejected() {
        let config = r#"
[sources.udp]
port = 55678
"#;
        assert_eq!("sinks", invalid_key(parse_config_file(config, 0)));
    }

    #[test]
    fn config_queue_capacity() {
        let config = r#"
queue-capacity = 10

[sinks.console]
"#;
        let args = parse_config_file(config, 0).unwrap();

        assert_eq!(10, args.queue_capacity);
    }

    #[test]
    fn config_queue_capacity_zero_is_rejected() {
        let config = r#"
queue-capacity = 0

[sinks.console]
"#;
        assert_eq!("queue-capacity", invalid_key(parse_config_file(config, 0)));
    }

    #[test]
    fn config_udp_source() {
        let config = r#"
[sources.udp]
host = "0.0.0.0"
port = 9999

[sinks.console]
"#;
        let args = parse_config_file(config, 0).unwrap();

        assert_eq!(
            Some(ListenerConfig {
                host: "0.0.0.0".to_string(),
                port: 9999,
            }),
            args.udp
        );
    }

    #[test]
    fn config_udp_source_defaults() {
        let config = r#"
[sources.udp]

[sinks.console]
"#;
        let args = parse_config_file(config, 0).unwrap();

        assert_eq!(Some(ListenerConfig::default()), args.udp);
    }

    #[test]
    fn config_udp_port_out_of_range() {
        let config = r#"
[sources.udp]
port = 70000

[sinks.console]
"#;
        assert_eq!(
            "sources.udp.port",
            invalid_key(parse_config_file(config, 0))
        );
    }

    #[test]
    fn config_fpm_sources() {
        let config = r#"
[sources.fpm.www]
url = "http://127.0.0.1:9000/status"
interval = 10

[sources.fpm.api]
url = "http://127.0.0.1:9001/status"
interval = 1
overlap = "skip"

[sinks.console]
"#;
        let args = parse_config_file(config, 0).unwrap();

        assert_eq!(2, args.fpms.len());
        let api = &args.fpms[0];
        assert_eq!("api", api.name);
        assert_eq!("http://127.0.0.1:9001/status", api.url.as_str());
        assert_eq!(Duration::from_secs(1), api.interval);
        assert_eq!(Overlap::Skip, api.overlap);

        let www = &args.fpms[1];
        assert_eq!("www", www.name);
        assert_eq!(Duration::from_secs(10), www.interval);
        assert_eq!(Overlap::Allow, www.overlap);
    }

    #[test]
    fn config_fpm_interval_below_one_is_rejected() {
        for interval in &["0", "-5"] {
            let config = format!(
                r#"
[sources.fpm.www]
url = "http://127.0.0.1:9000/status"
interval = {}

[sinks.console]
"#,
                interval
            );
            assert_eq!(
                "sources.fpm.www.interval",
                invalid_key(parse_config_file(&config, 0))
            );
        }
    }

    #[test]
    fn config_fpm_interval_too_large_is_rejected() {
        for interval in &["86401", "9223372036854775807"] {
            let config = format!(
                r#"
[sources.fpm.www]
url = "http://127.0.0.1:9000/status"
interval = {}

[sinks.console]
"#,
                interval
            );
            assert_eq!(
                "sources.fpm.www.interval",
                invalid_key(parse_config_file(&config, 0))
            );
        }
    }

    #[test]
    fn config_fpm_interval_of_a_day_is_accepted() {
        let config = r#"
[sources.fpm.www]
url = "http://127.0.0.1:9000/status"
interval = 86400

[sinks.console]
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(Duration::from_secs(86_400), args.fpms[0].interval);
    }

    #[test]
    fn config_fpm_requires_url_and_interval() {
        let no_url = r#"
[sources.fpm.www]
interval = 10

[sinks.console]
"#;
        assert_eq!(
            "sources.fpm.www.url",
            invalid_key(parse_config_file(no_url, 0))
        );

        let no_interval = r#"
[sources.fpm.www]
url = "http://127.0.0.1:9000/status"

[sinks.console]
"#;
        assert_eq!(
            "sources.fpm.www.interval",
            invalid_key(parse_config_file(no_interval, 0))
        );
    }

    #[test]
    fn config_fpm_bad_overlap() {
        let config = r#"
[sources.fpm.www]
url = "http://127.0.0.1:9000/status"
interval = 10
overlap = "sometimes"

[sinks.console]
"#;
        assert_eq!(
            "sources.fpm.www.overlap",
            invalid_key(parse_config_file(config, 0))
        );
    }

    #[test]
    fn config_clickhouse_sink() {
        let config = r#"
[sinks.clickhouse]
host = "ch.internal"
port = 18123
database = "telemetry"
table = "samples"
username = "agent"
password = "s3cret"
ttl-days = 30
on-error = "stop"
max-backoff-ms = 2000
"#;
        let args = parse_config_file(config, 0).unwrap();

        assert_eq!(
            Some(ClickHouseConfig {
                host: "ch.internal".to_string(),
                port: 18123,
                database: "telemetry".to_string(),
                table: "samples".to_string(),
                username: "agent".to_string(),
                password: "s3cret".to_string(),
                ttl_days: 30,
                on_error: FailurePolicy::Stop,
                max_backoff_ms: 2000,
            }),
            args.clickhouse
        );
    }

    #[test]
    fn config_clickhouse_sink_defaults() {
        let config = r#"
[sinks.clickhouse]
"#;
        let args = parse_config_file(config, 0).unwrap();
        let ch = args.clickhouse.unwrap();

        assert_eq!(ClickHouseConfig::default(), ch);
        assert_eq!(8123, ch.port);
        assert_eq!(15, ch.ttl_days);
        assert_eq!(FailurePolicy::Continue, ch.on_error);
        assert_eq!(500, ch.max_backoff_ms);
    }

    #[test]
    fn config_clickhouse_max_backoff_too_large_is_rejected() {
        let config = r#"
[sinks.clickhouse]
max-backoff-ms = 9223372036854775807
"#;
        assert_eq!(
            "sinks.clickhouse.max-backoff-ms",
            invalid_key(parse_config_file(config, 0))
        );
    }

    #[test]
    fn config_clickhouse_rejects_odd_table_names() {
        let config = r#"
[sinks.clickhouse]
table = "metrics; DROP TABLE metrics"
"#;
        assert_eq!(
            "sinks.clickhouse.table",
            invalid_key(parse_config_file(config, 0))
        );
    }

    #[test]
    fn config_clickhouse_bad_policy() {
        let config = r#"
[sinks.clickhouse]
on-error = "retry"
"#;
        assert_eq!(
            "sinks.clickhouse.on-error",
            invalid_key(parse_config_file(config, 0))
        );
    }

    #[test]
    fn config_wrong_type() {
        let config = r#"
[sinks.clickhouse]
port = "8123"
"#;
        assert_eq!(
            "sinks.clickhouse.port",
            invalid_key(parse_config_file(config, 0))
        );
    }

    #[test]
    fn config_not_toml() {
        match parse_config_file("this is = = not toml", 0) {
            Err(ConfigError::Parse(_)) => {}
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn load_config_from_disk() {
        let dir = TempDir::new("siphon").unwrap();
        let path = dir.path().join("siphon.toml");
        let mut fp = File::create(&path).unwrap();
        fp.write_all(b"queue-capacity = 7\n[sinks.console]\n").unwrap();
        drop(fp);

        let args = load_config_file(&path, 2).unwrap();

        assert_eq!(7, args.queue_capacity);
        assert_eq!(2, args.verbose);
    }

    #[test]
    fn load_missing_config_file() {
        let dir = TempDir::new("siphon").unwrap();

        match load_config_file(dir.path().join("absent.toml"), 0) {
            Err(ConfigError::Io { path, .. }) => assert!(path.ends_with("absent.toml")),
            other => panic!("expected an io error, got {:?}", other),
        }
    }
}
