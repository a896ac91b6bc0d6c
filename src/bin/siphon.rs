#![allow(unknown_lints)]

#[macro_use]
extern crate log;

use chrono::Utc;
use siphon::config::{self, Args};
use siphon::metric::Metric;
use siphon::mpsc;
use siphon::shutdown::Shutdown;
use siphon::sink::{ClickHouse, Console, Exit, FailurePolicy, Sink};
use siphon::source::{Fpm, Listener, Source, TransportError};
use siphon::time;
use std::process;
use std::thread;

type SourceWorker = thread::JoinHandle<Result<(), TransportError>>;

fn setup_logging(verbose: u64) -> Result<(), log::SetLoggerError> {
    let level = match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("?"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .level_for("hyper", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()
}

fn spawn_sink<S>(
    name: &str,
    mut sink: S,
    recv: mpsc::Receiver<Metric>,
    policy: FailurePolicy,
    max_backoff_ms: u64,
    shutdown: Shutdown,
) -> thread::JoinHandle<Exit>
where
    S: Sink + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("sink-{}", name))
        .spawn(move || sink.run(recv, policy, max_backoff_ms, &shutdown));
    match spawned {
        Ok(handle) => handle,
        Err(e) => {
            error!("unable to start sink {}: {}", name, e);
            process::exit(1);
        }
    }
}

fn spawn_source<S>(
    name: String,
    mut source: S,
    chan: mpsc::Sender<Metric>,
    shutdown: Shutdown,
) -> (String, SourceWorker)
where
    S: Source + Send + 'static,
{
    let thr_name = name.clone();
    let spawned = thread::Builder::new()
        .name(format!("source-{}", name))
        .spawn(move || {
            let res = source.run(chan, shutdown);
            if let Err(ref e) = res {
                error!("source {} stopped: {}", thr_name, e);
            }
            res
        });
    match spawned {
        Ok(handle) => (name, handle),
        Err(e) => {
            error!("unable to start source {}: {}", name, e);
            process::exit(1);
        }
    }
}

fn start_sink(args: &Args, recv: mpsc::Receiver<Metric>, shutdown: &Shutdown) -> thread::JoinHandle<Exit> {
    match args.clickhouse {
        Some(ref config) => {
            let mut ch = match ClickHouse::connect(config.clone()) {
                Ok(ch) => ch,
                Err(e) => {
                    error!("unable to connect to clickhouse at {}:{}: {}", config.host, config.port, e);
                    process::exit(1);
                }
            };
            if let Err(e) = ch.migrate() {
                error!("unable to migrate clickhouse table {}: {}", config.table, e);
                process::exit(1);
            }
            info!("shipping to clickhouse at {}:{}", config.host, config.port);
            spawn_sink(
                "clickhouse",
                ch,
                recv,
                config.on_error,
                config.max_backoff_ms,
                shutdown.clone(),
            )
        }
        None => {
            let console = Console::new(args.console.clone().unwrap_or_default());
            info!("no clickhouse sink configured, logging inserts to the console");
            spawn_sink(
                "console",
                console,
                recv,
                FailurePolicy::default(),
                time::DEFAULT_MAX_BACKOFF_MS,
                shutdown.clone(),
            )
        }
    }
}

fn start_sources(args: &Args, snd: &mpsc::Sender<Metric>, shutdown: &Shutdown) -> Vec<(String, SourceWorker)> {
    let mut sources = Vec::new();

    if let Some(ref config) = args.udp {
        let listener = match Listener::bind(config) {
            Ok(listener) => listener,
            Err(e) => {
                error!("unable to start listener: {}", e);
                process::exit(1);
            }
        };
        sources.push(spawn_source(
            "udp".to_string(),
            listener,
            snd.clone(),
            shutdown.clone(),
        ));
    }

    for config in &args.fpms {
        sources.push(spawn_source(
            format!("fpm.{}", config.name),
            Fpm::new(config.clone()),
            snd.clone(),
            shutdown.clone(),
        ));
    }

    if sources.is_empty() {
        warn!("no sources configured, nothing to ship");
    }
    sources
}

fn main() {
    let signal = chan_signal::notify(&[chan_signal::Signal::INT, chan_signal::Signal::TERM]);

    let args = match config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("siphon: {}", e);
            process::exit(2);
        }
    };
    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("siphon: could not set up logging: {}", e);
        process::exit(1);
    }
    info!("siphon - {}", args.version);

    let shutdown = Shutdown::new();
    let (snd, recv) = mpsc::channel(args.queue_capacity);

    let sink = start_sink(&args, recv, &shutdown);
    let sources = start_sources(&args, &snd, &shutdown);
    drop(snd);

    let thr_shutdown = shutdown.clone();
    thread::spawn(move || {
        if let Some(sig) = signal.recv() {
            info!("received {:?}, shutting down", sig);
        }
        thr_shutdown.cancel();
    });

    let exit = match sink.join() {
        Ok(exit) => exit,
        Err(_) => {
            error!("sink thread panicked");
            Exit::Failed
        }
    };
    debug!("sink exited: {:?}", exit);

    // the sink is gone; wind the producers down
    shutdown.cancel();
    let mut source_failed = false;
    for (name, worker) in sources {
        match worker.join() {
            Ok(Ok(())) => debug!("source {} stopped", name),
            Ok(Err(_)) => source_failed = true,
            Err(_) => {
                error!("source {} panicked", name);
                source_failed = true;
            }
        }
    }

    match exit {
        Exit::Failed => process::exit(1),
        Exit::Disconnected if source_failed => process::exit(1),
        Exit::Cancelled | Exit::Disconnected => {}
    }
}
