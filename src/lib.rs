//! Siphon is a lightweight telemetry agent. Applications push metric samples
//! to it over a tiny binary UDP protocol, siphon polls PHP-FPM status pages on
//! a schedule, and everything is shipped to ClickHouse through its
//! asynchronous insert facility.
//!
//! The moving parts, leaves first:
//!
//!  * `metric::Metric`, the one record that flows through the pipeline.
//!  * `protocols::wire`, the decoder for pushed frames.
//!  * `scheduler`, which drives the pollers in `source::fpm`.
//!  * `mpsc`, the bounded queue that every producer pushes into. It is the
//!    agent's only backpressure.
//!  * `sink`, the single consumer draining the queue into ClickHouse.
//!  * `source::Listener`, the UDP endpoint.
//!
//! Delivery is best-effort. Nothing is retried, persisted or deduplicated.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, missing_docs, unstable_features, unused_import_braces)]
#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod constants;
pub mod metric;
pub mod mpsc;
pub mod protocols;
pub mod ratelimit;
pub mod scheduler;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod time;
