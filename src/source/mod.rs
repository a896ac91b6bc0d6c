//! Producers feeding the ingestion queue.
//!
//! A source runs on its own thread until the shutdown signal fires, pushing
//! every metric it makes onto the queue with a blocking `send`.
use crate::metric::Metric;
use crate::mpsc;
use crate::shutdown::Shutdown;
use std::io;
use std::net::SocketAddr;

pub mod fpm;
mod listener;

pub use self::fpm::{Fpm, FpmConfig};
pub use self::listener::{Listener, ListenerConfig};

/// A failure that ends a source.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host did not resolve, or resolved to nothing.
    #[error("unable to resolve {host}: {source}")]
    Resolve {
        /// The configured host.
        host: String,
        /// Underlying cause.
        source: io::Error,
    },
    /// A socket could not be bound.
    #[error("unable to bind {addr}: {source}")]
    Bind {
        /// The address we tried.
        addr: SocketAddr,
        /// Underlying cause.
        source: io::Error,
    },
    /// Reading from a bound socket failed.
    #[error("unable to read from {addr}: {source}")]
    Read {
        /// The socket's local address.
        addr: SocketAddr,
        /// Underlying cause.
        source: io::Error,
    },
    /// The poll loop itself failed.
    #[error("poll failed: {0}")]
    Poll(#[from] io::Error),
}

/// A producer of metrics.
pub trait Source {
    /// Produce into `chan` until `shutdown` fires, the queue's receiver goes
    /// away or a fatal error occurs. Blocks the calling thread.
    fn run(&mut self, chan: mpsc::Sender<Metric>, shutdown: Shutdown) -> Result<(), TransportError>;
}
