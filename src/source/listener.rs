use crate::constants;
use crate::metric::Metric;
use crate::mpsc;
use crate::protocols::wire;
use crate::ratelimit::ErrorLimiter;
use crate::shutdown::Shutdown;
use crate::source::{Source, TransportError};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// Configuration for the UDP listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// The host to bind to. Every address it resolves to is bound.
    pub host: String,
    /// The port to listen on. Zero picks a free port per address.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> ListenerConfig {
        ListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 55678,
        }
    }
}

/// The UDP endpoint for the binary push protocol.
///
/// Each datagram is one frame. Good frames are enqueued, bad ones are logged
/// through an `ErrorLimiter` and skipped.
pub struct Listener {
    sockets: Vec<mio::net::UdpSocket>,
    errors: ErrorLimiter,
}

impl Listener {
    /// Resolve the configured host and bind a socket on every address.
    pub fn bind(config: &ListenerConfig) -> Result<Listener, TransportError> {
        let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: config.host.clone(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                host: config.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
            });
        }

        let mut sockets = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let socket = mio::net::UdpSocket::bind(&addr)
                .map_err(|source| TransportError::Bind { addr, source })?;
            sockets.push(socket);
        }
        Ok(Listener {
            sockets,
            errors: ErrorLimiter::new("listener"),
        })
    }

    /// The addresses actually bound, useful when the configured port is 0.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets
            .iter()
            .filter_map(|s| s.local_addr().ok())
            .collect()
    }

    /// Decode and forward one frame. Returns false if the queue is gone.
    fn handle_frame(&mut self, frame: &[u8], chan: &mpsc::Sender<Metric>) -> bool {
        if frame.len() == constants::MAX_FRAME_SIZE {
            warn!(
                "frame of {} bytes filled the read buffer, it may be truncated",
                frame.len()
            );
        }
        match wire::decode(frame) {
            Ok(metric) => {
                self.errors.reset();
                if chan.send(metric).is_err() {
                    info!("ingestion queue closed, listener stopping");
                    return false;
                }
            }
            Err(e) => {
                self.errors
                    .report(format_args!("{} ({} bytes received)", e, frame.len()));
            }
        }
        true
    }
}

impl Source for Listener {
    fn run(&mut self, chan: mpsc::Sender<Metric>, shutdown: Shutdown) -> Result<(), TransportError> {
        let poll = mio::Poll::new()?;
        for (i, socket) in self.sockets.iter().enumerate() {
            poll.register(
                socket,
                mio::Token(i),
                mio::Ready::readable(),
                mio::PollOpt::edge(),
            )?;
        }
        let _shutdown = shutdown.register(&poll, constants::SYSTEM)?;
        for addr in self.local_addrs() {
            info!("listener started on {}", addr);
        }

        let mut buf = vec![0; constants::MAX_FRAME_SIZE];
        let mut events = mio::Events::with_capacity(1024);
        loop {
            match poll.poll(&mut events, None) {
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Poll(e)),
            }
            for event in events.iter() {
                let idx = match event.token() {
                    constants::SYSTEM => {
                        info!("listener shutting down");
                        return Ok(());
                    }
                    mio::Token(idx) => idx,
                };
                // edge triggered, so drain until the socket would block
                loop {
                    let received = match self.sockets.get(idx) {
                        Some(socket) => socket.recv_from(&mut buf),
                        None => break,
                    };
                    let len = match received {
                        Ok((len, _)) => len,
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(source) => {
                            let addr = self.sockets[idx]
                                .local_addr()
                                .unwrap_or_else(|_| ([0, 0, 0, 0], 0).into());
                            return Err(TransportError::Read { addr, source });
                        }
                    };
                    if !self.handle_frame(&buf[..len], &chan) {
                        return Ok(());
                    }
                    if shutdown.is_cancelled() {
                        info!("listener shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}
