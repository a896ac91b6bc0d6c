#![deny(missing_docs)]
//! bounded multi-producer, single-consumer
//!
//! This module provides a bounded, in-memory version of the rust standard
//! [mpsc](https://doc.rust-lang.org/std/sync/mpsc/) built for the ingestion
//! path. Producers (the listener, the pollers) push with `Sender::send`, the
//! one sink thread pulls with `Receiver::recv` or `Receiver::recv_timeout`.
//!
//! # Inside Baseball
//!
//! The bound is the whole story. A `Sender` that finds the queue full blocks
//! until the consumer has made room; nothing is ever dropped or reordered on
//! the way in. That blocking is the agent's only flow control, and the bound
//! is what keeps a slow sink from growing memory without limit.
//!
//! Items come out in the order they went in. Two producers racing each other
//! interleave freely, but each producer's own items stay in order.
//!
//! When the `Receiver` goes away, blocked and future sends fail with
//! `SendError`, handing the item back. When every `Sender` is gone and the
//! queue is drained, `recv` returns `None`.
mod receiver;
mod sender;

pub use self::receiver::{Receiver, RecvTimeoutError, TryRecvError};
pub use self::sender::{SendError, Sender};

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// PRIVATE -- the state shared by every `Sender` and the `Receiver`
#[derive(Debug)]
struct Queue<T> {
    items: VecDeque<T>,
    capacity: usize,
    senders: usize,
    receiver_alive: bool,
}

/// PRIVATE -- exposed via `Sender` and `Receiver`
#[derive(Debug)]
struct Shared<T> {
    queue: Mutex<Queue<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> Shared<T> {
    /// Lock the queue, ignoring poison. No code path panics while holding the
    /// lock with the queue half-updated.
    fn lock(&self) -> MutexGuard<Queue<T>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Create a (Sender, Receiver) pair in a like fashion to [`std::sync::mpsc::sync_channel`](https://doc.rust-lang.org/std/sync/mpsc/fn.sync_channel.html)
///
/// The queue holds at most `capacity` items, which must be at least one. The
/// Sender is clonable.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "mpsc capacity must be at least one");
    let shared = Arc::new(Shared {
        queue: Mutex::new(Queue {
            items: VecDeque::with_capacity(capacity),
            capacity,
            senders: 1,
            receiver_alive: true,
        }),
        not_full: Condvar::new(),
        not_empty: Condvar::new(),
    });
    (Sender::new(Arc::clone(&shared)), Receiver::new(shared))
}
