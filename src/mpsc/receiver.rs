use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Shared;

/// Returned by `Receiver::try_recv`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvError {
    /// Nothing queued right now.
    Empty,
    /// Nothing queued and every `Sender` is gone.
    Disconnected,
}

/// Returned by `Receiver::recv_timeout`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvTimeoutError {
    /// Nothing arrived before the timeout.
    Timeout,
    /// Nothing queued and every `Sender` is gone.
    Disconnected,
}

/// The 'receive' side of a bounded mpsc, similar to
/// [`std::sync::mpsc::Receiver`](https://doc.rust-lang.org/std/sync/mpsc/struct.Receiver.html).
///
/// There is exactly one `Receiver` per queue; it is not clonable.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    pub(super) fn new(shared: Arc<Shared<T>>) -> Receiver<T> {
        Receiver { shared }
    }

    /// Pop the front of the queue, blocking while it is empty. Returns `None`
    /// once the queue is drained and every `Sender` is gone.
    pub fn recv(&mut self) -> Option<T> {
        let mut queue = self.shared.lock();
        loop {
            if let Some(item) = queue.items.pop_front() {
                drop(queue);
                self.shared.not_full.notify_one();
                return Some(item);
            }
            if queue.senders == 0 {
                return None;
            }
            queue = match self.shared.not_empty.wait(queue) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Like `recv` but gives up after `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.lock();
        loop {
            if let Some(item) = queue.items.pop_front() {
                drop(queue);
                self.shared.not_full.notify_one();
                return Ok(item);
            }
            if queue.senders == 0 {
                return Err(RecvTimeoutError::Disconnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }
            queue = match self.shared.not_empty.wait_timeout(queue, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Pop the front of the queue without blocking.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let mut queue = self.shared.lock();
        match queue.items.pop_front() {
            Some(item) => {
                drop(queue);
                self.shared.not_full.notify_one();
                Ok(item)
            }
            None if queue.senders == 0 => Err(TryRecvError::Disconnected),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Number of items waiting.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bound this queue was created with.
    pub fn capacity(&self) -> usize {
        self.shared.lock().capacity
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared.lock().receiver_alive = false;
        self.shared.not_full.notify_all();
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Receiver { .. }")
    }
}
