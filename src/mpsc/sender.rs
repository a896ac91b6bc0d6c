use std::fmt;
use std::sync::Arc;

use super::Shared;

/// The item could not be sent because the `Receiver` is gone. The item is
/// handed back.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SendError { .. }")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("sending on a closed queue")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// The 'send' side of a bounded mpsc, similar to
/// [`std::sync::mpsc::SyncSender`](https://doc.rust-lang.org/std/sync/mpsc/struct.SyncSender.html).
///
/// Producers must not hold a lock the consumer needs while calling `send`;
/// it may block for as long as the queue stays full.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    pub(super) fn new(shared: Arc<Shared<T>>) -> Sender<T> {
        Sender { shared }
    }

    /// Push `item` onto the back of the queue, blocking while the queue is
    /// full.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        let mut queue = self.shared.lock();
        loop {
            if !queue.receiver_alive {
                return Err(SendError(item));
            }
            if queue.items.len() < queue.capacity {
                break;
            }
            queue = match self.shared.not_full.wait(queue) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        queue.items.push_back(item);
        drop(queue);
        self.shared.not_empty.notify_one();
        Ok(())
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Sender<T> {
        self.shared.lock().senders += 1;
        Sender::new(Arc::clone(&self.shared))
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let last = {
            let mut queue = self.shared.lock();
            queue.senders -= 1;
            queue.senders == 0
        };
        if last {
            self.shared.not_empty.notify_all();
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Sender { .. }")
    }
}
