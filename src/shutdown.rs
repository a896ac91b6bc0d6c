//! The process-wide cancellation signal.
//!
//! One `Shutdown` is created at boot and cloned into every worker. Firing it
//! is permanent. Workers observe it in one of three ways:
//!
//!  * mio poll loops register a readiness handle with `register` and get
//!    woken on the `constants::SYSTEM` token,
//!  * sleepers use `wait_timeout`, which returns early on cancellation,
//!  * busy loops check `is_cancelled`.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct State {
    cancelled: bool,
    wakers: Vec<mio::SetReadiness>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    cvar: Condvar,
}

impl Inner {
    fn lock(&self) -> MutexGuard<State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A clonable, fire-once cancellation signal.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    /// Create a signal that has not fired.
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    /// Fire the signal. Every waiter and registered poller is woken. Calling
    /// this more than once is harmless.
    pub fn cancel(&self) {
        let wakers = {
            let mut state = self.inner.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            ::std::mem::replace(&mut state.wakers, Vec::new())
        };
        self.inner.cvar.notify_all();
        for waker in wakers {
            if let Err(e) = waker.set_readiness(mio::Ready::readable()) {
                warn!("unable to wake poller for shutdown: {}", e);
            }
        }
    }

    /// Has the signal fired?
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Sleep up to `timeout`. Returns true if the signal fired, possibly
    /// before the timeout elapsed.
    ///
    /// A timeout too large to represent as an `Instant` waits for the signal
    /// alone.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.lock();
        loop {
            if state.cancelled {
                return true;
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    match self.inner.cvar.wait_timeout(state, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.inner.cvar.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }

    /// Sleep until `deadline`, see `wait_timeout`.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if deadline <= now {
            return self.is_cancelled();
        }
        self.wait_timeout(deadline - now)
    }

    /// Register with `poll` under `token` so the poll loop wakes when the
    /// signal fires. The returned registration must be kept alive for as
    /// long as the poll loop runs. If the signal has already fired the
    /// registration is readable immediately.
    pub fn register(
        &self,
        poll: &mio::Poll,
        token: mio::Token,
    ) -> io::Result<mio::Registration> {
        let (registration, readiness) = mio::Registration::new2();
        poll.register(
            &registration,
            token,
            mio::Ready::readable(),
            mio::PollOpt::edge(),
        )?;
        let mut state = self.inner.lock();
        if state.cancelled {
            readiness.set_readiness(mio::Ready::readable())?;
        } else {
            state.wakers.push(readiness);
        }
        Ok(registration)
    }
}
