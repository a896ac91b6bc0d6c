//! Run a piece of work on a fixed period until shutdown.
//!
//! Every tick hands the work to a fresh thread and goes straight back to
//! waiting for the next tick, so a slow or hung invocation never holds up the
//! schedule. Invocations may therefore overlap; work must either tolerate
//! running alongside itself or be scheduled with `Overlap::Skip`.
//!
//! Ticks missed because the scheduler thread was starved are dropped rather
//! than fired back to back. Once the shutdown signal fires no further ticks
//! are dispatched. Invocations already running are left alone.

use crate::shutdown::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What to do with a tick while the previous invocation is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// Run it anyway. Invocations may pile up behind a hung endpoint.
    Allow,
    /// Skip the tick.
    Skip,
}

impl Default for Overlap {
    fn default() -> Overlap {
        Overlap::Allow
    }
}

/// Clears the in-flight flag when the invocation finishes, panics included.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Call `work` once every `interval`, each call on its own thread, until
/// `shutdown` fires. Blocks the calling thread.
///
/// `interval` must be greater than zero; configuration is expected to have
/// rejected anything else.
pub fn repeat_every<F>(interval: Duration, work: F, shutdown: &Shutdown)
where
    F: Fn() + Send + Sync + 'static,
{
    repeat_every_with(interval, Overlap::Allow, work, shutdown)
}

/// `repeat_every`, choosing what happens when ticks overlap.
pub fn repeat_every_with<F>(interval: Duration, overlap: Overlap, work: F, shutdown: &Shutdown)
where
    F: Fn() + Send + Sync + 'static,
{
    debug_assert!(interval > Duration::from_millis(0));
    let work = Arc::new(work);
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut next = match Instant::now().checked_add(interval) {
        Some(next) => next,
        None => {
            warn!("interval of {:?} never elapses, nothing scheduled", interval);
            shutdown.wait_timeout(interval);
            return;
        }
    };
    loop {
        if shutdown.wait_until(next) {
            return;
        }
        dispatch(overlap, &work, &in_flight);

        let now = Instant::now();
        let due = match next.checked_add(interval) {
            // we fell behind; drop the missed ticks
            Some(due) if due <= now => now.checked_add(interval),
            due => due,
        };
        next = match due {
            Some(due) => due,
            None => {
                shutdown.wait_timeout(interval);
                return;
            }
        };
    }
}

fn dispatch<F>(overlap: Overlap, work: &Arc<F>, in_flight: &Arc<AtomicBool>)
where
    F: Fn() + Send + Sync + 'static,
{
    let guard = match overlap {
        Overlap::Allow => None,
        Overlap::Skip => {
            if in_flight.swap(true, Ordering::AcqRel) {
                debug!("previous tick still running, skipping");
                return;
            }
            Some(InFlight(Arc::clone(in_flight)))
        }
    };
    let work = Arc::clone(work);
    let spawned = thread::Builder::new().spawn(move || {
        let _guard = guard;
        work();
    });
    if let Err(e) = spawned {
        error!("unable to spawn scheduled work: {}", e);
    }
}
