//! Wait primitives used by the transfer engine.
//!
//! Two event backends implement [`Signal`]:
//! - [`CondvarSignal`] parks the waiting thread on a condition variable
//! - [`PollSignal`] sleeps in fixed increments and polls an atomic flag, for
//!   targets without a scheduler that can wake a sleeper
//!
//! Both behave like a binary semaphore: any number of `signal` calls before a
//! wait collapse into one pending event, and a successful wait consumes it.
//! Waiters must recheck their condition after waking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default sleep increment of the polling backend
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Event notification between interrupt context and tasks.
pub trait Signal: Send + Sync {
    /// Marks the event pending and wakes one waiter. Never blocks for long,
    /// so it is safe to call from a driver callback.
    ///
    /// Returns true when a parked waiter was woken, which a cooperative
    /// scheduler can treat as a request to yield on interrupt return.
    fn signal(&self) -> bool;

    /// Waits until the event is pending or `timeout` expires. Consumes the
    /// pending event and returns true, or returns false on expiry.
    fn wait_timeout(&self, timeout: Duration) -> bool;
}

/// Selects the wait backend a port is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitBackend {
    #[default]
    Condvar,
    Poll { interval: Duration },
}

impl WaitBackend {
    pub fn poll() -> Self {
        WaitBackend::Poll {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub(crate) fn build(&self) -> Box<dyn Signal> {
        match *self {
            WaitBackend::Condvar => Box::new(CondvarSignal::new()),
            WaitBackend::Poll { interval } => Box::new(PollSignal::new(interval)),
        }
    }
}

#[derive(Debug, Default)]
struct EventState {
    pending: bool,
    waiters: usize,
}

/// Condition-variable backed event
#[derive(Debug, Default)]
pub struct CondvarSignal {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl CondvarSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Signal for CondvarSignal {
    fn signal(&self) -> bool {
        let mut state = self.lock();
        state.pending = true;
        let woke = state.waiters > 0;
        drop(state);
        self.cond.notify_one();
        woke
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        // A timeout past the end of the clock waits without a deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        state.waiters += 1;
        while !state.pending {
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.cond.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
        state.waiters -= 1;
        std::mem::take(&mut state.pending)
    }
}

/// Sleep-and-poll event for targets without a blocking scheduler
#[derive(Debug)]
pub struct PollSignal {
    pending: AtomicBool,
    interval: Duration,
}

impl PollSignal {
    pub fn new(interval: Duration) -> Self {
        Self {
            pending: AtomicBool::new(false),
            interval,
        }
    }
}

impl Signal for PollSignal {
    fn signal(&self) -> bool {
        self.pending.store(true, Ordering::Release);
        // Nobody is parked, there is nothing to yield to
        false
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut remaining = timeout;
        loop {
            if self.pending.swap(false, Ordering::AcqRel) {
                return true;
            }
            if remaining.is_zero() {
                return false;
            }
            let step = remaining.min(self.interval);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}

/// Mutex with a bounded acquire, guarding a port's send path.
///
/// `std::sync::Mutex` cannot time out, so the lock flag sits behind a
/// condition variable.
#[derive(Debug, Default)]
pub struct SendLock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl SendLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to take the lock, waiting at most `timeout`.
    /// A timeout too large to form a deadline waits until the lock is free.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<SendGuard<'_>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        while *locked {
            locked = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.released
                        .wait_timeout(locked, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .released
                    .wait(locked)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        *locked = true;
        Some(SendGuard { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unlock(&self) {
        *self.locked.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.released.notify_one();
    }
}

/// Held send lock; released on drop
#[derive(Debug)]
pub struct SendGuard<'a> {
    lock: &'a SendLock,
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
