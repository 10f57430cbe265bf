use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Observer hooked into an [`Event`] by a pool wait object.
///
/// `on_signal` must not call back into the event it is registered with: the
/// event lock may be held while observers are notified.
pub(crate) trait WaitObserver: Send + Sync {
    /// Offers the signal to the observer. Returns `true` when the observer
    /// was still armed and consumed it.
    fn on_signal(&self) -> bool;

    /// Identity used to unregister the observer.
    fn token(&self) -> u64;
}

struct EventState {
    signaled: bool,
    registrations: Vec<Arc<dyn WaitObserver>>,
}

/// A waitable event in the manual/auto-reset style.
///
/// An auto-reset event releases exactly one waiter per signal and stays
/// signaled when nobody is waiting; a manual-reset event releases everybody
/// and stays signaled until [`reset`](Event::reset). Threads block on
/// [`wait`](Event::wait)/[`wait_timeout`](Event::wait_timeout); pool wait
/// objects subscribe through the registration hooks instead of blocking.
pub struct Event {
    manual_reset: bool,
    state: Mutex<EventState>,
    cv: Condvar,
}

impl Event {
    fn new(manual_reset: bool) -> Self {
        Self {
            manual_reset,
            state: Mutex::new(EventState {
                signaled: false,
                registrations: Vec::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Creates an unsignaled auto-reset event.
    pub fn auto() -> Self {
        Self::new(false)
    }

    /// Creates an unsignaled manual-reset event.
    pub fn manual() -> Self {
        Self::new(true)
    }

    /// Signals the event.
    pub fn set(&self) {
        let mut state = self.lock();

        if self.manual_reset {
            state.signaled = true;
            let registrations = std::mem::take(&mut state.registrations);
            self.cv.notify_all();
            drop(state);

            for registration in registrations {
                registration.on_signal();
            }
            return;
        }

        // Auto-reset: hand the signal to the first registration that is
        // still armed; stale entries are discarded on the way.
        while !state.registrations.is_empty() {
            let registration = state.registrations.remove(0);
            if registration.on_signal() {
                return;
            }
        }

        state.signaled = true;
        self.cv.notify_one();
    }

    /// Returns the event to the unsignaled state.
    pub fn reset(&self) {
        self.lock().signaled = false;
    }

    /// Blocks until the event is signaled.
    pub fn wait(&self) {
        let mut state = self.lock();
        loop {
            if state.signaled {
                if !self.manual_reset {
                    state.signaled = false;
                }
                return;
            }
            state = self
                .cv
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Blocks until the event is signaled or `timeout` elapses. Returns
    /// `true` when the event was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.signaled {
                if !self.manual_reset {
                    state.signaled = false;
                }
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let (guard, _) = self
                .cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }
    }

    /// Subscribes an observer. A signaled event delivers immediately.
    pub(crate) fn register(&self, registration: Arc<dyn WaitObserver>) {
        let mut state = self.lock();
        if state.signaled {
            if !self.manual_reset {
                state.signaled = false;
            }
            drop(state);
            registration.on_signal();
            return;
        }
        state.registrations.push(registration);
    }

    /// Removes an observer by token, if still subscribed.
    pub(crate) fn unregister(&self, token: u64) {
        self.lock().registrations.retain(|r| r.token() != token);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EventState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Event")
            .field("manual_reset", &self.manual_reset)
            .field("signaled", &state.signaled)
            .field("registrations", &state.registrations.len())
            .finish()
    }
}
