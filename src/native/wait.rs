//! The wait slot: observes a waitable event, with an optional timeout.
//!
//! Arming subscribes a registration with the event and, when a timeout was
//! requested, schedules a deadline on the clock. Whichever source fires
//! first wins an atomic race and dispatches the trampoline with the
//! corresponding [`WaitResult`]; the loser finds the registration already
//! retired. Disarming cancels both sources.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::callback::WaitResult;
use crate::sync::{Event, WaitObserver};

use super::clock::clock;
use super::pool::Environment;
use super::{Activity, Instance, NativeObject, NativeSlot};

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// One arming of a wait slot, racing the event signal against the timeout.
pub(crate) struct WaitRegistration {
    token: u64,
    state: AtomicU8,
    slot: Weak<WaitSlot>,
    event: Weak<Event>,
    generation: u64,
    deadline: Mutex<Option<u64>>,
}

impl WaitRegistration {
    fn fire(&self, result: WaitResult, from_event: bool) -> bool {
        if self
            .state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(deadline) = self
            .deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            clock().cancel(deadline);
        }

        // When the timeout won the race the event still holds us; drop out
        // of its registration list. The signal path removes us itself (and
        // may hold the event lock right now).
        if !from_event {
            if let Some(event) = self.event.upgrade() {
                event.unregister(self.token);
            }
        }

        if let Some(slot) = self.slot.upgrade() {
            slot.complete(self.generation, result);
        }
        true
    }

    fn retire(&self) -> bool {
        let retired = self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if retired {
            if let Some(deadline) = self
                .deadline
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take()
            {
                clock().cancel(deadline);
            }
        }
        retired
    }
}

impl WaitObserver for WaitRegistration {
    fn on_signal(&self) -> bool {
        self.fire(WaitResult::Signaled, true)
    }

    fn token(&self) -> u64 {
        self.token
    }
}

struct ArmedWait {
    event: Arc<Event>,
    registration: Arc<WaitRegistration>,
}

pub(crate) struct WaitSlot {
    env: Arc<Environment>,
    trampoline: Arc<dyn Fn(&Instance, WaitResult) + Send + Sync>,
    activity: Arc<Activity>,
    generation: AtomicU64,
    armed: Mutex<Option<ArmedWait>>,
    closed: AtomicBool,
}

impl WaitSlot {
    pub(crate) fn create(
        env: Arc<Environment>,
        trampoline: Arc<dyn Fn(&Instance, WaitResult) + Send + Sync>,
    ) -> Arc<Self> {
        let slot = Arc::new(Self {
            env,
            trampoline,
            activity: Activity::new(),
            generation: AtomicU64::new(0),
            armed: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        slot.env.adopt(Arc::downgrade(&slot) as Weak<dyn NativeObject>);
        slot
    }

    /// Arms or disarms the wait. `None` cancels the pending arming;
    /// `Some((event, timeout))` subscribes to the event, with `None` as the
    /// timeout meaning an infinite wait.
    pub(crate) fn set(self: &Arc<Self>, target: Option<(Arc<Event>, Option<Duration>)>) {
        self.disarm_current();

        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let Some((event, timeout)) = target else {
            return;
        };

        let registration = Arc::new(WaitRegistration {
            token: super::next_id(),
            state: AtomicU8::new(ARMED),
            slot: Arc::downgrade(self),
            event: Arc::downgrade(&event),
            generation: self.generation.load(Ordering::Acquire),
            deadline: Mutex::new(None),
        });

        if let Some(timeout) = timeout {
            let deadline_registration = registration.clone();
            let deadline = clock().schedule(
                Instant::now() + timeout,
                Box::new(move || {
                    deadline_registration.fire(WaitResult::TimedOut, false);
                }),
            );
            *registration
                .deadline
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(deadline);
        }

        *self
            .armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ArmedWait {
            event: event.clone(),
            registration: registration.clone(),
        });

        // Registering last: an already-signaled event fires immediately.
        event.register(registration);
    }

    fn disarm_current(&self) {
        let previous = self
            .armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(armed) = previous {
            if armed.registration.retire() {
                armed.event.unregister(armed.registration.token);
            }
        }
    }

    /// Dispatches one completion, unless the arming it belongs to has been
    /// cancelled since.
    fn complete(self: &Arc<Self>, generation: u64, result: WaitResult) {
        if self.closed.load(Ordering::Acquire)
            || generation != self.generation.load(Ordering::Acquire)
        {
            return;
        }

        let guard = self.activity.begin();
        let weak = Arc::downgrade(self);

        let dispatched = self.env.dispatch(Box::new(move |instance: &Instance| {
            if let Some(slot) = weak.upgrade() {
                if slot.generation.load(Ordering::Acquire) == generation {
                    instance.install_activity(guard);
                    (slot.trampoline)(instance, result);
                    return;
                }
            }
            // Stale or orphaned dispatch: dropping the guard retires it.
        }));
        // A failed dispatch dropped the job together with its guard.
        let _ = dispatched;
    }
}

impl NativeSlot for WaitSlot {
    fn disarm(&self) {
        self.disarm_current();
    }

    fn quiesce(&self, cancel: bool) {
        if cancel {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.activity.wait_idle();
    }

    fn close(&self) {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.disarm_current();
        }
        self.quiesce(true);
    }
}

impl NativeObject for WaitSlot {
    fn close(&self) {
        NativeSlot::close(self);
    }
}
