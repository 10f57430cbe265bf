//! The timer slot: one-shot or periodic deadline fires.
//!
//! Arming schedules the first fire on the clock; a periodic timer
//! reschedules itself at `fire_time + period` before dispatching, so a slow
//! callback delays delivery (the context callback lock serializes
//! invocations) but not the schedule itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use super::clock::clock;
use super::pool::Environment;
use super::{Activity, Instance, NativeObject, NativeSlot};

struct ArmedTimer {
    clock_entry: u64,
}

pub(crate) struct TimerSlot {
    env: Arc<Environment>,
    trampoline: Arc<dyn Fn(&Instance) + Send + Sync>,
    activity: Arc<Activity>,
    generation: AtomicU64,
    armed: Mutex<Option<ArmedTimer>>,
    closed: AtomicBool,
}

impl TimerSlot {
    pub(crate) fn create(
        env: Arc<Environment>,
        trampoline: Arc<dyn Fn(&Instance) + Send + Sync>,
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

    /// Arms or disarms the timer. `None` cancels the pending fire;
    /// `Some((first_fire, period))` schedules the first fire relative to
    /// now, with `period` of `None` meaning one-shot.
    pub(crate) fn set(self: &Arc<Self>, schedule: Option<(Duration, Option<Duration>)>) {
        self.disarm_current();

        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let Some((first_fire, period)) = schedule else {
            return;
        };

        let generation = self.generation.load(Ordering::Acquire);
        let at = Instant::now() + first_fire;
        let entry = Self::schedule_fire(self, at, period, generation);
        *self
            .armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ArmedTimer { clock_entry: entry });
    }

    fn schedule_fire(
        slot: &Arc<Self>,
        at: Instant,
        period: Option<Duration>,
        generation: u64,
    ) -> u64 {
        let weak = Arc::downgrade(slot);
        clock().schedule(
            at,
            Box::new(move || {
                if let Some(slot) = weak.upgrade() {
                    slot.fire(at, period, generation);
                }
            }),
        )
    }

    fn fire(self: &Arc<Self>, fired_at: Instant, period: Option<Duration>, generation: u64) {
        if self.closed.load(Ordering::Acquire)
            || generation != self.generation.load(Ordering::Acquire)
        {
            return;
        }

        match period {
            Some(period) => {
                // Reschedule first so a cancelled slot can still drop the
                // entry through its armed state.
                let next = Self::schedule_fire(self, fired_at + period, Some(period), generation);
                let mut armed = self
                    .armed
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if armed.is_some() {
                    *armed = Some(ArmedTimer { clock_entry: next });
                } else {
                    // Disarmed while firing; the fresh entry must not live.
                    drop(armed);
                    clock().cancel(next);
                    return;
                }
            }
            None => {
                // One-shot: this fire consumes the arming.
                let _ = self
                    .armed
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take();
            }
        }

        let guard = self.activity.begin();
        let weak = Arc::downgrade(self);

        let dispatched = self.env.dispatch(Box::new(move |instance: &Instance| {
            if let Some(slot) = weak.upgrade() {
                if slot.generation.load(Ordering::Acquire) == generation {
                    instance.install_activity(guard);
                    (slot.trampoline)(instance);
                    return;
                }
            }
            // Stale or orphaned dispatch: dropping the guard retires it.
        }));
        let _ = dispatched;
    }

    fn disarm_current(&self) {
        let previous = self
            .armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(armed) = previous {
            clock().cancel(armed.clock_entry);
        }
    }
}

impl NativeSlot for TimerSlot {
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

impl NativeObject for TimerSlot {
    fn close(&self) {
        NativeSlot::close(self);
    }
}
