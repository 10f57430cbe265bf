//! The work slot: one native object serving an entire submission queue.
//!
//! Each `submit` schedules exactly one trampoline invocation on the band.
//! Cancellation bumps the slot generation so dispatched-but-unstarted
//! invocations retire without running, then waits for in-flight ones.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{PoolError, Result};

use super::pool::Environment;
use super::{Activity, Instance, NativeObject};

pub(crate) struct WorkSlot {
    env: Arc<Environment>,
    trampoline: Arc<dyn Fn(&Instance) + Send + Sync>,
    activity: Arc<Activity>,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl WorkSlot {
    pub(crate) fn create(
        env: Arc<Environment>,
        trampoline: Arc<dyn Fn(&Instance) + Send + Sync>,
    ) -> Arc<Self> {
        let slot = Arc::new(Self {
            env,
            trampoline,
            activity: Activity::new(),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        slot.env.adopt(Arc::downgrade(&slot) as Weak<dyn NativeObject>);
        slot
    }

    /// Schedules one trampoline invocation.
    pub(crate) fn submit(self: &Arc<Self>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Native {
                code: -1,
                message: "work object is closed".to_string(),
            });
        }

        let guard = self.activity.begin();
        let generation = self.generation.load(Ordering::Acquire);
        let weak = Arc::downgrade(self);

        self.env.dispatch(Box::new(move |instance: &Instance| {
            if let Some(slot) = weak.upgrade() {
                if slot.generation.load(Ordering::Acquire) == generation {
                    instance.install_activity(guard);
                    (slot.trampoline)(instance);
                    return;
                }
            }
            // Stale or orphaned dispatch: dropping the guard retires it.
        }))
    }

    /// Waits until no invocation is pending or running. With `cancel`,
    /// unstarted invocations are discarded instead of run.
    pub(crate) fn wait(&self, cancel: bool) {
        if cancel {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.activity.wait_idle();
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wait(true);
    }
}

impl NativeObject for WorkSlot {
    fn close(&self) {
        WorkSlot::close(self);
    }
}
