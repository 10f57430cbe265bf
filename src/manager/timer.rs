//! The timer manager: one-shot and periodic deadline callbacks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::callback::TimerCallback;
use crate::error::Result;
use crate::native::pool::Environment;
use crate::native::timer::TimerSlot;
use crate::native::{self, Instance};
use crate::time::{self, NativeTicks};

use super::{ManagerCore, ObjectContext, ObjectKind};

pub(crate) struct TimerKind;

pub(crate) struct TimerParams {
    /// First-fire offset as a negated relative tick quantity.
    first_fire_ticks: NativeTicks,
    /// Fire period in milliseconds; zero means one-shot.
    period_ms: u64,
}

impl ObjectKind for TimerKind {
    type Slot = TimerSlot;
    type Params = TimerParams;
    type Datum = ();
    type Callback = TimerCallback;

    const KIND: &'static str = "TimerManager";

    fn arm(slot: &Arc<TimerSlot>, params: &TimerParams) {
        let first_fire = time::relative_duration(params.first_fire_ticks);
        let period = if params.period_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(params.period_ms))
        };
        slot.set(Some((first_fire, period)));
    }

    fn one_shot(params: &TimerParams) -> bool {
        params.period_ms == 0
    }

    fn invoke(callback: &mut TimerCallback, instance: &Instance, _datum: ()) {
        callback.invoke(instance);
    }
}

pub(crate) struct TimerManager {
    env: Arc<Environment>,
    core: Arc<ManagerCore<TimerKind>>,
}

impl TimerManager {
    pub(crate) fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            core: ManagerCore::new(),
        }
    }

    /// Submits a timer firing `timeout` from now, then every `period`
    /// (zero-period timers fire once and are torn down by the completion).
    pub(crate) fn submit(
        &self,
        timeout: Duration,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<u64> {
        let params = TimerParams {
            first_fire_ticks: time::as_relative(timeout),
            period_ms: period.as_millis() as u64,
        };

        let id = native::next_id();
        let trampoline = self.core.trampoline(id);
        let slot = TimerSlot::create(
            self.env.clone(),
            Arc::new(move |instance: &Instance| trampoline(instance, ())),
        );
        let context = ObjectContext::new(slot, params, callback);
        self.core.install(id, context);
        Ok(id)
    }

    /// Deadline form: fires when the steady clock reaches `deadline`, with
    /// past deadlines clamped to fire immediately.
    pub(crate) fn submit_at(
        &self,
        deadline: Instant,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<u64> {
        self.submit(time::until_deadline(deadline), period, callback)
    }

    pub(crate) fn replace(&self, id: u64, callback: TimerCallback) -> Result<u64> {
        self.core.replace(id, callback)?;
        Ok(id)
    }

    pub(crate) fn cancel(&self, id: u64) {
        self.core.cancel(id);
    }

    pub(crate) fn cancel_all(&self) {
        self.core.cancel_all();
    }

    pub(crate) fn count(&self) -> usize {
        self.core.count()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
