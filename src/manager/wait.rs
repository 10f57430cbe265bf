//! The wait manager: callbacks fired when a waitable event is signaled or a
//! timeout elapses first.

use std::sync::Arc;
use std::time::Duration;

use crate::callback::{WaitCallback, WaitResult};
use crate::error::Result;
use crate::native::pool::Environment;
use crate::native::wait::WaitSlot;
use crate::native::{self, Instance};
use crate::sync::Event;
use crate::time::{self, NativeTicks};

use super::{ManagerCore, ObjectContext, ObjectKind};

pub(crate) struct WaitKind;

pub(crate) struct WaitParams {
    event: Arc<Event>,
    /// Negated relative timeout in native ticks; absent means infinite.
    timeout_ticks: Option<NativeTicks>,
}

impl ObjectKind for WaitKind {
    type Slot = WaitSlot;
    type Params = WaitParams;
    type Datum = WaitResult;
    type Callback = WaitCallback;

    const KIND: &'static str = "WaitManager";

    fn arm(slot: &Arc<WaitSlot>, params: &WaitParams) {
        let timeout = params.timeout_ticks.map(time::relative_duration);
        slot.set(Some((params.event.clone(), timeout)));
    }

    fn one_shot(_params: &WaitParams) -> bool {
        true
    }

    fn invoke(callback: &mut WaitCallback, instance: &Instance, datum: WaitResult) {
        callback.invoke(instance, datum);
    }
}

pub(crate) struct WaitManager {
    env: Arc<Environment>,
    core: Arc<ManagerCore<WaitKind>>,
}

impl WaitManager {
    pub(crate) fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            core: ManagerCore::new(),
        }
    }

    /// Submits a wait on `event`. A `timeout` of `None` never expires; a
    /// timeout whose tick count saturates is treated the same way.
    pub(crate) fn submit(
        &self,
        event: Arc<Event>,
        timeout: Option<Duration>,
        callback: WaitCallback,
    ) -> Result<u64> {
        let timeout_ticks = match timeout {
            None => None,
            Some(duration) => {
                let ticks = time::to_ticks(duration);
                if ticks == time::INFINITE {
                    None
                } else {
                    Some(time::negate(ticks))
                }
            }
        };

        let id = native::next_id();
        let slot = WaitSlot::create(self.env.clone(), Arc::new(self.core.trampoline(id)));
        let context = ObjectContext::new(
            slot,
            WaitParams {
                event,
                timeout_ticks,
            },
            callback,
        );
        self.core.install(id, context);
        Ok(id)
    }

    pub(crate) fn replace(&self, id: u64, callback: WaitCallback) -> Result<u64> {
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

impl Drop for WaitManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
