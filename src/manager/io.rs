//! The I/O manager: callbacks fired by overlapped transfer completions.

use std::sync::Arc;

use crate::callback::{IoCallback, IoData};
use crate::error::Result;
use crate::native::io::{IoSlot, OverlappedFile};
use crate::native::pool::Environment;
use crate::native::{self, Instance};

use super::{ManagerCore, ObjectContext, ObjectKind};

pub(crate) struct IoKind;

/// The native object is bound to the file at creation; per-completion data
/// arrives on the completion record, so nothing is stored here.
pub(crate) struct IoParams;

impl ObjectKind for IoKind {
    type Slot = IoSlot;
    type Params = IoParams;
    type Datum = IoData;
    type Callback = IoCallback;

    const KIND: &'static str = "IoManager";

    fn arm(slot: &Arc<IoSlot>, _params: &IoParams) {
        slot.start();
    }

    fn one_shot(_params: &IoParams) -> bool {
        true
    }

    fn invoke(callback: &mut IoCallback, instance: &Instance, datum: IoData) {
        callback.invoke(instance, datum);
    }
}

pub(crate) struct IoManager {
    env: Arc<Environment>,
    core: Arc<ManagerCore<IoKind>>,
}

impl IoManager {
    pub(crate) fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            core: ManagerCore::new(),
        }
    }

    /// Binds an I/O callback to `file` and arms it for one transfer.
    pub(crate) fn submit(&self, file: &OverlappedFile, callback: IoCallback) -> Result<u64> {
        let id = native::next_id();
        let slot = IoSlot::create(
            self.env.clone(),
            file.port(),
            Arc::new(self.core.trampoline(id)),
        );
        let context = ObjectContext::new(slot, IoParams, callback);
        self.core.install(id, context);
        Ok(id)
    }

    pub(crate) fn cancel(&self, id: u64) {
        self.core.cancel(id);
    }

    /// Releases an armed object whose transfer never went pending: the
    /// expectation is withdrawn before the regular close, since no
    /// completion will ever balance it. The withdrawal rides the same
    /// detach a plain cancel performs, so a racing cancel cannot strand
    /// it.
    pub(crate) fn abort(&self, id: u64) {
        self.core
            .cancel_with(id, |context| context.slot.cancel_pending());
    }

    pub(crate) fn cancel_all(&self) {
        self.core.cancel_all();
    }

    pub(crate) fn count(&self) -> usize {
        self.core.count()
    }
}

impl Drop for IoManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
