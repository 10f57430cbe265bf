//! Object managers: the typed layer between the facade and the native
//! slots.
//!
//! The map-based kinds (wait, timer, I/O) share [`ManagerCore`], a skeleton
//! parameterized over an [`ObjectKind`]: it owns the contexts keyed by slot
//! id, linearizes submit / cancel / replace against each other, and hosts
//! the completion trampoline with its one-shot cleanup path. The work
//! manager has a different shape (a queue feeding a single native object)
//! and lives in [`work`].

pub(crate) mod io;
pub(crate) mod queue;
pub(crate) mod timer;
pub(crate) mod wait;
pub(crate) mod work;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{PoolError, Result};
use crate::logging::{pool_trace, Severity};
use crate::native::{panic_message, Instance, NativeSlot};

/// The per-kind plumbing a [`ManagerCore`] is instantiated over.
pub(crate) trait ObjectKind: Send + Sync + Sized + 'static {
    /// Native slot type backing objects of this kind.
    type Slot: NativeSlot;
    /// Object parameters captured at submission and reused on re-arm.
    type Params: Send + Sync + 'static;
    /// Completion datum delivered to the callback.
    type Datum: Send + 'static;
    /// Callback wrapper type.
    type Callback: Send + 'static;

    /// Kind tag used in diagnostics.
    const KIND: &'static str;

    /// Arms the slot with the stored parameters. Must not fail: the context
    /// is already installed in the map when this runs.
    fn arm(slot: &Arc<Self::Slot>, params: &Self::Params);

    /// Whether a completed callback consumes the object.
    fn one_shot(params: &Self::Params) -> bool;

    /// Invokes the callback with the completion datum.
    fn invoke(callback: &mut Self::Callback, instance: &Instance, datum: Self::Datum);
}

/// A live submission: the native slot, the parameters it was armed with and
/// the (replaceable) callback wrapper.
pub(crate) struct ObjectContext<K: ObjectKind> {
    pub(crate) slot: Arc<K::Slot>,
    params: K::Params,
    callback: Mutex<K::Callback>,
}

impl<K: ObjectKind> ObjectContext<K> {
    pub(crate) fn new(slot: Arc<K::Slot>, params: K::Params, callback: K::Callback) -> Arc<Self> {
        Arc::new(Self {
            slot,
            params,
            callback: Mutex::new(callback),
        })
    }
}

/// Shared skeleton of the map-based managers.
pub(crate) struct ManagerCore<K: ObjectKind> {
    contexts: RwLock<HashMap<u64, Arc<ObjectContext<K>>>>,
}

impl<K: ObjectKind> ManagerCore<K> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            contexts: RwLock::new(HashMap::new()),
        })
    }

    /// Installs a context under its slot id and arms the slot. The writer
    /// lock linearizes this against cancel and cancel-all.
    pub(crate) fn install(&self, id: u64, context: Arc<ObjectContext<K>>) {
        let mut contexts = self
            .contexts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        contexts.insert(id, context.clone());
        K::arm(&context.slot, &context.params);
    }

    pub(crate) fn lookup(&self, id: u64) -> Option<Arc<ObjectContext<K>>> {
        self.contexts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    /// Cancels one object: detaches it from the map, then quiesces and
    /// closes the slot. After this returns no further callback for `id`
    /// starts and in-flight ones have drained.
    pub(crate) fn cancel(&self, id: u64) {
        self.cancel_with(id, |_| {});
    }

    /// Like [`cancel`](ManagerCore::cancel), running `before_close` on the
    /// detached context first. The detach is what resolves the context, so
    /// a racing cancel cannot slip in between resolution and close.
    pub(crate) fn cancel_with(&self, id: u64, before_close: impl FnOnce(&Arc<ObjectContext<K>>)) {
        let detached = self
            .contexts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);

        // Closing outside the map lock: an in-flight completion may need
        // the lock for its own removal while we wait for it to drain.
        if let Some(context) = detached {
            before_close(&context);
            context.slot.close();
        }
    }

    /// Cancels every object of this kind. Completions racing the teardown
    /// find the map already empty and skip self-removal.
    pub(crate) fn cancel_all(&self) {
        let detached: Vec<_> = {
            let mut contexts = self
                .contexts
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            contexts.drain().map(|(_, context)| context).collect()
        };

        for context in &detached {
            context.slot.close();
        }
    }

    /// Swaps the callback of a pending object and re-arms it with the
    /// parameters captured at submission, applied from now.
    ///
    /// Quiesces first: no callback started before the quiesce is observable
    /// after this returns, and the very next completion runs the new
    /// wrapper. Must not be called concurrently with itself for one id.
    pub(crate) fn replace(&self, id: u64, callback: K::Callback) -> Result<()> {
        let context = self.lookup(id).ok_or(PoolError::NotFound)?;

        context.slot.disarm();
        context.slot.quiesce(true);

        *context
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = callback;

        K::arm(&context.slot, &context.params);
        Ok(())
    }

    pub(crate) fn count(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Builds the completion trampoline for the object `id`.
    pub(crate) fn trampoline(
        self: &Arc<Self>,
        id: u64,
    ) -> impl Fn(&Instance, K::Datum) + Send + Sync + 'static {
        let weak = Arc::downgrade(self);
        move |instance: &Instance, datum: K::Datum| {
            if let Some(core) = weak.upgrade() {
                core.on_completion(id, instance, datum);
            }
        }
    }

    fn on_completion(self: &Arc<Self>, id: u64, instance: &Instance, datum: K::Datum) {
        let Some(context) = self.lookup(id) else {
            pool_trace!(
                Severity::Error,
                "[{}]: completion for unknown object {id}",
                K::KIND
            );
            return;
        };

        let outcome = {
            let mut callback = context
                .callback
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            panic::catch_unwind(AssertUnwindSafe(|| {
                K::invoke(&mut callback, instance, datum)
            }))
        };

        if let Err(payload) = outcome {
            report_callback_fault(K::KIND, payload);
        }

        if K::one_shot(&context.params) {
            self.cleanup_context(instance, id, &context);
        }
    }

    /// One-shot teardown, run from inside the completion itself: detach the
    /// current thread from the slot so the close can wait for idle, close,
    /// then drop the map entry.
    fn cleanup_context(&self, instance: &Instance, id: u64, context: &Arc<ObjectContext<K>>) {
        instance.disassociate_current_thread();
        context.slot.close();
        self.contexts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
    }
}

/// Reports a panic caught in a user callback: recognizable payloads at
/// ERROR, anything else at CRITICAL. The worker thread returns normally
/// either way.
pub(crate) fn report_callback_fault(kind: &str, payload: Box<dyn std::any::Any + Send>) {
    if payload.is::<String>() || payload.is::<&str>() {
        let fault = PoolError::CallbackFault(panic_message(payload));
        pool_trace!(Severity::Error, "[{kind}]: {fault}");
    } else {
        pool_trace!(Severity::Critical, "[{kind}]: unknown error in user callback");
    }
}
