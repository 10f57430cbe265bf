//! The native dispatcher layer.
//!
//! This module is the in-crate rendition of the work dispatcher the typed
//! managers are written against: a worker band fed over a channel, a
//! process-wide deadline clock, slot objects for the four schedulable kinds
//! and a cleanup registry that can close everything an environment created.
//! The managers never touch threads directly; everything reaches them
//! through the slot contract (`arm` / quiesce / close) and the completion
//! trampolines.

pub(crate) mod cleanup;
pub(crate) mod clock;
pub(crate) mod io;
pub(crate) mod pool;
pub(crate) mod timer;
pub(crate) mod wait;
pub(crate) mod work;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::PoolError;
use crate::logging::{pool_trace, Severity};
use crate::sync::Event;

use self::pool::PoolCore;

/// Allocates a process-unique id for slots, registrations and clock entries.
pub(crate) fn next_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Per-invocation handle passed to every callback trampoline.
///
/// Lets a callback interact with the worker executing it: defer an event
/// signal to after the callback returns, tell the band the callback may
/// block for a long time, or detach the current thread from the slot so the
/// slot can be closed synchronously from inside its own callback.
pub struct Instance {
    pool: Arc<PoolCore>,
    activity: Mutex<Option<ActivityGuard>>,
    finalizers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl Instance {
    pub(crate) fn new(pool: Arc<PoolCore>) -> Self {
        Self {
            pool,
            activity: Mutex::new(None),
            finalizers: Mutex::new(Vec::new()),
        }
    }

    /// Signals `event` after the current callback returns, regardless of
    /// whether the callback completes normally.
    pub fn signal_on_return(&self, event: Arc<Event>) {
        self.finalizers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(move || event.set()));
    }

    /// Hints that the current callback may block for a long time, allowing
    /// the band to grow past its configured maximum by one surge worker.
    pub fn may_run_long(&self) {
        self.pool.note_long_running();
    }

    /// Detaches the current thread from the slot whose callback it is
    /// executing. Required before closing that slot from inside its own
    /// callback: the close waits for the slot to go idle, and without the
    /// detach it would wait for the calling thread itself.
    pub fn disassociate_current_thread(&self) {
        let guard = self
            .activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(guard);
    }

    pub(crate) fn install_activity(&self, guard: ActivityGuard) {
        *self
            .activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(guard);
    }

    /// Runs end-of-callback bookkeeping: retires the slot activity, then
    /// fires the deferred finalizers.
    pub(crate) fn finish(&self) {
        self.disassociate_current_thread();

        let finalizers = std::mem::take(
            &mut *self
                .finalizers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for finalizer in finalizers {
            finalizer();
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance").finish_non_exhaustive()
    }
}

/// Count of callbacks a slot has pending or running, with a condvar so
/// quiesce paths can wait for it to drain to zero.
pub(crate) struct Activity {
    pending: Mutex<usize>,
    cv: Condvar,
}

impl Activity {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(0),
            cv: Condvar::new(),
        })
    }

    /// Accounts for one dispatched callback. The returned guard retires it.
    pub(crate) fn begin(self: &Arc<Self>) -> ActivityGuard {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending += 1;
        ActivityGuard {
            activity: Some(self.clone()),
        }
    }

    fn end(&self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.cv.notify_all();
        }
    }

    /// Blocks until no callback is pending or running.
    pub(crate) fn wait_idle(&self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while *pending > 0 {
            pending = self
                .cv
                .wait(pending)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Retires one unit of slot activity on drop (or earlier, via
/// [`Instance::disassociate_current_thread`]).
pub(crate) struct ActivityGuard {
    activity: Option<Arc<Activity>>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if let Some(activity) = self.activity.take() {
            activity.end();
        }
    }
}

/// A native object the cleanup group can close collectively.
pub(crate) trait NativeObject: Send + Sync {
    fn close(&self);
}

/// The slot contract the generic manager is written against.
pub(crate) trait NativeSlot: Send + Sync + 'static {
    /// Cancels the pending arming without waiting for callbacks.
    fn disarm(&self);

    /// Waits for the slot's callbacks to drain. With `cancel`, dispatched
    /// but unstarted callbacks are discarded instead of run.
    fn quiesce(&self, cancel: bool);

    /// Full close: disarm once, then quiesce with cancel. Idempotent, and
    /// callable from inside the slot's own callback after a disassociate.
    fn close(&self);
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error".to_string()
    }
}

/// Runs a native-layer call, converting a panic into an error code instead
/// of letting it unwind a worker thread or a teardown path.
pub(crate) fn safe_call<R>(what: &str, f: impl FnOnce() -> R) -> Result<R, PoolError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = panic_message(payload);
            pool_trace!(Severity::Error, "[{what}]: native call fault: {message}");
            Err(PoolError::Native { code: -1, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn activity_drains_to_idle() {
        let activity = Activity::new();
        let guard = activity.begin();

        let waiter = {
            let activity = activity.clone();
            thread::spawn(move || activity.wait_idle())
        };

        thread::sleep(Duration::from_millis(20));
        drop(guard);
        waiter.join().unwrap();
    }

    #[test]
    fn safe_call_converts_panics() {
        let ok = safe_call("test", || 42);
        assert!(matches!(ok, Ok(42)));

        let err = safe_call("test", || panic!("boom"));
        match err {
            Err(PoolError::Native { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn ids_are_unique() {
        let a = next_id();
        let b = next_id();
        assert_ne!(a, b);
    }
}
