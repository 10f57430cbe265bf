//! The work manager: fire-and-forget callbacks with a cooperative drain.
//!
//! Unlike the map-based kinds there is no per-object identity: one native
//! work object serves a queue of submitted wrappers. Workers pop in
//! whatever order they get scheduled; parallelism is bounded only by the
//! band.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::callback::WorkCallback;
use crate::error::Result;
use crate::logging::{pool_trace, Severity};
use crate::native::pool::Environment;
use crate::native::work::WorkSlot;
use crate::native::Instance;
use crate::sync::Event;

use super::queue::CallbackQueue;
use super::report_callback_fault;

pub(crate) struct WorkManager {
    env: Arc<Environment>,
    queue: Arc<CallbackQueue>,
    slot: Arc<WorkSlot>,
    done: Arc<Event>,
    poll_interval: Duration,
}

impl WorkManager {
    pub(crate) fn new(env: Arc<Environment>, poll_interval: Duration) -> Self {
        let queue = Arc::new(CallbackQueue::new());
        let trampoline = {
            let queue = Arc::downgrade(&queue);
            Arc::new(move |instance: &Instance| invoke_one(&queue, instance))
        };
        let slot = WorkSlot::create(env.clone(), trampoline);

        Self {
            env,
            queue,
            slot,
            done: Arc::new(Event::manual()),
            poll_interval,
        }
    }

    /// Queues a callback and schedules one worker invocation for it.
    pub(crate) fn submit(&self, callback: WorkCallback) -> Result<()> {
        self.queue.push(callback);
        self.slot.submit()
    }

    /// Waits until every submitted callback has completed, polling
    /// `test_cancel` on the way. Returns `true` on a full drain, `false`
    /// when the predicate fired and the drain was abandoned.
    ///
    /// The blocking wait runs as a callback inside the pool itself so this
    /// thread stays free to poll; if that submission fails the wait happens
    /// here and cancellation checks are impossible.
    pub(crate) fn wait_all(&self, test_cancel: &(dyn Fn() -> bool + Send + Sync)) -> bool {
        self.done.reset();

        let waiter = {
            let slot = self.slot.clone();
            let done = self.done.clone();
            Box::new(move |instance: &Instance| {
                pool_trace!(Severity::Extended, "[WorkManager]: wait started");

                instance.signal_on_return(done.clone());
                instance.may_run_long();
                slot.wait(false);

                pool_trace!(Severity::Extended, "[WorkManager]: wait finished");
            })
        };

        if self.env.dispatch(waiter).is_err() {
            pool_trace!(
                Severity::Error,
                "[WorkManager]: cannot wait in a separate thread, waiting in the current one, cancellation is unavailable"
            );
            self.slot.wait(false);
            self.done.set();
        }

        let mut cancelled = false;
        while !self.done.wait_timeout(self.poll_interval) {
            if test_cancel() {
                self.cancel_all();
                cancelled = true;
            }
        }

        pool_trace!(Severity::Extended, "[WorkManager]: wait completed");
        !cancelled
    }

    /// Discards queued-but-unstarted callbacks, waits for in-flight ones
    /// and reports how many never ran.
    pub(crate) fn cancel_all(&self) {
        self.slot.wait(true);
        self.done.set();

        let left_unprocessed = self.queue.drain();
        pool_trace!(
            Severity::Normal,
            "[WorkManager]: tasks cancelled and {left_unprocessed} left unprocessed"
        );
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for WorkManager {
    fn drop(&mut self) {
        self.slot.close();
        self.queue.drain();
    }
}

fn invoke_one(queue: &Weak<CallbackQueue>, instance: &Instance) {
    let Some(queue) = queue.upgrade() else {
        pool_trace!(Severity::Error, "[WorkManager]: callback queue is gone");
        return;
    };

    let Some(callback) = queue.try_pop() else {
        pool_trace!(Severity::Error, "[WorkManager]: no more items in the queue");
        return;
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback.invoke(instance))) {
        report_callback_fault("WorkManager", payload);
    }
}
