//! The process-wide deadline clock.
//!
//! A single thread sleeps until the earliest scheduled deadline and runs the
//! due entries' thunks. Thunks must be cheap: they hand completions to the
//! worker band rather than doing work themselves. Cancellation removes the
//! thunk; already-popped heap entries for cancelled ids are simply skipped.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Condvar, Mutex, OnceLock};
use std::thread;
use std::time::Instant;

use crate::logging::{pool_trace, Severity};

pub(crate) type Thunk = Box<dyn FnOnce() + Send>;

struct DueEntry {
    at: Instant,
    id: u64,
}

impl PartialEq for DueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for DueEntry {}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline wins.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct ClockInner {
    due: BinaryHeap<DueEntry>,
    thunks: HashMap<u64, Thunk>,
}

pub(crate) struct Clock {
    inner: Mutex<ClockInner>,
    cv: Condvar,
}

impl Clock {
    fn new() -> Self {
        Self {
            inner: Mutex::new(ClockInner {
                due: BinaryHeap::new(),
                thunks: HashMap::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Schedules `thunk` to run at `at`. Returns an id usable with
    /// [`cancel`](Clock::cancel).
    pub(crate) fn schedule(&self, at: Instant, thunk: Thunk) -> u64 {
        let id = super::next_id();
        let mut inner = self.lock();
        inner.thunks.insert(id, thunk);
        inner.due.push(DueEntry { at, id });
        self.cv.notify_one();
        id
    }

    /// Cancels a scheduled entry. Returns `true` when the thunk had not
    /// fired yet.
    pub(crate) fn cancel(&self, id: u64) -> bool {
        self.lock().thunks.remove(&id).is_some()
    }

    fn run(&self) {
        let mut inner = self.lock();
        loop {
            let now = Instant::now();
            let mut ready: Vec<Thunk> = Vec::new();

            while let Some(entry) = inner.due.peek() {
                if entry.at > now {
                    break;
                }
                let id = inner.due.pop().map(|entry| entry.id);
                if let Some(thunk) = id.and_then(|id| inner.thunks.remove(&id)) {
                    ready.push(thunk);
                }
            }

            if !ready.is_empty() {
                drop(inner);
                for thunk in ready {
                    thunk();
                }
                inner = self.lock();
                continue;
            }

            inner = match inner.due.peek().map(|entry| entry.at) {
                Some(next) => {
                    let wait = next.saturating_duration_since(now);
                    self.cv
                        .wait_timeout(inner, wait)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
                None => self
                    .cv
                    .wait(inner)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Returns the clock singleton, starting its thread on first use.
pub(crate) fn clock() -> &'static Clock {
    static CLOCK: OnceLock<Clock> = OnceLock::new();
    static STARTED: OnceLock<()> = OnceLock::new();

    let clock = CLOCK.get_or_init(Clock::new);
    STARTED.get_or_init(|| {
        let spawned = thread::Builder::new()
            .name("petrel-clock".to_string())
            .spawn(move || clock.run());
        if let Err(err) = spawned {
            pool_trace!(Severity::Critical, "[Clock]: failed to start: {err}");
        }
    });
    clock
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn scheduled_thunks_fire_in_deadline_order() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let clock = clock();

        let base = Instant::now();
        for (label, offset) in [(2u32, 30u64), (1, 10)] {
            let fired = fired.clone();
            clock.schedule(
                base + Duration::from_millis(offset),
                Box::new(move || fired.lock().unwrap().push(label)),
            );
        }

        thread::sleep(Duration::from_millis(200));
        assert_eq!(*fired.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancelled_entries_do_not_fire() {
        let count = Arc::new(AtomicUsize::new(0));
        let clock = clock();

        let id = {
            let count = count.clone();
            clock.schedule(
                Instant::now() + Duration::from_millis(30),
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        assert!(clock.cancel(id));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn past_deadlines_fire_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let clock = clock();

        {
            let count = count.clone();
            clock.schedule(
                Instant::now(),
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "immediate entry never fired");
            thread::sleep(Duration::from_millis(5));
        }
    }
}
