//! The thread-pool facade.
//!
//! [`BasicThreadPool`] composes a traits instance (which band callbacks run
//! on), a cleanup group owning every native slot, a cancellation predicate
//! and the four object managers. Instantiate it through the
//! [`SystemThreadPool`] alias to share the process-global band, or through
//! [`ThreadPool`] to own a band with a `[min, max]` thread count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::callback::{IoCallback, TimerCallback, WaitCallback, WorkCallback};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::manager::io::IoManager;
use crate::manager::timer::TimerManager;
use crate::manager::wait::WaitManager;
use crate::manager::work::WorkManager;
use crate::native::cleanup::CleanupGroup;
use crate::native::io::OverlappedFile;
use crate::native::pool::{system_pool, Environment, PoolCore};
use crate::sync::Event;

/// Cancellation predicate polled while draining work callbacks.
pub type TestCancel = Box<dyn Fn() -> bool + Send + Sync>;

/// The default cancellation test: never cancel.
fn default_test_cancel() -> bool {
    false
}

/// Selects the band a pool's callbacks dispatch into.
///
/// Two implementations ship: [`SystemTraits`] shares the process-global
/// band, [`CustomTraits`] owns one with a configured thread count.
pub trait PoolTraits: Send + Sync + 'static {
    /// The callback environment tied to this traits instance.
    fn environment(&self) -> &Arc<Environment>;
}

/// Traits of a pool sharing the process-global worker band.
pub struct SystemTraits {
    env: Arc<Environment>,
}

impl SystemTraits {
    fn new() -> Self {
        Self {
            env: Environment::new(system_pool()),
        }
    }
}

impl PoolTraits for SystemTraits {
    fn environment(&self) -> &Arc<Environment> {
        &self.env
    }
}

/// Traits of a pool owning its worker band.
pub struct CustomTraits {
    env: Arc<Environment>,
    pool: Arc<PoolCore>,
}

impl CustomTraits {
    fn new(config: &PoolConfig) -> Self {
        let pool = PoolCore::new(config);
        Self {
            env: Environment::new(pool.clone()),
            pool,
        }
    }
}

impl PoolTraits for CustomTraits {
    fn environment(&self) -> &Arc<Environment> {
        &self.env
    }
}

impl Drop for CustomTraits {
    fn drop(&mut self) {
        let _ = crate::native::safe_call("CustomTraits::drop", || self.pool.shutdown_and_join());
    }
}

/// Identifier of a pending wait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitId(u64);

/// Identifier of a pending timer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Identifier of a pending I/O object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoId(u64);

/// A callback-dispatching thread pool.
///
/// Submissions hand a callback wrapper to the matching manager; completions
/// run on the band's workers. Dropping the pool cancels every pending
/// callback and waits for in-flight ones through the cleanup group before
/// the managers and the band go away.
pub struct BasicThreadPool<T: PoolTraits> {
    work: WorkManager,
    wait: WaitManager,
    timer: TimerManager,
    io: IoManager,
    test_cancel: TestCancel,
    cleanup: Arc<CleanupGroup>,
    traits: T,
}

/// Pool dispatching into the process-global band.
pub type SystemThreadPool = BasicThreadPool<SystemTraits>;

/// Pool owning its worker band.
pub type ThreadPool = BasicThreadPool<CustomTraits>;

impl BasicThreadPool<SystemTraits> {
    /// Creates a pool over the process-global band.
    pub fn new() -> Self {
        Self::with_test_cancel(default_test_cancel)
    }

    /// Same, with a cancellation predicate polled by
    /// [`wait_works`](BasicThreadPool::wait_works).
    pub fn with_test_cancel(test_cancel: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self::assemble(
            SystemTraits::new(),
            Box::new(test_cancel),
            &PoolConfig::default(),
        )
    }
}

impl Default for BasicThreadPool<SystemTraits> {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicThreadPool<CustomTraits> {
    /// Creates a pool owning a band with the default thread count.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool owning a band of `[min_threads, max_threads]`
    /// workers, normalized per [`crate::config::normalize_thread_band`].
    pub fn with_thread_count(min_threads: usize, max_threads: usize) -> Self {
        Self::with_config(PoolConfig::with_thread_count(min_threads, max_threads))
    }

    /// Creates a pool from a full configuration.
    pub fn with_config(config: PoolConfig) -> Self {
        Self::with_config_and_test_cancel(config, default_test_cancel)
    }

    /// Thread-count form with a cancellation predicate.
    pub fn with_thread_count_and_test_cancel(
        min_threads: usize,
        max_threads: usize,
        test_cancel: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::with_config_and_test_cancel(
            PoolConfig::with_thread_count(min_threads, max_threads),
            test_cancel,
        )
    }

    /// Full-configuration form with a cancellation predicate.
    pub fn with_config_and_test_cancel(
        config: PoolConfig,
        test_cancel: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::assemble(CustomTraits::new(&config), Box::new(test_cancel), &config)
    }
}

impl Default for BasicThreadPool<CustomTraits> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PoolTraits> BasicThreadPool<T> {
    fn assemble(traits: T, test_cancel: TestCancel, config: &PoolConfig) -> Self {
        let env = traits.environment().clone();
        let cleanup = CleanupGroup::new(&env);

        Self {
            work: WorkManager::new(env.clone(), config.cancel_poll_interval),
            wait: WaitManager::new(env.clone()),
            timer: TimerManager::new(env.clone()),
            io: IoManager::new(env),
            test_cancel,
            cleanup,
            traits,
        }
    }

    /// Borrow of the traits instance backing this pool.
    pub fn traits(&self) -> &T {
        &self.traits
    }

    /// Submits a work callback. No handle is returned: work items are
    /// addressed collectively through
    /// [`wait_works`](BasicThreadPool::wait_works) and
    /// [`cancel_works`](BasicThreadPool::cancel_works).
    pub fn submit_work(&self, callback: WorkCallback) -> Result<()> {
        self.work.submit(callback)
    }

    /// Waits until all work callbacks complete or the cancellation
    /// predicate requests an early stop. Returns `true` on a full drain.
    pub fn wait_works(&self) -> bool {
        self.work.wait_all(self.test_cancel.as_ref())
    }

    /// Cancels queued work callbacks and waits for in-flight ones.
    pub fn cancel_works(&self) {
        self.work.cancel_all()
    }

    /// Number of work callbacks queued but not yet picked up.
    pub fn queued_works(&self) -> usize {
        self.work.queued()
    }

    /// Submits a wait on `event` that never expires.
    pub fn submit_wait(&self, event: &Arc<Event>, callback: WaitCallback) -> Result<WaitId> {
        self.wait.submit(event.clone(), None, callback).map(WaitId)
    }

    /// Submits a wait on `event` delivering
    /// [`WaitResult::TimedOut`](crate::WaitResult::TimedOut) when `timeout`
    /// elapses unsignaled.
    pub fn submit_wait_timeout(
        &self,
        event: &Arc<Event>,
        timeout: Duration,
        callback: WaitCallback,
    ) -> Result<WaitId> {
        self.wait
            .submit(event.clone(), Some(timeout), callback)
            .map(WaitId)
    }

    /// Replaces the callback of a pending wait and re-arms it with its
    /// original parameters, timed from now. Fails with
    /// [`PoolError::NotFound`](crate::PoolError::NotFound) for an unknown
    /// or already-completed id.
    pub fn replace_wait(&self, id: WaitId, callback: WaitCallback) -> Result<WaitId> {
        self.wait.replace(id.0, callback).map(WaitId)
    }

    /// Cancels a pending wait. Unknown ids are ignored.
    pub fn cancel_wait(&self, id: WaitId) {
        self.wait.cancel(id.0)
    }

    /// Cancels every pending wait.
    pub fn cancel_waits(&self) {
        self.wait.cancel_all()
    }

    /// Number of pending waits.
    pub fn pending_waits(&self) -> usize {
        self.wait.count()
    }

    /// Submits a one-shot timer firing `timeout` from now.
    pub fn submit_timer(&self, timeout: Duration, callback: TimerCallback) -> Result<TimerId> {
        self.timer
            .submit(timeout, Duration::ZERO, callback)
            .map(TimerId)
    }

    /// Submits a periodic timer: first fire after `timeout`, then every
    /// `period` until cancelled.
    pub fn submit_periodic_timer(
        &self,
        timeout: Duration,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<TimerId> {
        self.timer.submit(timeout, period, callback).map(TimerId)
    }

    /// Submits a one-shot timer firing at `deadline` on the steady clock.
    /// A deadline already in the past fires immediately.
    pub fn submit_timer_at(&self, deadline: Instant, callback: TimerCallback) -> Result<TimerId> {
        self.timer
            .submit_at(deadline, Duration::ZERO, callback)
            .map(TimerId)
    }

    /// Deadline form of
    /// [`submit_periodic_timer`](BasicThreadPool::submit_periodic_timer).
    pub fn submit_periodic_timer_at(
        &self,
        deadline: Instant,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<TimerId> {
        self.timer.submit_at(deadline, period, callback).map(TimerId)
    }

    /// Replaces the callback of a pending timer and re-arms it with its
    /// original timeout and period, timed from now. Must not be called
    /// concurrently with itself for the same id.
    pub fn replace_timer(&self, id: TimerId, callback: TimerCallback) -> Result<TimerId> {
        self.timer.replace(id.0, callback).map(TimerId)
    }

    /// Cancels a pending timer. Unknown ids are ignored.
    pub fn cancel_timer(&self, id: TimerId) {
        self.timer.cancel(id.0)
    }

    /// Cancels every pending timer.
    pub fn cancel_timers(&self) {
        self.timer.cancel_all()
    }

    /// Number of pending timers.
    pub fn pending_timers(&self) -> usize {
        self.timer.count()
    }

    /// Binds an I/O callback to `file`, armed for one overlapped transfer.
    ///
    /// If the subsequent transfer call fails to enter the pending state the
    /// caller must release the object with
    /// [`abort_io`](BasicThreadPool::abort_io); the pool cannot detect that
    /// condition on its own.
    pub fn submit_io(&self, file: &OverlappedFile, callback: IoCallback) -> Result<IoId> {
        self.io.submit(file, callback).map(IoId)
    }

    /// Cancels a pending I/O callback. Unknown ids are ignored.
    pub fn cancel_io(&self, id: IoId) {
        self.io.cancel(id.0)
    }

    /// Releases an I/O object whose transfer never went pending.
    pub fn abort_io(&self, id: IoId) {
        self.io.abort(id.0)
    }

    /// Cancels every pending I/O callback.
    pub fn cancel_ios(&self) {
        self.io.cancel_all()
    }

    /// Number of pending I/O objects.
    pub fn pending_ios(&self) -> usize {
        self.io.count()
    }

    /// Cancels every pending callback of every kind.
    pub fn cancel_all_callbacks(&self) {
        self.work.cancel_all();
        self.wait.cancel_all();
        self.timer.cancel_all();
        self.io.cancel_all();
    }
}

impl<T: PoolTraits> Drop for BasicThreadPool<T> {
    fn drop(&mut self) {
        // The cleanup group quiesces and closes every surviving native
        // slot; only then do the managers drop their maps, and the traits
        // release the band last.
        self.cleanup.close_members();
    }
}
