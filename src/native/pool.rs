//! The worker band and the callback environment.
//!
//! Jobs are boxed closures delivered over an MPMC channel. The band keeps
//! `min_threads` workers alive, grows lazily up to `max_threads` when a
//! submission finds nobody idle, and lets workers above the minimum retire
//! after an idle timeout. Long-running callbacks may request one surge
//! worker beyond the maximum so blocking waiters cannot starve the band.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::logging::{pool_trace, Severity};

use super::cleanup::CleanupGroup;
use super::{panic_message, Instance, NativeObject};

/// A unit of dispatch: runs on some worker with that worker's instance.
pub(crate) type Job = Box<dyn FnOnce(&Instance) + Send>;

/// The worker band.
pub(crate) struct PoolCore {
    tx: flume::Sender<Job>,
    rx: flume::Receiver<Job>,
    min_threads: usize,
    max_threads: usize,
    idle_timeout: Duration,
    live: AtomicUsize,
    idle: AtomicUsize,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolCore {
    pub(crate) fn new(config: &PoolConfig) -> Arc<Self> {
        let (tx, rx) = flume::unbounded();
        let core = Arc::new(Self {
            tx,
            rx,
            min_threads: config.min_threads.max(1),
            max_threads: config.max_threads.max(config.min_threads.max(1)),
            idle_timeout: config.worker_idle_timeout,
            live: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        });

        for _ in 0..core.min_threads {
            core.spawn_worker(false);
        }

        core
    }

    /// Enqueues a job, growing the band when nobody is idle.
    pub(crate) fn submit(self: &Arc<Self>, job: Job) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Native {
                code: -1,
                message: "worker band is shut down".to_string(),
            });
        }

        self.tx.send(job).map_err(|_| PoolError::Native {
            code: -1,
            message: "worker band is shut down".to_string(),
        })?;

        if self.idle.load(Ordering::Relaxed) == 0
            && self.live.load(Ordering::Relaxed) < self.max_threads
        {
            self.spawn_worker(false);
        }

        Ok(())
    }

    /// Grows the band by one surge worker when everyone is busy. Called on
    /// behalf of callbacks that declared they may run long.
    pub(crate) fn note_long_running(self: &Arc<Self>) {
        if self.idle.load(Ordering::Relaxed) == 0 && !self.shutdown.load(Ordering::Acquire) {
            self.spawn_worker(true);
        }
    }

    fn spawn_worker(self: &Arc<Self>, surge: bool) {
        let core = self.clone();
        let id = super::next_id();
        let name = format!("petrel-worker-{id}");

        self.live.fetch_add(1, Ordering::AcqRel);
        match thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(core, surge))
        {
            Ok(handle) => {
                self.workers
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(handle);
            }
            Err(err) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                pool_trace!(
                    Severity::Error,
                    "[PoolCore]: failed to spawn worker thread: {err}"
                );
            }
        }
    }

    /// Stops the band and joins every worker. Outstanding jobs are drained
    /// before the workers exit.
    pub(crate) fn shutdown_and_join(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        // Wake every worker blocked on the channel.
        let live = self.live.load(Ordering::Acquire);
        for _ in 0..live {
            let _ = self.tx.send(Box::new(|_: &Instance| {}));
        }

        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(core: Arc<PoolCore>, surge: bool) {
    loop {
        if core.shutdown.load(Ordering::Acquire) {
            break;
        }

        core.idle.fetch_add(1, Ordering::AcqRel);
        let received = core.rx.recv_timeout(core.idle_timeout);
        core.idle.fetch_sub(1, Ordering::AcqRel);

        match received {
            Ok(job) => run_job(&core, job),
            Err(flume::RecvTimeoutError::Timeout) => {
                // Surge workers always retire; regular workers retire only
                // above the configured minimum.
                if surge || core.live.load(Ordering::Acquire) > core.min_threads {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    core.live.fetch_sub(1, Ordering::AcqRel);
}

fn run_job(core: &Arc<PoolCore>, job: Job) {
    let instance = Instance::new(core.clone());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&instance)));
    instance.finish();

    if let Err(payload) = outcome {
        pool_trace!(
            Severity::Critical,
            "[PoolCore]: dispatched job fault: {}",
            panic_message(payload)
        );
    }
}

/// Returns the process-global band backing system pools.
pub(crate) fn system_pool() -> Arc<PoolCore> {
    static SYSTEM: OnceLock<Arc<PoolCore>> = OnceLock::new();
    SYSTEM
        .get_or_init(|| PoolCore::new(&PoolConfig::default()))
        .clone()
}

/// A callback environment: selects the band new slots dispatch into and the
/// cleanup group that will own them.
pub struct Environment {
    pool: Arc<PoolCore>,
    cleanup: RwLock<Weak<CleanupGroup>>,
}

impl Environment {
    pub(crate) fn new(pool: Arc<PoolCore>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            cleanup: RwLock::new(Weak::new()),
        })
    }

    /// Schedules a job on the environment's band.
    pub(crate) fn dispatch(&self, job: Job) -> Result<()> {
        self.pool.submit(job)
    }

    pub(crate) fn set_cleanup_group(&self, group: &Arc<CleanupGroup>) {
        *self
            .cleanup
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::downgrade(group);
    }

    /// Hands a freshly created slot to the environment's cleanup group.
    pub(crate) fn adopt(&self, object: Weak<dyn NativeObject>) {
        let group = self
            .cleanup
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .upgrade();
        if let Some(group) = group {
            group.register(object);
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}
