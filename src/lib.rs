//! Callback-dispatching thread-pool runtime.
//!
//! petrel offers four kinds of schedulable objects (immediate work items,
//! waits on signalable events, one-shot/periodic timers and overlapped I/O
//! completions) behind one facade with uniform submission, replacement,
//! cancellation and lifetime semantics. Callbacks run on a worker band that
//! is either shared process-wide ([`SystemThreadPool`]) or owned by the
//! pool instance with a configured thread count ([`ThreadPool`]).
//!
//! ```no_run
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use petrel::{SystemThreadPool, WorkCallback};
//!
//! let pool = SystemThreadPool::new();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..50 {
//!     let counter = counter.clone();
//!     pool.submit_work(WorkCallback::new(move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }))
//!     .unwrap();
//! }
//!
//! assert!(pool.wait_works());
//! assert_eq!(counter.load(Ordering::SeqCst), 50);
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod sync;
pub mod time;

mod manager;
mod native;

pub use callback::{IoCallback, IoData, TimerCallback, WaitCallback, WaitResult, WorkCallback};
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use logging::{set_logger, LogConfig, LoggerFn, Severity};
pub use native::io::{Overlapped, OverlappedFile};
pub use native::pool::Environment;
pub use native::Instance;
pub use pool::{
    BasicThreadPool, CustomTraits, IoId, PoolTraits, SystemThreadPool, SystemTraits, TestCancel,
    ThreadPool, TimerId, WaitId,
};
pub use sync::Event;
