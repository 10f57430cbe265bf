//! The I/O slot, its completion port and the overlapped file wrapper.
//!
//! An I/O slot is bound at creation to a file's completion port. Arming
//! (`start`) raises the count of transfers the slot expects a completion
//! for; a posted completion consumes one expectation and dispatches the
//! trampoline with the `{overlapped, status, bytes}` record. The count is
//! balanced only by a completion or by `cancel_pending`; closing the slot
//! leaves it alone. A completion still owed to a closed object is thereby
//! consumed and discarded quietly, while one with no matching expectation
//! is reported as an error. A transfer the caller failed to put in flight
//! leaves a dangling expectation that no completion will ever balance,
//! which is what the abort protocol (`cancel_pending`, then the normal
//! close) withdraws.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread;

use crate::callback::IoData;
use crate::error::{PoolError, Result};
use crate::logging::{pool_trace, Severity};

use super::pool::Environment;
use super::{Activity, Instance, NativeObject, NativeSlot};

pub(crate) struct IoSlot {
    env: Arc<Environment>,
    trampoline: Arc<dyn Fn(&Instance, IoData) + Send + Sync>,
    activity: Arc<Activity>,
    generation: AtomicU64,
    expected: AtomicUsize,
    closed: AtomicBool,
}

impl IoSlot {
    pub(crate) fn create(
        env: Arc<Environment>,
        port: &Arc<CompletionPort>,
        trampoline: Arc<dyn Fn(&Instance, IoData) + Send + Sync>,
    ) -> Arc<Self> {
        let slot = Arc::new(Self {
            env,
            trampoline,
            activity: Activity::new(),
            generation: AtomicU64::new(0),
            expected: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        port.bind(&slot);
        slot.env.adopt(Arc::downgrade(&slot) as Weak<dyn NativeObject>);
        slot
    }

    /// Declares that one more transfer will post a completion.
    pub(crate) fn start(&self) {
        self.expected.fetch_add(1, Ordering::AcqRel);
    }

    /// Withdraws one expectation, for a transfer that never went pending.
    /// Besides a posted completion this is the only way the count comes
    /// back down.
    pub(crate) fn cancel_pending(&self) {
        let mut current = self.expected.load(Ordering::Acquire);
        while current > 0 {
            match self.expected.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    fn post(self: &Arc<Self>, data: IoData) {
        // Consume one expectation first: this classifies the completion
        // even when the slot is already closed.
        let mut current = self.expected.load(Ordering::Acquire);
        loop {
            if current == 0 {
                pool_trace!(
                    Severity::Error,
                    "[IoSlot]: completion nobody expects (overlapped {})",
                    data.overlapped
                );
                return;
            }
            match self.expected.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        if self.closed.load(Ordering::Acquire) {
            pool_trace!(
                Severity::Extended,
                "[IoSlot]: discarding completion of a closed object (overlapped {})",
                data.overlapped
            );
            return;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let guard = self.activity.begin();
        let weak = Arc::downgrade(self);

        let dispatched = self.env.dispatch(Box::new(move |instance: &Instance| {
            if let Some(slot) = weak.upgrade() {
                if slot.generation.load(Ordering::Acquire) == generation {
                    instance.install_activity(guard);
                    (slot.trampoline)(instance, data);
                    return;
                }
            }
            // Stale or orphaned dispatch: dropping the guard retires it.
        }));
        let _ = dispatched;
    }
}

impl NativeSlot for IoSlot {
    fn disarm(&self) {
        // Nothing to cancel on the clock or an event; expectations stay
        // until a completion or an abort balances them.
    }

    fn quiesce(&self, cancel: bool) {
        if cancel {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.activity.wait_idle();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.quiesce(true);
    }
}

impl NativeObject for IoSlot {
    fn close(&self) {
        NativeSlot::close(self);
    }
}

/// Delivery point for transfer completions, bound to at most one I/O slot.
pub(crate) struct CompletionPort {
    slot: RwLock<Weak<IoSlot>>,
}

impl CompletionPort {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: RwLock::new(Weak::new()),
        })
    }

    fn bind(&self, slot: &Arc<IoSlot>) {
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::downgrade(slot);
    }

    pub(crate) fn post(&self, data: IoData) {
        let slot = self
            .slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .upgrade();
        match slot {
            Some(slot) => slot.post(data),
            None => pool_trace!(
                Severity::Extended,
                "[CompletionPort]: completion with no bound object (overlapped {})",
                data.overlapped
            ),
        }
    }
}

/// Descriptor of one overlapped operation: a caller-chosen token carried
/// into the completion record, and the file offset to transfer at.
#[derive(Debug, Clone, Copy)]
pub struct Overlapped {
    /// Token echoed back as [`IoData::overlapped`].
    pub token: u64,
    /// Byte offset the transfer starts at.
    pub offset: u64,
}

impl Overlapped {
    /// Creates a descriptor for a transfer at `offset` identified by `token`.
    pub fn new(token: u64, offset: u64) -> Self {
        Self { token, offset }
    }
}

/// A file whose transfers complete asynchronously through a completion port.
///
/// Writes return as soon as the transfer is in flight; the completion (or
/// the in-flight failure) reaches the I/O callback bound to this file
/// through the pool. A call that returns an error never went pending, and a pool
/// submission armed for it must be released with `abort_io`.
pub struct OverlappedFile {
    file: Arc<Mutex<File>>,
    port: Arc<CompletionPort>,
}

impl OverlappedFile {
    /// Opens (creating if needed) `path` for overlapped read/write.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::from_file(file))
    }

    /// Wraps an already-open file.
    pub fn from_file(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
            port: CompletionPort::new(),
        }
    }

    pub(crate) fn port(&self) -> &Arc<CompletionPort> {
        &self.port
    }

    /// Starts an overlapped write of `data` at the descriptor's offset.
    ///
    /// Returns `Ok` once the transfer is in flight; the outcome arrives at
    /// the bound I/O callback as an [`IoData`] record. An `Err` means the
    /// transfer never went pending and no completion will be posted.
    pub fn write_at(&self, data: &[u8], overlapped: &Overlapped) -> Result<()> {
        if data.is_empty() {
            return Err(PoolError::InvalidArgument("empty transfer"));
        }

        let buffer = data.to_vec();
        let file = self.file.clone();
        let port = self.port.clone();
        let token = overlapped.token;
        let offset = overlapped.offset;

        thread::Builder::new()
            .name("petrel-io".to_string())
            .spawn(move || {
                let outcome = (|| -> std::io::Result<usize> {
                    let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    file.seek(SeekFrom::Start(offset))?;
                    file.write_all(&buffer)?;
                    Ok(buffer.len())
                })();

                match outcome {
                    Ok(written) => port.post(IoData {
                        overlapped: token,
                        status: 0,
                        bytes_transferred: written,
                    }),
                    Err(err) => port.post(IoData {
                        overlapped: token,
                        status: err.raw_os_error().unwrap_or(-1) as u32,
                        bytes_transferred: 0,
                    }),
                }
            })
            .map_err(|err| PoolError::OutOfResources(format!("transfer thread: {err}")))?;

        Ok(())
    }
}

impl std::fmt::Debug for OverlappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlappedFile").finish_non_exhaustive()
    }
}
