//! Callback wrappers for the four object kinds.
//!
//! Each wrapper erases the user's closure behind a single invocation point.
//! Two shapes are supported per kind: a plain closure receiving just the
//! completion datum, and an instance-aware closure that additionally
//! receives the worker [`Instance`] (needed for things like signaling an
//! event when the callback returns, or closing the object from inside its
//! own callback). Pick the shape with the matching constructor.

use crate::native::Instance;

/// Outcome of a handle wait delivered to a wait callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The awaited handle was signaled before the timeout elapsed.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}

/// Completion record delivered to an I/O callback.
///
/// Mirrors what the completion port reported: the caller-chosen overlapped
/// token identifying the operation, the status code (`0` on success,
/// otherwise the OS error code) and the number of bytes transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoData {
    /// Token of the overlapped operation that completed.
    pub overlapped: u64,
    /// `0` on success, otherwise the OS error code of the transfer.
    pub status: u32,
    /// Bytes moved by the completed operation.
    pub bytes_transferred: usize,
}

/// A work callback: runs once, receives no completion datum.
pub enum WorkCallback {
    /// Closure receiving nothing.
    Plain(Box<dyn FnOnce() + Send>),
    /// Closure receiving the worker instance.
    WithInstance(Box<dyn FnOnce(&Instance) + Send>),
}

impl WorkCallback {
    /// Wraps a plain closure.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self::Plain(Box::new(f))
    }

    /// Wraps an instance-aware closure.
    pub fn with_instance(f: impl FnOnce(&Instance) + Send + 'static) -> Self {
        Self::WithInstance(Box::new(f))
    }

    pub(crate) fn invoke(self, instance: &Instance) {
        match self {
            Self::Plain(f) => f(),
            Self::WithInstance(f) => f(instance),
        }
    }
}

/// A wait callback: receives the [`WaitResult`] of the completed wait.
pub enum WaitCallback {
    /// Closure receiving the wait result.
    Plain(Box<dyn FnMut(WaitResult) + Send>),
    /// Closure receiving the worker instance and the wait result.
    WithInstance(Box<dyn FnMut(&Instance, WaitResult) + Send>),
}

impl WaitCallback {
    /// Wraps a plain closure.
    pub fn new(f: impl FnMut(WaitResult) + Send + 'static) -> Self {
        Self::Plain(Box::new(f))
    }

    /// Wraps an instance-aware closure.
    pub fn with_instance(f: impl FnMut(&Instance, WaitResult) + Send + 'static) -> Self {
        Self::WithInstance(Box::new(f))
    }

    pub(crate) fn invoke(&mut self, instance: &Instance, result: WaitResult) {
        match self {
            Self::Plain(f) => f(result),
            Self::WithInstance(f) => f(instance, result),
        }
    }
}

/// A timer callback: fires with no completion datum, possibly repeatedly.
pub enum TimerCallback {
    /// Closure receiving nothing.
    Plain(Box<dyn FnMut() + Send>),
    /// Closure receiving the worker instance.
    WithInstance(Box<dyn FnMut(&Instance) + Send>),
}

impl TimerCallback {
    /// Wraps a plain closure.
    pub fn new(f: impl FnMut() + Send + 'static) -> Self {
        Self::Plain(Box::new(f))
    }

    /// Wraps an instance-aware closure.
    pub fn with_instance(f: impl FnMut(&Instance) + Send + 'static) -> Self {
        Self::WithInstance(Box::new(f))
    }

    pub(crate) fn invoke(&mut self, instance: &Instance) {
        match self {
            Self::Plain(f) => f(),
            Self::WithInstance(f) => f(instance),
        }
    }
}

/// An I/O callback: receives the [`IoData`] completion record.
pub enum IoCallback {
    /// Closure receiving the completion record.
    Plain(Box<dyn FnMut(IoData) + Send>),
    /// Closure receiving the worker instance and the completion record.
    WithInstance(Box<dyn FnMut(&Instance, IoData) + Send>),
}

impl IoCallback {
    /// Wraps a plain closure.
    pub fn new(f: impl FnMut(IoData) + Send + 'static) -> Self {
        Self::Plain(Box::new(f))
    }

    /// Wraps an instance-aware closure.
    pub fn with_instance(f: impl FnMut(&Instance, IoData) + Send + 'static) -> Self {
        Self::WithInstance(Box::new(f))
    }

    pub(crate) fn invoke(&mut self, instance: &Instance, data: IoData) {
        match self {
            Self::Plain(f) => f(data),
            Self::WithInstance(f) => f(instance, data),
        }
    }
}

impl std::fmt::Debug for WorkCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain(_) => "WorkCallback::Plain",
            Self::WithInstance(_) => "WorkCallback::WithInstance",
        })
    }
}

impl std::fmt::Debug for WaitCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain(_) => "WaitCallback::Plain",
            Self::WithInstance(_) => "WaitCallback::WithInstance",
        })
    }
}

impl std::fmt::Debug for TimerCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain(_) => "TimerCallback::Plain",
            Self::WithInstance(_) => "TimerCallback::WithInstance",
        })
    }
}

impl std::fmt::Debug for IoCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain(_) => "IoCallback::Plain",
            Self::WithInstance(_) => "IoCallback::WithInstance",
        })
    }
}
