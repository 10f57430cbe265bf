//! Logging for the pool runtime.
//!
//! Two cooperating layers live here. The first is a process-wide, swappable
//! logger function fed with a [`Severity`] and a formatted message; it is
//! disabled by default and exists so embedders can route pool diagnostics
//! into whatever sink they already have. The second is the `tracing`
//! ecosystem: every message handed to the pluggable logger is also emitted
//! as a `tracing` event, and this module ships subscriber setup helpers for
//! binaries and tests.

use std::io;
use std::sync::{Once, RwLock};

use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter};

/// Severity of a pool diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine progress message.
    Normal,
    /// Verbose message, mostly interesting when chasing a problem.
    Extended,
    /// An operation failed in a recognized way.
    Error,
    /// An unrecognized failure; the pool state is still consistent, but the
    /// cause is unknown.
    Critical,
}

/// Logger function installed with [`set_logger`].
pub type LoggerFn = fn(Severity, &str);

static LOGGER: RwLock<Option<LoggerFn>> = RwLock::new(None);

/// Replaces the process-wide logger function, returning the previous one.
///
/// Passing `None` disables the pluggable sink again. The `tracing` events
/// are emitted regardless of what is installed here.
pub fn set_logger(new_logger: Option<LoggerFn>) -> Option<LoggerFn> {
    let mut slot = LOGGER.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::replace(&mut *slot, new_logger)
}

/// Emits a diagnostic through both layers.
pub(crate) fn trace(severity: Severity, message: &str) {
    match severity {
        Severity::Normal => tracing::info!(target: "petrel", "{message}"),
        Severity::Extended => tracing::debug!(target: "petrel", "{message}"),
        Severity::Error => tracing::error!(target: "petrel", "{message}"),
        Severity::Critical => tracing::error!(target: "petrel", critical = true, "{message}"),
    }

    let logger = *LOGGER.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(logger) = logger {
        logger(severity, message);
    }
}

macro_rules! pool_trace {
    ($severity:expr, $($arg:tt)*) => {
        $crate::logging::trace($severity, &format!($($arg)*))
    };
}

pub(crate) use pool_trace;

/// Configuration for the tracing subscriber helpers.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level to display.
    pub level: Level,
    /// Whether to include file and line information.
    pub show_file_line: bool,
    /// Whether to include thread names and ids.
    pub show_thread_info: bool,
    /// Target filter expressions (format: `"target=level,target2=level2"`).
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_file_line: true,
            show_thread_info: true,
            target_filters: None,
        }
    }
}

// Initialization guard so the subscriber is only installed once.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber with the given configuration.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

        if let Some(filters) = config.target_filters {
            for filter in filters.split(',') {
                if let Ok(directive) = filter.parse() {
                    env_filter = env_filter.add_directive(directive);
                }
            }
        }

        let fmt_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let subscriber = Registry::default().with(env_filter).with(fmt_layer);
        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Initializes tracing with reasonable defaults.
pub fn init_default() {
    init(LogConfig::default());
}

/// Initializes tracing for tests: warnings and errors only, no timestamps
/// worth of noise.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        show_file_line: true,
        show_thread_info: false,
        target_filters: None,
    });
}

/// Utility to open an appending log-file writer usable with a `fmt::Layer`.
pub fn file_writer(path: &str) -> io::Result<impl io::Write + Send + Sync + 'static> {
    use std::fs::OpenOptions;

    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_logger(_severity: Severity, _message: &str) {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn logger_is_swappable_and_restorable() {
        let previous = set_logger(Some(counting_logger));
        trace(Severity::Normal, "message through the pluggable sink");
        assert!(CALLS.load(Ordering::SeqCst) >= 1);

        let ours = set_logger(previous);
        assert_eq!(ours, Some(counting_logger as LoggerFn));

        // Disabled again: no further counting.
        let before = CALLS.load(Ordering::SeqCst);
        trace(Severity::Error, "dropped on the floor");
        assert_eq!(CALLS.load(Ordering::SeqCst), before);
    }

    #[test]
    fn severity_ordering_matches_escalation() {
        assert!(Severity::Normal < Severity::Extended);
        assert!(Severity::Error < Severity::Critical);
    }
}
