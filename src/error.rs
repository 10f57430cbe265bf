use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors surfaced by submission, replacement and arming operations.
///
/// Completion-side failures are never propagated through this type: a fault
/// raised inside a user callback is caught by the dispatch trampoline and
/// reported through the logger so the worker thread can return normally.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A caller-supplied argument made the operation meaningless.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An allocation or native object creation failed.
    #[error("out of resources: {0}")]
    OutOfResources(String),

    /// Replace or cancel was asked about an object this pool does not own.
    #[error("object not found")]
    NotFound,

    /// A dispatcher-level call failed. Carries the underlying error code and
    /// its formatted message.
    #[error("native dispatcher failure (code {code}): {message}")]
    Native { code: i32, message: String },

    /// A user callback panicked inside a trampoline.
    #[error("user callback fault: {0}")]
    CallbackFault(String),
}

impl From<io::Error> for PoolError {
    fn from(err: io::Error) -> Self {
        PoolError::Native {
            code: err.raw_os_error().unwrap_or(-1),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_maps_to_native() {
        let err: PoolError = io::Error::from_raw_os_error(2).into();
        match err {
            PoolError::Native { code, .. } => assert_eq!(code, 2),
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn messages_carry_context() {
        let err = PoolError::InvalidArgument("empty transfer");
        assert!(err.to_string().contains("empty transfer"));
    }
}
