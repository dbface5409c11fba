//! Error types for the dispatch bridge.
//!
//! Three layers of failure exist:
//!
//! - [`DispatchError`] is what an awaiting caller observes. It keeps the
//!   handler's own error untouched in [`DispatchError::Handler`] and tags every
//!   infrastructure failure with its own variant, so the two can always be told
//!   apart.
//! - [`SubmitError`] describes why a unit of work could not be queued.
//! - [`PoolError`] covers pool construction and shutdown.

use core::time::Duration;

/// Outcome of awaiting a dispatched handler.
pub type Result<T, E> = core::result::Result<T, DispatchError<E>>;

/// Failure observed through a [`PendingResult`](crate::PendingResult).
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum DispatchError<E> {
    /// The handler returned this error. It is passed through verbatim.
    #[error("{0}")]
    Handler(E),

    /// The unit of work never reached a worker.
    #[error("submission failed: {0}")]
    Rejected(#[from] SubmitError),

    /// The handler panicked on the worker thread.
    #[error("handler panicked: {message}")]
    Panicked { message: String },

    /// The promise was dropped without being completed.
    #[error("worker dropped the result without completing it")]
    Abandoned,

    /// The dispatcher deadline elapsed before the handler finished.
    #[error("handler did not finish within {after:?}")]
    DeadlineExceeded { after: Duration },
}

impl<E> DispatchError<E> {
    /// Returns `true` if the handler itself produced the error.
    pub const fn is_handler(&self) -> bool {
        matches!(self, Self::Handler(_))
    }

    /// Returns `true` if the bridge, not the handler, failed.
    pub const fn is_infrastructure(&self) -> bool {
        !self.is_handler()
    }

    /// Recovers the handler's error, or gives `self` back if the failure came
    /// from the bridge.
    pub fn into_handler_error(self) -> core::result::Result<E, Self> {
        match self {
            Self::Handler(e) => Ok(e),
            other => Err(other),
        }
    }

    /// Maps the handler error while leaving infrastructure variants alone.
    pub fn map_handler<F, O>(self, f: F) -> DispatchError<O>
    where
        F: FnOnce(E) -> O,
    {
        match self {
            Self::Handler(e) => DispatchError::Handler(f(e)),
            Self::Rejected(e) => DispatchError::Rejected(e),
            Self::Panicked { message } => DispatchError::Panicked { message },
            Self::Abandoned => DispatchError::Abandoned,
            Self::DeadlineExceeded { after } => DispatchError::DeadlineExceeded { after },
        }
    }
}

/// Why [`WorkerPool::submit`](crate::WorkerPool::submit) refused a unit of
/// work.
#[derive(Clone, Copy, thiserror::Error, Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// The queue is at capacity and the pool rejects new work.
    #[error("worker queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The queue stayed full for the whole blocking submit timeout.
    #[error("timed out waiting for worker queue space")]
    Timeout,

    /// The pool is shutting down or has shut down.
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Errors raised while building or tearing down a
/// [`WorkerPool`](crate::WorkerPool).
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// A [`PoolConfig`](crate::PoolConfig) value is out of range.
    #[error("invalid pool config: {reason}")]
    InvalidConfig { reason: String },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker {worker}: {reason}")]
    Spawn { worker: usize, reason: String },

    /// `shutdown` was already called on this pool.
    #[error("worker pool already shut down")]
    AlreadyShutDown,

    /// A worker thread could not be joined.
    #[error("failed to join worker thread: {reason}")]
    Join { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_round_trips_unchanged() {
        let err: DispatchError<&str> = DispatchError::Handler("not found");
        assert!(err.is_handler());
        assert_eq!(err.to_string(), "not found");
        assert_eq!(err.into_handler_error(), Ok("not found"));
    }

    #[test]
    fn infrastructure_errors_are_tagged() {
        let err: DispatchError<&str> = SubmitError::QueueFull { capacity: 4 }.into();
        assert!(err.is_infrastructure());
        assert_eq!(
            err.to_string(),
            "submission failed: worker queue is full (capacity 4)"
        );
        assert_eq!(
            err.into_handler_error(),
            Err(DispatchError::Rejected(SubmitError::QueueFull { capacity: 4 }))
        );
    }

    #[test]
    fn map_handler_only_touches_handler_errors() {
        let err: DispatchError<u8> = DispatchError::Handler(7);
        assert_eq!(err.map_handler(|n| n * 2), DispatchError::Handler(14));

        let err: DispatchError<u8> = DispatchError::Abandoned;
        assert_eq!(err.map_handler(|n| n * 2), DispatchError::Abandoned);
    }
}
