use crate::error::PoolError;
use core::time::Duration;

/// What [`WorkerPool::submit`](crate::WorkerPool::submit) does when the queue
/// is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backpressure {
    /// Fail immediately with
    /// [`SubmitError::QueueFull`](crate::SubmitError::QueueFull). The only
    /// policy that never blocks the submitting thread, and the one to use when
    /// submitting from a reactor thread.
    #[default]
    Reject,

    /// Park the submitting thread until space frees up, giving up after
    /// `timeout` with [`SubmitError::Timeout`](crate::SubmitError::Timeout).
    Block { timeout: Duration },
}

/// Sizing and lifecycle settings for a [`WorkerPool`](crate::WorkerPool).
///
/// The defaults oversubscribe the CPU count because workers spend most of
/// their time parked on blocking I/O rather than computing.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of OS threads executing units of work.
    pub num_workers: usize,
    /// Maximum number of queued, not yet running, units of work.
    pub queue_capacity: usize,
    /// Policy applied when the queue is full.
    pub backpressure: Backpressure,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Optional stack size for worker threads, in bytes.
    pub stack_size: Option<usize>,
    /// How long `shutdown` waits for workers to drain and acknowledge.
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get().max(1) * 4,
            queue_capacity: 1024,
            backpressure: Backpressure::Reject,
            thread_name_prefix: String::from("offload-worker"),
            stack_size: None,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Checks that the pool can actually make progress with these settings.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if there are no workers or the
    /// queue has no room.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.num_workers == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "num_workers must be greater than 0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "queue_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
