//! Bounded pool of OS threads executing blocking units of work.
//!
//! This module defines [`WorkerPool`], a cheaply cloneable handle to a fixed
//! set of named worker threads. All workers drain one shared, bounded
//! MPMC queue, so an idle worker always picks up the next queued job no matter
//! which thread submitted it. What happens when the queue is full is decided by
//! [`Backpressure`].
//!
//! Shutdown is explicit and staged: the pool stops accepting work, lets
//! already-queued work drain, asks every worker to exit, and joins the ones
//! that acknowledge within the configured timeout.

use super::{
    stats::{Counters, PoolStats},
    worker::{Job, WorkRequest, panic_message, worker_loop},
};
use crate::{
    config::{Backpressure, PoolConfig},
    error::{PoolError, SubmitError},
};
use core::time::Duration;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use portable_atomic::{AtomicBool, Ordering};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

/// Summary of a completed [`WorkerPool::shutdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that acknowledged shutdown and were joined.
    pub joined: usize,
    /// Workers still busy when the timeout elapsed; their threads are detached.
    pub abandoned: usize,
    /// Queued units of work discarded unrun; their futures resolve as
    /// abandoned.
    pub dropped: usize,
    /// Wall-clock time spent shutting down.
    pub elapsed: Duration,
}

/// Handle to a pool of blocking worker threads.
///
/// Cloning the handle is cheap and every clone refers to the same pool. The
/// pool is typically built once at startup and handed to a
/// [`Dispatcher`](crate::Dispatcher).
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

struct Inner {
    sender: Sender<WorkRequest>,
    /// Kept so shutdown can drop work that no worker will ever take.
    receiver: Receiver<WorkRequest>,
    /// Submitters hold it shared across the closing check and the enqueue;
    /// shutdown takes it exclusively to close the pool.
    admission: RwLock<()>,
    config: PoolConfig,
    counters: Arc<Counters>,
    handles: Mutex<Vec<Option<JoinHandle<()>>>>,
    /// Cancelled once shutdown begins; new submissions are refused.
    closing: CancellationToken,
    /// Cancelled if shutdown times out; observed by cooperative handlers.
    abort: CancellationToken,
    shut_down: AtomicBool,
}

impl WorkerPool {
    /// Validates `config` and spawns `config.num_workers` threads.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] for unusable settings and
    /// [`PoolError::Spawn`] if a thread cannot be created. Threads spawned
    /// before the failure exit on their own once the queue is dropped.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity);
        let counters = Arc::new(Counters::default());
        let mut handles = Vec::with_capacity(config.num_workers);

        for worker_id in 0..config.num_workers {
            let rx = receiver.clone();
            let counters = Arc::clone(&counters);
            let name = format!("{}-{}", config.thread_name_prefix, worker_id);

            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let handle = builder
                .spawn(move || worker_loop(worker_id, rx, counters))
                .map_err(|e| PoolError::Spawn {
                    worker: worker_id,
                    reason: e.to_string(),
                })?;
            handles.push(Some(handle));
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Started {} workers with a queue capacity of {} ({:?})",
            config.num_workers,
            config.queue_capacity,
            config.backpressure
        );

        Ok(Self {
            inner: Arc::new(Inner {
                sender,
                receiver,
                admission: RwLock::new(()),
                config,
                counters,
                handles: Mutex::new(handles),
                closing: CancellationToken::new(),
                abort: CancellationToken::new(),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Enqueues a unit of work and returns without waiting for it to run.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::ShutDown`] once shutdown has begun.
    /// - [`SubmitError::QueueFull`] under [`Backpressure::Reject`] when the
    ///   queue is at capacity.
    /// - [`SubmitError::Timeout`] under [`Backpressure::Block`] when no space
    ///   frees up in time.
    pub fn submit<F>(&self, job: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_job(Box::new(job))
    }

    pub(crate) fn submit_job(&self, job: Job) -> Result<(), SubmitError> {
        let inner = &*self.inner;
        let admission = inner.admission.read();

        let result = if inner.closing.is_cancelled() {
            Err(SubmitError::ShutDown)
        } else {
            let request = WorkRequest::Run(job);
            match inner.config.backpressure {
                Backpressure::Reject => inner.sender.try_send(request).map_err(|e| match e {
                    TrySendError::Full(_) => SubmitError::QueueFull {
                        capacity: inner.config.queue_capacity,
                    },
                    TrySendError::Disconnected(_) => SubmitError::ShutDown,
                }),
                Backpressure::Block { timeout } => inner
                    .sender
                    .send_timeout(request, timeout)
                    .map_err(|e| match e {
                        SendTimeoutError::Timeout(_) => SubmitError::Timeout,
                        SendTimeoutError::Disconnected(_) => SubmitError::ShutDown,
                    }),
            }
        };
        drop(admission);

        match result {
            Ok(()) => inner.counters.record_submitted(),
            Err(_e) => {
                inner.counters.record_rejected();
                #[cfg(feature = "tracing")]
                tracing::warn!("Rejected unit of work: {_e}");
            }
        }
        result
    }

    /// Returns a token that is cancelled if shutdown gives up on running work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.abort.child_token()
    }

    pub fn num_workers(&self) -> usize {
        self.inner.config.num_workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.config.queue_capacity
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.inner.closing.is_cancelled()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner
            .counters
            .snapshot(self.inner.config.num_workers, self.inner.sender.len())
    }

    /// Gracefully shuts the pool down without blocking the async runtime.
    ///
    /// Runs [`WorkerPool::shutdown_blocking`] on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::shutdown_blocking`].
    pub async fn shutdown(&self) -> Result<ShutdownReport, PoolError> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.shutdown_blocking())
            .await
            .map_err(|e| PoolError::Join {
                reason: e.to_string(),
            })?
    }

    /// Gracefully shuts the pool down, blocking the calling thread.
    ///
    /// - Refuses new submissions.
    /// - Queues one shutdown message per worker behind outstanding work, so
    ///   everything already queued still runs.
    /// - Waits up to `shutdown_timeout` for every worker to acknowledge.
    /// - Cancels [`WorkerPool::cancellation_token`] if some never do.
    /// - Drops whatever is still queued, failing those futures with
    ///   [`DispatchError::Abandoned`](crate::DispatchError::Abandoned).
    /// - Joins the acknowledged workers and detaches the rest.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AlreadyShutDown`] on a second call and
    /// [`PoolError::Join`] if a worker thread panicked outside a job.
    pub fn shutdown_blocking(&self) -> Result<ShutdownReport, PoolError> {
        let inner = &*self.inner;
        if inner.shut_down.swap(true, Ordering::AcqRel) {
            return Err(PoolError::AlreadyShutDown);
        }

        let start = Instant::now();
        let deadline = start + inner.config.shutdown_timeout;
        let num_workers = inner.config.num_workers;

        // === Phase 0: Stop accepting new work ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new work");
        // Waits out submitters that already passed the closing check, so no
        // unit of work can land behind the shutdown messages.
        {
            let _closed = inner.admission.write();
            inner.closing.cancel();
        }

        // === Phase 1: Queue one shutdown per worker behind pending work ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining {} queued units of work", inner.sender.len());
        let (ack_tx, ack_rx) = crossbeam_channel::unbounded();
        let mut notified = 0;
        for _ in 0..num_workers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let request = WorkRequest::Shutdown {
                ack: ack_tx.clone(),
            };
            if let Err(_e) = inner.sender.send_timeout(request, remaining) {
                #[cfg(feature = "tracing")]
                tracing::warn!("Queue stayed full while notifying workers: {_e}");
                break;
            }
            notified += 1;
        }
        drop(ack_tx);

        // === Phase 2: Collect acknowledgements ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Waiting up to {:?} for shutdown acknowledgements", inner.config.shutdown_timeout);
        let mut acked = Vec::with_capacity(notified);
        while acked.len() < notified {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match ack_rx.recv_timeout(remaining) {
                Ok(worker_id) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {worker_id} shutdown acknowledged");
                    acked.push(worker_id);
                }
                Err(_) => break,
            }
        }

        // === Phase 3: Ask whatever is still running to give up ===
        if acked.len() < num_workers {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Graceful drain timed out ({} workers still busy)",
                num_workers - acked.len()
            );
            inner.abort.cancel();
        }

        // === Phase 4: Drop work no worker will take ===
        // Dropping a job drops its promise, which resolves the caller's
        // future as abandoned instead of leaving it pending.
        let mut dropped = 0usize;
        while let Ok(request) = inner.receiver.try_recv() {
            if let WorkRequest::Run(job) = request {
                drop(job);
                dropped += 1;
            }
        }
        #[cfg(feature = "tracing")]
        if dropped > 0 {
            tracing::warn!("Dropped {dropped} queued units of work that no worker will run");
        }

        // === Phase 5: Join acknowledged workers, detach the rest ===
        let mut handles = inner.handles.lock();
        let mut joined = 0;
        let mut join_error = None;
        for worker_id in acked {
            if let Some(handle) = handles.get_mut(worker_id).and_then(Option::take) {
                match handle.join() {
                    Ok(()) => joined += 1,
                    Err(payload) => join_error = Some(panic_message(&*payload)),
                }
            }
        }
        let abandoned = handles.iter_mut().filter_map(Option::take).count();
        drop(handles);

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete ({joined} joined, {abandoned} abandoned)");

        if let Some(reason) = join_error {
            return Err(PoolError::Join { reason });
        }

        Ok(ShutdownReport {
            joined,
            abandoned,
            dropped,
            elapsed: start.elapsed(),
        })
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
