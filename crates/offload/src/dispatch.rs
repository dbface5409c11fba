//! Synchronous-to-asynchronous handler adaptation.
//!
//! [`Dispatcher::dispatch`] is the single core: it takes a zero-argument
//! closure, creates a [`PendingResult`] on the calling thread, ships the
//! closure to the [`WorkerPool`], and returns immediately. On the worker the
//! closure runs inside `catch_unwind`; its value, its error or its panic is
//! written into the promise exactly once.
//!
//! [`Dispatcher::adapt`] and [`Dispatcher::adapt_with`] turn one- and
//! two-argument handlers into same-arity functions returning
//! [`PendingResult`]. Both simply capture their arguments into a closure and
//! hand it to `dispatch`, so every arity shares the same completion logic.

use crate::{
    pool::{WorkerPool, panic_message},
    promise::{PendingResult, Promise, promise},
};
use core::time::Duration;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

/// Hands blocking handlers to a [`WorkerPool`] and returns futures for their
/// outcomes.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    pool: WorkerPool,
    deadline: Option<Duration>,
}

impl Dispatcher {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            pool,
            deadline: None,
        }
    }

    /// Fails every dispatched future that has not resolved within `deadline`.
    ///
    /// The handler keeps running on its worker; only the caller stops
    /// waiting. Use [`Dispatcher::dispatch_cancellable`] for handlers that can
    /// notice and bail out early.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs `work` on the pool and returns a future for its outcome.
    ///
    /// Never waits for `work` to run. If the pool refuses the submission,
    /// the returned future is already failed with
    /// [`DispatchError::Rejected`](crate::DispatchError::Rejected).
    pub fn dispatch<F, T, E>(&self, work: F) -> PendingResult<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (promise, pending) = promise();
        self.submit(work, promise, self.arm(pending))
    }

    /// Like [`Dispatcher::dispatch`], but passes `work` a cooperative
    /// cancellation token.
    ///
    /// The token is cancelled when the deadline fires, when the returned
    /// future is dropped before completion, or when pool shutdown gives up
    /// waiting. Nothing forces `work` to stop; it should poll
    /// [`CancellationToken::is_cancelled`] between blocking steps.
    pub fn dispatch_cancellable<F, T, E>(&self, work: F) -> PendingResult<T, E>
    where
        F: FnOnce(&CancellationToken) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let token = self.pool.cancellation_token();
        let (promise, pending) = promise();
        let pending = self.arm(pending).with_cancellation(token.clone());
        self.submit(move || work(&token), promise, pending)
    }

    /// Adapts `handler(ctx)` into `adapted(ctx) -> PendingResult`.
    pub fn adapt<C, T, E, H>(
        &self,
        handler: H,
    ) -> impl Fn(C) -> PendingResult<T, E> + Clone + Send + Sync + 'static + use<C, T, E, H>
    where
        H: Fn(C) -> Result<T, E> + Send + Sync + 'static,
        C: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let dispatcher = self.clone();
        let handler = Arc::new(handler);
        move |ctx| {
            let handler = Arc::clone(&handler);
            dispatcher.dispatch(move || handler(ctx))
        }
    }

    /// Adapts `handler(ctx, payload)` into
    /// `adapted(ctx, payload) -> PendingResult`.
    pub fn adapt_with<C, P, T, E, H>(
        &self,
        handler: H,
    ) -> impl Fn(C, P) -> PendingResult<T, E> + Clone + Send + Sync + 'static + use<C, P, T, E, H>
    where
        H: Fn(C, P) -> Result<T, E> + Send + Sync + 'static,
        C: Send + 'static,
        P: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let dispatcher = self.clone();
        let handler = Arc::new(handler);
        move |ctx, payload| {
            let handler = Arc::clone(&handler);
            dispatcher.dispatch(move || handler(ctx, payload))
        }
    }

    fn arm<T, E>(&self, pending: PendingResult<T, E>) -> PendingResult<T, E> {
        match self.deadline {
            Some(deadline) => pending.with_deadline(deadline),
            None => pending,
        }
    }

    fn submit<F, T, E>(
        &self,
        work: F,
        promise: Promise<T, E>,
        pending: PendingResult<T, E>,
    ) -> PendingResult<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        match self.pool.submit(move || run_to_completion(work, promise)) {
            Ok(()) => pending,
            // The promise was dropped along with the refused job.
            Err(err) => pending.rejected(err),
        }
    }
}

/// Executes `work` and writes exactly one outcome into `promise`.
fn run_to_completion<F, T, E>(work: F, promise: Promise<T, E>)
where
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => promise.fulfill(value),
        Ok(Err(err)) => promise.fail(err),
        Err(payload) => {
            let message = panic_message(&*payload);
            #[cfg(feature = "tracing")]
            tracing::error!("Dispatched handler panicked: {message}");
            promise.panicked(message);
        }
    }
}
