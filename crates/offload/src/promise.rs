//! Single-assignment result slot shared between a worker and an awaiting
//! task.
//!
//! [`promise`] returns the two halves of one pending result. The
//! [`Promise`] is moved into a unit of work and completed exactly once by the
//! worker that runs it; every completion method takes `self`, so a second
//! completion cannot be expressed. The [`PendingResult`] is the caller's half:
//! a [`Future`] that resolves to the value or the error written into the
//! promise.
//!
//! If the promise is dropped without being completed, the future resolves to
//! [`DispatchError::Abandoned`] instead of staying pending forever.

use crate::error::{DispatchError, Result, SubmitError};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use futures::future::{FutureExt, Shared};
use pin_project_lite::pin_project;
use tokio::{
    sync::oneshot,
    time::{Instant, Sleep, sleep_until},
};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Creates a connected [`Promise`] / [`PendingResult`] pair.
pub fn promise<T, E>() -> (Promise<T, E>, PendingResult<T, E>) {
    let (tx, rx) = oneshot::channel();
    (Promise { tx }, PendingResult::waiting(rx))
}

/// Write half of a pending result. Owned by exactly one unit of work.
#[derive(Debug)]
pub struct Promise<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Promise<T, E> {
    /// Resolves the pending result with `value`.
    pub fn fulfill(self, value: T) {
        self.complete(Ok(value));
    }

    /// Fails the pending result with the handler's own error.
    pub fn fail(self, err: E) {
        self.complete(Err(DispatchError::Handler(err)));
    }

    pub(crate) fn panicked(self, message: String) {
        self.complete(Err(DispatchError::Panicked { message }));
    }

    /// Writes the final outcome.
    ///
    /// If nobody is listening anymore (the caller dropped its future or a
    /// deadline already fired) the outcome is discarded.
    pub fn complete(self, outcome: Result<T, E>) {
        if self.tx.send(outcome).is_err() {
            #[cfg(feature = "tracing")]
            tracing::trace!("Pending result dropped before completion; discarding outcome");
        }
    }

    /// Returns `true` while the caller still holds the [`PendingResult`].
    pub fn is_observed(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[derive(Debug)]
enum State<T, E> {
    Waiting(oneshot::Receiver<Result<T, E>>),
    Ready(Result<T, E>),
    Done,
}

pin_project! {
    /// Read half of a pending result.
    ///
    /// Resolves to `Ok(T)` when the handler returned a value and to
    /// `Err(DispatchError<E>)` for every kind of failure. Optionally carries a
    /// deadline, armed lazily on first poll, and a cancellation token that is
    /// cancelled if this future is dropped or times out before completion.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct PendingResult<T, E> {
        state: State<T, E>,
        deadline: Option<(Instant, Duration)>,
        #[pin]
        timer: Option<Sleep>,
        cancel: Option<DropGuard>,
    }
}

impl<T, E> PendingResult<T, E> {
    fn waiting(rx: oneshot::Receiver<Result<T, E>>) -> Self {
        Self {
            state: State::Waiting(rx),
            deadline: None,
            timer: None,
            cancel: None,
        }
    }

    /// A pending result that has already failed to reach a worker.
    pub(crate) fn rejected(mut self, err: SubmitError) -> Self {
        self.state = State::Ready(Err(DispatchError::Rejected(err)));
        self
    }

    /// Fails the future with [`DispatchError::DeadlineExceeded`] if no
    /// outcome arrives within `after`, measured from now.
    ///
    /// The worker is not interrupted; its late outcome is discarded.
    pub fn with_deadline(mut self, after: Duration) -> Self {
        self.deadline = Some((Instant::now() + after, after));
        self
    }

    /// Cancels `token` if this future is dropped or times out before the
    /// outcome arrives. Completion disarms it.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token.drop_guard());
        self
    }

    /// Converts into a cloneable future so several observers can await the
    /// same outcome.
    pub fn shared(self) -> Shared<Self>
    where
        T: Clone,
        E: Clone,
    {
        FutureExt::shared(self)
    }
}

impl<T, E> Future for PendingResult<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        let outcome = match core::mem::replace(this.state, State::Done) {
            State::Waiting(mut rx) => match Pin::new(&mut rx).poll(cx) {
                // A closed channel means the promise was dropped uncompleted.
                Poll::Ready(res) => Some(res.unwrap_or(Err(DispatchError::Abandoned))),
                Poll::Pending => {
                    *this.state = State::Waiting(rx);
                    None
                }
            },
            State::Ready(out) => Some(out),
            State::Done => panic!("`PendingResult` polled after completion"),
        };

        if let Some(out) = outcome {
            if let Some(guard) = this.cancel.take() {
                guard.disarm();
            }
            return Poll::Ready(out);
        }

        if let Some((at, after)) = *this.deadline {
            if this.timer.is_none() {
                this.timer.set(Some(sleep_until(at)));
            }
            if let Some(timer) = this.timer.as_mut().as_pin_mut() {
                if timer.poll(cx).is_ready() {
                    *this.state = State::Done;
                    // Dropping the guard cancels the cooperative token.
                    this.cancel.take();
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Dispatched handler exceeded its {after:?} deadline");
                    return Poll::Ready(Err(DispatchError::DeadlineExceeded { after }));
                }
            }
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[tokio::test]
    async fn fulfilled_promise_resolves_value() {
        let (promise, pending) = promise::<u32, String>();
        assert!(promise.is_observed());
        promise.fulfill(42);
        assert_eq!(pending.await, Ok(42));
    }

    #[tokio::test]
    async fn failed_promise_resolves_handler_error() {
        let (promise, pending) = promise::<u32, &str>();
        promise.fail("not found");
        assert_eq!(pending.await, Err(DispatchError::Handler("not found")));
    }

    #[tokio::test]
    async fn completion_from_another_thread_wakes_the_task() {
        let (promise, pending) = promise::<&str, ()>();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.fulfill("done");
        });
        assert_eq!(pending.await, Ok("done"));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn dropped_promise_is_abandoned() {
        let (promise, pending) = promise::<u32, ()>();
        drop(promise);
        assert_eq!(pending.await, Err(DispatchError::Abandoned));
    }

    #[tokio::test]
    async fn dropped_pending_result_unobserves_promise() {
        let (promise, pending) = promise::<u32, ()>();
        drop(pending);
        assert!(!promise.is_observed());
        // Completing an unobserved promise is a silent no-op.
        promise.fulfill(1);
    }

    #[tokio::test]
    async fn rejected_result_is_ready_immediately() {
        let (_promise, pending) = promise::<u32, ()>();
        let pending = pending.rejected(SubmitError::ShutDown);
        assert_eq!(
            pending.await,
            Err(DispatchError::Rejected(SubmitError::ShutDown))
        );
    }

    #[tokio::test]
    async fn deadline_fails_and_cancels() {
        let token = CancellationToken::new();
        let (_promise, pending) = promise::<u32, ()>();
        let pending = pending
            .with_deadline(Duration::from_millis(20))
            .with_cancellation(token.clone());

        let after = Duration::from_millis(20);
        assert_eq!(
            pending.await,
            Err(DispatchError::DeadlineExceeded { after })
        );
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn completion_before_deadline_disarms_token() {
        let token = CancellationToken::new();
        let (promise, pending) = promise::<u32, ()>();
        let pending = pending
            .with_deadline(Duration::from_secs(5))
            .with_cancellation(token.clone());

        promise.fulfill(7);
        assert_eq!(pending.await, Ok(7));
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_pending_result_cancels_token() {
        let token = CancellationToken::new();
        let (_promise, pending) = promise::<u32, ()>();
        let pending = pending.with_cancellation(token.clone());
        drop(pending);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn shared_observers_see_the_same_outcome() {
        let (promise, pending) = promise::<u32, String>();
        let first = pending.shared();
        let second = first.clone();
        promise.fail("boom".to_string());

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a, Err(DispatchError::Handler("boom".to_string())));
        assert_eq!(a, b);
    }
}
