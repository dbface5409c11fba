use super::stats::Counters;
use core::any::Any;
use crossbeam_channel::{Receiver, Sender};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

/// A zero-argument unit of work, owned by the queue until a worker takes it.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Messages consumed by [`worker_loop`].
pub(crate) enum WorkRequest {
    /// Execute a unit of work to completion.
    Run(Job),
    /// Stop after acknowledging with this worker's index. Queued behind any
    /// outstanding work, so a worker only sees it once earlier jobs are taken.
    Shutdown { ack: Sender<usize> },
}

/// Body of every worker thread.
///
/// Pulls [`WorkRequest`]s off the shared queue until it receives
/// [`WorkRequest::Shutdown`] or every sender is gone. A panicking job is
/// caught here so the thread survives and keeps serving the pool.
pub(crate) fn worker_loop(worker_id: usize, rx: Receiver<WorkRequest>, counters: Arc<Counters>) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Ok(work) = rx.recv() {
        match work {
            WorkRequest::Run(job) => run_job(worker_id, job, &counters),
            WorkRequest::Shutdown { ack } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if ack.send(worker_id).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

fn run_job(_worker_id: usize, job: Job, counters: &Counters) {
    counters.record_started();
    let outcome = panic::catch_unwind(AssertUnwindSafe(job));
    counters.record_finished(outcome.is_err());

    if let Err(_payload) = outcome {
        #[cfg(feature = "tracing")]
        tracing::error!(
            "Worker {_worker_id} caught a panicking job: {}",
            panic_message(&*_payload)
        );
    }
}

/// Best-effort extraction of the message passed to `panic!`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static message");

        let payload = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted 7");

        let payload = panic::catch_unwind(|| std::panic::panic_any(5_u8)).unwrap_err();
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }

    #[test]
    fn worker_survives_panics_and_acknowledges_shutdown() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (ack_tx, ack_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let handle = thread::spawn(move || worker_loop(3, rx, worker_counters));

        tx.send(WorkRequest::Run(Box::new(|| panic!("boom")))).unwrap();
        tx.send(WorkRequest::Run(Box::new(move || done_tx.send(()).unwrap())))
            .unwrap();
        tx.send(WorkRequest::Shutdown { ack: ack_tx }).unwrap();

        done_rx.recv().unwrap();
        assert_eq!(ack_rx.recv().unwrap(), 3);
        handle.join().unwrap();

        let stats = counters.snapshot(1, 0);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn worker_exits_when_queue_disconnects() {
        let (tx, rx) = crossbeam_channel::unbounded::<WorkRequest>();
        let counters = Arc::new(Counters::default());
        let handle = thread::spawn(move || worker_loop(0, rx, counters));
        drop(tx);
        handle.join().unwrap();
    }
}
