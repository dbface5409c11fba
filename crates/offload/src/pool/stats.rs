use crossbeam_utils::CachePadded;
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time view of a [`WorkerPool`](crate::WorkerPool).
///
/// Counters are read individually with relaxed ordering, so a snapshot taken
/// under load is approximate rather than a consistent cut.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads the pool was built with.
    pub workers: usize,
    /// Units of work waiting in the queue.
    pub queued: usize,
    /// Units of work currently executing.
    pub active: usize,
    /// Units of work accepted by `submit`.
    pub submitted: u64,
    /// Units of work that ran to completion.
    pub completed: u64,
    /// Submissions refused by backpressure or shutdown.
    pub rejected: u64,
    /// Units of work that panicked past the dispatch adapter.
    pub panicked: u64,
}

// Submitters and workers hammer different counters; padding keeps them off
// each other's cache lines.
#[derive(Default)]
pub(crate) struct Counters {
    submitted: CachePadded<AtomicU64>,
    rejected: CachePadded<AtomicU64>,
    active: CachePadded<AtomicUsize>,
    completed: CachePadded<AtomicU64>,
    panicked: AtomicU64,
}

impl Counters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self, panicked: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if panicked {
            self.panicked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, workers: usize, queued: usize) -> PoolStats {
        PoolStats {
            workers,
            queued,
            active: self.active.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let counters = Counters::default();
        counters.record_submitted();
        counters.record_submitted();
        counters.record_rejected();
        counters.record_started();
        counters.record_started();
        counters.record_finished(false);

        let stats = counters.snapshot(4, 3);
        assert_eq!(
            stats,
            PoolStats {
                workers: 4,
                queued: 3,
                active: 1,
                submitted: 2,
                completed: 1,
                rejected: 1,
                panicked: 0,
            }
        );

        counters.record_finished(true);
        let stats = counters.snapshot(4, 0);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.panicked, 1);
    }
}
