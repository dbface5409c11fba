//! Worker pool that runs blocking units of work off the reactor.
//!
//! ## Structure
//!
//! - `manager` - the [`WorkerPool`] handle: submission, backpressure and
//!   staged shutdown.
//! - `worker` - the loop each worker thread runs.
//! - `stats` - lock-free counters exposed as [`PoolStats`].

mod manager;
mod stats;
mod worker;

pub use manager::{ShutdownReport, WorkerPool};
pub use stats::PoolStats;
pub(crate) use worker::panic_message;
