use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use offload::{Backpressure, PoolConfig};

/// What the worker pool does when every queue slot is taken.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureMode {
    /// Answer `503 Service Unavailable` right away.
    Reject,
    /// Wait up to `SUBMIT_TIMEOUT_MS` for a free slot.
    Block,
}

/// Runtime configuration for the `offload-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is honored), with defaults suitable for local development.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "offload-server",
    version,
    about = "A CRUD HTTP service running its blocking store calls on a worker pool"
)]
pub struct CliArgs {
    /// Number of worker threads executing blocking handlers.
    ///
    /// Workers spend most of their time parked on store I/O, so this is
    /// usually a multiple of the CPU count.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = default_workers())]
    pub num_workers: usize,

    /// Maximum number of handler calls waiting for a free worker.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Policy applied when the queue is full.
    ///
    /// Environment variable: `BACKPRESSURE`
    #[arg(long, env = "BACKPRESSURE", value_enum, default_value_t = BackpressureMode::Reject)]
    pub backpressure: BackpressureMode,

    /// How long a submission may wait for queue space under `block`.
    ///
    /// Environment variable: `SUBMIT_TIMEOUT_MS`
    #[arg(long, env = "SUBMIT_TIMEOUT_MS", default_value_t = 100)]
    pub submit_timeout_ms: u64,

    /// Per-request deadline for handler results, in milliseconds. `0`
    /// disables it.
    ///
    /// A handler that misses its deadline keeps running on its worker; only
    /// the response stops waiting for it.
    ///
    /// Environment variable: `HANDLER_DEADLINE_MS`
    #[arg(long, env = "HANDLER_DEADLINE_MS", default_value_t = 0)]
    pub handler_deadline_ms: u64,

    /// Seconds to wait for workers to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,

    /// Simulated latency of every store call, in milliseconds.
    ///
    /// Environment variable: `STORE_LATENCY_MS`
    #[arg(long, env = "STORE_LATENCY_MS", default_value_t = 5)]
    pub store_latency_ms: u64,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,
}

fn default_workers() -> usize {
    PoolConfig::default().num_workers
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub pool: PoolConfig,
    pub handler_deadline: Option<Duration>,
    pub store_latency: Duration,
    pub server_addr: String,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.queue_capacity == 0 {
            bail!("QUEUE_CAPACITY must be greater than 0");
        }

        let backpressure = match args.backpressure {
            BackpressureMode::Reject => Backpressure::Reject,
            BackpressureMode::Block if args.submit_timeout_ms == 0 => {
                bail!("SUBMIT_TIMEOUT_MS must be greater than 0 when BACKPRESSURE=block");
            }
            BackpressureMode::Block => Backpressure::Block {
                timeout: Duration::from_millis(args.submit_timeout_ms),
            },
        };

        let pool = PoolConfig::default()
            .with_workers(args.num_workers)
            .with_queue_capacity(args.queue_capacity)
            .with_backpressure(backpressure)
            .with_thread_name_prefix("crud-io")
            .with_shutdown_timeout(Duration::from_secs(args.shutdown_timeout));

        let handler_deadline =
            (args.handler_deadline_ms > 0).then(|| Duration::from_millis(args.handler_deadline_ms));

        Ok(Self {
            pool,
            handler_deadline,
            store_latency: Duration::from_millis(args.store_latency_ms),
            server_addr: args.server_addr,
        })
    }
}
