use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global `tracing` subscriber.
///
/// Events are printed to the console through `tracing_subscriber::fmt`.
/// Filtering follows `RUST_LOG` and falls back to `info`. Worker thread ids
/// are included so it is visible which pool thread ran a handler.
pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()?;

    Ok(())
}
