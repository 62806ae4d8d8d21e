//! Tracing initialization.
//!
//! Log verbosity is controlled with the standard `RUST_LOG` environment variable and
//! defaults to `info`. For example, `RUST_LOG=microbatch=debug` includes the
//! dispatcher's periodic status lines.

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber: an env-filtered fmt layer on stdout.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
