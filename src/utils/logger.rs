use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialises the global tracing subscriber, writing structured log lines to stdout.
///
/// Verbosity is controlled by `RUST_LOG` (defaults to `info` when unset), since this
/// service runs containerised and a container's logs belong on stdout, not in a file
/// under a local `logs/` directory.
pub fn init_logger() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    info!("logger initialized");

    Ok(())
}
