use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber for the binaries. Filter comes from
/// `RUST_LOG`, falling back to `default_filter`. Logs go to stderr so stdout
/// stays free for snapshots and notices.
pub fn init_tracing(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init();
}
