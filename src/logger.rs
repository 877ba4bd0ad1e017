use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Set up the global tracing subscriber.
///
/// Configured to use ISO-8601, of which rfc3339 is a subset. The filter is
/// read from the `RUST_LOG` env var; accepted values are `trace`, `debug`,
/// `info`, `warn`, and `error`.
pub fn initialize() {
    let info_env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(info_env_filter)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_err| eprintln!("Unable to set global default subscriber"))
        .expect("Failed to set trace subscriber");
}
