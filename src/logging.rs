use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `log` records from the library and from
/// `ort` are forwarded to it.
///
/// Uses RUST_LOG for filtering (defaults to "info" if not set).
pub fn setup_logging() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();
}
