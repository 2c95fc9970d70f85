//! Logging initialization for embedding binaries and tests

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. `RUST_LOG` overrides the
/// default filter. Safe to call once per process.
pub fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("harbor={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
