//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Installs the global subscriber. A `RUST_LOG` in the environment
/// replaces the filter built from `level`.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .init(),
        LogFormat::Pretty => subscriber.with(fmt::layer()).init(),
    }

    tracing::debug!(%level, ?format, "tracing ready");
}

// Targets match by prefix, so `gitgate` covers every workspace crate.
// Request spans come from tower_http at debug.
fn default_directives(level: &str) -> String {
    format!("gitgate={level},tower_http=debug,axum::rejection=trace")
}
