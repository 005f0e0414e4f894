use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Installs the global subscriber.
///
/// `RUST_LOG` sets the filter (default `info`). `PRODBOARD_LOG_FORMAT=json`
/// switches to JSON lines. Records from the `log` facade are bridged into
/// tracing so library logs carry the active job span.
pub fn init_logging() -> Result<(), String> {
    tracing_log::LogTracer::init().map_err(|e| format!("Failed to bridge log records: {}", e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PRODBOARD_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        let subscriber = Registry::default().with(filter).with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr),
        );
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(filter).with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        );
        tracing::subscriber::set_global_default(subscriber)
    };

    result.map_err(|e| format!("Failed to install tracing subscriber: {}", e))
}
