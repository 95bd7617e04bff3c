//! Logging setup for the compression service using `tracing_subscriber`.
//!
//! Lambda deployments log flattened JSON so that CloudWatch can index the
//! fields; local runs can switch to the pretty formatter.

use serde::Deserialize;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the log lines.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over
/// `directives` when it is set.
///
/// # Arguments
///
/// - `directives` - Filter directives, e.g. `info,compress_api=debug`
/// - `format` - Whether to emit JSON or pretty output
pub fn setup_logging(directives: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_target(false)
                .with_current_span(true)
                .with_span_list(true)
                .with_line_number(true)
                .with_file(true)
                .with_timer(UtcTime::rfc_3339());
            registry.with(layer).init()
        }
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_timer(UtcTime::rfc_3339());
            registry.with(layer).init()
        }
    }
}
