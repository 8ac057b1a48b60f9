//! # Structured Logging
//!
//! `tracing` subscriber setup for the node. The filter honors `RUST_LOG`
//! when set and otherwise falls back to the caller's default directives.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format, selectable from the CLI (`--log-format`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable output for local development.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

/// Installs the global tracing subscriber. Call once, early in `main()`;
/// a second call panics.
///
/// `default_directives` applies when `RUST_LOG` is unset, e.g.
/// `"deedflow_node=info,deedflow_contracts=info"`.
pub fn init_logging(default_directives: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
    }

    tracing::info!(?format, "logging initialized");
}
