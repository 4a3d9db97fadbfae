//! Structured logging infrastructure for the DPE.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system from configuration.
///
/// `RUST_LOG` takes precedence over `config.filter` when set.
///
/// # Example
/// ```no_run
/// use dpe_core::{config::LoggingConfig, logging};
///
/// logging::init(&LoggingConfig::default());
/// tracing::info!("Application started");
/// ```
pub fn init(config: &LoggingConfig) {
    match config.format {
        LogFormat::Pretty => init_pretty(&config.filter),
        LogFormat::Json => init_json(&config.filter),
    }
}

/// Human-readable output with targets and thread ids.
pub fn init_pretty(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// JSON output for log aggregation systems.
pub fn init_json(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(default_filter))
}

/// `directives` if they parse, otherwise plain `info`.
fn configured_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}
