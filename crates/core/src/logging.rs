//! Structured logging infrastructure for SkyRelay.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging from the `[logging]` configuration section.
///
/// `RUST_LOG` still takes precedence over `config.level`. With `json` set
/// the output is one JSON object per line, for log aggregation.
///
/// # Example
/// ```no_run
/// use skyrelay_core::{logging, LoggingConfig};
///
/// logging::init_from_config(&LoggingConfig::default());
/// ```
pub fn init_from_config(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(&config.level));
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
