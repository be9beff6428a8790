//! Tracing subscriber setup for embedding applications and tests

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{FileError, Result};

/// Installs a global subscriber. `RUST_LOG` overrides the configured level.
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={}",
            env!("CARGO_CRATE_NAME").replace('-', "_"),
            config.level
        )
        .into()
    });

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .try_init()
    };

    result.map_err(|e| FileError::Config(format!("Failed to install tracing subscriber: {}", e)))
}
