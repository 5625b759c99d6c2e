//! Structured logging setup.
//!
//! Installs a global `tracing-subscriber` formatter from a [`LoggingConfig`].
//! `RUST_LOG`, when set, takes precedence over the configured level.

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Build the filter for `config`, letting `RUST_LOG` override it.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_str().to_ascii_lowercase())
    })
}

/// Install the global subscriber.
///
/// Calling this when a subscriber is already installed (a second call, or a
/// test harness that set its own) is not an error.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if !config.log_to_console {
        return Ok(());
    }
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    match result {
        Ok(()) => {
            info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
            Ok(())
        }
        // Lost a race with another initializer
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(ProtocolError::ConfigError(format!(
            "Failed to initialize logging: {e}"
        ))),
    }
}
