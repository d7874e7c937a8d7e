//! Tracing subscriber configuration.

use teamflow_core::config::LoggingConfig;
use teamflow_core::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins over the configured directive.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| config.filter.clone());
    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("invalid log filter '{}': {}, falling back to 'info'", directive, e);
        EnvFilter::new("info")
    })
}

/// Install the global subscriber with plain or JSON formatting.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn configure_tracing(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {}", e)))?;
    tracing::debug!(json = config.json, filter = %config.filter, "Tracing configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_an_error() {
        let config = LoggingConfig::default();
        // Another test binary may already own the global subscriber, so only
        // the second call is asserted.
        let _ = configure_tracing(&config);
        assert!(configure_tracing(&config).is_err());
    }
}
