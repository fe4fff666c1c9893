//! Structured logging setup
//!
//! Provides JSON-formatted and human-readable logging through the tracing
//! ecosystem. The level filter comes from `RUST_LOG` when set, otherwise
//! from the configured level.

use crate::error::Result;
use crate::settings::LoggingSettings;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes logging based on configuration
///
/// Call once at process startup, before the service handles any request.
///
/// # Errors
///
/// Returns an error when the configured level is not a valid filter
/// directive or a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use parley::logging::init_logging;
/// use parley::settings::LoggingSettings;
///
/// init_logging(&LoggingSettings::default()).unwrap();
/// ```
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if settings.json_format {
        let stdout_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true);
        registry.with(stdout_layer).try_init()?;
    } else {
        let stdout_layer = fmt::layer().with_target(true).with_level(true);
        registry.with(stdout_layer).try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        let settings = LoggingSettings {
            level: "not a directive ][".to_string(),
            json_format: false,
        };
        // RUST_LOG may rescue the bad level; only assert when it is unset.
        if std::env::var("RUST_LOG").is_err() {
            assert!(init_logging(&settings).is_err());
        }
    }

    #[test]
    fn test_default_settings_level() {
        let settings = LoggingSettings::default();
        assert_eq!(settings.level, "info");
        assert!(!settings.json_format);
    }
}
