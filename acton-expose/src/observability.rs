//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

fn level_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn announce(config: &Config, format: &'static str) {
    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        format,
        "Logging ready"
    );
}

/// Initialize JSON log output filtered by `service.log_level`
///
/// An unparsable level falls back to `info`. A second call fails instead of
/// replacing the installed subscriber.
#[cfg(feature = "observability")]
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(level_filter(config))
        .try_init()
        .map_err(|e| Error::Internal(format!("subscriber already installed: {e}")))?;

    announce(config, "json");
    Ok(())
}

/// Initialize human-readable log output
#[cfg(not(feature = "observability"))]
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(level_filter(config))
        .try_init()
        .map_err(|e| Error::Internal(format!("subscriber already installed: {e}")))?;

    announce(config, "text");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = Config::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
