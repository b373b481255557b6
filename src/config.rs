//! Configuration for callguard

use crate::error::{CallguardError, Result};
use std::env;
use url::Url;

/// Daemon configuration
///
/// All fields are optional; a config with no collector address produces a
/// disabled daemon that runs calls without recording telemetry.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Environment label attached to every shipped batch (e.g. "prod")
    pub environment: String,

    /// Service label attached to every shipped batch
    pub service: String,

    /// Collector address; only the host component is dialed
    pub collector_addr: Option<Url>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(environment) = env::var("CALLGUARD_ENVIRONMENT") {
            config.environment = environment;
        }

        if let Ok(service) = env::var("CALLGUARD_SERVICE") {
            config.service = service;
        }

        if let Ok(addr) = env::var("CALLGUARD_COLLECTOR_ADDR") {
            config.collector_addr = Some(addr.parse().map_err(|e| {
                CallguardError::Config(format!("invalid CALLGUARD_COLLECTOR_ADDR: {e}"))
            })?);
        }

        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = Config::default();
        assert!(config.environment.is_empty());
        assert!(config.collector_addr.is_none());
    }

    #[test]
    fn test_collector_addr_parses() {
        let config = Config {
            collector_addr: Some("http://collector:8000".parse().unwrap()),
            ..Config::default()
        };
        let addr = config.collector_addr.unwrap();
        assert_eq!(addr.host_str(), Some("collector"));
        assert_eq!(addr.port(), Some(8000));
    }
}
