//! Logging setup for the Trellis platform.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

pub mod logging;
pub use logging::{init_logging, try_init_test_logging};

/// Configuration for initializing logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset (e.g., "info,trellis_core=debug")
    pub log_filter: String,
    /// JSON output instead of the pretty formatter
    pub json: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "trellis".to_string(),
            log_filter: "info".to_string(),
            json: false,
        }
    }
}

impl MonitoringConfig {
    /// Defaults overridden by `LOG_FILTER` and `LOG_FORMAT`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(filter) = env::var("LOG_FILTER") {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        if let Ok(format) = env::var("LOG_FORMAT") {
            match format.trim().to_ascii_lowercase().as_str() {
                "json" => config.json = true,
                "pretty" => config.json = false,
                other => warn!("Invalid LOG_FORMAT value: {}", other),
            }
        }

        config
    }

    /// Set the service name
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }
}
