//! Configuration types for the HTTP service
//!
//! Configuration is assembled once at start-up and passed to the server as
//! a value; nothing reads the environment after that.

use crate::errors::ConfigError;
use event_relay_core::{ExtractionOptions, ForwarderConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable naming an additional YAML configuration file
pub const CONFIG_FILE_ENV: &str = "RELAY_CONFIG_FILE";

/// Prefix for structured environment overrides, e.g. `RELAY__SERVER__HOST`
pub const ENV_PREFIX: &str = "RELAY";

/// Well-known variables and the configuration keys they set
const WELL_KNOWN_ENV: [(&str, &str); 4] = [
    ("PORT", "server.port"),
    ("DIREKTIV_ENDPOINT", "downstream.endpoint"),
    ("DIREKTIV_NAMESPACE", "downstream.namespace"),
    ("DIREKTIV_TOKEN", "downstream.token"),
];

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Direktiv destination settings
    pub downstream: DownstreamConfig,

    /// Inbound header handling
    pub extraction: ExtractionOptions,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        if self.server.timeout_seconds == 0 || self.downstream.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "timeouts must be at least one second".to_string(),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be non-zero".to_string(),
            });
        }

        if self.downstream.endpoint.is_empty() {
            return Err(ConfigError::Missing {
                key: "downstream.endpoint (DIREKTIV_ENDPOINT)".to_string(),
            });
        }

        if self.downstream.namespace.is_empty() {
            return Err(ConfigError::Missing {
                key: "downstream.namespace (DIREKTIV_NAMESPACE)".to_string(),
            });
        }

        Ok(())
    }

    /// Settings for the forwarder built at start-up
    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig::new(
            self.downstream.endpoint.clone(),
            self.downstream.namespace.clone(),
            self.downstream.token.clone(),
        )
        .with_timeout(Duration::from_secs(self.downstream.timeout_seconds))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upper bound for handling one request, including the downstream call
    pub timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 60,
            shutdown_timeout_seconds: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Direktiv destination configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Direktiv API base URL
    pub endpoint: String,

    /// Namespace receiving the broadcast
    pub namespace: String,

    /// Access token sent as `direktiv-token`
    #[serde(skip_serializing)]
    pub token: String,

    /// Timeout for one downstream exchange in seconds
    pub timeout_seconds: u64,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            namespace: String::new(),
            token: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl fmt::Debug for DownstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownstreamConfig")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("token", &"<REDACTED>")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Load the service configuration.
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/event-relay/service.yaml`
///  2. `./config/service.yaml`
///  3. the file named by `RELAY_CONFIG_FILE` (must exist when set)
///  4. `RELAY__`-prefixed environment variables, `__` separating sections
///  5. `PORT`, `DIREKTIV_ENDPOINT`, `DIREKTIV_NAMESPACE`, `DIREKTIV_TOKEN`
///
/// Every field has a default, so absent files are fine. The result is not
/// validated; call [`ServiceConfig::validate`] before using it.
pub fn load_configuration() -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/event-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var(CONFIG_FILE_ENV) {
        if !explicit_path.is_empty() {
            builder = builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

    for (variable, key) in WELL_KNOWN_ENV {
        // Empty counts as unset, so `PORT=` still falls back to 8080
        let value = std::env::var(variable).ok().filter(|v| !v.is_empty());
        builder = builder.set_override_option(key, value)?;
    }

    let service_config = builder.build()?.try_deserialize()?;
    Ok(service_config)
}
