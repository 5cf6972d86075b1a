//! Server Configuration Settings
//!
//! Configuration types for the quote server, loaded from environment
//! variables. Every variable is optional; unset variables take the
//! defaults below, malformed ones are rejected.

use std::time::Duration;

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 50505,
            health_port: 8086,
        }
    }
}

/// Per-session stream settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Capacity of each session's outbound response buffer.
    pub outbound_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: 16,
        }
    }
}

/// Market data provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Provider base URL (scheme and host, no trailing slash).
    pub base_url: String,
    /// HTTP request timeout for one lookup.
    pub http_timeout: Duration,
    /// Upper bound on one resolver call, including queueing for a
    /// blocking thread.
    pub lookup_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            http_timeout: Duration::from_millis(4_000),
            lookup_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteServerConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Per-session stream settings.
    pub session: SessionSettings,
    /// Market data provider settings.
    pub provider: ProviderSettings,
}

impl QuoteServerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_defaults = ServerSettings::default();
        let session_defaults = SessionSettings::default();
        let provider_defaults = ProviderSettings::default();

        let server = ServerSettings {
            grpc_port: parse_var(&lookup, "QUOTE_SERVER_GRPC_PORT", server_defaults.grpc_port)?,
            health_port: parse_var(
                &lookup,
                "QUOTE_SERVER_HEALTH_PORT",
                server_defaults.health_port,
            )?,
        };

        let session = SessionSettings {
            outbound_buffer: parse_var(
                &lookup,
                "QUOTE_SERVER_OUTBOUND_BUFFER",
                session_defaults.outbound_buffer,
            )?,
        };

        let provider = ProviderSettings {
            base_url: lookup("QUOTE_PROVIDER_BASE_URL")
                .map_or(provider_defaults.base_url, |url| {
                    url.trim_end_matches('/').to_string()
                }),
            http_timeout: parse_millis(
                &lookup,
                "QUOTE_PROVIDER_HTTP_TIMEOUT_MS",
                provider_defaults.http_timeout,
            )?,
            lookup_timeout: parse_millis(
                &lookup,
                "QUOTE_LOOKUP_TIMEOUT_MS",
                provider_defaults.lookup_timeout,
            )?,
        };

        let config = Self {
            server,
            session,
            provider,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.grpc_port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_SERVER_GRPC_PORT",
                reason: "port must be non-zero".to_string(),
            });
        }

        if self.session.outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_SERVER_OUTBOUND_BUFFER",
                reason: "buffer must hold at least one response".to_string(),
            });
        }

        if self.provider.base_url.is_empty() {
            return Err(ConfigError::EmptyValue("QUOTE_PROVIDER_BASE_URL"));
        }

        if self.provider.lookup_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_LOOKUP_TIMEOUT_MS",
                reason: "timeout must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(&'static str),
    /// Environment variable could not be parsed or is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Err(ConfigError::EmptyValue(key)),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
            }),
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_var(lookup, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> Result<QuoteServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        QuoteServerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config, QuoteServerConfig::default());
        assert_eq!(config.server.grpc_port, 50505);
        assert_eq!(config.server.health_port, 8086);
        assert_eq!(config.session.outbound_buffer, 16);
        assert_eq!(config.provider.lookup_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_with(&[
            ("QUOTE_SERVER_GRPC_PORT", "6000"),
            ("QUOTE_SERVER_HEALTH_PORT", "0"),
            ("QUOTE_SERVER_OUTBOUND_BUFFER", "4"),
            ("QUOTE_PROVIDER_BASE_URL", "http://localhost:9999/"),
            ("QUOTE_PROVIDER_HTTP_TIMEOUT_MS", "250"),
            ("QUOTE_LOOKUP_TIMEOUT_MS", "300"),
        ])
        .unwrap();

        assert_eq!(config.server.grpc_port, 6000);
        assert_eq!(config.server.health_port, 0);
        assert_eq!(config.session.outbound_buffer, 4);
        assert_eq!(config.provider.base_url, "http://localhost:9999");
        assert_eq!(config.provider.http_timeout, Duration::from_millis(250));
        assert_eq!(config.provider.lookup_timeout, Duration::from_millis(300));
    }

    #[test]
    fn malformed_port_is_rejected() {
        let err = config_with(&[("QUOTE_SERVER_GRPC_PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "QUOTE_SERVER_GRPC_PORT",
                ..
            }
        ));
    }

    #[test]
    fn empty_value_is_rejected() {
        let err = config_with(&[("QUOTE_LOOKUP_TIMEOUT_MS", " ")]).unwrap_err();
        assert_eq!(err, ConfigError::EmptyValue("QUOTE_LOOKUP_TIMEOUT_MS"));
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = config_with(&[("QUOTE_SERVER_OUTBOUND_BUFFER", "0")]).unwrap_err();
        assert!(err.to_string().contains("QUOTE_SERVER_OUTBOUND_BUFFER"));
    }

    #[test]
    fn zero_grpc_port_is_rejected() {
        assert!(config_with(&[("QUOTE_SERVER_GRPC_PORT", "0")]).is_err());
    }
}
