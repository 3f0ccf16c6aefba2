//! Broker configuration.
//!
//! All settings come from the environment. The upstream API key is required
//! and held as a secret; it is attached to upstream requests only and never
//! reaches a browser-facing response.

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default upstream realtime-calls endpoint.
pub const DEFAULT_CALLS_URL: &str = "https://api.openai.com/v1/realtime/calls";

/// Default path the broker serves the SDP exchange on.
pub const DEFAULT_SESSION_PATH: &str = "/realtime/session";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY must be set to a non-empty value")]
    MissingApiKey,

    #[error("Invalid {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid SERVER_PORT: {0}")]
    InvalidPort(#[source] std::num::ParseIntError),
}

/// Server-side broker settings.
pub struct BrokerConfig {
    pub api_key: SecretString,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub calls_url: Url,
    pub session_path: String,
    pub app_origin: Option<String>,
    pub host: String,
    pub port: u16,
}

impl BrokerConfig {
    /// Load the configuration from environment variables.
    ///
    /// `OPENAI_API_KEY` is required and must be non-empty. Recognized
    /// optional variables: `OPENAI_ORGANIZATION`, `OPENAI_PROJECT`,
    /// `OPENAI_REALTIME_CALLS_URL`, `SESSION_PATH`, `APP_ORIGIN`,
    /// `SERVER_HOST`, `SERVER_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_var("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let calls_url = non_empty_var("OPENAI_REALTIME_CALLS_URL")
            .unwrap_or_else(|| DEFAULT_CALLS_URL.to_string());
        let calls_url = Url::parse(&calls_url)
            .map_err(|source| ConfigError::InvalidUrl { name: "OPENAI_REALTIME_CALLS_URL", source })?;

        let port = match non_empty_var("SERVER_PORT") {
            Some(raw) => raw.parse().map_err(ConfigError::InvalidPort)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            organization: non_empty_var("OPENAI_ORGANIZATION"),
            project: non_empty_var("OPENAI_PROJECT"),
            calls_url,
            session_path: normalize_path(
                non_empty_var("SESSION_PATH").unwrap_or_else(|| DEFAULT_SESSION_PATH.to_string()),
            ),
            app_origin: non_empty_var("APP_ORIGIN"),
            host: non_empty_var("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        })
    }

    /// Build a configuration for tests and embedding, without touching the
    /// environment.
    pub fn for_upstream(api_key: impl Into<String>, calls_url: Url) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            organization: None,
            project: None,
            calls_url,
            session_path: DEFAULT_SESSION_PATH.to_string(),
            app_origin: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') { path } else { format!("/{path}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_normalized_to_a_leading_slash() {
        assert_eq!(normalize_path("realtime/session".to_string()), "/realtime/session");
        assert_eq!(normalize_path("/custom".to_string()), "/custom");
    }
}
