//! Pipeline configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::options::CallOptions;

/// Content type for url-encoded forms.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded;charset=UTF-8";
/// Content type for JSON bodies.
pub const JSON: &str = "application/json;charset=UTF-8";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// File could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Origin all relative URLs are resolved against.
    pub base_url: Option<String>,
    /// Prefix joined onto request paths when `join_prefix` is set.
    pub url_prefix: String,
    /// Locale sent as `lang` when `join_locale` is set.
    pub locale: String,
    /// Default per-call options.
    pub request_options: CallOptions,
    /// Transport request timeout.
    pub timeout: Duration,
    /// Transport connection timeout.
    pub connect_timeout: Duration,
    /// Default headers for all requests.
    pub default_headers: Vec<(String, String)>,
    /// User agent string.
    pub user_agent: String,
    /// Header carrying the access token.
    pub credential_header: String,
    /// Path of the token refresh endpoint.
    pub refresh_path: String,
    /// Time before expiry at which a credential is refreshed.
    pub refresh_margin: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            url_prefix: String::new(),
            locale: "zh_CN".to_string(),
            request_options: CallOptions::default(),
            timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            default_headers: Vec::new(),
            user_agent: format!("courier-http/{}", env!("CARGO_PKG_VERSION")),
            credential_header: "Access-Token".to_string(),
            refresh_path: "/access-token".to_string(),
            refresh_margin: Duration::from_secs(180),
        }
    }
}

/// On-disk shape of [`PipelineConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PipelineFile {
    base_url: Option<String>,
    url_prefix: Option<String>,
    locale: Option<String>,
    request_options: Option<CallOptions>,
    timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    headers: Vec<(String, String)>,
    user_agent: Option<String>,
    credential_header: Option<String>,
    refresh_path: Option<String>,
    refresh_margin_secs: Option<u64>,
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: PipelineFile = toml::from_str(content)?;
        let mut config = Self::default();

        if file.base_url.is_some() {
            config.base_url = file.base_url;
        }
        if let Some(prefix) = file.url_prefix {
            config.url_prefix = prefix;
        }
        if let Some(locale) = file.locale {
            config.locale = locale;
        }
        if let Some(options) = file.request_options {
            config.request_options = options;
        }
        if let Some(secs) = file.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        config.default_headers.extend(file.headers);
        if let Some(ua) = file.user_agent {
            config.user_agent = ua;
        }
        if let Some(header) = file.credential_header {
            config.credential_header = header;
        }
        if let Some(path) = file.refresh_path {
            config.refresh_path = path;
        }
        if let Some(secs) = file.refresh_margin_secs {
            config.refresh_margin = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply `COURIER_*` environment overrides.
    ///
    /// Recognized: `COURIER_BASE_URL`, `COURIER_URL_PREFIX`, `COURIER_LOCALE`,
    /// `COURIER_TIMEOUT_SECS`.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(std::env::vars())
    }

    fn with_vars(
        mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        for (key, value) in vars {
            match key.as_str() {
                "COURIER_BASE_URL" => self.base_url = Some(value),
                "COURIER_URL_PREFIX" => self.url_prefix = value,
                "COURIER_LOCALE" => self.locale = value,
                "COURIER_TIMEOUT_SECS" => {
                    let secs = value.parse::<u64>().map_err(|e| {
                        ConfigError::Invalid(format!("COURIER_TIMEOUT_SECS: {}", e))
                    })?;
                    self.timeout = Duration::from_secs(secs);
                }
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".to_string()));
        }
        if self.credential_header.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "credential_header must not be empty".to_string(),
            ));
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base)
                .map_err(|e| ConfigError::Invalid(format!("base_url: {}", e)))?;
        }
        Ok(())
    }
}

/// Builder for pipeline configuration.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the origin relative URLs resolve against.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the URL prefix.
    pub fn url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.url_prefix = prefix.into();
        self
    }

    /// Set the locale.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    /// Set the default per-call options.
    pub fn request_options(mut self, options: CallOptions) -> Self {
        self.config.request_options = options;
        self
    }

    /// Set the transport request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the transport connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Add a default header for all requests.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the header carrying the access token.
    pub fn credential_header(mut self, header: impl Into<String>) -> Self {
        self.config.credential_header = header.into();
        self
    }

    /// Set the token refresh path.
    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.config.refresh_path = path.into();
        self
    }

    /// Set the refresh safety margin.
    pub fn refresh_margin(mut self, margin: Duration) -> Self {
        self.config.refresh_margin = margin;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ErrorMessageMode;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.refresh_margin, Duration::from_secs(180));
        assert_eq!(config.credential_header, "Access-Token");
        assert!(config.request_options.with_credential);
    }

    #[test]
    fn test_from_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            base_url = "https://api.example.com"
            url_prefix = "/basic-api"
            timeout_secs = 5
            headers = [["X-Client", "courier"]]

            [request_options]
            joinTime = false
            errorMessageMode = "modal"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.url_prefix, "/basic-api");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.default_headers,
            vec![("X-Client".to_string(), "courier".to_string())]
        );
        assert!(!config.request_options.join_time);
        assert!(config.request_options.format_date);
        assert_eq!(
            config.request_options.error_message_mode,
            ErrorMessageMode::Modal
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = PipelineConfig::from_toml_str(r#"base_url = "not a url""#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::default()
            .with_vars(vec![
                ("COURIER_URL_PREFIX".to_string(), "/api".to_string()),
                ("COURIER_TIMEOUT_SECS".to_string(), "7".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ])
            .unwrap();
        assert_eq!(config.url_prefix, "/api");
        assert_eq!(config.timeout, Duration::from_secs(7));

        let result = PipelineConfig::default()
            .with_vars(vec![("COURIER_TIMEOUT_SECS".to_string(), "soon".to_string())]);
        assert!(result.is_err());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::builder()
            .base_url("http://localhost:3000")
            .url_prefix("/basic-api")
            .locale("en")
            .refresh_margin(Duration::from_secs(60))
            .build();

        assert_eq!(config.locale, "en");
        assert_eq!(config.refresh_margin, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }
}
