// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the SDK client.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Result, SdkError};

/// Configuration for the [`Client`](crate::Client).
///
/// All values are fixed at construction time.
#[derive(Clone)]
pub struct SdkConfig {
    /// Base URL of the platform, e.g. `https://orchestra.example.com:8443`.
    pub base_url: String,
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// PEM file holding the CA certificate(s) trusted for `https` URLs.
    pub ca_file: Option<PathBuf>,
    /// Skip TLS certificate verification (development only).
    pub skip_tls_verify: bool,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
    /// Default upper bound when waiting for a workflow execution.
    pub workflow_timeout: Duration,
    /// Maximum number of resends the retry chain may request per call.
    pub max_resends: u32,
}

impl fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ca_file", &self.ca_file)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("request_timeout", &self.request_timeout)
            .field("workflow_timeout", &self.workflow_timeout)
            .field("max_resends", &self.max_resends)
            .finish()
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8088".to_string(),
            username: String::new(),
            password: String::new(),
            ca_file: None,
            skip_tls_verify: false,
            request_timeout: Duration::from_secs(30),
            workflow_timeout: Duration::from_secs(30 * 60),
            max_resends: 5,
        }
    }
}

impl SdkConfig {
    /// Create a configuration for the given URL and credentials.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Create a configuration for a local development instance.
    pub fn localhost() -> Self {
        Self::new("http://127.0.0.1:8088", "admin", "admin")
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ORCHESTRA_URL`: Base URL (required)
    /// - `ORCHESTRA_USER`: Login user name (required)
    /// - `ORCHESTRA_PASSWORD`: Login password (required)
    /// - `ORCHESTRA_CA_FILE`: CA certificate PEM file
    /// - `ORCHESTRA_SKIP_TLS_VERIFY`: Skip TLS verification (default: "false")
    /// - `ORCHESTRA_REQUEST_TIMEOUT_MS`: Request timeout (default: 30000)
    /// - `ORCHESTRA_WORKFLOW_TIMEOUT_MS`: Workflow wait timeout (default: 1800000)
    /// - `ORCHESTRA_MAX_RESENDS`: Retry chain resend limit (default: 5)
    pub fn from_env() -> Result<Self> {
        let base_url = required_var("ORCHESTRA_URL")?;
        let username = required_var("ORCHESTRA_USER")?;
        let password = required_var("ORCHESTRA_PASSWORD")?;

        let ca_file = std::env::var("ORCHESTRA_CA_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let skip_tls_verify = std::env::var("ORCHESTRA_SKIP_TLS_VERIFY")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let request_timeout_ms: u64 = parse_var("ORCHESTRA_REQUEST_TIMEOUT_MS", 30_000)?;
        let workflow_timeout_ms: u64 = parse_var("ORCHESTRA_WORKFLOW_TIMEOUT_MS", 1_800_000)?;
        let max_resends: u32 = parse_var("ORCHESTRA_MAX_RESENDS", 5)?;

        Ok(Self {
            base_url,
            username,
            password,
            ca_file,
            skip_tls_verify,
            request_timeout: Duration::from_millis(request_timeout_ms),
            workflow_timeout: Duration::from_millis(workflow_timeout_ms),
            max_resends,
        })
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the login credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Trust the CA certificate(s) in the given PEM file.
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Enable or disable TLS verification skipping.
    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the default workflow wait timeout.
    pub fn with_workflow_timeout(mut self, timeout: Duration) -> Self {
        self.workflow_timeout = timeout;
        self
    }

    /// Set the resend limit of the retry chain.
    pub fn with_max_resends(mut self, max_resends: u32) -> Self {
        self.max_resends = max_resends;
        self
    }

    /// Check the configuration and return the parsed base URL.
    ///
    /// An `https` URL needs either a CA file or an explicit opt-in to skip
    /// verification.
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| SdkError::Config(format!("invalid base url {:?}: {}", self.base_url, e)))?;

        match url.scheme() {
            "http" => {}
            "https" => {
                if self.ca_file.is_none() && !self.skip_tls_verify {
                    return Err(SdkError::Config(
                        "https base url requires a CA file or skip_tls_verify".to_string(),
                    ));
                }
            }
            other => {
                return Err(SdkError::Config(format!(
                    "unsupported url scheme {:?}",
                    other
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(SdkError::Config(format!(
                "base url {:?} has no host",
                self.base_url
            )));
        }

        Ok(url)
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| SdkError::Config(format!("{} is required", name)))
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8088");
        assert!(config.ca_file.is_none());
        assert!(!config.skip_tls_verify);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_resends, 5);
    }

    #[test]
    fn test_builder_methods() {
        let config = SdkConfig::localhost()
            .with_base_url("https://orchestra.internal:8443")
            .with_credentials("ops", "secret")
            .with_ca_file("/etc/orchestra/ca.pem")
            .with_request_timeout(Duration::from_secs(5))
            .with_workflow_timeout(Duration::from_secs(120))
            .with_max_resends(2);

        assert_eq!(config.base_url, "https://orchestra.internal:8443");
        assert_eq!(config.username, "ops");
        assert_eq!(config.password, "secret");
        assert_eq!(config.ca_file, Some(PathBuf::from("/etc/orchestra/ca.pem")));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.workflow_timeout, Duration::from_secs(120));
        assert_eq!(config.max_resends, 2);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SdkConfig::new("http://localhost:8088", "admin", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_validate_http_needs_no_tls_material() {
        let url = SdkConfig::localhost().validate().unwrap();
        assert_eq!(url.host_str(), Some("127.0.0.1"));
    }

    #[test]
    fn test_validate_https_without_tls_material_fails() {
        let err = SdkConfig::new("https://orchestra.internal", "a", "b")
            .validate()
            .unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn test_validate_https_with_opt_in() {
        assert!(SdkConfig::new("https://orchestra.internal", "a", "b")
            .with_skip_tls_verify(true)
            .validate()
            .is_ok());
        assert!(SdkConfig::new("https://orchestra.internal", "a", "b")
            .with_ca_file("/tmp/ca.pem")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_url() {
        assert!(matches!(
            SdkConfig::new("not a url", "a", "b").validate(),
            Err(SdkError::Config(_))
        ));
        assert!(matches!(
            SdkConfig::new("ftp://host", "a", "b").validate(),
            Err(SdkError::Config(_))
        ));
    }
}
