//! Configuration for the reconciliation client.

use crate::error::{ClientError, ClientResult};
use lbsync_protocol::{ApiVersion, DEFAULT_API_VERSION, MAX_API_VERSION, MIN_API_VERSION};
use std::time::Duration;

/// Configuration for an [`UpstreamClient`](crate::UpstreamClient).
///
/// Validated once when the client is constructed.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the control API (e.g. `http://127.0.0.1:8080/api`).
    pub endpoint: String,
    /// Requested API version. Defaults to [`DEFAULT_API_VERSION`].
    pub api_version: ApiVersion,
    /// Fail construction unless the remote advertises `api_version`.
    pub check_api: bool,
    /// Adopt the newest version both sides understand.
    pub max_api: bool,
    /// Upper bound for a single request.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: DEFAULT_API_VERSION,
            check_api: false,
            max_api: false,
            timeout: Duration::from_secs(10),
        }
    }

    /// Pins the API version.
    pub fn with_api_version(mut self, version: ApiVersion) -> Self {
        self.api_version = version;
        self
    }

    /// Verifies at construction that the remote supports the pinned version.
    pub fn with_check_api(mut self) -> Self {
        self.check_api = true;
        self
    }

    /// Negotiates the newest mutually supported version at construction.
    pub fn with_max_api_version(mut self) -> Self {
        self.max_api = true;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks the configuration without touching the network.
    pub fn validate(&self) -> ClientResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::InvalidConfig("endpoint must not be empty".into()));
        }
        if !(MIN_API_VERSION..=MAX_API_VERSION).contains(&self.api_version) {
            return Err(ClientError::UnsupportedVersion {
                requested: self.api_version,
                min: MIN_API_VERSION,
                max: MAX_API_VERSION,
            });
        }
        if self.check_api && self.max_api {
            return Err(ClientError::InvalidConfig(
                "check_api and max_api cannot be combined".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig("timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Endpoint without a trailing slash.
    pub(crate) fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8080/api")
    }
}
