//! CLI command implementations.

pub mod add;
pub mod delete;
pub mod reconcile;
pub mod servers;
pub mod version;

use crate::transport::ReqwestClient;
use clap::ValueEnum;
use lbsync_client::{ClientConfig, RequestContext, UpstreamClient};
use std::time::Duration;

/// Upstream family selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    /// HTTP upstreams.
    Http,
    /// Stream (TCP/UDP) upstreams.
    Stream,
}

/// Connection settings shared by every command.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Base URL of the control API.
    pub endpoint: String,
    /// Upstream family.
    pub kind: Kind,
    /// Pinned API version.
    pub api_version: Option<u32>,
    /// Require the pinned version to be advertised.
    pub check_api: bool,
    /// Negotiate the newest common version.
    pub max_api: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Connection {
    /// Builds the client configuration.
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.endpoint.clone()).with_timeout(self.timeout);
        if let Some(version) = self.api_version {
            config = config.with_api_version(version);
        }
        if self.check_api {
            config = config.with_check_api();
        }
        if self.max_api {
            config = config.with_max_api_version();
        }
        config
    }

    /// Connects to the control API.
    pub fn connect(&self) -> Result<UpstreamClient<ReqwestClient>, Box<dyn std::error::Error>> {
        let client = UpstreamClient::new(self.config(), ReqwestClient::new()?)?;
        Ok(client)
    }

    /// A context for one command, bounded at a multiple of the request timeout.
    pub fn context(&self) -> RequestContext {
        RequestContext::with_timeout(self.timeout.saturating_mul(BATCH_TIMEOUT_FACTOR))
    }
}

const BATCH_TIMEOUT_FACTOR: u32 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection {
            endpoint: "http://lb/api".into(),
            kind: Kind::Http,
            api_version: None,
            check_api: false,
            max_api: false,
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn default_config() {
        let config = connection().config();
        assert_eq!(config.endpoint, "http://lb/api");
        assert_eq!(config.api_version, lbsync_protocol::DEFAULT_API_VERSION);
        assert!(!config.check_api);
        assert!(!config.max_api);
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[test]
    fn pinned_and_checked() {
        let mut conn = connection();
        conn.api_version = Some(6);
        conn.check_api = true;
        let config = conn.config();
        assert_eq!(config.api_version, 6);
        assert!(config.check_api);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn huge_timeout_gives_unbounded_context() {
        let mut conn = connection();
        conn.timeout = Duration::MAX;
        let ctx = conn.context();
        assert!(ctx.deadline().is_none());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn context_is_bounded_by_request_timeout() {
        let ctx = connection().context();
        let left = ctx.remaining().unwrap();
        assert!(left <= Duration::from_secs(60));
        assert!(left > Duration::from_secs(50));
    }
}
