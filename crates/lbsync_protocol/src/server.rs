//! Upstream server records.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Values the remote assumes for parameters a record leaves unset.
pub mod defaults {
    /// Default `max_conns` (unlimited).
    pub const MAX_CONNS: u32 = 0;
    /// Default `max_fails`.
    pub const MAX_FAILS: u32 = 1;
    /// Default `fail_timeout`.
    pub const FAIL_TIMEOUT: &str = "10s";
    /// Default `slow_start`.
    pub const SLOW_START: &str = "0s";
    /// Default `backup` flag.
    pub const BACKUP: bool = false;
    /// Default `down` flag.
    pub const DOWN: bool = false;
    /// Default `weight`.
    pub const WEIGHT: u32 = 1;
}

/// The upstream family a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    /// HTTP upstreams.
    Http,
    /// TCP/UDP stream upstreams.
    Stream,
}

impl ServerKind {
    /// Returns the path segment used by the control API.
    pub fn path_segment(&self) -> &'static str {
        match self {
            ServerKind::Http => "http",
            ServerKind::Stream => "stream",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Behaviour shared by HTTP and stream server records.
///
/// The differ and the reconciliation orchestrator are written against this
/// trait so both upstream families go through the same code path.
pub trait ServerRecord:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync
{
    /// Upstream family of this record type.
    const KIND: ServerKind;

    /// Remote-assigned identifier, `0` when absent.
    fn id(&self) -> u64;

    /// Sets the remote identifier.
    fn set_id(&mut self, id: u64);

    /// Server address, the natural key of a record.
    fn server(&self) -> &str;

    /// Replaces the server address.
    fn set_server(&mut self, server: String);

    /// Returns a copy with every unset parameter replaced by its default.
    fn with_defaults(&self) -> Self;

    /// Returns true if both records describe the same server parameters.
    ///
    /// `id` is ignored. Unset parameters on either side compare as the
    /// remote default.
    fn same_parameters(&self, other: &Self) -> bool {
        let mut lhs = self.with_defaults();
        let rhs = other.with_defaults();
        lhs.set_id(rhs.id());
        lhs == rhs
    }
}

fn is_zero(id: &u64) -> bool {
    *id == 0
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// A server in an HTTP upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamServer {
    /// Remote-assigned identifier, `0` when absent.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u64,
    /// Address (`host:port`, `[v6]:port` or `unix:/path`).
    pub server: String,
    /// Connection limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_conns: Option<u32>,
    /// Failed attempts before the server is marked unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,
    /// Failure window, empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fail_timeout: String,
    /// Slow-start period, empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slow_start: String,
    /// Sticky route, empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route: String,
    /// Backup server flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<bool>,
    /// Down flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<bool>,
    /// Drain flag.
    #[serde(default, skip_serializing_if = "is_false")]
    pub drain: bool,
    /// Load-balancing weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Service name for resolved servers, empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
}

/// A server in a stream (TCP/UDP) upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUpstreamServer {
    /// Remote-assigned identifier, `0` when absent.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u64,
    /// Address (`host:port`, `[v6]:port` or `unix:/path`).
    pub server: String,
    /// Connection limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_conns: Option<u32>,
    /// Failed attempts before the server is marked unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,
    /// Failure window, empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fail_timeout: String,
    /// Slow-start period, empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slow_start: String,
    /// Backup server flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<bool>,
    /// Down flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<bool>,
    /// Load-balancing weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Service name for resolved servers, empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
}

/// Builder methods for the parameters both record kinds share.
macro_rules! shared_builders {
    ($ty:ty) => {
        impl $ty {
            /// Creates a record for `server` with every parameter unset.
            pub fn new(server: impl Into<String>) -> Self {
                Self {
                    server: server.into(),
                    ..Self::default()
                }
            }

            /// Sets the remote identifier.
            pub fn with_id(mut self, id: u64) -> Self {
                self.id = id;
                self
            }

            /// Sets `max_conns`.
            pub fn with_max_conns(mut self, max_conns: u32) -> Self {
                self.max_conns = Some(max_conns);
                self
            }

            /// Sets `max_fails`.
            pub fn with_max_fails(mut self, max_fails: u32) -> Self {
                self.max_fails = Some(max_fails);
                self
            }

            /// Sets `fail_timeout`.
            pub fn with_fail_timeout(mut self, fail_timeout: impl Into<String>) -> Self {
                self.fail_timeout = fail_timeout.into();
                self
            }

            /// Sets `slow_start`.
            pub fn with_slow_start(mut self, slow_start: impl Into<String>) -> Self {
                self.slow_start = slow_start.into();
                self
            }

            /// Sets the backup flag.
            pub fn with_backup(mut self, backup: bool) -> Self {
                self.backup = Some(backup);
                self
            }

            /// Sets the down flag.
            pub fn with_down(mut self, down: bool) -> Self {
                self.down = Some(down);
                self
            }

            /// Sets the weight.
            pub fn with_weight(mut self, weight: u32) -> Self {
                self.weight = Some(weight);
                self
            }

            /// Sets the service name.
            pub fn with_service(mut self, service: impl Into<String>) -> Self {
                self.service = service.into();
                self
            }

            fn fill_shared_defaults(&mut self) {
                self.max_conns = self.max_conns.or(Some(defaults::MAX_CONNS));
                self.max_fails = self.max_fails.or(Some(defaults::MAX_FAILS));
                if self.fail_timeout.is_empty() {
                    self.fail_timeout = defaults::FAIL_TIMEOUT.to_string();
                }
                if self.slow_start.is_empty() {
                    self.slow_start = defaults::SLOW_START.to_string();
                }
                self.backup = self.backup.or(Some(defaults::BACKUP));
                self.down = self.down.or(Some(defaults::DOWN));
                self.weight = self.weight.or(Some(defaults::WEIGHT));
            }
        }
    };
}

shared_builders!(UpstreamServer);
shared_builders!(StreamUpstreamServer);

impl UpstreamServer {
    /// Sets the sticky route.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    /// Sets the drain flag.
    pub fn with_drain(mut self, drain: bool) -> Self {
        self.drain = drain;
        self
    }
}

impl ServerRecord for UpstreamServer {
    const KIND: ServerKind = ServerKind::Http;

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn server(&self) -> &str {
        &self.server
    }

    fn set_server(&mut self, server: String) {
        self.server = server;
    }

    fn with_defaults(&self) -> Self {
        let mut filled = self.clone();
        filled.fill_shared_defaults();
        filled
    }
}

impl ServerRecord for StreamUpstreamServer {
    const KIND: ServerKind = ServerKind::Stream;

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn server(&self) -> &str {
        &self.server
    }

    fn set_server(&mut self, server: String) {
        self.server = server;
    }

    fn with_defaults(&self) -> Self {
        let mut filled = self.clone();
        filled.fill_shared_defaults();
        filled
    }
}
