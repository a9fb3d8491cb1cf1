//! # lbsync Client
//!
//! Keeps the server membership of a load balancer's upstreams in line with a
//! desired state, through the balancer's HTTP control API.
//!
//! This crate provides:
//! - Error classification (`ClientError`, `ApiError`, `find_api_error`)
//! - API version negotiation at client construction
//! - Desired-versus-remote diffing and duplicate detection
//! - Reconciliation of HTTP and stream upstreams (`UpstreamClient`)
//! - HTTP client abstraction plus in-process test doubles
//!
//! ## Reconciliation
//!
//! A reconciliation pass works in three steps:
//! 1. Collapse duplicate desired entries; conflicting ones are reported
//! 2. Fetch the remote server list and diff it against the desired set
//! 3. Apply adds, then deletes, then updates
//!
//! ## Key Invariants
//!
//! - The API version is fixed once the client is constructed
//! - Failures of single operations never abort the rest of the batch
//! - Cancellation stops the batch before the next request
//! - Reported successes are exactly the operations the remote accepted
//!
//! ```rust
//! use std::sync::Arc;
//! use lbsync_client::{
//!     ClientConfig, LoopbackClient, MemoryBalancer, RequestContext, UpstreamClient,
//! };
//! use lbsync_protocol::UpstreamServer;
//!
//! let balancer = Arc::new(MemoryBalancer::new());
//! balancer.insert_http_server("backend", UpstreamServer::new("10.0.0.1:80"));
//!
//! let client = UpstreamClient::new(
//!     ClientConfig::new("http://lb/api"),
//!     LoopbackClient::new(balancer.clone()),
//! )?;
//!
//! let outcome = client.reconcile_http_servers(
//!     &RequestContext::new(),
//!     "backend",
//!     &[UpstreamServer::new("10.0.0.2")],
//! )?;
//! assert_eq!(outcome.added.len(), 1);
//! assert_eq!(outcome.deleted.len(), 1);
//! # Ok::<(), lbsync_client::ClientError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod context;
mod diff;
mod error;
mod http;
mod memory;
mod mock;
mod negotiate;

pub use client::{ReconcileOutcome, UpstreamClient};
pub use config::ClientConfig;
pub use context::RequestContext;
pub use diff::{dedupe_servers, diff_servers, Deduplicated, ServerDiff};
pub use error::{find_api_error, ApiError, ClientError, ClientResult, StatusError};
pub use http::{
    ControlEndpoint, HttpClient, HttpMethod, HttpRequest, HttpResponse, LoopbackClient,
    LoopbackServer, JSON_CONTENT_TYPE,
};
pub use memory::MemoryBalancer;
pub use mock::ScriptedClient;
pub use negotiate::select_max_version;
