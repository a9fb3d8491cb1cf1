//! # lbsync Protocol
//!
//! Wire types for a load balancer's administrative HTTP API.
//!
//! This crate provides:
//! - `UpstreamServer` and `StreamUpstreamServer` records
//! - The `ServerRecord` trait shared by both record kinds
//! - Address normalization (`normalize_address`)
//! - API version constants and version-list parsing
//! - The remote error body (`ApiErrorResponse`)
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Parameter equality
//!
//! Callers usually omit parameters they do not care about, while the remote
//! always reports concrete values. Two records are considered equal when
//! every parameter matches after unset fields have been filled with the
//! remote defaults:
//!
//! ```rust
//! use lbsync_protocol::{ServerRecord, UpstreamServer};
//!
//! let desired = UpstreamServer::new("10.0.0.1:80");
//! let reported = UpstreamServer::new("10.0.0.1:80")
//!     .with_id(7)
//!     .with_max_fails(1)
//!     .with_weight(1);
//!
//! assert!(desired.same_parameters(&reported));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod address;
mod api_error;
mod error;
mod server;
mod version;

pub use address::{normalize_address, DEFAULT_PORT};
pub use api_error::{ApiErrorBody, ApiErrorResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use server::{
    defaults, ServerKind, ServerRecord, StreamUpstreamServer, UpstreamServer,
};
pub use version::{
    parse_versions, ApiVersion, DEFAULT_API_VERSION, MAX_API_VERSION, MIN_API_VERSION,
};
