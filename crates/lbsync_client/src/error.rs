//! Error types for the reconciliation client.
//!
//! Remote failures are classified into [`ApiError`], which carries the
//! status and machine code the control API reported. Classified errors stay
//! discoverable after being wrapped with context ([`ClientError::context`])
//! or joined with other failures ([`ClientError::join`]).

use lbsync_protocol::{ApiVersion, ProtocolError};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Capability exposed by errors that carry a remote classification.
pub trait StatusError {
    /// HTTP-like status reported by the remote.
    fn status(&self) -> u16;

    /// Machine-readable code reported by the remote.
    fn code(&self) -> &str;
}

/// A classified failure reported by the control API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// What the client expected versus what it received.
    pub message: String,
    /// Status from the error body (falls back to the HTTP status).
    pub status: u16,
    /// Machine-readable code.
    pub code: String,
    /// Human-readable text from the remote.
    pub text: String,
    /// Request identifier assigned by the remote.
    pub request_id: String,
}

impl ApiError {
    /// Creates a classified error.
    pub fn new(
        message: impl Into<String>,
        status: u16,
        code: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            status,
            code: code.into(),
            text: text.into(),
            request_id: String::new(),
        }
    }

    /// Returns true for not-found class failures.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns true for conflict class failures.
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: status={} code={} text={}",
            self.message, self.status, self.code, self.text
        )?;
        if !self.request_id.is_empty() {
            write!(f, " request_id={}", self.request_id)?;
        }
        Ok(())
    }
}

impl StdError for ApiError {}

impl StatusError for ApiError {
    fn status(&self) -> u16 {
        self.status
    }

    fn code(&self) -> &str {
        &self.code
    }
}

/// Errors that can occur while talking to the control API.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network failure; carries no remote classification.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The remote rejected the request.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A payload could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested API version is outside the range this build understands.
    #[error("API version {requested} is not supported by the client (supported {min}..={max})")]
    UnsupportedVersion {
        /// Requested version.
        requested: ApiVersion,
        /// Oldest supported version.
        min: ApiVersion,
        /// Newest supported version.
        max: ApiVersion,
    },

    /// The remote does not advertise the requested API version.
    #[error("API version {requested} is not supported by the server (advertised {advertised:?})")]
    VersionNotAdvertised {
        /// Requested version.
        requested: ApiVersion,
        /// Versions the remote listed.
        advertised: Vec<ApiVersion>,
    },

    /// The desired state lists the same server twice with different parameters.
    #[error("server {server} is listed with conflicting parameters for {upstream} upstream")]
    ParameterMismatch {
        /// Normalized server address.
        server: String,
        /// Upstream name.
        upstream: String,
    },

    /// The server already exists in the upstream.
    #[error("server {server} already exists in {upstream} upstream")]
    ServerExists {
        /// Server address.
        server: String,
        /// Upstream name.
        upstream: String,
    },

    /// The server does not exist in the upstream.
    #[error("server {server} not found in {upstream} upstream")]
    ServerNotFound {
        /// Server address.
        server: String,
        /// Upstream name.
        upstream: String,
    },

    /// The request context was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The request context deadline passed.
    #[error("request timed out")]
    Timeout,

    /// An error wrapped with additional context.
    #[error("{context}: {source}")]
    Context {
        /// Description of the failed operation.
        context: String,
        /// Underlying error.
        #[source]
        source: Box<ClientError>,
    },

    /// Several independent failures.
    #[error("{}", join_messages(.0))]
    Multiple(Vec<ClientError>),
}

fn join_messages(errors: &[ClientError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ClientError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Wraps this error with a description of the failed operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Joins independent failures into one error.
    ///
    /// Nested joins are flattened. Returns `None` for an empty input and the
    /// error itself when only one is given.
    pub fn join(errors: impl IntoIterator<Item = ClientError>) -> Option<ClientError> {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                ClientError::Multiple(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(ClientError::Multiple(flat)),
        }
    }

    /// Returns the first classified remote error inside this error.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(err) => Some(err),
            ClientError::Context { source, .. } => source.api_error(),
            ClientError::Multiple(errors) => errors.iter().find_map(ClientError::api_error),
            _ => None,
        }
    }

    /// Returns every classified remote error inside this error.
    pub fn api_errors(&self) -> Vec<&ApiError> {
        let mut found = Vec::new();
        self.collect_api_errors(&mut found);
        found
    }

    fn collect_api_errors<'a>(&'a self, found: &mut Vec<&'a ApiError>) {
        match self {
            ClientError::Api(err) => found.push(err),
            ClientError::Context { source, .. } => source.collect_api_errors(found),
            ClientError::Multiple(errors) => {
                for err in errors {
                    err.collect_api_errors(found);
                }
            }
            _ => {}
        }
    }

    /// Remote status of the first classified error, if any.
    pub fn status(&self) -> Option<u16> {
        self.api_error().map(|e| e.status)
    }

    /// Remote code of the first classified error, if any.
    pub fn code(&self) -> Option<&str> {
        self.api_error().map(|e| e.code.as_str())
    }

    /// Returns the individual failures (a single error yields itself).
    pub fn errors(&self) -> &[ClientError] {
        match self {
            ClientError::Multiple(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }

    /// Returns true if the error is (or contains) a transport failure.
    pub fn is_transport(&self) -> bool {
        self.any(&|e| matches!(e, ClientError::Transport { .. }))
    }

    /// Returns true if the error is (or contains) a cancellation or timeout.
    pub fn is_cancellation(&self) -> bool {
        self.any(&|e| matches!(e, ClientError::Cancelled | ClientError::Timeout))
    }

    /// Returns true for failures detected before any mutating request.
    pub fn is_validation(&self) -> bool {
        self.any(&|err| {
            matches!(
                err,
                ClientError::InvalidConfig(_)
                    | ClientError::UnsupportedVersion { .. }
                    | ClientError::VersionNotAdvertised { .. }
                    | ClientError::ParameterMismatch { .. }
            )
        })
    }

    fn any(&self, pred: &dyn Fn(&ClientError) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            ClientError::Context { source, .. } => source.any(pred),
            ClientError::Multiple(errors) => errors.iter().any(|e| e.any(pred)),
            _ => false,
        }
    }
}

/// Finds a classified remote error anywhere in a `source()` chain.
///
/// Works for errors that wrap a [`ClientError`] or an [`ApiError`] in a
/// foreign error type, as long as the wrapper exposes it through `source()`.
pub fn find_api_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ApiError> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(api) = err.downcast_ref::<ApiError>() {
            return Some(api);
        }
        if let Some(client) = err.downcast_ref::<ClientError>() {
            if let Some(api) = client.api_error() {
                return Some(api);
            }
        }
        current = err.source();
    }
    None
}
