//! Error bodies returned by the control API.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};

/// Body of a failed control API response.
///
/// ```json
/// {
///   "error": { "status": 404, "text": "upstream not found", "code": "UpstreamNotFound" },
///   "request_id": "2cc5d8bd6c5a05b4d3b2b9e3a0d3c2aa",
///   "href": "https://nginx.org/en/docs/http/ngx_http_api_module.html"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Classified error.
    #[serde(default)]
    pub error: ApiErrorBody,
    /// Request identifier assigned by the remote.
    #[serde(default)]
    pub request_id: String,
    /// Documentation link.
    #[serde(default)]
    pub href: String,
}

/// The classified part of an error response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// HTTP-like status.
    #[serde(default)]
    pub status: u16,
    /// Human-readable text.
    #[serde(default)]
    pub text: String,
    /// Machine-readable code.
    #[serde(default)]
    pub code: String,
}

impl ApiErrorResponse {
    /// Creates an error response with the given classification.
    pub fn new(status: u16, code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            error: ApiErrorBody {
                status,
                text: text.into(),
                code: code.into(),
            },
            request_id: String::new(),
            href: String::new(),
        }
    }

    /// Decodes an error response body.
    pub fn decode(body: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encodes the response to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
