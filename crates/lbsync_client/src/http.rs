//! HTTP access to the control API.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so callers can
//! plug in reqwest, hyper, ureq, or an in-process loopback for tests.
//! [`ControlEndpoint`] layers the control API conventions on top: JSON
//! bodies, expected status codes, and classification of error responses.

use crate::context::RequestContext;
use crate::error::{ApiError, ClientError, ClientResult};
use lbsync_protocol::ApiErrorResponse;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Content type sent with every request body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP verbs used by the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

impl HttpMethod {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Upper bound for this request.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Returns the value of a header (case-insensitive name match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response returned by an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Self {
        // Serializing plain data structures into a Vec cannot fail.
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self { status, body }
    }

    /// Creates a classified error response.
    pub fn error(status: u16, code: &str, text: &str) -> Self {
        Self::json(status, &ApiErrorResponse::new(status, code, text))
    }
}

/// HTTP client abstraction.
///
/// Implementations perform exactly one request per call. Failures to reach
/// the remote are reported as `Err`; any response the remote sends,
/// including error statuses, is returned as `Ok`.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        (**self).execute(request)
    }
}

/// The control API as seen through an [`HttpClient`].
pub struct ControlEndpoint<C: HttpClient> {
    /// Base URL without a trailing slash.
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Per-request timeout.
    timeout: Duration,
}

impl<C: HttpClient> ControlEndpoint<C> {
    /// Creates an endpoint rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client,
            timeout,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches the raw version listing at the API root.
    pub fn get_root(&self, ctx: &RequestContext) -> ClientResult<Vec<u8>> {
        let response = self.send(ctx, HttpMethod::Get, "", None, Accept::Exactly(200))?;
        Ok(response.body)
    }

    /// GETs `path` and decodes the JSON body.
    pub fn get<T: DeserializeOwned>(&self, ctx: &RequestContext, path: &str) -> ClientResult<T> {
        let response = self.send(ctx, HttpMethod::Get, path, None, Accept::Exactly(200))?;
        serde_json::from_slice(&response.body).map_err(|e| {
            ClientError::Protocol(e.into()).context(format!("failed to decode response of {path}"))
        })
    }

    /// POSTs a JSON body to `path`; any `2xx` status is success.
    pub fn post<B: Serialize + ?Sized>(
        &self,
        ctx: &RequestContext,
        path: &str,
        body: &B,
    ) -> ClientResult<()> {
        let body = encode(body)?;
        self.send(ctx, HttpMethod::Post, path, Some(body), Accept::AnySuccess)?;
        Ok(())
    }

    /// PATCHes `path` with a JSON body; any `2xx` status is success.
    pub fn patch<B: Serialize + ?Sized>(
        &self,
        ctx: &RequestContext,
        path: &str,
        body: &B,
    ) -> ClientResult<()> {
        let body = encode(body)?;
        self.send(ctx, HttpMethod::Patch, path, Some(body), Accept::AnySuccess)?;
        Ok(())
    }

    /// DELETEs `path`; any `2xx` status is success.
    pub fn delete(&self, ctx: &RequestContext, path: &str) -> ClientResult<()> {
        self.send(ctx, HttpMethod::Delete, path, None, Accept::AnySuccess)?;
        Ok(())
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send(
        &self,
        ctx: &RequestContext,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
        expected: Accept,
    ) -> ClientResult<HttpResponse> {
        ctx.check()?;

        let timeout = match ctx.remaining() {
            Some(left) => left.min(self.timeout),
            None => self.timeout,
        };

        let mut headers = Vec::new();
        if body.is_some() {
            headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
        }

        let request = HttpRequest {
            method,
            url: self.url_for(path),
            headers,
            body,
            timeout: Some(timeout),
        };

        debug!(method = %method, url = %request.url, "sending control request");

        let response = self.client.execute(request).map_err(|e| {
            // Cancellation and deadline take precedence over the transport message.
            match ctx.check() {
                Err(ctx_err) => ctx_err,
                Ok(()) => ClientError::transport(e),
            }
        })?;

        if !expected.matches(response.status) {
            return Err(classify(method, expected, &response).into());
        }
        Ok(response)
    }
}

/// Statuses a call treats as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accept {
    /// Only this status; the body is decoded afterwards.
    Exactly(u16),
    /// Any `2xx` acknowledgment.
    AnySuccess,
}

impl Accept {
    fn matches(self, status: u16) -> bool {
        match self {
            Accept::Exactly(expected) => status == expected,
            Accept::AnySuccess => (200..300).contains(&status),
        }
    }
}

impl fmt::Display for Accept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accept::Exactly(status) => write!(f, "{status}"),
            Accept::AnySuccess => f.write_str("2xx"),
        }
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> ClientResult<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| ClientError::Protocol(e.into()))
}

/// Turns an unexpected response into a classified error.
fn classify(method: HttpMethod, expected: Accept, response: &HttpResponse) -> ApiError {
    let message = format!(
        "{method} expected {expected} response, got {}",
        response.status
    );
    match ApiErrorResponse::decode(&response.body) {
        Ok(body) => ApiError {
            message,
            status: if body.error.status == 0 {
                response.status
            } else {
                body.error.status
            },
            code: body.error.code,
            text: body.error.text,
            request_id: body.request_id,
        },
        Err(_) => ApiError::new(
            message,
            response.status,
            "",
            String::from_utf8_lossy(&response.body).into_owned(),
        ),
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a request for `path` (URL without scheme and authority).
    fn handle(&self, path: &str, request: &HttpRequest) -> HttpResponse;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle(&self, path: &str, request: &HttpRequest) -> HttpResponse {
        (**self).handle(path, request)
    }
}

/// A loopback HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server behind this client.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let path = strip_authority(&request.url);
        Ok(self.server.handle(path, &request))
    }
}

/// Extracts the path from an absolute URL.
fn strip_authority(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| &url[i + 3..]).unwrap_or(url);
    after_scheme
        .find('/')
        .map(|i| &after_scheme[i..])
        .unwrap_or("/")
}
