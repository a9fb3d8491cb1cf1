//! An in-memory load balancer control API for testing.
//!
//! [`MemoryBalancer`] answers the same paths, verbs and status codes as the
//! real control API, reports servers with every default filled in, and can
//! be told to fail operations on chosen addresses.

use crate::http::{HttpMethod, HttpRequest, HttpResponse, LoopbackServer, JSON_CONTENT_TYPE};
use lbsync_protocol::{
    normalize_address, ApiVersion, ServerRecord, StreamUpstreamServer, UpstreamServer,
    MAX_API_VERSION, MIN_API_VERSION,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

type Pool<T> = RwLock<HashMap<String, Vec<T>>>;

/// Path prefix the API is conventionally mounted under; optional.
const API_MOUNT: &str = "/api";

/// An injected failure for operations on one server address.
#[derive(Debug, Clone)]
struct Fault {
    status: u16,
    code: String,
}

/// In-memory control API.
pub struct MemoryBalancer {
    root_body: RwLock<Vec<u8>>,
    http: Pool<UpstreamServer>,
    stream: Pool<StreamUpstreamServer>,
    next_id: AtomicU64,
    faults: RwLock<HashMap<String, Fault>>,
    requests: RwLock<Vec<(HttpMethod, String)>>,
}

impl MemoryBalancer {
    /// Creates a balancer advertising every version this build understands.
    pub fn new() -> Self {
        Self::with_versions((MIN_API_VERSION..=MAX_API_VERSION).collect())
    }

    /// Creates a balancer advertising `versions`.
    pub fn with_versions(versions: Vec<ApiVersion>) -> Self {
        let root_body = serde_json::to_vec(&versions).unwrap_or_default();
        Self {
            root_body: RwLock::new(root_body),
            http: RwLock::new(HashMap::new()),
            stream: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            faults: RwLock::new(HashMap::new()),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Replaces the raw body served at the API root.
    pub fn set_root_body(&self, body: impl Into<Vec<u8>>) {
        *self.root_body.write() = body.into();
    }

    /// Creates an empty HTTP upstream.
    pub fn create_http_upstream(&self, name: &str) {
        self.http.write().entry(name.to_string()).or_default();
    }

    /// Creates an empty stream upstream.
    pub fn create_stream_upstream(&self, name: &str) {
        self.stream.write().entry(name.to_string()).or_default();
    }

    /// Inserts a server into an HTTP upstream, creating it if needed.
    pub fn insert_http_server(&self, upstream: &str, server: UpstreamServer) -> u64 {
        self.insert(&self.http, upstream, server)
    }

    /// Inserts a server into a stream upstream, creating it if needed.
    pub fn insert_stream_server(&self, upstream: &str, server: StreamUpstreamServer) -> u64 {
        self.insert(&self.stream, upstream, server)
    }

    /// Current servers of an HTTP upstream.
    pub fn http_servers(&self, upstream: &str) -> Option<Vec<UpstreamServer>> {
        self.http.read().get(upstream).cloned()
    }

    /// Current servers of a stream upstream.
    pub fn stream_servers(&self, upstream: &str) -> Option<Vec<StreamUpstreamServer>> {
        self.stream.read().get(upstream).cloned()
    }

    /// Makes every mutating operation on `server` fail with `status`.
    pub fn fail_server(&self, server: &str, status: u16, code: &str) {
        self.faults.write().insert(
            normalize_address(server),
            Fault {
                status,
                code: code.to_string(),
            },
        );
    }

    /// Removes every injected failure.
    pub fn clear_faults(&self) {
        self.faults.write().clear();
    }

    /// Requests received so far (verb and path below the API mount).
    pub fn requests(&self) -> Vec<(HttpMethod, String)> {
        self.requests.read().clone()
    }

    /// Number of POST, PATCH and DELETE requests received.
    pub fn mutation_count(&self) -> usize {
        self.requests
            .read()
            .iter()
            .filter(|(method, _)| *method != HttpMethod::Get)
            .count()
    }

    fn insert<T: ServerRecord>(&self, pool: &Pool<T>, upstream: &str, server: T) -> u64 {
        let id = self.allocate_id();
        let mut stored = server.with_defaults();
        stored.set_server(normalize_address(server.server()));
        stored.set_id(id);
        pool.write()
            .entry(upstream.to_string())
            .or_default()
            .push(stored);
        id
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fault_for(&self, server: &str) -> Option<HttpResponse> {
        self.faults.read().get(server).map(|fault| {
            HttpResponse::error(fault.status, &fault.code, "injected failure")
        })
    }

    fn handle_servers<T: ServerRecord>(
        &self,
        pool: &Pool<T>,
        method: HttpMethod,
        upstream: &str,
        id: Option<&str>,
        request: &HttpRequest,
    ) -> HttpResponse {
        if matches!(method, HttpMethod::Post | HttpMethod::Patch)
            && request.header("Content-Type") != Some(JSON_CONTENT_TYPE)
        {
            return HttpResponse::error(415, "UnsupportedMediaType", "expected a JSON body");
        }

        let mut pools = pool.write();
        let Some(servers) = pools.get_mut(upstream) else {
            return HttpResponse::error(404, "UpstreamNotFound", "upstream not found");
        };

        let id = match id.map(str::parse::<u64>) {
            None => None,
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                return HttpResponse::error(400, "UpstreamBadServerId", "invalid server id")
            }
        };

        match (method, id) {
            (HttpMethod::Get, None) => HttpResponse::json(200, &*servers),
            (HttpMethod::Post, None) => {
                let server: T = match decode_body(request) {
                    Ok(server) => server,
                    Err(response) => return response,
                };
                let address = normalize_address(server.server());
                if let Some(response) = self.fault_for(&address) {
                    return response;
                }
                if servers.iter().any(|s| s.server() == address) {
                    return HttpResponse::error(
                        409,
                        "UpstreamServerAlreadyExists",
                        "server already exists",
                    );
                }
                let mut stored = server.with_defaults();
                stored.set_server(address);
                stored.set_id(self.allocate_id());
                servers.push(stored.clone());
                HttpResponse::json(201, &stored)
            }
            (HttpMethod::Delete, Some(id)) => {
                let Some(idx) = servers.iter().position(|s| s.id() == id) else {
                    return HttpResponse::error(404, "UpstreamServerNotFound", "server not found");
                };
                if let Some(response) = self.fault_for(servers[idx].server()) {
                    return response;
                }
                servers.remove(idx);
                HttpResponse::json(200, &*servers)
            }
            (HttpMethod::Patch, Some(id)) => {
                let Some(existing) = servers.iter_mut().find(|s| s.id() == id) else {
                    return HttpResponse::error(404, "UpstreamServerNotFound", "server not found");
                };
                if let Some(response) = self.fault_for(existing.server()) {
                    return response;
                }
                match merge_patch(&*existing, request) {
                    Ok(merged) => {
                        *existing = merged;
                        HttpResponse::json(200, &*existing)
                    }
                    Err(response) => response,
                }
            }
            _ => HttpResponse::error(405, "MethodNotSupported", "method not supported"),
        }
    }

    fn version_is_served(&self, segment: &str) -> bool {
        let Ok(version) = segment.parse::<ApiVersion>() else {
            return false;
        };
        let body = self.root_body.read();
        serde_json::from_slice::<Vec<Value>>(&body)
            .map(|versions| versions.iter().any(|v| v.as_u64() == Some(u64::from(version))))
            .unwrap_or(false)
    }
}

impl Default for MemoryBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackServer for MemoryBalancer {
    fn handle(&self, path: &str, request: &HttpRequest) -> HttpResponse {
        let path = match path.strip_prefix(API_MOUNT) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        };
        self.requests
            .write()
            .push((request.method, path.to_string()));

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] if request.method == HttpMethod::Get => {
                HttpResponse::new(200, self.root_body.read().clone())
            }
            [version, kind, "upstreams", upstream, "servers", rest @ ..] if rest.len() <= 1 => {
                if !self.version_is_served(version) {
                    return HttpResponse::error(404, "UnknownVersion", "unknown version");
                }
                let id = rest.first().copied();
                match *kind {
                    "http" => {
                        self.handle_servers(&self.http, request.method, upstream, id, request)
                    }
                    "stream" => {
                        self.handle_servers(&self.stream, request.method, upstream, id, request)
                    }
                    _ => HttpResponse::error(404, "PathNotFound", "path not found"),
                }
            }
            _ => HttpResponse::error(404, "PathNotFound", "path not found"),
        }
    }
}

fn decode_body<T: ServerRecord>(request: &HttpRequest) -> Result<T, HttpResponse> {
    let body = request.body.as_deref().unwrap_or_default();
    serde_json::from_slice(body).map_err(|e| {
        HttpResponse::error(400, "UpstreamConfFormatError", &e.to_string())
    })
}

/// Overlays the fields present in the request body onto `existing`.
fn merge_patch<T: ServerRecord>(existing: &T, request: &HttpRequest) -> Result<T, HttpResponse> {
    let format_error =
        |text: String| HttpResponse::error(400, "UpstreamConfFormatError", &text);

    let body = request.body.as_deref().unwrap_or_default();
    let patch: Value = serde_json::from_slice(body).map_err(|e| format_error(e.to_string()))?;
    let Value::Object(patch) = patch else {
        return Err(format_error("expected an object".into()));
    };

    let mut current = serde_json::to_value(existing).map_err(|e| format_error(e.to_string()))?;
    if let Value::Object(fields) = &mut current {
        for (key, value) in patch {
            if key != "id" {
                fields.insert(key, value);
            }
        }
    }

    let mut merged: T = serde_json::from_value(current).map_err(|e| format_error(e.to_string()))?;
    merged.set_id(existing.id());
    Ok(merged)
}
