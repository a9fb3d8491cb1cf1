//! A scripted [`HttpClient`] for tests.

use crate::http::{HttpClient, HttpRequest, HttpResponse};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Replies with queued responses in order and records every request.
///
/// Once the queue is empty every further request fails as a transport error.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedClient {
    /// Creates a client with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.responses.lock().push_back(Ok(response));
        self
    }

    /// Queues a response with a JSON body.
    pub fn push_json<T: Serialize + ?Sized>(&self, status: u16, body: &T) -> &Self {
        self.push_response(HttpResponse::json(status, body))
    }

    /// Queues a classified error response.
    pub fn push_error(&self, status: u16, code: &str, text: &str) -> &Self {
        self.push_response(HttpResponse::error(status, code, text))
    }

    /// Queues a transport failure.
    pub fn push_transport_error(&self, message: impl Into<String>) -> &Self {
        self.responses.lock().push_back(Err(message.into()));
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

impl HttpClient for ScriptedClient {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let url = request.url.clone();
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(format!("no scripted response for {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    #[test]
    fn replays_in_order() {
        let client = ScriptedClient::new();
        client
            .push_json(200, &[4, 5])
            .push_transport_error("connection reset");

        assert_eq!(client.execute(get("http://a/")).unwrap().status, 200);
        assert_eq!(client.execute(get("http://a/x")).unwrap_err(), "connection reset");
        assert!(client.execute(get("http://a/y")).is_err());

        let urls: Vec<_> = client.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["http://a/", "http://a/x", "http://a/y"]);
        assert_eq!(client.remaining(), 0);
    }
}
