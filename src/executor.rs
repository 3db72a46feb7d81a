//! Request execution.
//!
//! An [`Executor`] turns one [`WireRequest`] into one [`Outcome`]. It never
//! fails: connection errors, timeouts and undecodable bodies are all folded
//! into the outcome so the caller can classify them.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// HTTP verbs used by the operation catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully prepared request, relative to the target base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl WireRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::Get, path: path.into(), body: None }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::Post, path: path.into(), body: Some(body) }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::Put, path: path.into(), body: Some(body) }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::Delete, path: path.into(), body: None }
    }
}

/// Response payload as seen by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Body decoded as JSON.
    Json(Value),
    /// A response arrived but its body is not valid JSON.
    Unparsed(String),
    /// No usable response: connect failure, timeout, or a broken body stream.
    Transport(String),
}

/// Result of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// `None` when the request never produced a response.
    pub status: Option<u16>,
    pub latency: Duration,
    pub body: Body,
}

impl Outcome {
    /// Build an outcome from a received response, decoding the body as JSON.
    ///
    /// An empty body is a decode failure, not an empty value.
    pub fn from_response(status: u16, latency: Duration, bytes: &[u8]) -> Self {
        let body = match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Body::Json(value),
            Err(e) => Body::Unparsed(e.to_string()),
        };
        Self { status: Some(status), latency, body }
    }

    pub fn transport(latency: Duration, reason: impl Into<String>) -> Self {
        Self { status: None, latency, body: Body::Transport(reason.into()) }
    }

    /// The decoded JSON body, if there is one.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Issues requests on behalf of one virtual user.
///
/// Calls suspend only the calling task; each virtual user owns its executor.
#[async_trait]
pub trait Executor: Send {
    async fn execute(&mut self, request: &WireRequest) -> Outcome;
}

/// Connection settings for [`HttpExecutor`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub accept_invalid_certs: bool,
}

/// Connection pool idle timeout in seconds
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 30;

/// TCP keepalive timeout in seconds
pub const TCP_KEEPALIVE_SECS: u64 = 60;

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 50,
            accept_invalid_certs: false,
        }
    }
}

/// [`Executor`] backed by a pooled `reqwest` client.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    base_url: String,
}

impl HttpExecutor {
    pub fn new(base_url: &str, settings: &ClientSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(TCP_KEEPALIVE_SECS))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&mut self, request: &WireRequest) -> Outcome {
        let url = self.url_for(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder.header("Accept", "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let latency = start.elapsed();
                debug!(method = %request.method, %url, error = %e, "request failed");
                return Outcome::transport(latency, e.to_string());
            }
        };
        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(bytes) => {
                let latency = start.elapsed();
                debug!(
                    method = %request.method,
                    %url,
                    status,
                    latency_ms = latency.as_secs_f64() * 1000.0,
                    "request complete"
                );
                Outcome::from_response(status, latency, &bytes)
            }
            Err(e) => {
                let latency = start.elapsed();
                debug!(method = %request.method, %url, status, error = %e, "body read failed");
                Outcome {
                    status: Some(status),
                    latency,
                    body: Body::Transport(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(server: &MockServer) -> HttpExecutor {
        HttpExecutor::new(&server.uri(), &ClientSettings::default()).unwrap()
    }

    #[test]
    fn test_from_response_surfaces_decode_failure() {
        let outcome = Outcome::from_response(200, Duration::from_millis(3), b"<html>");
        assert_eq!(outcome.status, Some(200));
        assert!(matches!(outcome.body, Body::Unparsed(_)));
        assert!(outcome.json().is_none());
    }

    #[test]
    fn test_empty_body_is_not_an_empty_value() {
        let outcome = Outcome::from_response(200, Duration::ZERO, b"");
        assert!(matches!(outcome.body, Body::Unparsed(_)));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let executor = HttpExecutor::with_client(Client::new(), "http://app:8000/");
        assert_eq!(executor.url_for("/api/users"), "http://app:8000/api/users");
    }

    #[tokio::test]
    async fn test_get_decodes_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let outcome = executor(&server).execute(&WireRequest::get("/api/users")).await;

        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.json(), Some(&json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"query": "query { users { id } }"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"users": []}})))
            .mount(&server)
            .await;

        let request = WireRequest::post("/graphql", json!({"query": "query { users { id } }"}));
        let outcome = executor(&server).execute(&request).await;

        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.json(), Some(&json!({"data": {"users": []}})));
    }

    #[tokio::test]
    async fn test_status_is_reported_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/roles/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "not found"})))
            .mount(&server)
            .await;

        let outcome = executor(&server).execute(&WireRequest::delete("/api/roles/9")).await;
        assert_eq!(outcome.status, Some(404));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_outcome() {
        // Bind then drop a listener so the port is closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut executor =
            HttpExecutor::new(&format!("http://127.0.0.1:{port}"), &ClientSettings::default())
                .unwrap();
        let outcome = executor.execute(&WireRequest::get("/")).await;

        assert_eq!(outcome.status, None);
        assert!(matches!(outcome.body, Body::Transport(_)));
    }
}
