//! HTTP transport abstraction and the reqwest implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use crate::error::{RateLimitError, RateLimitResult};
use crate::headers::{GLOBAL, RETRY_AFTER};
use crate::route::{is_global_exempt, route_key};

/// Marker header set on 429s synthesized by the rate limiter.
pub const LOCAL_MARKER: &str = "x-accord-ratelimit";

/// An outbound REST request, relative to the API base URL.
#[derive(Debug, Clone)]
pub struct RestRequest {
    /// HTTP method.
    pub method: Method,
    /// Path with leading slash, optionally with a query string.
    pub path: String,
    /// Extra request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl RestRequest {
    /// A request with no headers or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set a JSON body and content type.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` does not serialize.
    pub fn with_json<T: serde::Serialize + ?Sized>(mut self, body: &T) -> RateLimitResult<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert("Content-Type".into(), "application/json".into());
        Ok(self)
    }
}

/// Rate-limit context passed along with each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Route key identifying the endpoint.
    pub endpoint: String,
    /// Whether the global limit does not apply.
    pub global_exempt: bool,
    /// Identity keying the global bucket.
    pub token_identity: String,
}

impl RequestContext {
    /// Derive the context for `request` sent with `token`.
    #[must_use]
    pub fn for_request(request: &RestRequest, token: &str) -> Self {
        Self {
            endpoint: route_key(&request.method, &request.path),
            global_exempt: is_global_exempt(&request.path),
            token_identity: token_identity(token),
        }
    }
}

/// Stable, non-reversible identity for a bot token.
///
/// Used as a cache key so tokens never appear in a shared cache.
#[must_use]
pub fn token_identity(token: &str) -> String {
    let hash = blake3::hash(token.as_bytes()).to_hex();
    hash.as_str().chars().take(16).collect()
}

/// A REST response.
#[derive(Debug, Clone)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl RestResponse {
    /// A synthetic 429 produced without a network call.
    ///
    /// Shaped like Discord's own 429 (`Retry-After` header and JSON body)
    /// so retry handling does not care where it came from.
    #[must_use]
    pub fn rate_limited(retry_after: Duration, global: bool) -> Self {
        let seconds = retry_after.as_secs_f64();
        let mut headers = HashMap::new();
        headers.insert(RETRY_AFTER.to_owned(), format!("{seconds:.3}"));
        headers.insert(GLOBAL.to_owned(), global.to_string());
        headers.insert(LOCAL_MARKER.to_owned(), "local".to_owned());
        let body = serde_json::json!({
            "message": "You are being rate limited.",
            "retry_after": seconds,
            "global": global,
        });
        Self {
            status: 429,
            headers,
            body: body.to_string().into_bytes(),
        }
    }

    /// Look up a header case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is 429.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Whether this 429 was synthesized locally.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.header(LOCAL_MARKER).is_some()
    }

    /// The `Retry-After` value, if present and valid.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        let seconds: f64 = self.header(RETRY_AFTER)?.trim().parse().ok()?;
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(seconds).ok()
    }

    /// Whether the response reports the global limit.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.header(GLOBAL)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Sends REST requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request.
    async fn send(
        &self,
        request: RestRequest,
        context: &RequestContext,
    ) -> RateLimitResult<RestResponse>;
}

/// [`HttpTransport`] over a `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Build a transport for `base_url` (e.g. `https://discord.com/api/v10`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> RateLimitResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(
                "DiscordBot (https://github.com/accord-rs/accord, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: RestRequest,
        context: &RequestContext,
    ) -> RateLimitResult<RestResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(endpoint = %context.endpoint, %url, "Sending REST request");

        let mut builder = self.client.request(request.method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
            })
            .collect();
        let body = response.bytes().await.map_err(RateLimitError::Http)?.to_vec();

        Ok(RestResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_identity_is_stable_and_opaque() {
        let a = token_identity("Bot secret");
        assert_eq!(a, token_identity("Bot secret"));
        assert_ne!(a, token_identity("Bot other"));
        assert_eq!(a.len(), 16);
        assert!(!a.contains("secret"));
    }

    #[test]
    fn context_for_request() {
        let request = RestRequest::new(Method::POST, "/channels/7/messages?x=1");
        let ctx = RequestContext::for_request(&request, "t");
        assert_eq!(ctx.endpoint, "POST /channels/7/messages");
        assert!(!ctx.global_exempt);

        let callback = RestRequest::new(Method::POST, "/interactions/1/tok/callback");
        assert!(RequestContext::for_request(&callback, "t").global_exempt);
    }

    #[test]
    fn synthetic_429_carries_retry_after() {
        let response = RestResponse::rate_limited(Duration::from_millis(1500), false);
        assert!(response.is_rate_limited());
        assert!(response.is_local());
        assert!(!response.is_global());
        assert_eq!(response.header("Retry-After"), Some("1.500"));
        assert_eq!(response.retry_after(), Some(Duration::from_millis(1500)));

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["retry_after"], 1.5);
        assert_eq!(body["global"], false);
    }

    #[test]
    fn server_429_is_not_local() {
        let response = RestResponse {
            status: 429,
            headers: HashMap::from([
                ("retry-after".to_owned(), "2".to_owned()),
                ("x-ratelimit-global".to_owned(), "true".to_owned()),
            ]),
            body: Vec::new(),
        };
        assert!(!response.is_local());
        assert!(response.is_global());
        assert_eq!(response.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn with_json_sets_body_and_content_type() {
        let request = RestRequest::new(Method::POST, "/x")
            .with_json(&serde_json::json!({"content": "hi"}))
            .unwrap();
        assert_eq!(request.body.as_deref(), Some(br#"{"content":"hi"}"#.as_slice()));
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let transport = ReqwestTransport::with_client(reqwest::Client::new(), "https://h/api/");
        assert_eq!(transport.base_url, "https://h/api");
    }
}
