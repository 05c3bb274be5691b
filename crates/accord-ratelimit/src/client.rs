//! Rate-limited Discord REST client.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{RateLimitError, RateLimitResult};
use crate::policy::RateLimitPolicy;
use crate::transport::{RequestContext, RestRequest, RestResponse};

/// Thin JSON client that sends every call through a [`RateLimitPolicy`].
#[derive(Clone)]
pub struct RestClient {
    token: Arc<str>,
    policy: RateLimitPolicy,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a client for a bot token.
    #[must_use]
    pub fn new(token: impl Into<String>, policy: RateLimitPolicy) -> Self {
        Self {
            token: Arc::from(token.into()),
            policy,
        }
    }

    /// The underlying policy.
    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Send a raw request with bot authorization.
    ///
    /// Rate-limit responses are returned as-is; see [`send`](Self::send)
    /// for the error-mapping variant.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn execute(&self, request: RestRequest) -> RateLimitResult<RestResponse> {
        let request = request.with_header("Authorization", format!("Bot {}", self.token));
        let context = RequestContext::for_request(&request, &self.token);
        self.policy.execute(request, &context).await
    }

    /// Send a request with an optional JSON body and decode the reply.
    ///
    /// An empty response body decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::RateLimited`] on any 429, local or remote.
    /// - [`RateLimitError::Api`] on other 4xx/5xx statuses.
    /// - [`RateLimitError::Json`] if the body does not decode as `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> RateLimitResult<T> {
        let mut request = RestRequest::new(method, path);
        if let Some(body) = body {
            request = request.with_json(body)?;
        }
        let response = self.execute(request).await?;

        if response.is_rate_limited() {
            let retry_after = response.retry_after().unwrap_or_default();
            return Err(RateLimitError::RateLimited {
                retry_after,
                global: response.is_global(),
                local: response.is_local(),
            });
        }
        if response.status >= 400 {
            return Err(RateLimitError::Api {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        debug!(path, status = response.status, "REST call succeeded");
        if response.body.is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// `GET` a JSON resource.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn get(&self, path: &str) -> RateLimitResult<serde_json::Value> {
        self.send(Method::GET, path, None).await
    }

    /// `POST` a JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> RateLimitResult<serde_json::Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    /// `PATCH` a JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn patch(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> RateLimitResult<serde_json::Value> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    /// `PUT` a JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn put(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> RateLimitResult<serde_json::Value> {
        self.send(Method::PUT, path, Some(body)).await
    }

    /// `DELETE` a resource.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn delete(&self, path: &str) -> RateLimitResult<serde_json::Value> {
        self.send(Method::DELETE, path, None).await
    }
}
