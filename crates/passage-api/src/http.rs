//! HTTP implementation of [`AuthApi`] using `reqwest`.
//!
//! Every call is a JSON `POST` to `<base_url><endpoint>` carrying the
//! configured key in an `apikey` header. Each call runs under a hard
//! client-side deadline that covers connecting, sending, and reading the
//! whole body. When it expires the in-flight request future is dropped,
//! which cancels the underlying I/O, and the call fails with
//! [`ApiError::Timeout`].

use std::time::Duration;

use passage_protocol::{decode_validity, CallbackPayload, SessionId, SessionRequest, UserAttributes};
use serde::Serialize;
use serde_json::Value;

use crate::{ApiEndpoints, ApiError, AuthApi};

/// Header that carries the backend API key.
pub const API_KEY_HEADER: &str = "apikey";

/// Client-side deadline used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An [`AuthApi`] that talks to the backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    endpoints: ApiEndpoints,
    timeout: Duration,
}

impl HttpAuthApi {
    /// Creates a client with default endpoints and timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            endpoints: ApiEndpoints::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the endpoint paths.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: ApiEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Overrides the client-side deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses a preconfigured `reqwest` client (proxies, TLS roots, pooling).
    #[must_use]
    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// The configured client-side deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// POSTs `body` and returns the parsed JSON reply, under the deadline.
    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "calling auth api");

        match tokio::time::timeout(self.timeout, self.exchange(&url, body)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%url, timeout = ?self.timeout, "auth api call timed out");
                Err(ApiError::Timeout(self.timeout))
            }
        }
    }

    async fn exchange<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value, ApiError> {
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_default();
            tracing::warn!(%url, status = status.as_u16(), %message, "auth api rejected request");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::Malformed(format!("response is not json: {e}")))?;
        tracing::debug!(%url, status = status.as_u16(), "auth api replied");
        Ok(value)
    }

    /// Maps a `reqwest` failure onto the taxonomy. A deadline hit inside
    /// reqwest is still a timeout, never a generic network failure.
    fn classify(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else if err.is_decode() || err.is_body() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl AuthApi for HttpAuthApi {
    async fn submit_callback(&self, payload: &CallbackPayload) -> Result<UserAttributes, ApiError> {
        let reply = self.post(&self.endpoints.callback, payload).await?;
        decode_attributes(reply)
    }

    async fn validate_session(&self, session: &SessionId) -> Result<bool, ApiError> {
        let body = SessionRequest {
            session: session.clone(),
        };
        let reply = self.post(&self.endpoints.validate_session, &body).await?;
        decode_validity(&reply).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    async fn fetch_user(&self, session: &SessionId) -> Result<UserAttributes, ApiError> {
        let body = SessionRequest {
            session: session.clone(),
        };
        let reply = self.post(&self.endpoints.user_data, &body).await?;
        decode_attributes(reply)
    }
}

/// Reads user attributes from a reply. Accepts the attributes at the top
/// level or wrapped in a `user` or `data` object.
fn decode_attributes(reply: Value) -> Result<UserAttributes, ApiError> {
    let inner = match reply {
        Value::Object(mut fields) => match ["user", "data"]
            .into_iter()
            .find(|key| matches!(fields.get(*key), Some(Value::Object(_))))
        {
            Some(key) => fields.remove(key).unwrap_or_default(),
            None => Value::Object(fields),
        },
        other => {
            return Err(ApiError::Malformed(format!(
                "expected user attributes object, got {other}"
            )));
        }
    };
    serde_json::from_value(inner).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Pulls a human-readable reason out of an error body, if it has one.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .into_iter()
        .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
}
