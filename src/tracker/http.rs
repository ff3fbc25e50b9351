//! Request/response values and the chain the interceptors forward through.
//!
//! Interceptors never talk to the network directly: they hand a
//! [`TrackerRequest`] to an [`HttpChain`], which is [`ReqwestChain`] in
//! production and a scripted fake in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::TransportError;
use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (60 seconds).
pub const READ_TIMEOUT_SECS: u64 = 60;

/// An outgoing tracker request.
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl TrackerRequest {
    /// Creates a bodiless request.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request with a JSON body (AniList GraphQL, MAL updates).
    #[must_use]
    pub fn post_json(url: Url, body: &serde_json::Value) -> Self {
        let mut request = Self::new(Method::POST, url);
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.body = Some(body.to_string().into_bytes());
        request
    }

    /// Creates a POST request with an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn post_form(url: Url, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut request = Self::new(Method::POST, url);
        request.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Some(encoded.into_bytes());
        request
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A tracker response with its body fully read.
#[derive(Debug, Clone)]
pub struct TrackerResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TrackerResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns a header value when present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decoding error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The next hop for an outgoing request.
#[async_trait]
pub trait HttpChain: Send + Sync {
    /// Sends `request` and returns whatever response comes back.
    ///
    /// Non-2xx statuses are responses, not errors.
    async fn proceed(&self, request: TrackerRequest) -> Result<TrackerResponse, TransportError>;
}

#[async_trait]
impl<C: HttpChain + ?Sized> HttpChain for Arc<C> {
    async fn proceed(&self, request: TrackerRequest) -> Result<TrackerResponse, TransportError> {
        (**self).proceed(request).await
    }
}

/// Production transport backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestChain {
    client: Client,
}

impl ReqwestChain {
    /// Creates a transport with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built (TLS backend
    /// initialization).
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::tracker_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(url)
    } else if error.is_connect() {
        TransportError::connection(url, error.to_string())
    } else {
        TransportError::network(url, error)
    }
}

#[async_trait]
impl HttpChain for ReqwestChain {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn proceed(&self, request: TrackerRequest) -> Result<TrackerResponse, TransportError> {
        let url = request.url.to_string();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?
            .to_vec();

        debug!(status, bytes = body.len(), "Tracker response received");
        Ok(TrackerResponse {
            status,
            headers,
            body,
        })
    }
}
