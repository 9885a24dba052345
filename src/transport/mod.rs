//! Transport module
//!
//! Request/response contract between the SimHub client and the network.
//!
//! Every call in the crate (catalog lookups, session setup, presigned PUTs)
//! goes through the [`Transport`] trait. [`ReqwestTransport`] is the
//! production implementation; tests plug in doubles to observe concurrency or
//! inject failures.
//!
//! API calls carry the bearer token. Presigned storage URLs are already
//! authorized, so requests built with [`HttpRequest::put`] or marked
//! [`HttpRequest::unauthenticated`] go out without it.
//!
//! A request may carry a [`ProgressTracker`] for its body. Transports that
//! stream the body advance it chunk by chunk; others may ignore it.

use crate::error::SimHubError;
use crate::upload::ProgressTracker;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

mod http;

pub use http::ReqwestTransport;

/// Transport-level errors (no HTTP response was obtained)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Client build error: {0}")]
    Build(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Body error: {0}")]
    Body(String),
}

/// HTTP methods used by the SimHub wire contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Attach the bearer token
    pub authenticated: bool,
    /// Advanced as body bytes are handed to the connection
    pub progress: Option<Arc<ProgressTracker>>,
}

impl HttpRequest {
    /// Authenticated GET
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            authenticated: true,
            progress: None,
        }
    }

    /// Authenticated POST with a JSON body
    pub fn post_json<T: Serialize + ?Sized>(
        url: impl Into<String>,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(body)?;
        Ok(Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(Bytes::from(payload)),
            authenticated: true,
            progress: None,
        })
    }

    /// Unauthenticated PUT of raw bytes to a presigned URL
    pub fn put(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
            authenticated: false,
            progress: None,
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send without the bearer token
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Report body upload progress to `tracker`
    pub fn with_progress(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.progress = Some(tracker);
        self
    }

    /// Body length in bytes
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }
}

/// Fully-buffered response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header (names are case-insensitive)
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
        self
    }

    /// Look up a header, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`SimHubError::Api`]
    pub fn error_for_status(self) -> Result<Self, SimHubError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SimHubError::Api {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SimHubError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Body stream of a streaming response
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Response whose body is consumed incrementally
pub struct StreamingResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl StreamingResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into an [`SimHubError::Api`] for a non-2xx status
    pub async fn into_api_error(mut self) -> SimHubError {
        let mut body = Vec::new();
        while let Some(Ok(chunk)) = self.body.next().await {
            body.extend_from_slice(&chunk);
        }
        SimHubError::Api {
            status: self.status,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Issues HTTP requests for the client
///
/// Implementations must be safe to share across concurrently running part
/// uploads.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and buffer the full response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Send a request and stream the response body
    ///
    /// The default implementation buffers through [`Transport::send`].
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let response = self.send(request).await?;
        let body = response.body;
        Ok(StreamingResponse {
            status: response.status,
            content_length: Some(body.len() as u64),
            body: futures::stream::once(async move { Ok(body) }).boxed(),
        })
    }
}

/// Drop the query string (presigned signatures) from a URL for logging
pub(crate) fn redact_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
