//! reqwest-backed transport
//!
//! # Tracing
//!
//! Each request creates a span named `simhub.http` with attributes:
//! - `http.method` - Request method
//! - `http.url` - Target URL without query string
//! - `http.request_id` - `X-Request-Id` sent with API calls
//! - `http.status_code` - Response status (recorded after the call)
//! - `http.response_bytes` - Response body size (recorded after the call)

use super::{
    redact_url, HttpRequest, HttpResponse, Method, StreamingResponse, Transport, TransportError,
};
use crate::auth::Credentials;
use crate::config::HttpConfig;
use crate::metrics;
use crate::upload::ProgressTracker;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{StreamExt, TryStreamExt};
use std::sync::Arc;

/// Transport backed by a shared `reqwest::Client`
pub struct ReqwestTransport {
    client: reqwest::Client,
    credentials: Credentials,
}

impl ReqwestTransport {
    /// Create a transport with the given timeouts and idle pool size
    pub fn new(
        http: &HttpConfig,
        credentials: Credentials,
        max_idle_per_host: usize,
    ) -> Result<Self, TransportError> {
        let user_agent = http
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("simhub-client/{}", env!("CARGO_PKG_VERSION")));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(http.connect_timeout())
            .timeout(http.request_timeout())
            .pool_max_idle_per_host(max_idle_per_host)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
        })
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if request.authenticated {
            let request_id = uuid::Uuid::new_v4().to_string();
            tracing::Span::current().record("http.request_id", request_id.as_str());
            builder = builder.header("X-Request-Id", request_id);
            if let Some(auth) = self.credentials.authorization_header() {
                builder = builder.header(reqwest::header::AUTHORIZATION, auth);
            }
        }

        match (request.body, request.progress) {
            (Some(body), Some(tracker)) => builder
                .header(reqwest::header::CONTENT_LENGTH, body.len())
                .body(reqwest::Body::wrap_stream(counted_chunks(body, tracker))),
            (Some(body), None) => builder.body(body),
            (None, _) => builder,
        }
    }
}

/// Granularity of upload progress for streamed bodies
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Split `body` into slices that advance `tracker` as the connection pulls them
fn counted_chunks(
    body: Bytes,
    tracker: Arc<ProgressTracker>,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let chunks: Vec<Bytes> = (0..body.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| body.slice(start..(start + UPLOAD_CHUNK_SIZE).min(body.len())))
        .collect();

    futures::stream::iter(chunks).map(move |chunk| {
        tracker.advance(chunk.len() as u64);
        Ok::<_, std::io::Error>(chunk)
    })
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_body() || e.is_decode() {
        TransportError::Body(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(
        name = "simhub.http",
        skip(self, request),
        fields(
            http.method = %request.method,
            http.url = %redact_url(&request.url),
            request.bytes = request.body_len(),
            http.request_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            http.response_bytes = tracing::field::Empty
        ),
        err
    )]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        let response = self.build(request).send().await.map_err(|e| {
            metrics::record_api_request(method.as_str(), None);
            map_error(e)
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(map_error)?;

        metrics::record_api_request(method.as_str(), Some(status));

        let span = tracing::Span::current();
        span.record("http.status_code", status);
        span.record("http.response_bytes", body.len());

        let mut result = HttpResponse::new(status, body);
        for (name, value) in headers {
            result = result.with_header(name, value);
        }
        Ok(result)
    }

    #[tracing::instrument(
        name = "simhub.http_stream",
        skip(self, request),
        fields(
            http.method = %request.method,
            http.url = %redact_url(&request.url),
            http.request_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let method = request.method;
        let response = self.build(request).send().await.map_err(|e| {
            metrics::record_api_request(method.as_str(), None);
            map_error(e)
        })?;

        let status = response.status().as_u16();
        metrics::record_api_request(method.as_str(), Some(status));
        tracing::Span::current().record("http.status_code", status);

        Ok(StreamingResponse {
            status,
            content_length: response.content_length(),
            body: response.bytes_stream().map_err(map_error).boxed(),
        })
    }
}
