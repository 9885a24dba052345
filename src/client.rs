//! SimHub client
//!
//! [`SimHubClient`] owns the transport and the upload settings; catalog,
//! upload and download operations are implemented on it in their own modules.

use crate::auth::CredentialsProvider;
use crate::config::{ClientConfig, UploadConfig};
use crate::error::Result;
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, StreamingResponse, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Transport plus base URL, cheap to clone into worker tasks
#[derive(Clone)]
pub(crate) struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: Arc<str>,
}

impl ApiClient {
    pub(crate) fn new(transport: Arc<dyn Transport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send and fail on non-2xx
    pub(crate) async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.transport.send(request).await?;
        response.error_for_status()
    }

    /// Send with a streaming body; status is left to the caller
    pub(crate) async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
        Ok(self.transport.send_streaming(request).await?)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(HttpRequest::get(self.url(path))).await?;
        response.json()
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = HttpRequest::post_json(self.url(path), body)?;
        let response = self.send(request).await?;
        response.json()
    }

    /// Like [`ApiClient::post_json`], but an empty body decodes to `T::default()`
    pub(crate) async fn post_json_or_default<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let request = HttpRequest::post_json(self.url(path), body)?;
        let response = self.send(request).await?;
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        response.json()
    }
}

/// SimHub API client
///
/// # Example
///
/// ```no_run
/// use simhub_client::{ClientConfig, SimHubClient, UploadMeta};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::new("https://simhub.example.com", Some("token".into()));
/// let client = SimHubClient::new(config)?;
///
/// for resource_type in client.list_resource_types().await? {
///     println!("{}", resource_type.type_key);
/// }
///
/// let meta = UploadMeta::new("map", "town.bin", "Town", "1.0.0");
/// let data = vec![0u8; 12 * 1024 * 1024];
/// let confirmed = client
///     .upload_multipart(&meta, &data[..], data.len() as u64, 5 * 1024 * 1024, None)
///     .await?;
/// println!("ticket {}", confirmed.ticket_id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SimHubClient {
    pub(crate) api: ApiClient,
    pub(crate) upload: UploadConfig,
}

impl SimHubClient {
    /// Create a client with a reqwest transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let credentials = CredentialsProvider::from_config(&config)?;
        let transport =
            ReqwestTransport::new(&config.http, credentials, config.upload.concurrency)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client from `SIMHUB_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Create a client on top of an existing transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            api: ApiClient::new(transport, config.base_url()),
            upload: config.upload,
        }
    }

    /// Override the number of concurrent part uploads
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.upload.concurrency = concurrency.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    pub fn upload_config(&self) -> &UploadConfig {
        &self.upload
    }
}

impl fmt::Debug for SimHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimHubClient")
            .field("base_url", &self.api.base_url())
            .field("upload", &self.upload)
            .finish()
    }
}
