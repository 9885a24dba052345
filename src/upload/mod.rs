//! Upload module
//!
//! Two upload flows share one confirm step:
//! - [`simple`]: ticket + presigned PUT of the whole payload
//! - [`multipart`]: concurrent part uploads, then complete
//!
//! [`SimHubClient::upload_file`] picks one by size.

use crate::client::{ApiClient, SimHubClient};
use crate::error::{Result, SimHubError};
use crate::models::{ConfirmResponse, ConfirmUploadRequest};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncRead;

pub mod multipart;
pub mod progress;
pub mod reader;
pub mod simple;

pub use multipart::{MultipartUploader, UploadSession, MIN_PART_SIZE};
pub use progress::{ProgressFn, ProgressTracker};
pub use reader::{ChunkedReader, Part, PartPlan};
pub use simple::SimpleUploader;

const CONFIRM_PATH: &str = "/api/v1/integration/upload/confirm";

/// What is being uploaded and how it should be registered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadMeta {
    pub resource_type: String,
    pub filename: String,
    /// Display name of the resource
    pub name: String,
    pub semver: String,
    pub tags: Vec<String>,
    pub category_id: Option<String>,
    pub meta_data: Option<HashMap<String, serde_json::Value>>,
}

impl UploadMeta {
    pub fn new(
        resource_type: impl Into<String>,
        filename: impl Into<String>,
        name: impl Into<String>,
        semver: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            filename: filename.into(),
            name: name.into(),
            semver: semver.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_meta_data(mut self, meta_data: HashMap<String, serde_json::Value>) -> Self {
        self.meta_data = Some(meta_data);
        self
    }
}

/// Outcome of a confirmed upload
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedUpload {
    pub ticket_id: String,
    /// Storage key (multipart only)
    pub object_key: Option<String>,
    pub size: u64,
    pub parts: u64,
    pub response: ConfirmResponse,
}

/// Upload flow selection for [`SimHubClient::upload_file`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadMode {
    /// Simple up to the multipart threshold, multipart above it
    #[default]
    Auto,
    Simple,
    Multipart,
}

impl FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(UploadMode::Auto),
            "simple" => Ok(UploadMode::Simple),
            "multipart" => Ok(UploadMode::Multipart),
            other => Err(format!(
                "unknown upload mode '{}' (expected auto, simple or multipart)",
                other
            )),
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Auto => write!(f, "auto"),
            UploadMode::Simple => write!(f, "simple"),
            UploadMode::Multipart => write!(f, "multipart"),
        }
    }
}

/// Register an uploaded ticket as a new resource version
#[tracing::instrument(
    name = "simhub.upload.confirm",
    skip(api, meta),
    fields(name = %meta.name, semver = %meta.semver),
    err
)]
pub(crate) async fn confirm(
    api: &ApiClient,
    ticket_id: &str,
    meta: &UploadMeta,
) -> Result<ConfirmResponse> {
    let request = ConfirmUploadRequest {
        ticket_id,
        name: &meta.name,
        semver: &meta.semver,
        tags: &meta.tags,
        category_id: meta.category_id.as_deref(),
        meta_data: meta.meta_data.as_ref(),
    };
    api.post_json_or_default(CONFIRM_PATH, &request).await
}

impl SimHubClient {
    /// Multipart uploader using the configured concurrency
    pub fn multipart(&self) -> MultipartUploader {
        MultipartUploader::new(self.api.clone(), self.upload.concurrency)
    }

    pub fn simple(&self) -> SimpleUploader {
        SimpleUploader::new(self.api.clone())
    }

    /// Multipart upload of `total_size` bytes from `source`
    ///
    /// See [`MultipartUploader::upload`].
    pub async fn upload_multipart<R>(
        &self,
        meta: &UploadMeta,
        source: R,
        total_size: u64,
        part_size: u64,
        progress: Option<ProgressFn>,
    ) -> Result<ConfirmedUpload>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.multipart()
            .upload(meta, source, total_size, part_size, progress)
            .await
    }

    /// Single-request upload of an in-memory payload
    pub async fn upload_simple(
        &self,
        meta: &UploadMeta,
        data: impl Into<Bytes>,
        progress: Option<ProgressFn>,
    ) -> Result<ConfirmedUpload> {
        self.simple().upload(meta, data.into(), progress).await
    }

    /// Upload a file from disk
    ///
    /// An empty `meta.filename` is replaced by the path's file name. Multipart
    /// uploads use the configured part size.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        meta: &UploadMeta,
        mode: UploadMode,
        progress: Option<ProgressFn>,
    ) -> Result<ConfirmedUpload> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        if size == 0 {
            return Err(SimHubError::InvalidArgument(format!(
                "{} is empty",
                path.display()
            )));
        }

        let mut meta = meta.clone();
        if meta.filename.is_empty() {
            meta.filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    SimHubError::InvalidArgument(format!("{} has no file name", path.display()))
                })?;
        }

        let mode = match mode {
            UploadMode::Auto if size <= self.upload.multipart_threshold => UploadMode::Simple,
            UploadMode::Auto => UploadMode::Multipart,
            explicit => explicit,
        };
        tracing::debug!(path = %path.display(), size = size, mode = %mode, "Uploading file");

        match mode {
            UploadMode::Simple => {
                let data = tokio::fs::read(path).await?;
                self.upload_simple(&meta, data, progress).await
            }
            _ => {
                let file = tokio::fs::File::open(path).await?;
                self.upload_multipart(&meta, file, size, self.upload.part_size, progress)
                    .await
            }
        }
    }
}
