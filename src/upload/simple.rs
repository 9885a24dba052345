//! Single-shot upload
//!
//! Requests an upload ticket with a presigned URL, PUTs the whole payload and
//! confirms. Used for payloads under the multipart threshold.

use super::progress::{ProgressFn, ProgressTracker};
use super::{confirm, ConfirmedUpload, UploadMeta};
use crate::client::ApiClient;
use crate::error::{Result, SimHubError};
use crate::metrics;
use crate::models::{UploadTokenRequest, UploadTokenResponse};
use crate::transport::HttpRequest;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

const TOKEN_PATH: &str = "/api/v1/integration/upload/token";

/// Uploader for payloads that fit in one request
///
/// Obtained from [`crate::SimHubClient::simple`].
#[derive(Clone)]
pub struct SimpleUploader {
    api: ApiClient,
}

impl SimpleUploader {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Upload `data` in a single PUT
    ///
    /// Progress is reported as the body is sent and always ends with
    /// `(size, size, true)` once the PUT succeeds.
    #[tracing::instrument(
        name = "simhub.upload.simple",
        skip(self, meta, data, progress),
        fields(
            resource_type = %meta.resource_type,
            filename = %meta.filename,
            upload.total_bytes = data.len(),
            upload.ticket_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        meta: &UploadMeta,
        data: Bytes,
        progress: Option<ProgressFn>,
    ) -> Result<ConfirmedUpload> {
        let start = Instant::now();
        let result = self.run(meta, data, progress).await;

        metrics::record_upload_duration("simple", start.elapsed().as_secs_f64());
        match &result {
            Ok(confirmed) => metrics::record_upload_success("simple", confirmed.size),
            Err(_) => metrics::record_upload_failure("simple"),
        }
        result
    }

    async fn run(
        &self,
        meta: &UploadMeta,
        data: Bytes,
        progress: Option<ProgressFn>,
    ) -> Result<ConfirmedUpload> {
        if data.is_empty() {
            return Err(SimHubError::InvalidArgument(
                "upload payload is empty".into(),
            ));
        }

        let size = data.len() as u64;
        let request = UploadTokenRequest {
            resource_type: &meta.resource_type,
            filename: &meta.filename,
            size,
            checksum: Some(checksum(&data)),
        };
        let token: UploadTokenResponse = self.api.post_json(TOKEN_PATH, &request).await?;
        tracing::Span::current().record("upload.ticket_id", token.ticket_id.as_str());

        let tracker = Arc::new(ProgressTracker::new(size, progress));
        self.api
            .send(HttpRequest::put(token.presigned_url, data).with_progress(tracker.clone()))
            .await?;
        // Transports that do not stream the body leave the count short
        let sent = tracker.uploaded();
        if sent < size {
            tracker.advance(size - sent);
        }

        let response = confirm(&self.api, &token.ticket_id, meta).await?;

        tracing::info!(ticket_id = %token.ticket_id, bytes = size, "Upload confirmed");

        Ok(ConfirmedUpload {
            ticket_id: token.ticket_id,
            object_key: None,
            size,
            parts: 1,
            response,
        })
    }
}

/// Hex-encoded SHA-256 of the payload
fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
