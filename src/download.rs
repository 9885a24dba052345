//! Resource download
//!
//! Resolves the latest version's download URL and streams the payload into a
//! writer chunk by chunk. Absolute URLs are presigned and fetched without the
//! bearer token; server-relative URLs go through the API with it.

use crate::client::SimHubClient;
use crate::error::{Result, SimHubError};
use crate::metrics;
use crate::transport::{HttpRequest, StreamingResponse};
use crate::upload::ProgressFn;
use futures::StreamExt;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

impl SimHubClient {
    /// Stream the latest version of resource `id` into `writer`
    ///
    /// Progress is reported as `(downloaded, content_length_or_0, done)` after
    /// every chunk. Returns the number of bytes written.
    #[tracing::instrument(
        name = "simhub.download",
        skip(self, writer, progress),
        fields(resource_id = %id, download.bytes = tracing::field::Empty),
        err
    )]
    pub async fn download_to_writer<W>(
        &self,
        id: &str,
        writer: &mut W,
        progress: Option<ProgressFn>,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let response = self.open_download(id).await?;
        let downloaded = stream_into(response, writer, progress).await?;

        tracing::Span::current().record("download.bytes", downloaded);
        tracing::info!(resource_id = %id, bytes = downloaded, "Download finished");
        Ok(downloaded)
    }

    /// Download the latest version of resource `id` to `path`
    ///
    /// The payload is staged in a temporary file next to `path` and moved
    /// over it only once every byte has arrived. On failure an existing file
    /// at `path` is left as it was.
    #[tracing::instrument(
        name = "simhub.download.file",
        skip(self, path, progress),
        fields(resource_id = %id, path = %path.as_ref().display()),
        err
    )]
    pub async fn download_to_file(
        &self,
        id: &str,
        path: impl AsRef<Path>,
        progress: Option<ProgressFn>,
    ) -> Result<u64> {
        let path = path.as_ref();
        let response = self.open_download(id).await?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staged = NamedTempFile::new_in(dir)?;
        let mut writer = BufWriter::new(tokio::fs::File::from_std(staged.reopen()?));

        // Dropping `staged` on any error below deletes the temporary file.
        let downloaded = stream_into(response, &mut writer, progress).await?;
        writer.into_inner().sync_all().await?;
        staged.persist(path).map_err(|e| e.error)?;

        tracing::info!(resource_id = %id, bytes = downloaded, "Download saved");
        Ok(downloaded)
    }

    /// Resolve the download URL of resource `id` and open the payload stream
    async fn open_download(&self, id: &str) -> Result<StreamingResponse> {
        let resource = self.get_resource(id).await?;
        let url = resource
            .latest_version
            .and_then(|version| version.download_url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                SimHubError::InvalidResponse(format!("resource {} has no download URL", id))
            })?;

        let request = if url.starts_with('/') {
            HttpRequest::get(self.api.url(&url))
        } else {
            HttpRequest::get(url).unauthenticated()
        };

        let response = self.api.send_streaming(request).await?;
        if !response.is_success() {
            return Err(response.into_api_error().await);
        }
        Ok(response)
    }
}

/// Copy an open payload stream into `writer`, checking it against the
/// advertised length
async fn stream_into<W>(
    response: StreamingResponse,
    writer: &mut W,
    progress: Option<ProgressFn>,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    let total = response.content_length.unwrap_or(0);
    let mut body = response.body;
    let mut downloaded = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        metrics::record_download_bytes(chunk.len() as u64);
        if let Some(callback) = &progress {
            callback(downloaded, total, false);
        }
    }
    writer.flush().await?;

    if total > 0 && downloaded != total {
        return Err(SimHubError::TruncatedStream {
            expected: total,
            read: downloaded,
        });
    }

    if let Some(callback) = &progress {
        callback(downloaded, total, true);
    }
    Ok(downloaded)
}
