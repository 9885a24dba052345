//! Multipart upload orchestrator
//!
//! Splits a source stream into parts and uploads them concurrently through
//! per-part presigned URLs, then finalizes in two phases: `complete` assembles
//! the object in storage, `confirm` registers it in the catalog.
//!
//! # Concurrency
//!
//! The dispatch loop runs on the caller's task and owns the reader. Each part
//! is read, then a slot is taken from a per-upload [`Semaphore`], then the part
//! is spawned into a [`JoinSet`]. At most `concurrency` parts are in flight and
//! at most one more is buffered while the loop waits for a slot.
//!
//! # Tracing
//!
//! - `simhub.upload.multipart` - whole upload (`upload.id`, `upload.parts`)
//! - `simhub.upload.multipart.init` - session creation
//! - `simhub.upload.part` - one part (`part_number`, `part.bytes`)
//! - `simhub.upload.multipart.complete` - storage-level completion

use super::progress::{ProgressFn, ProgressTracker};
use super::reader::{ChunkedReader, Part, PartPlan};
use super::{confirm, ConfirmedUpload, UploadMeta};
use crate::client::ApiClient;
use crate::error::{FinalizePhase, Result, SimHubError};
use crate::metrics;
use crate::models::{
    MultipartCompleteRequest, MultipartCompleteResponse, MultipartInitRequest,
    MultipartInitResponse, PartETag, PartUrlRequest, PartUrlResponse,
};
use crate::transport::HttpRequest;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

const INIT_PATH: &str = "/api/v1/integration/upload/multipart/init";
const PART_URL_PATH: &str = "/api/v1/integration/upload/multipart/part-url";
const COMPLETE_PATH: &str = "/api/v1/integration/upload/multipart/complete";

/// Smallest part size object storage accepts for non-final parts
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Server-side multipart session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_id: String,
    pub object_key: String,
    pub ticket_id: Option<String>,
    plan: PartPlan,
}

impl UploadSession {
    pub fn part_size(&self) -> u64 {
        self.plan.part_size()
    }

    pub fn total_size(&self) -> u64 {
        self.plan.total_size()
    }

    pub fn part_count(&self) -> u64 {
        self.plan.part_count()
    }
}

/// Identifies the session to part workers
struct PartTarget {
    upload_id: String,
    object_key: String,
    ticket_id: Option<String>,
}

/// Concurrent multipart uploader
///
/// Obtained from [`crate::SimHubClient::multipart`].
#[derive(Clone)]
pub struct MultipartUploader {
    api: ApiClient,
    concurrency: usize,
}

impl MultipartUploader {
    pub(crate) fn new(api: ApiClient, concurrency: usize) -> Self {
        Self {
            api,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Upload `total_size` bytes from `source` in parts of `part_size`
    ///
    /// Exactly `total_size` bytes are consumed; a source that ends earlier
    /// fails with [`SimHubError::TruncatedStream`]. When a part fails, no more
    /// parts are submitted, parts already in flight are left to finish on
    /// their own and neither finalize call is made.
    #[tracing::instrument(
        name = "simhub.upload.multipart",
        skip(self, meta, source, progress),
        fields(
            resource_type = %meta.resource_type,
            filename = %meta.filename,
            upload.total_bytes = total_size,
            upload.part_size = part_size,
            upload.concurrency = self.concurrency,
            upload.parts = tracing::field::Empty,
            upload.id = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload<R>(
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
        let start = Instant::now();
        let result = self
            .run(meta, source, total_size, part_size, progress)
            .await;

        metrics::record_upload_duration("multipart", start.elapsed().as_secs_f64());
        match &result {
            Ok(confirmed) => metrics::record_upload_success("multipart", confirmed.size),
            Err(_) => metrics::record_upload_failure("multipart"),
        }
        result
    }

    async fn run<R>(
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
        let plan = PartPlan::new(total_size, part_size)?;
        tracing::Span::current().record("upload.parts", plan.part_count());

        if part_size < MIN_PART_SIZE && plan.part_count() > 1 {
            tracing::warn!(
                part_size = part_size,
                minimum = MIN_PART_SIZE,
                "Part size below storage minimum, non-final parts may be rejected"
            );
        }

        let session = self
            .init(meta, plan)
            .await
            .map_err(|e| SimHubError::SessionInit(Box::new(e)))?;
        tracing::Span::current().record("upload.id", session.upload_id.as_str());

        let tracker = Arc::new(ProgressTracker::new(total_size, progress));
        let manifest = self.transfer_parts(&session, source, tracker).await?;
        metrics::record_multipart_parts(plan.part_count());

        let ticket_id = self
            .complete(&session, &manifest)
            .await
            .map_err(|e| SimHubError::finalize(FinalizePhase::Complete, e))?;

        let response = confirm(&self.api, &ticket_id, meta)
            .await
            .map_err(|e| SimHubError::finalize(FinalizePhase::Confirm, e))?;

        tracing::info!(
            upload_id = %session.upload_id,
            ticket_id = %ticket_id,
            parts = manifest.len(),
            bytes = total_size,
            "Multipart upload confirmed"
        );

        Ok(ConfirmedUpload {
            ticket_id,
            object_key: Some(session.object_key),
            size: total_size,
            parts: plan.part_count(),
            response,
        })
    }

    #[tracing::instrument(
        name = "simhub.upload.multipart.init",
        skip(self, meta, plan),
        fields(part_count = plan.part_count()),
        err
    )]
    async fn init(&self, meta: &UploadMeta, plan: PartPlan) -> Result<UploadSession> {
        let request = MultipartInitRequest {
            resource_type: &meta.resource_type,
            filename: &meta.filename,
            part_count: plan.part_count(),
        };
        let response: MultipartInitResponse = self.api.post_json(INIT_PATH, &request).await?;

        if response.upload_id.is_empty() || response.object_key.is_empty() {
            return Err(SimHubError::InvalidResponse(
                "multipart init returned an empty upload_id or object_key".into(),
            ));
        }

        tracing::info!(
            upload_id = %response.upload_id,
            object_key = %response.object_key,
            parts = plan.part_count(),
            "Created multipart upload"
        );

        Ok(UploadSession {
            upload_id: response.upload_id,
            object_key: response.object_key,
            ticket_id: response.ticket_id.filter(|t| !t.is_empty()),
            plan,
        })
    }

    /// Upload every part and return the sorted manifest
    async fn transfer_parts<R>(
        &self,
        session: &UploadSession,
        source: R,
        tracker: Arc<ProgressTracker>,
    ) -> Result<Vec<PartETag>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut reader = ChunkedReader::new(source, session.plan);
        let mut tasks = JoinSet::new();
        let mut collector = PartCollector::new(session.part_count());
        let target = Arc::new(PartTarget {
            upload_id: session.upload_id.clone(),
            object_key: session.object_key.clone(),
            ticket_id: session.ticket_id.clone(),
        });

        let dispatched = self
            .dispatch(&mut reader, &mut tasks, &mut collector, target, tracker.clone())
            .await;

        if let Err(e) = dispatched {
            // In-flight parts keep running; dropping the set would abort them.
            // They must not report progress for an upload that already failed.
            tracker.close();
            tasks.detach_all();
            return Err(e);
        }

        collector.into_manifest()
    }

    async fn dispatch<R>(
        &self,
        reader: &mut ChunkedReader<R>,
        tasks: &mut JoinSet<Result<PartETag>>,
        collector: &mut PartCollector,
        target: Arc<PartTarget>,
        tracker: Arc<ProgressTracker>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        while let Some(part) = reader.next_part().await? {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SimHubError::Worker(e.to_string()))?;

            while let Some(joined) = tasks.try_join_next() {
                collector.record(joined)?;
            }

            let api = self.api.clone();
            let target = target.clone();
            let tracker = tracker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                upload_part(api, target, part, tracker).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            collector.record(joined)?;
        }

        Ok(())
    }

    /// Storage-level completion; returns the ticket to confirm
    #[tracing::instrument(
        name = "simhub.upload.multipart.complete",
        skip(self, session, manifest),
        fields(upload.id = %session.upload_id, parts_count = manifest.len()),
        err
    )]
    async fn complete(&self, session: &UploadSession, manifest: &[PartETag]) -> Result<String> {
        let request = MultipartCompleteRequest {
            upload_id: &session.upload_id,
            object_key: &session.object_key,
            parts: manifest,
            ticket_id: session.ticket_id.as_deref(),
        };
        let response: MultipartCompleteResponse =
            self.api.post_json_or_default(COMPLETE_PATH, &request).await?;

        response
            .ticket_id
            .filter(|t| !t.is_empty())
            .or_else(|| session.ticket_id.clone())
            .ok_or_else(|| {
                SimHubError::InvalidResponse(
                    "no ticket_id in multipart complete or init response".into(),
                )
            })
    }
}

#[tracing::instrument(
    name = "simhub.upload.part",
    skip(api, target, part, tracker),
    fields(
        upload.id = %target.upload_id,
        part_number = part.part_number,
        part.bytes = part.data.len()
    ),
    err
)]
async fn upload_part(
    api: ApiClient,
    target: Arc<PartTarget>,
    part: Part,
    tracker: Arc<ProgressTracker>,
) -> Result<PartETag> {
    let part_number = part.part_number;
    let result = put_part(&api, &target, part, &tracker).await;
    metrics::record_part_upload(result.is_ok());
    result.map_err(|e| SimHubError::part(part_number, e))
}

async fn put_part(
    api: &ApiClient,
    target: &PartTarget,
    part: Part,
    tracker: &ProgressTracker,
) -> Result<PartETag> {
    let request = PartUrlRequest {
        upload_id: &target.upload_id,
        object_key: &target.object_key,
        part_number: part.part_number,
        ticket_id: target.ticket_id.as_deref(),
    };
    let url: PartUrlResponse = api.post_json(PART_URL_PATH, &request).await?;

    let len = part.data.len() as u64;
    let response = api.send(HttpRequest::put(url.presigned_url, part.data)).await?;
    let etag = response
        .header("etag")
        .and_then(normalize_etag)
        .ok_or_else(|| SimHubError::InvalidResponse("part response has no ETag header".into()))?;

    tracker.advance(len);
    tracing::debug!(part_number = part.part_number, bytes = len, etag = %etag, "Uploaded part");

    Ok(PartETag {
        part_number: part.part_number,
        etag,
    })
}

/// Strip whitespace and surrounding quotes; `None` when nothing is left
fn normalize_etag(raw: &str) -> Option<String> {
    let etag = raw.trim().trim_matches('"');
    if etag.is_empty() {
        None
    } else {
        Some(etag.to_string())
    }
}

/// Part results addressed by part number
struct PartCollector {
    slots: Vec<Option<String>>,
}

impl PartCollector {
    fn new(part_count: u64) -> Self {
        Self {
            slots: vec![None; part_count as usize],
        }
    }

    /// Store a finished part; the first failure is returned as-is
    fn record(&mut self, joined: std::result::Result<Result<PartETag>, JoinError>) -> Result<()> {
        let part = joined.map_err(|e| SimHubError::Worker(e.to_string()))??;
        let slot = (part.part_number as usize)
            .checked_sub(1)
            .and_then(|index| self.slots.get_mut(index))
            .ok_or_else(|| {
                SimHubError::Worker(format!("part {} is outside the session", part.part_number))
            })?;
        if slot.is_some() {
            return Err(SimHubError::Worker(format!(
                "part {} finished twice",
                part.part_number
            )));
        }
        *slot = Some(part.etag);
        Ok(())
    }

    /// Manifest sorted by part number, covering every part
    fn into_manifest(self) -> Result<Vec<PartETag>> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, etag)| {
                let part_number = index as u32 + 1;
                etag.map(|etag| PartETag { part_number, etag })
                    .ok_or_else(|| SimHubError::Worker(format!("part {} never finished", part_number)))
            })
            .collect()
    }
}
