//! Chunked reader
//!
//! Splits a source stream into the fixed-size parts of a multipart upload.
//! Parts come out strictly in part-number order; only the final part may be
//! shorter than the part size.

use crate::config::MAX_PARTS;
use crate::error::{Result, SimHubError};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Part layout of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    total_size: u64,
    part_size: u64,
    part_count: u64,
}

impl PartPlan {
    /// Lay out `total_size` bytes in parts of `part_size`
    pub fn new(total_size: u64, part_size: u64) -> Result<Self> {
        if total_size == 0 {
            return Err(SimHubError::InvalidArgument(
                "total_size must be greater than zero".into(),
            ));
        }
        if part_size == 0 {
            return Err(SimHubError::InvalidArgument(
                "part_size must be greater than zero".into(),
            ));
        }
        if usize::try_from(part_size).is_err() {
            return Err(SimHubError::InvalidArgument(format!(
                "part_size {} does not fit in memory on this platform",
                part_size
            )));
        }

        let part_count = total_size.div_ceil(part_size);
        if part_count > MAX_PARTS {
            return Err(SimHubError::InvalidArgument(format!(
                "{} bytes in parts of {} needs {} parts (maximum {})",
                total_size, part_size, part_count, MAX_PARTS
            )));
        }

        Ok(Self {
            total_size,
            part_size,
            part_count,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn part_count(&self) -> u64 {
        self.part_count
    }

    /// Byte offset of a 1-based part
    pub fn offset(&self, part_number: u32) -> u64 {
        (u64::from(part_number).saturating_sub(1)) * self.part_size
    }

    /// Length of a 1-based part; 0 outside `1..=part_count`
    pub fn part_len(&self, part_number: u32) -> u64 {
        if part_number == 0 || u64::from(part_number) > self.part_count {
            return 0;
        }
        (self.total_size - self.offset(part_number)).min(self.part_size)
    }
}

/// One contiguous chunk of the source
#[derive(Debug, Clone)]
pub struct Part {
    pub part_number: u32,
    pub offset: u64,
    pub data: Bytes,
}

/// Sequential reader producing [`Part`]s
pub struct ChunkedReader<R> {
    source: R,
    plan: PartPlan,
    next_part: u32,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> ChunkedReader<R> {
    pub fn new(source: R, plan: PartPlan) -> Self {
        Self {
            source,
            plan,
            next_part: 1,
            bytes_read: 0,
        }
    }

    /// Bytes handed out so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next part, or `None` once all parts were produced
    ///
    /// Short reads are retried until the part is full; only a zero-length
    /// read ends the stream, and an early end is a
    /// [`SimHubError::TruncatedStream`].
    pub async fn next_part(&mut self) -> Result<Option<Part>> {
        let part_number = self.next_part;
        if u64::from(part_number) > self.plan.part_count() {
            return Ok(None);
        }

        // PartPlan::new guarantees part_size fits in usize
        let len = self.plan.part_len(part_number) as usize;
        let mut buffer = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            let n = self.source.read(&mut buffer[filled..]).await?;
            if n == 0 {
                return Err(SimHubError::TruncatedStream {
                    expected: self.plan.total_size(),
                    read: self.bytes_read + filled as u64,
                });
            }
            filled += n;
        }

        self.bytes_read += len as u64;
        self.next_part += 1;

        Ok(Some(Part {
            part_number,
            offset: self.plan.offset(part_number),
            data: Bytes::from(buffer),
        }))
    }
}
