//! Crate-wide error type
//!
//! Every public operation returns a single terminal [`SimHubError`]. Upload
//! failures keep the phase they happened in (session init, part upload,
//! finalize) so callers can tell a failed transfer from bytes that are stored
//! but not yet registered.

use crate::auth::CredentialsError;
use crate::config::ConfigError;
use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SimHubError>;

/// Finalize phase of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizePhase {
    /// multipart-complete call (storage-level assembly)
    Complete,
    /// confirm call (catalog registration)
    Confirm,
}

impl fmt::Display for FinalizePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizePhase::Complete => write!(f, "complete"),
            FinalizePhase::Confirm => write!(f, "confirm"),
        }
    }
}

/// SimHub client errors
#[derive(Error, Debug)]
pub enum SimHubError {
    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Multipart session init failed: {0}")]
    SessionInit(#[source] Box<SimHubError>),

    #[error("Source stream ended after {read} of {expected} bytes")]
    TruncatedStream { expected: u64, read: u64 },

    #[error("Part {part_number} upload failed: {source}")]
    PartUpload {
        part_number: u32,
        #[source]
        source: Box<SimHubError>,
    },

    #[error("Multipart finalize ({phase}) failed: {source}")]
    Finalize {
        phase: FinalizePhase,
        #[source]
        source: Box<SimHubError>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl SimHubError {
    /// HTTP status of the underlying API error, looking through wrapped phases
    pub fn status(&self) -> Option<u16> {
        match self {
            SimHubError::Api { status, .. } => Some(*status),
            SimHubError::SessionInit(inner) => inner.status(),
            SimHubError::PartUpload { source, .. } | SimHubError::Finalize { source, .. } => {
                source.status()
            }
            _ => None,
        }
    }

    /// Part number of a failed part upload
    pub fn part_number(&self) -> Option<u32> {
        match self {
            SimHubError::PartUpload { part_number, .. } => Some(*part_number),
            _ => None,
        }
    }

    /// True when the failure happened after all parts were stored
    pub fn is_finalize(&self) -> bool {
        matches!(self, SimHubError::Finalize { .. })
    }

    pub(crate) fn part(part_number: u32, source: SimHubError) -> Self {
        SimHubError::PartUpload {
            part_number,
            source: Box::new(source),
        }
    }

    pub(crate) fn finalize(phase: FinalizePhase, source: SimHubError) -> Self {
        SimHubError::Finalize {
            phase,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_through_wrappers() {
        let api = SimHubError::Api {
            status: 503,
            body: "busy".into(),
        };
        let err = SimHubError::part(3, api);

        assert_eq!(err.status(), Some(503));
        assert_eq!(err.part_number(), Some(3));
        assert!(!err.is_finalize());
        assert!(err.to_string().contains("Part 3"));
    }

    #[test]
    fn test_finalize_display_names_phase() {
        let err = SimHubError::finalize(
            FinalizePhase::Confirm,
            SimHubError::Api {
                status: 409,
                body: "duplicate semver".into(),
            },
        );

        assert!(err.is_finalize());
        assert_eq!(err.status(), Some(409));
        assert_eq!(
            err.to_string(),
            "Multipart finalize (confirm) failed: API error (status 409): duplicate semver"
        );
    }

    #[test]
    fn test_truncated_has_no_status() {
        let err = SimHubError::TruncatedStream {
            expected: 10,
            read: 4,
        };
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "Source stream ended after 4 of 10 bytes");
    }
}
