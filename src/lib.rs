//! SimHub Client Library
//!
//! Async client for the SimHub resource service.
//!
//! # Features
//!
//! - **Catalog**: list resource types and resources, fetch a resource
//! - **Multipart Upload**: concurrent part uploads through presigned URLs with
//!   bounded parallelism and memory
//! - **Simple Upload**: single presigned PUT for small payloads
//! - **Download**: streamed download of a resource's latest version
//!
//! # Example
//!
//! ```no_run
//! use simhub_client::{SimHubClient, UploadMeta, UploadMode};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SimHubClient::from_env()?;
//!     let meta = UploadMeta::new("scenario", "", "Highway merge", "1.0.0");
//!     let confirmed = client
//!         .upload_file("highway.zip", &meta, UploadMode::Auto, None)
//!         .await?;
//!     println!("{:?}", confirmed.response);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod metrics;
pub mod models;
pub mod transport;
pub mod upload;

// Re-export commonly used types
pub use catalog::ResourceQuery;
pub use client::SimHubClient;
pub use config::ClientConfig;
pub use error::{FinalizePhase, Result, SimHubError};
pub use models::{ConfirmResponse, PartETag, Resource, ResourceType, ResourceVersion};
pub use upload::{ConfirmedUpload, ProgressFn, UploadMeta, UploadMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
