//! SimHub wire models
//!
//! Catalog types are decoded leniently: missing fields fall back to defaults
//! so older or newer servers do not break listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A resource type registered on the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceType {
    pub type_key: String,
    pub type_name: String,
    pub schema_def: serde_json::Value,
    pub category_mode: String,
    pub integration_mode: String,
    pub upload_mode: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Category node within a resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub id: String,
    pub type_key: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// A concrete version of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceVersion {
    pub id: String,
    pub resource_id: Option<String>,
    pub version_num: u32,
    pub semver: String,
    pub file_path: Option<String>,
    pub file_hash: Option<String>,
    pub file_size: u64,
    pub meta_data: HashMap<String, serde_json::Value>,
    pub state: String,
    pub download_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A catalog resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub id: String,
    pub type_key: String,
    pub name: String,
    pub owner_id: String,
    pub scope: String,
    pub tags: Vec<String>,
    pub latest_version_id: Option<String>,
    pub latest_version: Option<ResourceVersion>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceListResponse {
    pub items: Vec<Resource>,
    pub total: u64,
}

// ============================================================================
// Upload wire contract
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UploadTokenRequest<'a> {
    pub resource_type: &'a str,
    pub filename: &'a str,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UploadTokenResponse {
    pub ticket_id: String,
    pub presigned_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MultipartInitRequest<'a> {
    pub resource_type: &'a str,
    pub filename: &'a str,
    pub part_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MultipartInitResponse {
    pub upload_id: String,
    #[serde(alias = "key")]
    pub object_key: String,
    #[serde(default)]
    pub ticket_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PartUrlRequest<'a> {
    pub upload_id: &'a str,
    pub object_key: &'a str,
    pub part_number: u32,
    /// The server derives the object key from the ticket
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PartUrlResponse {
    #[serde(alias = "url")]
    pub presigned_url: String,
}

/// Entry of a multipart completion manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartETag {
    pub part_number: u32,
    pub etag: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MultipartCompleteRequest<'a> {
    pub upload_id: &'a str,
    pub object_key: &'a str,
    pub parts: &'a [PartETag],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MultipartCompleteResponse {
    pub ticket_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ConfirmUploadRequest<'a> {
    pub ticket_id: &'a str,
    pub name: &'a str,
    pub semver: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<&'a HashMap<String, serde_json::Value>>,
}

/// Server acknowledgement of a confirmed upload
///
/// Every field is optional: servers differ in how much of the new version they
/// echo back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmResponse {
    pub resource_id: Option<String>,
    pub version_id: Option<String>,
    pub version_num: Option<u32>,
    pub semver: Option<String>,
    pub msg: Option<String>,
}
