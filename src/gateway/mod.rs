//! Object store gateway: the bucket/key store the hierarchy is materialized in.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod common;
pub mod in_memory;
pub mod presign;

/// What the store reports back after a write.
///
/// The core never interprets this beyond `size`; it is captured verbatim on the
/// node for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub etag: String,
    pub size: u64,
    pub content_type: String,
    pub last_modified_unix_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub key: String,
    pub size: u64,
}

/// One page of a prefix listing. `continuation_token` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    pub continuation_token: Option<String>,
}

/// A finished part of a multipart upload, as handed back to `complete_multipart_upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub etag: String,
    pub part_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedOperation {
    Get,
    Put,
    Delete,
}

impl SignedOperation {
    pub fn method(&self) -> &'static str {
        match self {
            SignedOperation::Get => "GET",
            SignedOperation::Put => "PUT",
            SignedOperation::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },
    #[error("no such upload: {upload_id} for {bucket}/{key}")]
    NoSuchUpload {
        bucket: String,
        key: String,
        upload_id: String,
    },
    #[error("invalid part: {0}")]
    InvalidPart(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Bucket/key addressed store consumed by the hierarchy engine.
///
/// Timeouts, retries and backoff belong to implementations; callers surface
/// every error as-is.
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync + 'static {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<StoreResponse, GatewayError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<(Bytes, StoreResponse), GatewayError>;

    /// List keys under `prefix`, resuming after `continuation_token` when given.
    async fn list_paginated(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, GatewayError>;

    /// Delete `keys`, ignoring ones that do not exist. Returns how many were removed.
    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize, GatewayError>;

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, GatewayError>;

    /// Store one part and return its ETag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, GatewayError>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<StoreResponse, GatewayError>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), GatewayError>;

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        operation: SignedOperation,
        ttl_secs: u64,
    ) -> Result<String, GatewayError>;
}
