use crate::config::StoreConfig;
use crate::gateway::common::{
    compute_etag, compute_multipart_etag, validate_bucket, validate_key, validate_part_number,
};
use crate::gateway::presign::generate_presigned_url;
use crate::gateway::{
    CompletedPart, GatewayError, ListEntry, ListPage, ObjectStoreGateway, SignedOperation,
    StoreResponse,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    meta: StoreResponse,
}

#[derive(Debug, Clone)]
struct PartData {
    etag: String,
    data: Bytes,
}

#[derive(Debug, Clone)]
struct InMemoryUpload {
    bucket: String,
    key: String,
    content_type: String,
    parts: BTreeMap<u32, PartData>,
}

/// Credentials and endpoint used to presign URLs.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "s3tree".to_string(),
            secret_key: "s3tree-secret".to_string(),
        }
    }
}

impl From<&StoreConfig> for SigningConfig {
    fn from(cfg: &StoreConfig) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            region: cfg.region.clone(),
            access_key: cfg.access_key.clone(),
            secret_key: cfg.secret_key.clone(),
        }
    }
}

/// In-memory object store.
///
/// Data structures:
/// - `buckets`: a set of bucket names
/// - `objects`: a BTreeMap keyed by (bucket, key) => StoredObject
/// - `uploads`: in-flight multipart uploads keyed by upload id
///
/// BTreeMap ordering makes prefix listing a range scan, and the last key of a
/// page doubles as the continuation token.
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    buckets: Arc<RwLock<BTreeSet<String>>>,
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
    uploads: Arc<RwLock<HashMap<String, InMemoryUpload>>>,
    page_size: usize,
    signing: SigningConfig,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(RwLock::new(BTreeSet::new())),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            uploads: Arc::new(RwLock::new(HashMap::new())),
            page_size: DEFAULT_PAGE_SIZE,
            signing: SigningConfig::default(),
        }
    }

    /// Cap each listing page at `page_size` entries (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_signing(mut self, signing: SigningConfig) -> Self {
        self.signing = signing;
        self
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<bool, GatewayError> {
        validate_bucket(bucket)?;
        let mut b = self.buckets.write().await;
        Ok(b.insert(bucket.to_string()))
    }

    /// Number of multipart uploads still open, across all buckets.
    pub async fn open_uploads(&self) -> usize {
        self.uploads.read().await.len()
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), GatewayError> {
        validate_bucket(bucket)?;
        let b = self.buckets.read().await;
        if !b.contains(bucket) {
            return Err(GatewayError::BucketNotFound(bucket.to_string()));
        }
        Ok(())
    }

    /// Fetch an upload, checking it belongs to `bucket/key`.
    async fn upload_for(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<InMemoryUpload, GatewayError> {
        let uploads = self.uploads.read().await;
        match uploads.get(upload_id) {
            Some(u) if u.bucket == bucket && u.key == key => Ok(u.clone()),
            _ => Err(GatewayError::NoSuchUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ObjectStoreGateway for InMemoryGateway {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<StoreResponse, GatewayError> {
        validate_key(key)?;
        if content_type.is_empty() {
            return Err(GatewayError::InvalidInput(
                "content_type must be non-empty".into(),
            ));
        }
        self.ensure_bucket(bucket).await?;

        let meta = StoreResponse {
            etag: compute_etag(&body),
            size: body.len() as u64,
            content_type: content_type.to_string(),
            last_modified_unix_secs: Utc::now().timestamp(),
        };

        let mut objs = self.objects.write().await;
        objs.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: body,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<(Bytes, StoreResponse), GatewayError> {
        validate_key(key)?;
        self.ensure_bucket(bucket).await?;
        let objs = self.objects.read().await;
        let obj = objs
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| GatewayError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        Ok((obj.data.clone(), obj.meta.clone()))
    }

    async fn list_paginated(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, GatewayError> {
        self.ensure_bucket(bucket).await?;
        let prefix = prefix.unwrap_or("");

        let start = match continuation_token {
            Some(token) => Bound::Excluded((bucket.to_string(), token.to_string())),
            None => Bound::Included((bucket.to_string(), prefix.to_string())),
        };

        let objs = self.objects.read().await;
        let mut page = ListPage::default();
        let mut truncated = false;
        for ((b, k), obj) in objs.range((start, Bound::Unbounded)) {
            if b != bucket {
                break;
            }
            if !k.starts_with(prefix) {
                // A token sorting before the prefix can land us short of it.
                if k.as_str() < prefix {
                    continue;
                }
                break;
            }
            if page.entries.len() == self.page_size {
                truncated = true;
                break;
            }
            page.entries.push(ListEntry {
                key: k.clone(),
                size: obj.meta.size,
            });
        }
        if truncated {
            page.continuation_token = page.entries.last().map(|e| e.key.clone());
        }
        Ok(page)
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize, GatewayError> {
        self.ensure_bucket(bucket).await?;
        let mut objs = self.objects.write().await;
        let mut removed = 0;
        for key in keys {
            if objs.remove(&(bucket.to_string(), key.clone())).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, GatewayError> {
        validate_key(key)?;
        self.ensure_bucket(bucket).await?;
        let upload_id = Uuid::new_v4().simple().to_string();
        let mut uploads = self.uploads.write().await;
        uploads.insert(
            upload_id.clone(),
            InMemoryUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, GatewayError> {
        validate_part_number(part_number)?;
        self.upload_for(bucket, key, upload_id).await?;

        let etag = compute_etag(&body);
        let mut uploads = self.uploads.write().await;
        // Re-checked under the write lock; an abort may have raced us.
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| GatewayError::NoSuchUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
            })?;
        upload.parts.insert(
            part_number,
            PartData {
                etag: etag.clone(),
                data: body,
            },
        );
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<StoreResponse, GatewayError> {
        let upload = self.upload_for(bucket, key, upload_id).await?;
        if parts.is_empty() {
            return Err(GatewayError::InvalidPart(
                "No parts supplied for completion".to_string(),
            ));
        }

        let mut sorted_parts = parts.to_vec();
        sorted_parts.sort_by_key(|p| p.part_number);

        let mut combined = BytesMut::new();
        let mut etags = Vec::with_capacity(sorted_parts.len());
        for part in &sorted_parts {
            let stored = upload.parts.get(&part.part_number).ok_or_else(|| {
                GatewayError::InvalidPart(format!(
                    "Part {} not found for upload {}",
                    part.part_number, upload_id
                ))
            })?;
            if stored.etag.trim_matches('"') != part.etag.trim_matches('"') {
                return Err(GatewayError::InvalidPart(format!(
                    "ETag mismatch for part {}: expected {}, got {}",
                    part.part_number, part.etag, stored.etag
                )));
            }
            combined.extend_from_slice(&stored.data);
            etags.push(stored.etag.clone());
        }

        let data = combined.freeze();
        let meta = StoreResponse {
            etag: compute_multipart_etag(&etags),
            size: data.len() as u64,
            content_type: upload.content_type.clone(),
            last_modified_unix_secs: Utc::now().timestamp(),
        };

        {
            let mut objs = self.objects.write().await;
            objs.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    data,
                    meta: meta.clone(),
                },
            );
        }
        self.uploads.write().await.remove(upload_id);
        Ok(meta)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), GatewayError> {
        self.upload_for(bucket, key, upload_id).await?;
        self.uploads.write().await.remove(upload_id);
        Ok(())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        operation: SignedOperation,
        ttl_secs: u64,
    ) -> Result<String, GatewayError> {
        validate_key(key)?;
        self.ensure_bucket(bucket).await?;
        generate_presigned_url(
            &self.signing.endpoint,
            bucket,
            key,
            operation.method(),
            ttl_secs,
            &self.signing.access_key,
            &self.signing.secret_key,
            &self.signing.region,
            &["host"],
        )
    }
}
