use crate::config::MultipartConfig;
use crate::error::{TreeError, TreeResult};
use crate::gateway::{CompletedPart, ObjectStoreGateway};
use crate::index::{HierarchyIndex, Node, NodeId, UploadStatus};
use crate::upload::{Placement, UploadOrchestrator};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultipartRequest {
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartSession {
    pub node_id: NodeId,
    pub upload_id: String,
    pub name: String,
    pub key: String,
}

/// Where a placeholder node stands.
///
/// Completed and Aborted come only from the stored status. Progress is a
/// caller hint and never ends an upload, even at 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartState {
    Initiated,
    PartUploading { progress: u8 },
    Completed,
    Aborted,
}

impl MultipartState {
    /// `None` for nodes that never took part in a multipart upload.
    pub fn of(node: &Node) -> Option<Self> {
        node.upload_id.as_ref()?;
        match node.upload_status {
            Some(UploadStatus::Completed) => Some(MultipartState::Completed),
            Some(UploadStatus::Aborted) => Some(MultipartState::Aborted),
            Some(UploadStatus::InProgress) | None => match node.upload_progress.unwrap_or(0) {
                0 => Some(MultipartState::Initiated),
                progress => Some(MultipartState::PartUploading { progress }),
            },
        }
    }

    pub fn is_open(self) -> bool {
        matches!(
            self,
            MultipartState::Initiated | MultipartState::PartUploading { .. }
        )
    }
}

/// Chunked uploads spanning several requests.
///
/// Part order, completeness and assembly are left to the store; progress is
/// whatever the caller reports.
#[derive(Clone)]
pub struct MultipartUploads {
    gateway: Arc<dyn ObjectStoreGateway>,
    index: Arc<dyn HierarchyIndex>,
    uploads: UploadOrchestrator,
    config: MultipartConfig,
}

impl MultipartUploads {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        index: Arc<dyn HierarchyIndex>,
        uploads: UploadOrchestrator,
        config: MultipartConfig,
    ) -> Self {
        Self {
            gateway,
            index,
            uploads,
            config,
        }
    }

    async fn placeholder(&self, upload_id: &str) -> TreeResult<Node> {
        self.index
            .find_by_upload_id(upload_id)
            .await?
            .ok_or_else(|| TreeError::NotFound(format!("multipart upload {upload_id}")))
    }

    /// The placeholder of an upload that has not been completed or aborted.
    async fn open_placeholder(&self, upload_id: &str) -> TreeResult<Node> {
        let node = self.placeholder(upload_id).await?;
        match MultipartState::of(&node) {
            Some(state) if state.is_open() => Ok(node),
            state => Err(TreeError::Conflict(format!(
                "multipart upload {upload_id} is no longer open ({state:?})"
            ))),
        }
    }

    pub async fn create_multipart_upload(&self, req: MultipartRequest) -> TreeResult<MultipartSession> {
        if req.content_type.trim().is_empty() {
            return Err(TreeError::InvalidArgument(
                "content type must be non-empty".into(),
            ));
        }
        let parent_id = self
            .uploads
            .target_parent(req.parent_id, req.path.as_deref())
            .await?;
        let use_original_name = self.uploads.policy().use_original_name;
        let (parent_id, name, key) = match self
            .uploads
            .place(&req.name, parent_id, false, use_original_name)
            .await?
        {
            Placement::Create {
                parent_id,
                name,
                key,
            } => (parent_id, name, key),
            Placement::Overwrite(node) => {
                return Err(TreeError::Conflict(format!(
                    "{} is already taken",
                    node.name
                )))
            }
        };

        let bucket = self.uploads.bucket().to_string();
        let upload_id = self
            .gateway
            .create_multipart_upload(&bucket, &key, &req.content_type)
            .await?;

        let mut node = Node::file(
            name,
            req.content_type,
            req.size.unwrap_or(0),
            bucket.clone(),
            key.clone(),
            parent_id,
        );
        node.upload_id = Some(upload_id.clone());
        node.upload_progress = Some(0);
        node.upload_status = Some(UploadStatus::InProgress);
        let node = self.index.insert(node).await.map_err(|e| {
            tracing::error!(
                bucket = %bucket,
                key = %key,
                upload_id = %upload_id,
                error = %e,
                "multipart upload opened but placeholder insert failed"
            );
            TreeError::from(e)
        })?;

        tracing::info!(node_id = %node.id, upload_id = %upload_id, key = %key, "multipart upload initiated");
        Ok(MultipartSession {
            node_id: node.id,
            upload_id,
            name: node.name,
            key,
        })
    }

    /// Forward one part and record the caller's progress hint.
    pub async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        progress_hint: u8,
        body: Bytes,
    ) -> TreeResult<CompletedPart> {
        let mut node = self.open_placeholder(upload_id).await?;
        let etag = self
            .gateway
            .upload_part(&node.bucket, &node.key, upload_id, part_number, body)
            .await?;

        node.upload_progress = Some(progress_hint.min(100));
        self.index.update(node).await?;
        tracing::debug!(upload_id = %upload_id, part_number, progress = progress_hint, "part stored");
        Ok(CompletedPart { etag, part_number })
    }

    pub async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> TreeResult<Node> {
        let mut node = self.open_placeholder(upload_id).await?;
        let response = self
            .gateway
            .complete_multipart_upload(&node.bucket, &node.key, upload_id, &parts)
            .await?;

        node.upload_progress = Some(100);
        node.upload_status = Some(UploadStatus::Completed);
        node.size = Some(response.size);
        node.store_response = serde_json::to_value(&response).ok();
        let node = self.index.update(node).await.map_err(|e| {
            tracing::error!(
                upload_id = %upload_id,
                error = %e,
                "object assembled but placeholder update failed"
            );
            TreeError::from(e)
        })?;
        tracing::info!(node_id = %node.id, upload_id = %upload_id, size = response.size, parts = parts.len(), "multipart upload completed");
        Ok(node)
    }

    /// Release the store-side upload. The placeholder row stays unless configured otherwise.
    pub async fn abort_multipart_upload(&self, upload_id: &str) -> TreeResult<()> {
        let mut node = self.open_placeholder(upload_id).await?;
        self.gateway
            .abort_multipart_upload(&node.bucket, &node.key, upload_id)
            .await?;
        if self.config.delete_placeholder_on_abort {
            self.index.delete(node.id).await?;
            tracing::info!(node_id = %node.id, upload_id = %upload_id, "multipart upload aborted, placeholder removed");
        } else {
            node.upload_status = Some(UploadStatus::Aborted);
            let node = self.index.update(node).await?;
            tracing::info!(node_id = %node.id, upload_id = %upload_id, "multipart upload aborted, placeholder kept");
        }
        Ok(())
    }
}
