// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::config::{Config, StoreConfig};
use crate::deletion::{DeletionCoordinator, DeletionReport};
use crate::error::{TreeError, TreeResult};
use crate::gateway::{CompletedPart, ObjectStoreGateway, SignedOperation};
use crate::index::{HierarchyIndex, Node, NodeId, Page};
use crate::multipart::{MultipartRequest, MultipartSession, MultipartUploads};
use crate::naming::{content_type_for, validate_folder_name};
use crate::reconcile::{ReconciliationEngine, SyncReport};
use crate::resolver::PathResolver;
use crate::upload::{Placement, UploadOrchestrator, UploadOutcome, UploadRequest};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upload whose payload arrives as base64 text, optionally as a `data:` URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Base64UploadRequest {
    pub data: String,
    pub name: String,
    /// Overridden by the media type of a `data:` URL.
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub overwrite: Option<bool>,
    #[serde(default)]
    pub use_original_name: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUpload {
    pub url: String,
    pub name: String,
    pub key: String,
}

/// Entry point bundling the gateway, the index and every hierarchy component.
///
/// Inbound surfaces (HTTP, CLI) hold one of these for the process lifetime.
#[derive(Clone)]
pub struct FileTree {
    gateway: Arc<dyn ObjectStoreGateway>,
    index: Arc<dyn HierarchyIndex>,
    store: StoreConfig,
    resolver: PathResolver,
    uploads: UploadOrchestrator,
    multipart: MultipartUploads,
    deletion: DeletionCoordinator,
    reconciliation: ReconciliationEngine,
}

impl FileTree {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        index: Arc<dyn HierarchyIndex>,
        config: &Config,
    ) -> Self {
        let store = config.store.clone();
        let resolver = PathResolver::new(
            gateway.clone(),
            index.clone(),
            store.bucket.clone(),
            config.hierarchy.max_depth,
        );
        let uploads = UploadOrchestrator::new(
            gateway.clone(),
            index.clone(),
            resolver.clone(),
            store.clone(),
            config.upload.clone(),
        );
        let multipart = MultipartUploads::new(
            gateway.clone(),
            index.clone(),
            uploads.clone(),
            config.multipart.clone(),
        );
        let deletion = DeletionCoordinator::new(gateway.clone(), index.clone());
        let reconciliation =
            ReconciliationEngine::new(gateway.clone(), index.clone(), store.bucket.clone());
        Self {
            gateway,
            index,
            store,
            resolver,
            uploads,
            multipart,
            deletion,
            reconciliation,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn bucket(&self) -> &str {
        &self.store.bucket
    }

    pub async fn get_node(&self, id: NodeId) -> TreeResult<Node> {
        self.resolver.get_node(id).await
    }

    async fn folder(&self, id: NodeId) -> TreeResult<Node> {
        let node = self.get_node(id).await?;
        if !node.is_folder() {
            return Err(TreeError::InvalidArgument(format!("{id} is not a folder")));
        }
        Ok(node)
    }

    async fn ensure_name_free(
        &self,
        parent_id: Option<NodeId>,
        name: &str,
        except: NodeId,
    ) -> TreeResult<()> {
        let clash = self
            .index
            .find_by_name(parent_id, name)
            .await?
            .into_iter()
            .any(|n| n.id != except);
        if clash {
            return Err(TreeError::Conflict(format!(
                "{name} already exists in the target folder"
            )));
        }
        Ok(())
    }

    pub async fn list_children(
        &self,
        parent_id: Option<NodeId>,
        offset: usize,
        limit: usize,
    ) -> TreeResult<Page<Node>> {
        if let Some(id) = parent_id {
            self.folder(id).await?;
        }
        Ok(self.index.list_page(parent_id, offset, limit).await?)
    }

    pub async fn create_folder(&self, name: &str, parent_id: Option<NodeId>) -> TreeResult<Node> {
        self.resolver.ensure_folder(name, parent_id).await
    }

    /// Create (or reuse) every folder along `path` and return the deepest one.
    pub async fn create_folder_path(
        &self,
        path: &str,
        parent_id: Option<NodeId>,
    ) -> TreeResult<Node> {
        let id = self
            .resolver
            .resolve_or_create_folder_chain(path, parent_id)
            .await?;
        self.get_node(id).await
    }

    /// Change the display name. The key, and with it the object's location, stays put.
    pub async fn rename(&self, id: NodeId, new_name: &str) -> TreeResult<Node> {
        let name = validate_folder_name(new_name)?;
        let mut node = self.get_node(id).await?;
        if node.name == name {
            return Ok(node);
        }
        self.ensure_name_free(node.parent_id, &name, id).await?;
        let old = std::mem::replace(&mut node.name, name);
        let node = self.index.update(node).await?;
        tracing::info!(node_id = %id, from = %old, to = %node.name, "node renamed");
        Ok(node)
    }

    /// Reparent `id` under `new_parent` (`None` for the root). Keys are not rewritten.
    pub async fn move_node(&self, id: NodeId, new_parent: Option<NodeId>) -> TreeResult<Node> {
        let mut node = self.get_node(id).await?;
        if let Some(parent_id) = new_parent {
            self.folder(parent_id).await?;
            if self.resolver.is_within(parent_id, id).await? {
                return Err(TreeError::InvalidArgument(format!(
                    "cannot move {id} into its own subtree"
                )));
            }
        }
        if node.parent_id == new_parent {
            return Ok(node);
        }
        self.ensure_name_free(new_parent, &node.name, id).await?;
        node.parent_id = new_parent;
        let node = self.index.update(node).await?;
        tracing::info!(node_id = %id, parent_id = ?new_parent, "node moved");
        Ok(node)
    }

    pub async fn ancestors(&self, id: NodeId) -> TreeResult<Vec<Node>> {
        self.resolver.ancestors(id).await
    }

    pub async fn resolve_path(&self, id: NodeId) -> TreeResult<String> {
        self.resolver.resolve_path_string(id).await
    }

    pub async fn upload(&self, req: UploadRequest) -> TreeResult<UploadOutcome> {
        self.uploads.upload(req).await
    }

    pub async fn upload_base64(&self, req: Base64UploadRequest) -> TreeResult<UploadOutcome> {
        let (declared, payload) = split_data_url(&req.data)?;
        let body = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| TreeError::InvalidArgument(format!("malformed base64 payload: {e}")))?;
        let content_type = declared
            .or(req.content_type)
            .unwrap_or_else(|| content_type_for(&req.name));

        self.uploads
            .upload(UploadRequest {
                size: Some(body.len() as u64),
                body: Bytes::from(body),
                name: req.name,
                content_type,
                parent_id: req.parent_id,
                path: req.path,
                overwrite: req.overwrite,
                use_original_name: req.use_original_name,
            })
            .await
    }

    /// Object bytes and content type of a file node.
    pub async fn download(&self, id: NodeId) -> TreeResult<(Bytes, String)> {
        let node = self.get_node(id).await?;
        let Some(content_type) = node.content_type() else {
            return Err(TreeError::InvalidArgument(format!("{id} is a folder")));
        };
        let content_type = content_type.to_string();
        let (data, _) = self.gateway.get(&node.bucket, &node.key).await?;
        Ok((data, content_type))
    }

    pub async fn delete(&self, id: NodeId) -> TreeResult<DeletionReport> {
        self.deletion.delete_node(id).await
    }

    pub async fn sync(&self) -> TreeResult<SyncReport> {
        self.reconciliation.sync().await
    }

    pub async fn create_multipart_upload(
        &self,
        req: MultipartRequest,
    ) -> TreeResult<MultipartSession> {
        self.multipart.create_multipart_upload(req).await
    }

    pub async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        progress_hint: u8,
        body: Bytes,
    ) -> TreeResult<CompletedPart> {
        self.multipart
            .upload_part(upload_id, part_number, progress_hint, body)
            .await
    }

    pub async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> TreeResult<Node> {
        self.multipart.complete_multipart_upload(upload_id, parts).await
    }

    pub async fn abort_multipart_upload(&self, upload_id: &str) -> TreeResult<()> {
        self.multipart.abort_multipart_upload(upload_id).await
    }

    /// Time-limited GET URL for a file's current key.
    pub async fn signed_download_url(&self, id: NodeId) -> TreeResult<String> {
        let node = self.get_node(id).await?;
        if node.is_folder() {
            return Err(TreeError::InvalidArgument(format!("{id} is a folder")));
        }
        Ok(self
            .gateway
            .signed_url(
                &node.bucket,
                &node.key,
                SignedOperation::Get,
                self.store.signed_url_ttl_secs,
            )
            .await?)
    }

    /// PUT URL for a direct client upload. No node is recorded; a later `sync` or
    /// upload picks the object up.
    pub async fn signed_upload_url(
        &self,
        name: &str,
        parent_id: Option<NodeId>,
    ) -> TreeResult<SignedUpload> {
        let use_original_name = self.uploads.policy().use_original_name;
        let (name, key) = match self
            .uploads
            .place(name, parent_id, false, use_original_name)
            .await?
        {
            Placement::Create { name, key, .. } => (name, key),
            Placement::Overwrite(node) => (node.name, node.key),
        };
        let url = self
            .gateway
            .signed_url(
                &self.store.bucket,
                &key,
                SignedOperation::Put,
                self.store.signed_url_ttl_secs,
            )
            .await?;
        Ok(SignedUpload { url, name, key })
    }
}

/// Split `data:<mime>;base64,<payload>` into its media type and payload.
/// Plain base64 passes through with no media type.
fn split_data_url(data: &str) -> TreeResult<(Option<String>, &str)> {
    let Some(rest) = data.strip_prefix("data:") else {
        return Ok((None, data));
    };
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| TreeError::InvalidArgument("data URL has no payload".into()))?;
    let media_type = header.strip_suffix(";base64").ok_or_else(|| {
        TreeError::InvalidArgument(format!("data URL is not base64 encoded: {header}"))
    })?;
    let media_type = (!media_type.is_empty()).then(|| media_type.to_string());
    Ok((media_type, payload))
}
