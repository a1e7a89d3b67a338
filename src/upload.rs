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

//! Single-shot uploads and the naming/collision policy they share with multipart.

use crate::config::{StoreConfig, UploadConfig};
use crate::error::{TreeError, TreeResult};
use crate::gateway::ObjectStoreGateway;
use crate::index::{HierarchyIndex, Node, NodeId, NodeKind};
use crate::naming::{disambiguate, join_key, unique_token, validate_file_name};
use crate::resolver::PathResolver;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Attempts at finding a free name/key before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub body: Bytes,
    pub name: String,
    pub content_type: String,
    /// Recorded size; the body length when absent.
    pub size: Option<u64>,
    pub parent_id: Option<NodeId>,
    /// Folder path (created on demand) below `parent_id`. Mutually exclusive with it.
    pub path: Option<String>,
    pub overwrite: Option<bool>,
    pub use_original_name: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub id: NodeId,
    pub name: String,
    pub key: String,
    pub url: Option<String>,
    pub overwritten: bool,
}

/// Where an incoming file lands.
#[derive(Debug, Clone)]
pub enum Placement {
    /// Reuse this file's key and row.
    Overwrite(Node),
    Create {
        parent_id: Option<NodeId>,
        name: String,
        key: String,
    },
}

impl Placement {
    pub fn key(&self) -> &str {
        match self {
            Placement::Overwrite(node) => &node.key,
            Placement::Create { key, .. } => key,
        }
    }
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    gateway: Arc<dyn ObjectStoreGateway>,
    index: Arc<dyn HierarchyIndex>,
    resolver: PathResolver,
    store: StoreConfig,
    policy: UploadConfig,
}

impl UploadOrchestrator {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        index: Arc<dyn HierarchyIndex>,
        resolver: PathResolver,
        store: StoreConfig,
        policy: UploadConfig,
    ) -> Self {
        Self {
            gateway,
            index,
            resolver,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &UploadConfig {
        &self.policy
    }

    pub fn bucket(&self) -> &str {
        self.resolver.bucket()
    }

    /// Turn `parent_id`/`path` into the effective parent folder.
    pub async fn target_parent(
        &self,
        parent_id: Option<NodeId>,
        path: Option<&str>,
    ) -> TreeResult<Option<NodeId>> {
        match (parent_id, path) {
            (Some(_), Some(_)) => Err(TreeError::InvalidArgument(
                "give either parent_id or path, not both".into(),
            )),
            (_, Some(path)) => Ok(Some(
                self.resolver.resolve_or_create_folder_chain(path, None).await?,
            )),
            (parent_id, None) => Ok(parent_id),
        }
    }

    /// Decide name and key for `name` under `parent_id`.
    ///
    /// Nothing is written; the store and index are only read.
    pub async fn place(
        &self,
        name: &str,
        parent_id: Option<NodeId>,
        overwrite: bool,
        use_original_name: bool,
    ) -> TreeResult<Placement> {
        let name = validate_file_name(name)?;
        let (parent_path, _) = self.resolver.locate_parent(parent_id).await?;
        let bucket = self.resolver.bucket();

        let mut existing = self.index.find_by_name(parent_id, &name).await?;
        if overwrite {
            if let Some(pos) = existing.iter().position(|n| !n.is_folder()) {
                return Ok(Placement::Overwrite(existing.swap_remove(pos)));
            }
        }

        let mut candidate = name.clone();
        let mut collided = !existing.is_empty();
        for _ in 0..MAX_NAME_ATTEMPTS {
            if collided {
                candidate = disambiguate(&name);
                if !self.index.find_by_name(parent_id, &candidate).await?.is_empty() {
                    continue;
                }
            }
            let segment = if use_original_name {
                candidate.clone()
            } else {
                unique_token(&candidate)
            };
            let key = join_key(parent_path.as_deref(), &segment);
            if self.index.find_by_key(bucket, &key).await?.is_none() {
                return Ok(Placement::Create {
                    parent_id,
                    name: candidate,
                    key,
                });
            }
            // A renamed node still holds the key; pick another name.
            collided = true;
        }
        Err(TreeError::Conflict(format!(
            "no free name for {name} after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    pub async fn upload(&self, req: UploadRequest) -> TreeResult<UploadOutcome> {
        if req.content_type.trim().is_empty() {
            return Err(TreeError::InvalidArgument(
                "content type must be non-empty".into(),
            ));
        }
        let overwrite = req.overwrite.unwrap_or(self.policy.overwrite);
        let use_original_name = req
            .use_original_name
            .unwrap_or(self.policy.use_original_name);
        let size = req.size.unwrap_or(req.body.len() as u64);

        let parent_id = self.target_parent(req.parent_id, req.path.as_deref()).await?;
        let placement = self
            .place(&req.name, parent_id, overwrite, use_original_name)
            .await?;

        let bucket = self.resolver.bucket().to_string();
        let key = placement.key().to_string();
        let response = self
            .gateway
            .put(&bucket, &key, req.body, &req.content_type)
            .await?;
        let captured = serde_json::to_value(&response).ok();
        let kind = NodeKind::File {
            content_type: req.content_type.clone(),
        };

        let (node, overwritten) = match placement {
            Placement::Overwrite(mut node) => {
                node.kind = kind;
                node.size = Some(size);
                node.store_response = captured;
                (self.index.update(node).await, true)
            }
            Placement::Create {
                parent_id,
                name,
                key,
            } => {
                let mut node = Node::file(name, req.content_type, size, bucket.clone(), key, parent_id);
                node.store_response = captured;
                (self.index.insert(node).await, false)
            }
        };
        let node = node.map_err(|e| {
            tracing::error!(
                bucket = %bucket,
                key = %key,
                error = %e,
                "object stored but index write failed; store and index diverged"
            );
            TreeError::from(e)
        })?;

        tracing::info!(
            node_id = %node.id,
            key = %node.key,
            size,
            overwritten,
            "upload stored"
        );
        Ok(UploadOutcome {
            id: node.id,
            url: self.store.public_url(&node.key),
            name: node.name,
            key: node.key,
            overwritten,
        })
    }
}
