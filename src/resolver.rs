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

use crate::error::{TreeError, TreeResult};
use crate::gateway::ObjectStoreGateway;
use crate::index::{HierarchyIndex, Node, NodeId};
use crate::naming::{join_key, validate_folder_name, FOLDER_CONTENT_TYPE};
use bytes::Bytes;
use std::sync::Arc;

/// Turns parent-pointer chains into store keys and materializes folder chains.
///
/// Every ancestor costs one index round trip; nothing is cached between calls.
#[derive(Clone)]
pub struct PathResolver {
    gateway: Arc<dyn ObjectStoreGateway>,
    index: Arc<dyn HierarchyIndex>,
    bucket: String,
    max_depth: usize,
}

impl PathResolver {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        index: Arc<dyn HierarchyIndex>,
        bucket: impl Into<String>,
        max_depth: usize,
    ) -> Self {
        Self {
            gateway,
            index,
            bucket: bucket.into(),
            max_depth,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn get_node(&self, id: NodeId) -> TreeResult<Node> {
        self.index
            .get(id)
            .await?
            .ok_or_else(|| TreeError::NotFound(format!("node {id}")))
    }

    /// The chain from the root down to `node_id`, inclusive.
    pub async fn ancestors(&self, node_id: NodeId) -> TreeResult<Vec<Node>> {
        let mut chain = Vec::new();
        let mut cursor = Some(node_id);
        while let Some(id) = cursor {
            if chain.len() >= self.max_depth {
                return Err(TreeError::Corrupt(format!(
                    "ancestor chain of {node_id} exceeds {} levels",
                    self.max_depth
                )));
            }
            let node = self.get_node(id).await?;
            cursor = node.parent_id;
            chain.push(node);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Names from the root to `node_id`, joined with `/`.
    pub async fn resolve_path_string(&self, node_id: NodeId) -> TreeResult<String> {
        let chain = self.ancestors(node_id).await?;
        Ok(chain
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>()
            .join("/"))
    }

    /// Whether `candidate` is `ancestor` itself or lies somewhere below it.
    pub async fn is_within(&self, candidate: NodeId, ancestor: NodeId) -> TreeResult<bool> {
        let chain = self.ancestors(candidate).await?;
        Ok(chain.iter().any(|n| n.id == ancestor))
    }

    /// Walk `path` below `parent_id`, creating missing folders, and return the deepest id.
    ///
    /// Existing folders are reused, so repeating a call yields the same id.
    pub async fn resolve_or_create_folder_chain(
        &self,
        path: &str,
        parent_id: Option<NodeId>,
    ) -> TreeResult<NodeId> {
        let segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            return Err(TreeError::InvalidArgument(format!(
                "path has no segments: {path:?}"
            )));
        }
        // Nothing is created when any segment is invalid.
        for segment in &segments {
            validate_folder_name(segment)?;
        }
        let (mut current_path, depth) = self.locate_parent(parent_id).await?;
        if depth + segments.len() > self.max_depth {
            return Err(TreeError::InvalidArgument(format!(
                "folder chain {path:?} would exceed {} levels",
                self.max_depth
            )));
        }

        let mut current = parent_id;
        for segment in segments {
            let folder = self
                .ensure_folder_at(segment, current, current_path.as_deref())
                .await?;
            current_path = Some(folder.key);
            current = Some(folder.id);
        }
        // segments is non-empty, so at least one folder was visited.
        current.ok_or_else(|| TreeError::InvalidArgument("empty folder chain".into()))
    }

    /// Single-level check-then-create below `parent_id`.
    pub async fn ensure_folder(&self, name: &str, parent_id: Option<NodeId>) -> TreeResult<Node> {
        let (parent_path, depth) = self.locate_parent(parent_id).await?;
        if depth >= self.max_depth {
            return Err(TreeError::InvalidArgument(format!(
                "folder would exceed {} levels",
                self.max_depth
            )));
        }
        self.ensure_folder_at(name, parent_id, parent_path.as_deref())
            .await
    }

    /// Key prefix and depth of a prospective parent folder; the bucket root is `(None, 0)`.
    ///
    /// Children live under the parent's stored key, which a rename leaves alone, so
    /// a folder's key stays a prefix of everything created inside it.
    pub async fn locate_parent(
        &self,
        parent_id: Option<NodeId>,
    ) -> TreeResult<(Option<String>, usize)> {
        let Some(id) = parent_id else {
            return Ok((None, 0));
        };
        let mut chain = self.ancestors(id).await?;
        let depth = chain.len();
        match chain.pop() {
            Some(parent) if parent.is_folder() => Ok((Some(parent.key), depth)),
            _ => Err(TreeError::InvalidArgument(format!(
                "parent {id} is not a folder"
            ))),
        }
    }

    async fn ensure_folder_at(
        &self,
        name: &str,
        parent_id: Option<NodeId>,
        parent_path: Option<&str>,
    ) -> TreeResult<Node> {
        let name = validate_folder_name(name)?;
        let existing = self.index.find_by_name(parent_id, &name).await?;
        if let Some(folder) = existing.into_iter().find(Node::is_folder) {
            tracing::debug!(folder_id = %folder.id, name = %folder.name, "reusing existing folder");
            return Ok(folder);
        }

        let key = format!("{}/", join_key(parent_path, &name));
        // A renamed node keeps its old key, so the logical path may already be taken.
        if let Some(holder) = self.index.find_by_key(&self.bucket, &key).await? {
            return Err(TreeError::Conflict(format!(
                "key {key} is still held by node {}",
                holder.id
            )));
        }
        let response = self
            .gateway
            .put(&self.bucket, &key, Bytes::new(), FOLDER_CONTENT_TYPE)
            .await?;

        let mut folder = Node::folder(name, self.bucket.clone(), key.clone(), parent_id);
        folder.store_response = serde_json::to_value(&response).ok();
        let folder = self.index.insert(folder).await.map_err(|e| {
            tracing::error!(
                bucket = %self.bucket,
                key = %key,
                error = %e,
                "folder marker written but index insert failed; store and index diverged"
            );
            TreeError::from(e)
        })?;
        tracing::info!(folder_id = %folder.id, key = %folder.key, "folder created");
        Ok(folder)
    }
}
