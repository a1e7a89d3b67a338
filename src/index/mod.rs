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

//! Hierarchy index: node records forming a parent-pointer tree over store keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

pub mod in_memory;

pub type NodeId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Folder,
    File { content_type: String },
}

/// Lifecycle of a multipart placeholder, set only by explicit transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    InProgress,
    Completed,
    Aborted,
}

/// One file or folder.
///
/// `key` is fixed when the node is created. Rename and move only touch `name`
/// and `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Always `None` for folders.
    pub size: Option<u64>,
    pub bucket: String,
    pub key: String,
    pub parent_id: Option<NodeId>,
    pub upload_id: Option<String>,
    pub upload_progress: Option<u8>,
    #[serde(default)]
    pub upload_status: Option<UploadStatus>,
    /// Last store write response, kept for diagnostics only.
    pub store_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn folder(
        name: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        parent_id: Option<NodeId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: NodeKind::Folder,
            size: None,
            bucket: bucket.into(),
            key: key.into(),
            parent_id,
            upload_id: None,
            upload_progress: None,
            upload_status: None,
            store_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file(
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        bucket: impl Into<String>,
        key: impl Into<String>,
        parent_id: Option<NodeId>,
    ) -> Self {
        let mut node = Self::folder(name, bucket, key, parent_id);
        node.kind = NodeKind::File {
            content_type: content_type.into(),
        };
        node.size = Some(size);
        node
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn content_type(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { content_type } => Some(content_type),
            NodeKind::Folder => None,
        }
    }

    /// Listing order: folders first, then by name, then by id.
    pub fn listing_order(a: &Node, b: &Node) -> Ordering {
        b.is_folder()
            .cmp(&a.is_folder())
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// A slice of an ordered listing plus the total it was cut from.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("key already indexed: {bucket}/{key}")]
    DuplicateKey { bucket: String, key: String },
    #[error("invalid node: {0}")]
    InvalidNode(String),
    #[error("internal index error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait HierarchyIndex: Send + Sync + 'static {
    /// Insert a node; `(bucket, key)` must not be indexed yet.
    async fn insert(&self, node: Node) -> Result<Node, IndexError>;

    /// Insert all nodes or none of them.
    async fn insert_many(&self, nodes: Vec<Node>) -> Result<usize, IndexError>;

    async fn get(&self, id: NodeId) -> Result<Option<Node>, IndexError>;

    /// Replace the stored row with `node`, stamping `updated_at`.
    async fn update(&self, node: Node) -> Result<Node, IndexError>;

    /// Remove one row. Children are left pointing at the removed id.
    async fn delete(&self, id: NodeId) -> Result<bool, IndexError>;

    /// All children of `parent_id` (roots for `None`) in listing order.
    async fn children(&self, parent_id: Option<NodeId>) -> Result<Vec<Node>, IndexError>;

    async fn find_by_name(
        &self,
        parent_id: Option<NodeId>,
        name: &str,
    ) -> Result<Vec<Node>, IndexError>;

    async fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<Node>, IndexError>;

    async fn find_by_key(&self, bucket: &str, key: &str) -> Result<Option<Node>, IndexError>;

    async fn list_page(
        &self,
        parent_id: Option<NodeId>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Node>, IndexError>;

    async fn count(&self) -> Result<usize, IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folders_sort_before_files() {
        let file = Node::file("a.txt", "text/plain", 1, "b", "a.txt", None);
        let folder = Node::folder("z", "b", "z/", None);
        let mut nodes = [file.clone(), folder.clone()];
        nodes.sort_by(Node::listing_order);
        assert_eq!(nodes[0].id, folder.id);
        assert_eq!(nodes[1].id, file.id);
    }

    #[test]
    fn kind_serializes_as_tagged_variant() {
        let file = Node::file("a.pdf", "application/pdf", 3, "b", "a.pdf", None);
        let json = serde_json::to_value(&file.kind).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["content_type"], "application/pdf");

        let folder = serde_json::to_value(NodeKind::Folder).unwrap();
        assert_eq!(folder["type"], "folder");
        assert!(Node::folder("d", "b", "d/", None).size.is_none());
    }
}
