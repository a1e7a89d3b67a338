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
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Keys per `delete_batch` call; the S3 DeleteObjects limit.
const DELETE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub objects_deleted: usize,
    pub nodes_deleted: usize,
}

/// Cascades a delete over a node's index subtree and the objects it owns.
///
/// Keys survive rename and move, so a subtree's objects are not necessarily
/// under its folder's prefix, and a prefix may hold objects of nodes that were
/// moved out. The doomed set is therefore every subtree node's own key plus
/// unindexed leftovers under each subtree folder's prefix. Keys indexed by a
/// node outside the subtree are never touched.
///
/// The store goes first. If the index side fails halfway, surviving rows point
/// at objects that no longer exist; nothing repairs that here.
#[derive(Clone)]
pub struct DeletionCoordinator {
    gateway: Arc<dyn ObjectStoreGateway>,
    index: Arc<dyn HierarchyIndex>,
}

impl DeletionCoordinator {
    pub fn new(gateway: Arc<dyn ObjectStoreGateway>, index: Arc<dyn HierarchyIndex>) -> Self {
        Self { gateway, index }
    }

    pub async fn delete_node(&self, node_id: NodeId) -> TreeResult<DeletionReport> {
        let root = self
            .index
            .get(node_id)
            .await?
            .ok_or_else(|| TreeError::NotFound(format!("node {node_id}")))?;

        let subtree = self.collect_subtree(root).await?;
        let doomed = self.doomed_keys(&subtree).await?;
        let objects_deleted = self.delete_objects(doomed).await?;

        let nodes_deleted = self.delete_rows(&subtree).await.map_err(|e| {
            tracing::warn!(
                node_id = %node_id,
                error = %e,
                "store objects removed but index subtree only partially deleted"
            );
            e
        })?;

        tracing::info!(
            node_id = %node_id,
            objects_deleted,
            nodes_deleted,
            "node deleted"
        );
        Ok(DeletionReport {
            objects_deleted,
            nodes_deleted,
        })
    }

    /// Depth-first, parents before children, each listing in listing order.
    async fn collect_subtree(&self, root: Node) -> TreeResult<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                continue;
            }
            if node.is_folder() {
                let children = self.index.children(Some(node.id)).await?;
                // Reversed so the first child in listing order is visited first.
                stack.extend(children.into_iter().rev());
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    async fn doomed_keys(&self, subtree: &[Node]) -> TreeResult<BTreeSet<(String, String)>> {
        let owned: BTreeSet<(String, String)> = subtree
            .iter()
            .map(|n| (n.bucket.clone(), n.key.clone()))
            .collect();
        let mut doomed = owned.clone();

        for folder in subtree.iter().filter(|n| n.is_folder()) {
            let mut token: Option<String> = None;
            loop {
                let page = self
                    .gateway
                    .list_paginated(&folder.bucket, Some(folder.key.as_str()), token.as_deref())
                    .await?;
                for entry in page.entries {
                    let addr = (folder.bucket.clone(), entry.key);
                    if owned.contains(&addr) || doomed.contains(&addr) {
                        continue;
                    }
                    match self.index.find_by_key(&addr.0, &addr.1).await? {
                        None => {
                            doomed.insert(addr);
                        }
                        Some(holder) => {
                            tracing::debug!(
                                key = %addr.1,
                                holder = %holder.id,
                                "key under prefix belongs to a node outside the subtree; keeping it"
                            );
                        }
                    }
                }
                token = page.continuation_token;
                if token.is_none() {
                    break;
                }
            }
        }
        Ok(doomed)
    }

    async fn delete_objects(&self, doomed: BTreeSet<(String, String)>) -> TreeResult<usize> {
        let mut removed = 0;
        let mut batch: Vec<String> = Vec::new();
        let mut batch_bucket: Option<String> = None;
        // Sorted by bucket first, so each bucket's keys are contiguous.
        for (bucket, key) in doomed {
            let switch = batch_bucket.as_deref() != Some(bucket.as_str());
            if switch || batch.len() == DELETE_BATCH_SIZE {
                removed += self.flush(batch_bucket.as_deref(), &mut batch).await?;
            }
            if switch {
                batch_bucket = Some(bucket);
            }
            batch.push(key);
        }
        removed += self.flush(batch_bucket.as_deref(), &mut batch).await?;
        Ok(removed)
    }

    async fn flush(&self, bucket: Option<&str>, batch: &mut Vec<String>) -> TreeResult<usize> {
        let Some(bucket) = bucket else {
            return Ok(0);
        };
        if batch.is_empty() {
            return Ok(0);
        }
        let removed = self.gateway.delete_batch(bucket, batch).await?;
        tracing::debug!(bucket, batch = batch.len(), removed, "deleted object batch");
        batch.clear();
        Ok(removed)
    }

    async fn delete_rows(&self, subtree: &[Node]) -> TreeResult<usize> {
        let mut deleted = 0;
        for node in subtree {
            if self.index.delete(node.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
