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

//! Rebuilds the hierarchy index from a raw bucket listing.
//!
//! Only keys that exist in the store become nodes. A folder that was never
//! written as an explicit `name/` marker cannot be recovered, so anything below
//! it stays a root.

use crate::error::{TreeError, TreeResult};
use crate::gateway::{ListEntry, ObjectStoreGateway};
use crate::index::{HierarchyIndex, Node};
use crate::naming::{content_type_for, last_segment, parent_key};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub folders: usize,
    pub files: usize,
    /// Rows that found their parent in the second pass.
    pub linked: usize,
    /// Keys with no usable name (e.g. a bare `/`).
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    gateway: Arc<dyn ObjectStoreGateway>,
    index: Arc<dyn HierarchyIndex>,
    bucket: String,
}

impl ReconciliationEngine {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        index: Arc<dyn HierarchyIndex>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            index,
            bucket: bucket.into(),
        }
    }

    /// Import every object of the bucket into an empty index.
    pub async fn sync(&self) -> TreeResult<SyncReport> {
        let existing = self.index.count().await?;
        if existing > 0 {
            return Err(TreeError::Conflict(format!(
                "index already holds {existing} nodes; sync needs an empty index"
            )));
        }

        let entries = self.list_all().await?;
        let mut report = SyncReport::default();
        let mut nodes = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.node_for(&entry) {
                Some(node) => {
                    if node.is_folder() {
                        report.folders += 1;
                    } else {
                        report.files += 1;
                    }
                    nodes.push(node);
                }
                None => {
                    tracing::warn!(key = %entry.key, "skipping key without a usable name");
                    report.skipped += 1;
                }
            }
        }

        let by_key: HashMap<String, _> = nodes.iter().map(|n| (n.key.clone(), n.id)).collect();
        let inserted = self.index.insert_many(nodes.clone()).await?;
        tracing::debug!(inserted, "bulk insert finished, linking parents");

        for mut node in nodes {
            let Some(parent) = parent_key(&node.key) else {
                continue;
            };
            match by_key.get(&parent) {
                Some(parent_id) => {
                    node.parent_id = Some(*parent_id);
                    self.index.update(node).await?;
                    report.linked += 1;
                }
                None => {
                    tracing::debug!(key = %node.key, parent_key = %parent, "parent folder was never materialized; leaving as root");
                }
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            folders = report.folders,
            files = report.files,
            linked = report.linked,
            skipped = report.skipped,
            "sync finished"
        );
        Ok(report)
    }

    async fn list_all(&self) -> TreeResult<Vec<ListEntry>> {
        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .gateway
                .list_paginated(&self.bucket, None, token.as_deref())
                .await?;
            entries.extend(page.entries);
            token = page.continuation_token;
            if token.is_none() {
                break;
            }
        }
        Ok(entries)
    }

    fn node_for(&self, entry: &ListEntry) -> Option<Node> {
        let name = last_segment(&entry.key)?;
        if entry.key.ends_with('/') {
            Some(Node::folder(name, self.bucket.clone(), entry.key.clone(), None))
        } else {
            Some(Node::file(
                name,
                content_type_for(name),
                entry.size,
                self.bucket.clone(),
                entry.key.clone(),
                None,
            ))
        }
    }
}
