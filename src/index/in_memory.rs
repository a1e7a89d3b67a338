use crate::index::{HierarchyIndex, IndexError, Node, NodeId, Page};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    nodes: BTreeMap<NodeId, Node>,
    /// (bucket, key) => id; enforces key uniqueness.
    keys: HashMap<(String, String), NodeId>,
}

/// In-memory hierarchy index.
///
/// Both tables sit behind one lock so key uniqueness holds across insert and update.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_shape(node: &Node) -> Result<(), IndexError> {
    if node.is_folder() && node.size.is_some() {
        return Err(IndexError::InvalidNode(format!(
            "folder {} cannot carry a size",
            node.id
        )));
    }
    Ok(())
}

/// Walk the proposed parent chain of `node`. The direct parent must be a folder,
/// every ancestor must exist, and the chain must never lead back to `node`.
fn check_ancestry<'a>(
    node: &Node,
    lookup: impl Fn(&NodeId) -> Option<&'a Node>,
) -> Result<(), IndexError> {
    let mut seen = HashSet::new();
    let mut cursor = node.parent_id;
    while let Some(id) = cursor {
        if id == node.id || !seen.insert(id) {
            return Err(IndexError::InvalidNode(format!(
                "placing {} under {} would create a cycle",
                node.id,
                node.parent_id.unwrap_or(id)
            )));
        }
        let ancestor = lookup(&id).ok_or_else(|| {
            IndexError::InvalidNode(format!("ancestor {id} of {} does not exist", node.id))
        })?;
        if Some(id) == node.parent_id && !ancestor.is_folder() {
            return Err(IndexError::InvalidNode(format!("parent {id} is not a folder")));
        }
        cursor = ancestor.parent_id;
    }
    Ok(())
}

fn duplicate(node: &Node) -> IndexError {
    IndexError::DuplicateKey {
        bucket: node.bucket.clone(),
        key: node.key.clone(),
    }
}

#[async_trait]
impl HierarchyIndex for InMemoryIndex {
    async fn insert(&self, node: Node) -> Result<Node, IndexError> {
        check_shape(&node)?;
        let mut t = self.tables.write().await;
        let addr = (node.bucket.clone(), node.key.clone());
        if t.keys.contains_key(&addr) || t.nodes.contains_key(&node.id) {
            return Err(duplicate(&node));
        }
        check_ancestry(&node, |id| t.nodes.get(id))?;
        t.keys.insert(addr, node.id);
        t.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn insert_many(&self, nodes: Vec<Node>) -> Result<usize, IndexError> {
        let mut t = self.tables.write().await;
        let mut batch_keys = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            check_shape(node)?;
            let addr = (node.bucket.clone(), node.key.clone());
            if t.keys.contains_key(&addr) || batch_keys.insert(addr, node.id).is_some() {
                return Err(duplicate(node));
            }
        }
        {
            let batch: HashMap<NodeId, &Node> = nodes.iter().map(|n| (n.id, n)).collect();
            for node in &nodes {
                check_ancestry(node, |id| batch.get(id).copied().or_else(|| t.nodes.get(id)))?;
            }
        }
        let count = nodes.len();
        t.keys.extend(batch_keys);
        for node in nodes {
            t.nodes.insert(node.id, node);
        }
        Ok(count)
    }

    async fn get(&self, id: NodeId) -> Result<Option<Node>, IndexError> {
        Ok(self.tables.read().await.nodes.get(&id).cloned())
    }

    async fn update(&self, mut node: Node) -> Result<Node, IndexError> {
        check_shape(&node)?;
        let mut t = self.tables.write().await;
        let old = t
            .nodes
            .get(&node.id)
            .cloned()
            .ok_or(IndexError::NodeNotFound(node.id))?;

        // Rows orphaned by a subtree delete can still be renamed; only a new
        // parent has its chain checked.
        if old.parent_id != node.parent_id {
            check_ancestry(&node, |id| t.nodes.get(id))?;
        }

        let old_addr = (old.bucket, old.key);
        let new_addr = (node.bucket.clone(), node.key.clone());
        if old_addr != new_addr {
            if t.keys.contains_key(&new_addr) {
                return Err(duplicate(&node));
            }
            t.keys.remove(&old_addr);
            t.keys.insert(new_addr, node.id);
        }
        node.updated_at = Utc::now();
        t.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn delete(&self, id: NodeId) -> Result<bool, IndexError> {
        let mut t = self.tables.write().await;
        match t.nodes.remove(&id) {
            Some(node) => {
                t.keys.remove(&(node.bucket, node.key));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn children(&self, parent_id: Option<NodeId>) -> Result<Vec<Node>, IndexError> {
        let t = self.tables.read().await;
        let mut out: Vec<Node> = t
            .nodes
            .values()
            .filter(|n| n.parent_id == parent_id)
            .cloned()
            .collect();
        out.sort_by(Node::listing_order);
        Ok(out)
    }

    async fn find_by_name(
        &self,
        parent_id: Option<NodeId>,
        name: &str,
    ) -> Result<Vec<Node>, IndexError> {
        let t = self.tables.read().await;
        let mut out: Vec<Node> = t
            .nodes
            .values()
            .filter(|n| n.parent_id == parent_id && n.name == name)
            .cloned()
            .collect();
        out.sort_by(Node::listing_order);
        Ok(out)
    }

    async fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<Node>, IndexError> {
        let t = self.tables.read().await;
        Ok(t.nodes
            .values()
            .find(|n| n.upload_id.as_deref() == Some(upload_id))
            .cloned())
    }

    async fn find_by_key(&self, bucket: &str, key: &str) -> Result<Option<Node>, IndexError> {
        let t = self.tables.read().await;
        Ok(t.keys
            .get(&(bucket.to_string(), key.to_string()))
            .and_then(|id| t.nodes.get(id))
            .cloned())
    }

    async fn list_page(
        &self,
        parent_id: Option<NodeId>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Node>, IndexError> {
        let all = self.children(parent_id).await?;
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Ok(Page {
            items,
            offset,
            limit,
            total,
        })
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.tables.read().await.nodes.len())
    }
}
