//! Failures injected between the store and the index.

use async_trait::async_trait;
use bytes::Bytes;
use s3tree::config::Config;
use s3tree::gateway::in_memory::InMemoryGateway;
use s3tree::gateway::{
    CompletedPart, GatewayError, ListPage, ObjectStoreGateway, SignedOperation, StoreResponse,
};
use s3tree::index::in_memory::InMemoryIndex;
use s3tree::index::{HierarchyIndex, IndexError, Node, NodeId, Page};
use s3tree::upload::UploadRequest;
use s3tree::{FileTree, TreeError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lets `puts_allowed` puts through, then fails every put.
struct FlakyGateway {
    inner: InMemoryGateway,
    puts_allowed: AtomicUsize,
}

impl FlakyGateway {
    fn new(inner: InMemoryGateway) -> Self {
        Self {
            inner,
            puts_allowed: AtomicUsize::new(usize::MAX),
        }
    }

    fn allow_puts(&self, n: usize) {
        self.puts_allowed.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStoreGateway for FlakyGateway {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<StoreResponse, GatewayError> {
        let allowed = self
            .puts_allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if allowed.is_err() {
            return Err(GatewayError::Internal("injected put failure".into()));
        }
        self.inner.put(bucket, key, body, content_type).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<(Bytes, StoreResponse), GatewayError> {
        self.inner.get(bucket, key).await
    }

    async fn list_paginated(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, GatewayError> {
        self.inner
            .list_paginated(bucket, prefix, continuation_token)
            .await
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize, GatewayError> {
        self.inner.delete_batch(bucket, keys).await
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, GatewayError> {
        self.inner
            .create_multipart_upload(bucket, key, content_type)
            .await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, GatewayError> {
        self.inner
            .upload_part(bucket, key, upload_id, part_number, body)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<StoreResponse, GatewayError> {
        self.inner
            .complete_multipart_upload(bucket, key, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), GatewayError> {
        self.inner.abort_multipart_upload(bucket, key, upload_id).await
    }

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        operation: SignedOperation,
        ttl_secs: u64,
    ) -> Result<String, GatewayError> {
        self.inner.signed_url(bucket, key, operation, ttl_secs).await
    }
}

/// Index whose inserts or deletes can be switched off.
#[derive(Default)]
struct FlakyIndex {
    inner: InMemoryIndex,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
}

fn injected() -> IndexError {
    IndexError::Internal("injected index failure".into())
}

#[async_trait]
impl HierarchyIndex for FlakyIndex {
    async fn insert(&self, node: Node) -> Result<Node, IndexError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert(node).await
    }

    async fn insert_many(&self, nodes: Vec<Node>) -> Result<usize, IndexError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_many(nodes).await
    }

    async fn get(&self, id: NodeId) -> Result<Option<Node>, IndexError> {
        self.inner.get(id).await
    }

    async fn update(&self, node: Node) -> Result<Node, IndexError> {
        self.inner.update(node).await
    }

    async fn delete(&self, id: NodeId) -> Result<bool, IndexError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.delete(id).await
    }

    async fn children(&self, parent_id: Option<NodeId>) -> Result<Vec<Node>, IndexError> {
        self.inner.children(parent_id).await
    }

    async fn find_by_name(
        &self,
        parent_id: Option<NodeId>,
        name: &str,
    ) -> Result<Vec<Node>, IndexError> {
        self.inner.find_by_name(parent_id, name).await
    }

    async fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<Node>, IndexError> {
        self.inner.find_by_upload_id(upload_id).await
    }

    async fn find_by_key(&self, bucket: &str, key: &str) -> Result<Option<Node>, IndexError> {
        self.inner.find_by_key(bucket, key).await
    }

    async fn list_page(
        &self,
        parent_id: Option<NodeId>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Node>, IndexError> {
        self.inner.list_page(parent_id, offset, limit).await
    }

    async fn count(&self) -> Result<usize, IndexError> {
        self.inner.count().await
    }
}

async fn setup() -> (FileTree, Arc<FlakyGateway>, Arc<FlakyIndex>) {
    let config = Config::default();
    let inner = InMemoryGateway::new();
    inner.create_bucket(&config.store.bucket).await.unwrap();
    let gateway = Arc::new(FlakyGateway::new(inner));
    let index = Arc::new(FlakyIndex::default());
    let tree = FileTree::new(gateway.clone(), index.clone(), &config);
    (tree, gateway, index)
}

fn note() -> UploadRequest {
    UploadRequest {
        body: Bytes::from_static(b"hello"),
        name: "note.txt".to_string(),
        content_type: "text/plain".to_string(),
        ..Default::default()
    }
}

async fn stored_keys(gateway: &FlakyGateway) -> Vec<String> {
    gateway
        .list_paginated("files", None, None)
        .await
        .unwrap()
        .entries
        .into_iter()
        .map(|e| e.key)
        .collect()
}

#[tokio::test]
async fn store_failure_writes_no_index_row() {
    let (tree, gateway, index) = setup().await;
    gateway.allow_puts(0);

    let err = tree.upload(note()).await.unwrap_err();
    assert!(matches!(err, TreeError::StoreFailure(_)));
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn index_failure_after_put_leaves_the_object() {
    let (tree, gateway, index) = setup().await;
    index.fail_inserts.store(true, Ordering::SeqCst);

    let err = tree.upload(note()).await.unwrap_err();
    assert!(matches!(err, TreeError::Index(_)));
    assert_eq!(index.count().await.unwrap(), 0);
    assert_eq!(stored_keys(&gateway).await.len(), 1);
}

#[tokio::test]
async fn interrupted_chain_resumes_on_retry() {
    let (tree, gateway, index) = setup().await;
    gateway.allow_puts(1);

    let err = tree.create_folder_path("a/b", None).await.unwrap_err();
    assert!(matches!(err, TreeError::StoreFailure(_)));
    assert_eq!(index.count().await.unwrap(), 1);

    gateway.allow_puts(usize::MAX);
    let b = tree.create_folder_path("a/b", None).await.unwrap();
    assert_eq!(b.key, "a/b/");
    assert_eq!(index.count().await.unwrap(), 2);
    assert_eq!(stored_keys(&gateway).await, vec!["a/", "a/b/"]);
}

#[tokio::test]
async fn delete_removes_objects_before_rows() {
    let (tree, gateway, index) = setup().await;
    let docs = tree.create_folder_path("docs", None).await.unwrap();
    tree.upload(UploadRequest {
        parent_id: Some(docs.id),
        ..note()
    })
    .await
    .unwrap();
    index.fail_deletes.store(true, Ordering::SeqCst);

    let err = tree.delete(docs.id).await.unwrap_err();
    assert!(matches!(err, TreeError::Index(_)));
    assert!(stored_keys(&gateway).await.is_empty());
    assert_eq!(index.count().await.unwrap(), 2);
}

#[tokio::test]
async fn failed_bulk_insert_leaves_the_index_empty() {
    let (tree, gateway, index) = setup().await;
    gateway
        .put("files", "docs/", Bytes::new(), "application/x-directory")
        .await
        .unwrap();
    index.fail_inserts.store(true, Ordering::SeqCst);

    assert!(tree.sync().await.is_err());
    assert_eq!(index.count().await.unwrap(), 0);

    index.fail_inserts.store(false, Ordering::SeqCst);
    assert_eq!(tree.sync().await.unwrap().folders, 1);
}
