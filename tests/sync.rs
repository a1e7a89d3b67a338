use bytes::Bytes;
use s3tree::config::Config;
use s3tree::gateway::in_memory::InMemoryGateway;
use s3tree::gateway::ObjectStoreGateway;
use s3tree::index::in_memory::InMemoryIndex;
use s3tree::index::HierarchyIndex;
use s3tree::{FileTree, TreeError};
use std::sync::Arc;

async fn setup(page_size: usize) -> (FileTree, Arc<InMemoryGateway>, Arc<InMemoryIndex>) {
    let config = Config::default();
    let gateway = Arc::new(InMemoryGateway::new().with_page_size(page_size));
    gateway.create_bucket(&config.store.bucket).await.unwrap();
    let index = Arc::new(InMemoryIndex::new());
    let tree = FileTree::new(gateway.clone(), index.clone(), &config);
    (tree, gateway, index)
}

async fn seed(gateway: &InMemoryGateway, keys: &[&str]) {
    for key in keys {
        gateway
            .put("files", key, Bytes::from_static(b"data"), "application/octet-stream")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn folder_and_file_are_linked() {
    let (tree, gateway, index) = setup(1000).await;
    seed(&gateway, &["docs/", "docs/report.pdf"]).await;

    let report = tree.sync().await.unwrap();
    assert_eq!(report.folders, 1);
    assert_eq!(report.files, 1);
    assert_eq!(report.linked, 1);
    assert_eq!(index.count().await.unwrap(), 2);

    let roots = tree.list_children(None, 0, 10).await.unwrap();
    assert_eq!(roots.total, 1);
    let docs = &roots.items[0];
    assert!(docs.is_folder());
    assert_eq!(docs.name, "docs");

    let children = tree.list_children(Some(docs.id), 0, 10).await.unwrap();
    assert_eq!(children.items.len(), 1);
    let file = &children.items[0];
    assert_eq!(file.name, "report.pdf");
    assert_eq!(file.content_type(), Some("application/pdf"));
    assert_eq!(file.size, Some(4));
}

#[tokio::test]
async fn sync_walks_every_listing_page() {
    let (tree, gateway, index) = setup(2).await;
    seed(
        &gateway,
        &["a/", "a/b/", "a/b/c.txt", "a/d.txt", "e.txt"],
    )
    .await;

    let report = tree.sync().await.unwrap();
    assert_eq!(report.folders + report.files, 5);
    assert_eq!(report.linked, 3);
    assert_eq!(index.count().await.unwrap(), 5);

    let c = index.find_by_key("files", "a/b/c.txt").await.unwrap().unwrap();
    assert_eq!(tree.resolve_path(c.id).await.unwrap(), "a/b/c.txt");
}

#[tokio::test]
async fn missing_folder_markers_leave_roots() {
    let (tree, gateway, _) = setup(1000).await;
    seed(&gateway, &["orphans/x.txt"]).await;

    let report = tree.sync().await.unwrap();
    assert_eq!(report.files, 1);
    assert_eq!(report.linked, 0);
    let roots = tree.list_children(None, 0, 10).await.unwrap();
    assert_eq!(roots.items[0].name, "x.txt");
}

#[tokio::test]
async fn sync_requires_an_empty_index() {
    let (tree, gateway, index) = setup(1000).await;
    seed(&gateway, &["docs/"]).await;
    tree.create_folder("existing", None).await.unwrap();

    let err = tree.sync().await.unwrap_err();
    assert!(matches!(err, TreeError::Conflict(_)));
    assert_eq!(index.count().await.unwrap(), 1);
}
