use bytes::Bytes;
use s3tree::config::Config;
use s3tree::gateway::in_memory::InMemoryGateway;
use s3tree::gateway::ObjectStoreGateway;
use s3tree::index::in_memory::InMemoryIndex;
use s3tree::index::HierarchyIndex;
use s3tree::multipart::{MultipartRequest, MultipartState};
use s3tree::{FileTree, TreeError};
use std::sync::Arc;

async fn setup(config: Config) -> (FileTree, Arc<InMemoryGateway>, Arc<InMemoryIndex>) {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.create_bucket(&config.store.bucket).await.unwrap();
    let index = Arc::new(InMemoryIndex::new());
    let tree = FileTree::new(gateway.clone(), index.clone(), &config);
    (tree, gateway, index)
}

fn video() -> MultipartRequest {
    MultipartRequest {
        name: "clip.mp4".to_string(),
        content_type: "video/mp4".to_string(),
        size: Some(11),
        path: Some("media".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn two_parts_complete_the_placeholder() {
    let (tree, gateway, _) = setup(Config::default()).await;

    let session = tree.create_multipart_upload(video()).await.unwrap();
    let node = tree.get_node(session.node_id).await.unwrap();
    assert_eq!(MultipartState::of(&node), Some(MultipartState::Initiated));
    assert!(session.key.starts_with("media/"));

    let p1 = tree
        .upload_part(&session.upload_id, 1, 50, Bytes::from_static(b"hello "))
        .await
        .unwrap();
    let node = tree.get_node(session.node_id).await.unwrap();
    assert_eq!(
        MultipartState::of(&node),
        Some(MultipartState::PartUploading { progress: 50 })
    );
    let p2 = tree
        .upload_part(&session.upload_id, 2, 90, Bytes::from_static(b"world"))
        .await
        .unwrap();

    // Order of the part list does not matter.
    let done = tree
        .complete_multipart_upload(&session.upload_id, vec![p2, p1])
        .await
        .unwrap();

    assert_eq!(done.id, session.node_id);
    assert_eq!(done.upload_progress, Some(100));
    assert_eq!(MultipartState::of(&done), Some(MultipartState::Completed));
    assert_eq!(done.upload_id.as_deref(), Some(session.upload_id.as_str()));
    assert_eq!(done.size, Some(11));
    let response = done.store_response.expect("completion response is kept");
    assert!(response["etag"].as_str().unwrap().ends_with("-2"));

    let (data, _) = gateway.get("files", &session.key).await.unwrap();
    assert_eq!(&data[..], b"hello world");
    assert_eq!(gateway.open_uploads().await, 0);
}

#[tokio::test]
async fn progress_hint_is_clamped() {
    let (tree, _, _) = setup(Config::default()).await;
    let session = tree.create_multipart_upload(video()).await.unwrap();
    tree.upload_part(&session.upload_id, 1, 250, Bytes::from_static(b"x"))
        .await
        .unwrap();
    let node = tree.get_node(session.node_id).await.unwrap();
    assert_eq!(node.upload_progress, Some(100));
    assert_eq!(
        MultipartState::of(&node),
        Some(MultipartState::PartUploading { progress: 100 })
    );

    // A full progress hint leaves the upload open for more parts.
    tree.upload_part(&session.upload_id, 2, 100, Bytes::from_static(b"y"))
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_upload_ids_are_not_found() {
    let (tree, _, _) = setup(Config::default()).await;
    let err = tree
        .upload_part("nope", 1, 10, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, TreeError::NotFound(_)));
    let err = tree.complete_multipart_upload("nope", vec![]).await.unwrap_err();
    assert!(matches!(err, TreeError::NotFound(_)));
    let err = tree.abort_multipart_upload("nope").await.unwrap_err();
    assert!(matches!(err, TreeError::NotFound(_)));
}

#[tokio::test]
async fn bad_part_numbers_surface_as_store_failures() {
    let (tree, _, _) = setup(Config::default()).await;
    let session = tree.create_multipart_upload(video()).await.unwrap();
    let err = tree
        .upload_part(&session.upload_id, 0, 10, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, TreeError::StoreFailure(_)));
}

#[tokio::test]
async fn abort_keeps_placeholder_by_default() {
    let (tree, gateway, index) = setup(Config::default()).await;
    let session = tree.create_multipart_upload(video()).await.unwrap();

    tree.abort_multipart_upload(&session.upload_id).await.unwrap();

    assert_eq!(gateway.open_uploads().await, 0);
    let node = index.get(session.node_id).await.unwrap().unwrap();
    assert_eq!(node.upload_progress, Some(0));
    assert_eq!(MultipartState::of(&node), Some(MultipartState::Aborted));
}

#[tokio::test]
async fn aborted_uploads_take_no_more_calls() {
    let (tree, gateway, _) = setup(Config::default()).await;
    let session = tree.create_multipart_upload(video()).await.unwrap();
    let part = tree
        .upload_part(&session.upload_id, 1, 40, Bytes::from_static(b"x"))
        .await
        .unwrap();
    tree.abort_multipart_upload(&session.upload_id).await.unwrap();

    let err = tree
        .upload_part(&session.upload_id, 2, 80, Bytes::from_static(b"y"))
        .await
        .unwrap_err();
    assert!(matches!(err, TreeError::Conflict(_)));
    let err = tree
        .complete_multipart_upload(&session.upload_id, vec![part])
        .await
        .unwrap_err();
    assert!(matches!(err, TreeError::Conflict(_)));
    let err = tree.abort_multipart_upload(&session.upload_id).await.unwrap_err();
    assert!(matches!(err, TreeError::Conflict(_)));
    assert!(gateway.get("files", &session.key).await.is_err());
}

#[tokio::test]
async fn completed_uploads_cannot_be_aborted() {
    let (tree, gateway, _) = setup(Config::default()).await;
    let session = tree.create_multipart_upload(video()).await.unwrap();
    let part = tree
        .upload_part(&session.upload_id, 1, 100, Bytes::from_static(b"whole"))
        .await
        .unwrap();
    tree.complete_multipart_upload(&session.upload_id, vec![part])
        .await
        .unwrap();

    let err = tree.abort_multipart_upload(&session.upload_id).await.unwrap_err();
    assert!(matches!(err, TreeError::Conflict(_)));
    let (data, _) = gateway.get("files", &session.key).await.unwrap();
    assert_eq!(&data[..], b"whole");
}

#[tokio::test]
async fn abort_can_remove_the_placeholder() {
    let mut config = Config::default();
    config.multipart.delete_placeholder_on_abort = true;
    let (tree, _, index) = setup(config).await;
    let session = tree.create_multipart_upload(video()).await.unwrap();

    tree.abort_multipart_upload(&session.upload_id).await.unwrap();

    assert!(index.get(session.node_id).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_content_type_is_rejected() {
    let (tree, gateway, _) = setup(Config::default()).await;
    let err = tree
        .create_multipart_upload(MultipartRequest {
            content_type: String::new(),
            ..video()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TreeError::InvalidArgument(_)));
    assert_eq!(gateway.open_uploads().await, 0);
}
