use crate::error::TreeError;
use crate::gateway::CompletedPart;
use crate::index::NodeId;
use crate::multipart::MultipartRequest;
use crate::naming::content_type_for;
use crate::tree::{Base64UploadRequest, FileTree};
use crate::upload::UploadRequest;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

const DEFAULT_PAGE_LIMIT: usize = 100;
const MAX_PAGE_LIMIT: usize = 1000;

/// JSON API over a [`FileTree`].
#[derive(Clone)]
pub struct TreeHttpHandler {
    tree: Arc<FileTree>,
}

impl TreeHttpHandler {
    pub fn new(tree: FileTree) -> Self {
        Self {
            tree: Arc::new(tree),
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/nodes", get(list_children))
            .route(
                "/nodes/:id",
                get(get_node).patch(update_node).delete(delete_node),
            )
            .route("/nodes/:id/path", get(node_path))
            .route("/nodes/:id/content", get(download))
            .route("/nodes/:id/signed-url", get(signed_download_url))
            .route("/folders", post(create_folder))
            .route("/uploads", post(upload))
            .route("/uploads/base64", post(upload_base64))
            .route("/uploads/signed-url", post(signed_upload_url))
            .route("/multipart", post(create_multipart))
            .route("/multipart/:upload_id", delete(abort_multipart))
            .route("/multipart/:upload_id/parts/:part_number", put(upload_part))
            .route("/multipart/:upload_id/complete", post(complete_multipart))
            .route("/sync", post(sync))
            .with_state(self.tree)
    }

    pub async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "HTTP API listening");
        axum::serve(listener, self.router()).await
    }
}

#[derive(Debug)]
struct ApiError(TreeError);

impl From<TreeError> for ApiError {
    fn from(e: TreeError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            TreeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            TreeError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            TreeError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            TreeError::StoreFailure(_) => (StatusCode::BAD_GATEWAY, "store_failure"),
            TreeError::Index(_) | TreeError::Corrupt(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(json!({ "error": code, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    parent_id: Option<NodeId>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: Option<usize>,
}

/// GET /nodes - children of a folder (root when `parent_id` is absent)
async fn list_children(
    State(tree): State<Arc<FileTree>>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let page = tree
        .list_children(params.parent_id, params.offset, limit)
        .await?;
    Ok(Json(page))
}

async fn get_node(
    State(tree): State<Arc<FileTree>>,
    Path(id): Path<NodeId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tree.get_node(id).await?))
}

#[derive(Deserialize)]
struct UpdateNodeBody {
    #[serde(default)]
    name: Option<String>,
    /// Present-and-null moves to the root; absent leaves the parent alone.
    #[serde(default, deserialize_with = "present")]
    parent_id: Option<Option<NodeId>>,
}

fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// PATCH /nodes/:id - rename and/or move
async fn update_node(
    State(tree): State<Arc<FileTree>>,
    Path(id): Path<NodeId>,
    Json(body): Json<UpdateNodeBody>,
) -> ApiResult<impl IntoResponse> {
    if body.name.is_none() && body.parent_id.is_none() {
        return Err(TreeError::InvalidArgument("nothing to update".into()).into());
    }
    let mut node = tree.get_node(id).await?;
    if let Some(parent_id) = body.parent_id {
        node = tree.move_node(id, parent_id).await?;
    }
    if let Some(name) = body.name {
        node = tree.rename(id, &name).await?;
    }
    Ok(Json(node))
}

async fn delete_node(
    State(tree): State<Arc<FileTree>>,
    Path(id): Path<NodeId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tree.delete(id).await?))
}

async fn node_path(
    State(tree): State<Arc<FileTree>>,
    Path(id): Path<NodeId>,
) -> ApiResult<impl IntoResponse> {
    let path = tree.resolve_path(id).await?;
    let ancestors = tree.ancestors(id).await?;
    Ok(Json(json!({ "path": path, "ancestors": ancestors })))
}

/// GET /nodes/:id/content - raw object bytes
async fn download(
    State(tree): State<Arc<FileTree>>,
    Path(id): Path<NodeId>,
) -> ApiResult<impl IntoResponse> {
    let (data, content_type) = tree.download(id).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(data),
    ))
}

async fn signed_download_url(
    State(tree): State<Arc<FileTree>>,
    Path(id): Path<NodeId>,
) -> ApiResult<impl IntoResponse> {
    let url = tree.signed_download_url(id).await?;
    Ok(Json(json!({ "url": url })))
}

#[derive(Deserialize)]
struct CreateFolderBody {
    #[serde(default)]
    name: Option<String>,
    /// Slash-separated chain, created segment by segment.
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    parent_id: Option<NodeId>,
}

/// POST /folders - `name` creates one folder, `path` a whole chain
async fn create_folder(
    State(tree): State<Arc<FileTree>>,
    Json(body): Json<CreateFolderBody>,
) -> ApiResult<impl IntoResponse> {
    let node = match (body.name, body.path) {
        (Some(name), None) => tree.create_folder(&name, body.parent_id).await?,
        (None, Some(path)) => tree.create_folder_path(&path, body.parent_id).await?,
        _ => {
            return Err(
                TreeError::InvalidArgument("give exactly one of name or path".into()).into(),
            )
        }
    };
    Ok((StatusCode::CREATED, Json(node)))
}

#[derive(Deserialize)]
struct UploadParams {
    name: String,
    #[serde(default)]
    parent_id: Option<NodeId>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    overwrite: Option<bool>,
    #[serde(default)]
    use_original_name: Option<bool>,
}

/// POST /uploads?name=... - body is the file content
async fn upload(
    State(tree): State<Arc<FileTree>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let content_type = match headers.get(header::CONTENT_TYPE) {
        Some(value) => value
            .to_str()
            .map_err(|_| TreeError::InvalidArgument("content-type is not valid text".into()))?
            .to_string(),
        None => content_type_for(&params.name),
    };
    let outcome = tree
        .upload(UploadRequest {
            body,
            name: params.name,
            content_type,
            size: None,
            parent_id: params.parent_id,
            path: params.path,
            overwrite: params.overwrite,
            use_original_name: params.use_original_name,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn upload_base64(
    State(tree): State<Arc<FileTree>>,
    Json(body): Json<Base64UploadRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = tree.upload_base64(body).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Deserialize)]
struct SignedUploadBody {
    name: String,
    #[serde(default)]
    parent_id: Option<NodeId>,
}

async fn signed_upload_url(
    State(tree): State<Arc<FileTree>>,
    Json(body): Json<SignedUploadBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tree.signed_upload_url(&body.name, body.parent_id).await?))
}

async fn create_multipart(
    State(tree): State<Arc<FileTree>>,
    Json(body): Json<MultipartRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = tree.create_multipart_upload(body).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Deserialize)]
struct PartParams {
    #[serde(default)]
    progress: u8,
}

/// PUT /multipart/:upload_id/parts/:part_number?progress=N
async fn upload_part(
    State(tree): State<Arc<FileTree>>,
    Path((upload_id, part_number)): Path<(String, u32)>,
    Query(params): Query<PartParams>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let part = tree
        .upload_part(&upload_id, part_number, params.progress, body)
        .await?;
    Ok(Json(part))
}

#[derive(Deserialize)]
struct CompleteBody {
    parts: Vec<CompletedPart>,
}

async fn complete_multipart(
    State(tree): State<Arc<FileTree>>,
    Path(upload_id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(tree.complete_multipart_upload(&upload_id, body.parts).await?))
}

async fn abort_multipart(
    State(tree): State<Arc<FileTree>>,
    Path(upload_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    tree.abort_multipart_upload(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /sync - rebuild an empty index from the bucket listing
async fn sync(State(tree): State<Arc<FileTree>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(tree.sync().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::in_memory::InMemoryGateway;
    use crate::index::in_memory::InMemoryIndex;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn create_test_router() -> Router {
        let config = Config::default();
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.create_bucket(&config.store.bucket).await.unwrap();
        let tree = FileTree::new(gateway, Arc::new(InMemoryIndex::new()), &config);
        TreeHttpHandler::new(tree).router()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_folder_and_list() {
        let app = create_test_router().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/folders")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"path":"docs/reports"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let folder = json_body(response).await;
        assert_eq!(folder["name"], "reports");
        assert_eq!(folder["key"], "docs/reports/");

        let response = app
            .oneshot(Request::builder().uri("/nodes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = json_body(response).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["name"], "docs");
    }

    #[tokio::test]
    async fn test_unknown_node_is_404() {
        let app = create_test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/nodes/{}", NodeId::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let app = create_test_router().await;
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/uploads?name=notes.txt&path=docs")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let outcome = json_body(response).await;
        let id = outcome["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/nodes/{id}/content"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_blank_folder_name_is_conflict() {
        let app = create_test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/folders")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_sync_on_empty_bucket() {
        let app = create_test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sync")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["folders"], 0);
    }
}
