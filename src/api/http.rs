use crate::analysis::{Analyzer, DocumentAnalysis};
use crate::api::types::{ApiError, CreateDocumentRequest};
use crate::config::ServerConfig;
use crate::error::{DocAnalyzerError, Result};
use crate::store::{Document, DocumentId, DocumentPatch, DocumentStore};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DocumentStore>,
    analyzer: Arc<Analyzer>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, analyzer: Arc<Analyzer>) -> Self {
        Self { store, analyzer }
    }
}

/// HTTP server exposing the document and analysis routes
pub struct ApiServer {
    state: AppState,
    config: ServerConfig,
}

impl ApiServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    /// Run the HTTP server until the process is stopped
    pub async fn run(&self) -> Result<()> {
        let app = self.create_router();

        let addr = self.config.bind_addr();
        log::info!("Starting document API on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            let error_msg = if e.kind() == std::io::ErrorKind::AddrInUse {
                format!(
                    "Port {} is already in use. Stop the other process or set server.port in config.toml",
                    self.config.port
                )
            } else {
                format!("Failed to bind to {}: {}", addr, e)
            };
            DocAnalyzerError::Io(std::io::Error::new(e.kind(), error_msg))
        })?;

        axum::serve(listener, app).await.map_err(|e| {
            DocAnalyzerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    /// Create the axum router
    pub fn create_router(&self) -> Router {
        // No configured origins (local dev): allow any
        let cors = if self.config.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .config
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let mut router = Router::new()
            .route("/documents", post(create_document).get(list_documents))
            .route("/documents/", post(create_document).get(list_documents))
            .route(
                "/documents/:id",
                get(get_document).put(update_document).delete(delete_document),
            )
            .route("/documents/:id/analyze", post(analyze_document))
            .route("/health", get(handle_health));

        if let Some(dir) = &self.config.static_dir {
            router = router.nest_service("/static", ServeDir::new(dir));
        }

        router
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

/// Non-numeric ids cannot name a document.
fn parse_id(raw: &str) -> std::result::Result<DocumentId, ApiError> {
    raw.parse::<DocumentId>().map_err(|_| {
        log::debug!("Rejecting non-numeric document id {:?}", raw);
        // Any id not issued by the store behaves as a missing document
        ApiError(DocAnalyzerError::NotFound(0))
    })
}

async fn create_document(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateDocumentRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<Document>), ApiError> {
    let Json(req) = payload?;
    let id = state.store.create(req.content, req.topic).await?;
    let doc = state.store.get(id).await?;
    log::info!("Created document {}", id);
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn list_documents(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Document>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get(id).await?))
}

async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<DocumentPatch>, JsonRejection>,
) -> std::result::Result<Json<Document>, ApiError> {
    let id = parse_id(&id)?;
    let Json(patch) = payload?;
    let current = state.store.get(id).await?;
    let (content, topic) = patch.merge(&current);
    let updated = state.store.update(id, content, topic).await?;
    Ok(Json(updated))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.store.get(id).await?;
    state.store.delete(id).await?;
    log::info!("Deleted document {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn analyze_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<DocumentAnalysis>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.analyzer.analyze(id).await?))
}

/// Handle health check endpoint
async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "docanalyzer",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SamplingParams;
    use crate::api::types::ErrorBody;
    use crate::completion::testing::StubCompletionClient;
    use crate::store::MemoryDocumentStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const CATS: &str = "This is a sufficiently long test document about cats.";

    struct TestApp {
        router: Router,
        client: Arc<StubCompletionClient>,
    }

    fn test_app(reply: &str) -> TestApp {
        test_app_with(ServerConfig::default(), reply)
    }

    fn test_app_with(config: ServerConfig, reply: &str) -> TestApp {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let client = Arc::new(StubCompletionClient::replying(reply));
        let analyzer = Arc::new(Analyzer::new(
            Arc::clone(&store),
            client.clone(),
            SamplingParams::default(),
        ));
        let server = ApiServer::new(AppState::new(store, analyzer), config);
        TestApp {
            router: server.create_router(),
            client,
        }
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send_raw(router: &Router, method: Method, uri: &str, body: &'static str) -> (StatusCode, ErrorBody) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create(router: &Router, content: &str, topic: Option<&str>) -> Value {
        let (status, body) = send(
            router,
            Method::POST,
            "/documents",
            Some(json!({"content": content, "topic": topic})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn test_create_returns_full_document() {
        let app = test_app("");

        let body = create(&app.router, "Test content", Some("Test topic")).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["content"], "Test content");
        assert_eq!(body["topic"], "Test topic");
        assert_eq!(body["created_at"], body["updated_at"]);
    }

    #[tokio::test]
    async fn test_create_without_topic() {
        let app = test_app("");

        let (status, body) = send(&app.router, Method::POST, "/documents", Some(json!({"content": "no topic"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["topic"].is_null());
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let app = test_app("");
        let first = create(&app.router, "first", None).await;
        create(&app.router, "second", None).await;

        let (status, body) = send(&app.router, Method::GET, "/documents", None).await;
        assert_eq!(status, StatusCode::OK);
        let docs = body.as_array().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["content"], "first");

        let (status, body) = send(&app.router, Method::GET, "/documents/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, first);
    }

    #[tokio::test]
    async fn test_get_missing_and_malformed_ids_are_404() {
        let app = test_app("");

        for uri in ["/documents/999", "/documents/123e4567-e89b-12d3-a456-426614174000"] {
            let (status, body) = send(&app.router, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            let error: ErrorBody = serde_json::from_value(body).unwrap();
            assert_eq!(error.kind, "not_found");
        }
    }

    #[tokio::test]
    async fn test_update_merges_partial_fields() {
        let app = test_app("");
        create(&app.router, "Original content", Some("Original topic")).await;

        let (status, body) = send(
            &app.router,
            Method::PUT,
            "/documents/1",
            Some(json!({"content": "Updated content"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "Updated content");
        assert_eq!(body["topic"], "Original topic");

        let (_, body) = send(&app.router, Method::PUT, "/documents/1", Some(json!({"topic": "New topic"}))).await;
        assert_eq!(body["content"], "Updated content");
        assert_eq!(body["topic"], "New topic");
    }

    #[tokio::test]
    async fn test_update_missing_is_404() {
        let app = test_app("");

        let (status, _) = send(&app.router, Method::PUT, "/documents/42", Some(json!({"content": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_then_gone() {
        let app = test_app("");
        create(&app.router, "delete me", None).await;

        let (status, body) = send(&app.router, Method::DELETE, "/documents/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (status, _) = send(&app.router, Method::GET, "/documents/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app.router, Method::DELETE, "/documents/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analyze_backfills_topic() {
        let app = test_app("Topic: Cats\nSummary: A short document about cats.");
        create(&app.router, CATS, None).await;

        let (status, body) = send(&app.router, Method::POST, "/documents/1/analyze", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"topic": "Cats", "summary": "A short document about cats."}));

        let (_, doc) = send(&app.router, Method::GET, "/documents/1", None).await;
        assert_eq!(doc["topic"], "Cats");
    }

    #[tokio::test]
    async fn test_analyze_error_mapping() {
        let app = test_app("Topic: Cats");
        create(&app.router, "hi", None).await;
        create(&app.router, CATS, None).await;

        let (status, body) = send(&app.router, Method::POST, "/documents/999/analyze", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let (status, body) = send(&app.router, Method::POST, "/documents/1/analyze", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");
        assert_eq!(app.client.calls(), 0);

        let (status, body) = send(&app.router, Method::POST, "/documents/2/analyze", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "analysis_parse_error");
        assert_eq!(body["message"], "Failed to parse analysis results");
    }

    #[tokio::test]
    async fn test_unreadable_bodies_are_invalid_input() {
        let app = test_app("");
        create(&app.router, "existing", None).await;

        let cases = [
            (Method::POST, "/documents", r#"{"topic": "x"}"#),
            (Method::POST, "/documents", "not json"),
            (Method::PUT, "/documents/1", "not json"),
            (Method::PUT, "/documents/1", r#"{"content": 5}"#),
        ];
        for (method, uri, body) in cases {
            let (status, error) = send_raw(&app.router, method.clone(), uri, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} {} {}", method, uri, body);
            assert_eq!(error.kind, "invalid_input");
            assert!(error.message.starts_with("Invalid request body"), "{}", error.message);
        }

        let (_, doc) = send(&app.router, Method::GET, "/documents/1", None).await;
        assert_eq!(doc["content"], "existing");
    }

    #[tokio::test]
    async fn test_collection_route_accepts_trailing_slash() {
        let app = test_app("");

        let (status, body) = send(&app.router, Method::POST, "/documents/", Some(json!({"content": "slash"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 1);

        let (status, body) = send(&app.router, Method::GET, "/documents/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app("");

        let (status, body) = send(&app.router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_serves_static_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("app.json"), r#"{"static": true}"#).unwrap();
        let config = ServerConfig {
            static_dir: Some(temp_dir.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let app = test_app_with(config, "");

        let (status, body) = send(&app.router, Method::GET, "/static/app.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["static"], true);
    }
}
