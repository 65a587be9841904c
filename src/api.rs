//! HTTP API for the story context engine
//!
//! ## Endpoint Map
//!
//! | Method | Path                                          | Description                  |
//! |--------|-----------------------------------------------|------------------------------|
//! | GET    | `/health`                                     | Liveness + backend state     |
//! | POST   | `/api/v1/context/:story_id`                   | Append text to a story       |
//! | GET    | `/api/v1/context/:story_id`                   | Current transcript record    |
//! | GET    | `/api/v1/context/:story_id/search`            | Relevant segments            |
//! | POST   | `/api/v1/context/:story_id/notes`             | Add a hidden note            |
//! | PUT    | `/api/v1/context/:story_id/characters/:name`  | Set a character summary      |

use crate::context::{BackendHealthController, ContextService, DEFAULT_SEARCH_LIMIT};
use crate::error::Error;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the context handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ContextService>,
    pub backend: Arc<BackendHealthController>,
}

/// Build the HTTP application
pub fn build_app(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/v1/context/:story_id",
            post(save_context).get(get_context),
        )
        .route("/api/v1/context/:story_id/search", get(search_context))
        .route("/api/v1/context/:story_id/notes", post(add_hidden_note))
        .route(
            "/api/v1/context/:story_id/characters/:name",
            put(set_character_summary),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(cors_origins))
}

// =============================================================================
// Error mapping
// =============================================================================

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({"error": {"code": code, "message": message.into()}})),
    )
        .into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::NotFound(msg) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Config(msg) => {
                error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            _ => {
                tracing::error!("Request failed: {}", self);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    self.to_string(),
                )
            }
        }
    }
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
}

/// Extractor rejections keep axum's status but use the error envelope.
fn rejected(status: StatusCode, message: String) -> Response {
    error_response(status, "INVALID_REQUEST", message)
}

fn json_body<T>(
    body: std::result::Result<Json<T>, JsonRejection>,
) -> std::result::Result<T, Response> {
    body.map(|Json(value)| value)
        .map_err(|e| rejected(e.status(), e.body_text()))
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    vector_backend: String,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "context",
        version: env!("CARGO_PKG_VERSION"),
        vector_backend: state.backend.state().to_string(),
    })
}

#[derive(Deserialize)]
struct SaveContextRequest {
    content: String,
}

/// POST /api/v1/context/:story_id
async fn save_context(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    body: std::result::Result<Json<SaveContextRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.content.trim().is_empty() {
        return bad_request("content must not be empty");
    }
    match state.service.save_context(&story_id, &request.content).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/context/:story_id
async fn get_context(State(state): State<AppState>, Path(story_id): Path<String>) -> Response {
    match state.service.get_context(&story_id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    limit: Option<usize>,
}

/// GET /api/v1/context/:story_id/search
async fn search_context(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(e) => return rejected(e.status(), e.body_text()),
    };
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if limit == 0 {
        return bad_request("limit must be positive");
    }
    match state
        .service
        .search_context(&story_id, &params.query, limit)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct HiddenNoteRequest {
    note: String,
}

/// POST /api/v1/context/:story_id/notes
async fn add_hidden_note(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    body: std::result::Result<Json<HiddenNoteRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.note.trim().is_empty() {
        return bad_request("note must not be empty");
    }
    match state.service.add_hidden_note(&story_id, &request.note).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct CharacterRequest {
    detail: String,
}

/// PUT /api/v1/context/:story_id/characters/:name
async fn set_character_summary(
    State(state): State<AppState>,
    Path((story_id, name)): Path<(String, String)>,
    body: std::result::Result<Json<CharacterRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state
        .service
        .set_character_summary(&story_id, &name, &request.detail)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// CORS
// =============================================================================

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BudgetConfig;
    use crate::context::{FallbackStore, MemoryTranscriptStore};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn make_app() -> Router {
        let backend = Arc::new(BackendHealthController::new(
            None,
            Arc::new(FallbackStore::new()),
            Duration::from_secs(1),
        ));
        let service = Arc::new(ContextService::new(
            Arc::new(MemoryTranscriptStore::new()),
            backend.clone(),
            BudgetConfig::default(),
        ));
        build_app(AppState { service, backend }, &[])
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = make_app();
        let resp = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "context");
        assert_eq!(json["vector_backend"], "disabled");
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let app = make_app();

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/context/story1",
                serde_json::json!({"content": "First part"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["story_id"], "story1");
        assert_eq!(json["content"], "First part");

        let resp = app
            .oneshot(get_request("/api/v1/context/story1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["content"], "First part");
        assert!(json["updated_at"].is_null());
    }

    #[tokio::test]
    async fn test_get_unknown_story() {
        let app = make_app();
        let resp = app
            .oneshot(get_request("/api/v1/context/missing"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_save_empty_content_rejected() {
        let app = make_app();
        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/v1/context/story1",
                serde_json::json!({"content": "   "}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search() {
        let app = make_app();
        for content in ["The dragon circles", "Rain on the harbor"] {
            let resp = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/v1/context/story1",
                    serde_json::json!({ "content": content }),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = app
            .clone()
            .oneshot(get_request("/api/v1/context/story1/search?query=dragon&limit=1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["text"], "The dragon circles");
        assert_eq!(results[0]["score"], 1.0);

        let resp = app
            .oneshot(get_request("/api/v1/context/story1/search?query=dragon&limit=0"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_unknown_story() {
        let app = make_app();
        let resp = app
            .oneshot(get_request("/api/v1/context/missing/search?query=dragon"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notes_and_characters() {
        let app = make_app();
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/context/story1/notes",
                serde_json::json!({"note": "foreshadow"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/context/story1",
                serde_json::json!({"content": "Chapter one"}),
            ))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/context/story1/notes",
                serde_json::json!({"note": "foreshadow"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/v1/context/story1/characters/Mira",
                serde_json::json!({"detail": "a reluctant thief"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        // Neither notes nor character details show up in the unfolded record
        let resp = app
            .oneshot(get_request("/api/v1/context/story1"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["content"], "Chapter one");
    }

    #[test]
    fn test_build_cors_with_origins() {
        let _cors = build_cors(&["http://localhost:3000".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        let app = make_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/context/story1")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
        assert!(json["error"]["message"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_missing_field_uses_error_envelope() {
        let app = make_app();
        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/v1/context/story1",
                serde_json::json!({"text": "wrong field"}),
            ))
            .await
            .unwrap();

        assert!(resp.status().is_client_error());
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_missing_query_uses_error_envelope() {
        let app = make_app();
        let resp = app
            .oneshot(get_request("/api/v1/context/story1/search"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
    }
}
