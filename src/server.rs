use crate::config::ProxyMode;
use crate::models;
use crate::proxy::{InboundRequest, ProxyPipeline};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Largest request body accepted (audio and file uploads included).
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ProxyPipeline,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = match state.pipeline.config().mode {
        ProxyMode::Azure => azure_routes(),
        ProxyMode::OpenAi => Router::new().fallback(handle_proxy),
    };

    router
        .route("/healthz", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn azure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/models", get(handle_models))
        .route("/v1/chat/completions", post(handle_proxy))
        .route("/v1/completions", post(handle_proxy))
        .route("/v1/embeddings", post(handle_proxy))
        // Images and audio
        .route("/v1/images/generations", post(handle_proxy))
        .route("/v1/audio/speech", post(handle_proxy))
        .route("/v1/audio/voices", get(handle_proxy))
        .route("/v1/audio/transcriptions", post(handle_proxy))
        .route("/v1/audio/translations", post(handle_proxy))
        // Fine-tuning
        .route("/v1/fine_tunes", get(handle_proxy).post(handle_proxy))
        .route("/v1/fine_tunes/:fine_tune_id", get(handle_proxy))
        .route("/v1/fine_tunes/:fine_tune_id/cancel", post(handle_proxy))
        .route("/v1/fine_tunes/:fine_tune_id/events", get(handle_proxy))
        // Files
        .route("/v1/files", get(handle_proxy).post(handle_proxy))
        .route("/v1/files/:file_id", get(handle_proxy).delete(handle_proxy))
        .route("/v1/files/:file_id/content", get(handle_proxy))
        // Deployments and capabilities
        .route("/deployments", get(handle_proxy))
        .route("/deployments/:deployment_id", get(handle_proxy))
        .route("/v1/models/:model_id/capabilities", get(handle_proxy))
        // Responses API
        .route("/v1/responses", post(handle_proxy))
        .route("/v1/responses/:response_id", get(handle_proxy).delete(handle_proxy))
        .route("/v1/responses/:response_id/cancel", post(handle_proxy))
        .route("/v1/responses/:response_id/input_items", get(handle_proxy))
        // Azure-shaped paths
        .route("/openai/deployments/:deployment/*rest", any(handle_proxy))
}

async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = InboundRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };

    match state.pipeline.handle(req).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn handle_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let pipeline = &state.pipeline;
    match models::list_models(pipeline.config(), pipeline.client(), &headers).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Error fetching deployed models");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "failed to fetch deployed models" })),
            )
                .into_response()
        }
    }
}
