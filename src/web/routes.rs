use crate::config::WebConfig;
use crate::db::NewSecret;
use crate::error::{AppError, AppResult};
use crate::secrets::SecretService;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use secretlink_types::{
    CreateSecretResponse, LinkMetadata, SecretRequest, SecretSummary, ViewRequest, ViewResponse,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub service: SecretService,
    pub web: Arc<WebConfig>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List secrets, newest first
pub async fn list_secrets(State(state): State<AppState>) -> AppResult<Json<Vec<SecretSummary>>> {
    let now = state.service.now();
    let secrets = state.service.list_secrets().await?;
    Ok(Json(secrets.iter().map(|s| s.summary(now)).collect()))
}

/// Create a secret and hand back its share link
pub async fn create_secret(
    State(state): State<AppState>,
    Json(req): Json<SecretRequest>,
) -> AppResult<(StatusCode, Json<CreateSecretResponse>)> {
    let created = state
        .service
        .create_secret(NewSecret::from_request(req))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSecretResponse {
            id: created.secret.id,
            url: state.web.share_url(&created.token),
            token: created.token,
            expires_at: created.secret.expires_at,
        }),
    ))
}

/// Replace a secret. Keeps the current expiry when none is given.
pub async fn update_secret(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SecretRequest>,
) -> AppResult<Json<SecretSummary>> {
    let secret = state
        .service
        .update_secret(&id, NewSecret::from_request(req))
        .await?;
    Ok(Json(secret.summary(state.service.now())))
}

pub async fn delete_secret(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    state.service.delete_secret(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Metadata for a shared link; never includes content
pub async fn link_metadata(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LinkMetadata>, Response> {
    state
        .service
        .get_link_metadata(&token)
        .await
        .map(Json)
        .map_err(|e| link_error(&state, e))
}

/// Reveal a shared secret. The body is optional for unprotected secrets.
pub async fn view_link(
    Path(token): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ViewResponse>, Response> {
    let req: ViewRequest = if body.is_empty() {
        ViewRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::validation(format!("invalid request body: {}", e)).into_response())?
    };
    state
        .service
        .view_link(&token, req.password.as_deref())
        .await
        .map(|content| Json(ViewResponse { content }))
        .map_err(|e| link_error(&state, e))
}

/// Render link errors, collapsing "gone" outcomes into one 404 when masking
/// is enabled. Password failures stay distinct so the caller can retry.
fn link_error(state: &AppState, err: AppError) -> Response {
    if state.web.mask_unavailable && err.is_unavailable() {
        let body = serde_json::json!({
            "error": "Secret unavailable",
            "code": StatusCode::NOT_FOUND.as_u16()
        });
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    }
    err.into_response()
}

/// Create the web router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/secrets", get(list_secrets).post(create_secret))
        .route(
            "/api/secrets/{id}",
            put(update_secret).delete(delete_secret),
        )
        .route("/api/links/{token}", get(link_metadata))
        .route("/api/links/{token}/view", post(view_link))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
