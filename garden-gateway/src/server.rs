//! HTTP routes over the search and sync cores.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use garden_search::SearchWeights;
use garden_sync::parse_entity_references;

use crate::error::ApiError;
use crate::state::AppState;

/// Run the HTTP server.
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/search", get(search_handler))
        .route("/api/search/advanced", post(advanced_search_handler))
        .route("/api/sync/logseq", post(sync_handler))
        .route("/api/sync/logseq/check", get(sync_check_handler))
        .route("/api/sync/logseq/force-git", post(force_git_handler))
        .route("/api/sync/logseq/force-db", post(force_db_handler))
        .route(
            "/api/sync/logseq/force-db/{entity_id}",
            post(force_db_by_id_handler),
        )
        .route("/api/entity-references/parse", post(parse_references_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    /// Legacy spelling of `query`; wins on collision.
    q: Option<String>,
    limit: Option<usize>,
    exact_match_weight: Option<f64>,
    similarity_weight: Option<f64>,
    /// Legacy spelling of `similarity_weight`; wins on collision.
    #[serde(rename = "levenshteinWeight")]
    levenshtein_weight: Option<f64>,
    recency_weight: Option<f64>,
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params
        .q
        .or(params.query)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("query parameter is required".to_string()))?;

    let weights = SearchWeights::resolve(
        params.exact_match_weight,
        params.similarity_weight,
        params.levenshtein_weight,
        params.recency_weight,
    )?;
    let limit = params.limit.unwrap_or(50);

    let outcome = state
        .search
        .search_all_with_cancel(&query, weights, limit, CancellationToken::new())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct AdvancedSearchRequest {
    query: Value,
}

async fn advanced_search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdvancedSearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state.advanced.answer(&request.query).await?;
    Ok(Json(answer))
}

async fn sync_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.sync.synchronize(CancellationToken::new()).await?;
    Ok(Json(stats))
}

async fn sync_check_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.sync.hard_sync_check().await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ForceGitRequest {
    entity_id: Uuid,
}

async fn force_git_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForceGitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.sync.force_update_file_from_db(request.entity_id).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct ForceDbRequest {
    page_path: String,
}

async fn force_db_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForceDbRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entity = state.sync.force_update_db_from_file(&request.page_path).await?;
    Ok(Json(entity))
}

async fn force_db_by_id_handler(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id: Uuid = entity_id
        .parse()
        .map_err(|_| ApiError::Validation(format!("invalid entity id: {entity_id}")))?;
    let entity = state.sync.force_update_db_by_entity(entity_id).await?;
    Ok(Json(entity))
}

#[derive(Debug, Deserialize)]
struct ParseReferencesRequest {
    content: String,
}

async fn parse_references_handler(
    Json(request): Json<ParseReferencesRequest>,
) -> impl IntoResponse {
    Json(parse_entity_references(&request.content))
}
