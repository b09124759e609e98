//! API routes

use crate::analysis::{AnalyzeRequest, ConfigureRequest, ConfigureSummary, DomainListing, HealthReport, IntentAnswer};
use crate::domain::DomainChange;
use crate::error::ServiceError;
use crate::models::{AnalysisResult, DecisionResponse, HistoryMessage, Role};
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

type AppStateArc = Arc<AppState>;

const DEFAULT_TOP_K: usize = 5;
const DEFAULT_LIMIT: usize = 10;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_domains: Option<Vec<String>>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::UnknownDomain { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Worker(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("  Request failed: {:#}", self);
        }

        let available_domains = match &self {
            ServiceError::UnknownDomain { available, .. } => Some(available.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            available_domains,
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Analysis Routes
// ============================================================================

pub fn analysis_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/analyze_text", post(analyze_text))
        .route("/classify_intent", post(classify_intent))
        .route("/resolve_coref", post(resolve_coref))
}

async fn analyze(
    State(state): State<AppStateArc>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<DecisionResponse>, ServiceError> {
    let response = state.blocking(move |service| service.analyze(&req)).await?;
    Ok(Json(response))
}

async fn analyze_text(
    State(state): State<AppStateArc>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, ServiceError> {
    let result = state.blocking(move |service| service.analyze_text(&req)).await??;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct TextRequest {
    text: String,
}

async fn classify_intent(
    State(state): State<AppStateArc>,
    Json(req): Json<TextRequest>,
) -> Result<Json<IntentAnswer>, ServiceError> {
    let answer = state
        .blocking(move |service| service.classify_intent(&req.text))
        .await?;
    Ok(Json(answer))
}

#[derive(Serialize)]
struct ResolvedResponse {
    resolved: String,
}

async fn resolve_coref(
    State(state): State<AppStateArc>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ResolvedResponse>, ServiceError> {
    let resolved = state
        .blocking(move |service| {
            service.resolve_coref(&req.text, req.session_id.as_deref(), req.prev_bot_response.as_deref())
        })
        .await?;
    Ok(Json(ResolvedResponse { resolved }))
}

// ============================================================================
// Memory Routes
// ============================================================================

pub fn memory_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/store_message", post(store_message))
        .route("/get_relevant_history", get(get_relevant_history))
        .route("/get_session_history", get(get_session_history))
}

#[derive(Debug, Deserialize)]
struct StoreMessageRequest {
    session_id: String,
    message: String,
    role: Role,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct StoreMessageResponse {
    status: &'static str,
    message_id: Option<String>,
}

async fn store_message(
    State(state): State<AppStateArc>,
    Json(req): Json<StoreMessageRequest>,
) -> Result<Json<StoreMessageResponse>, ServiceError> {
    let message_id = state
        .blocking(move |service| service.store_message(&req.session_id, &req.message, req.role, req.timestamp))
        .await??;
    Ok(Json(StoreMessageResponse {
        status: "success",
        message_id,
    }))
}

#[derive(Debug, Deserialize)]
struct RelevantHistoryQuery {
    query: String,
    session_id: Option<String>,
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct RelevantHistoryResponse {
    relevant_history: Vec<HistoryMessage>,
}

async fn get_relevant_history(
    State(state): State<AppStateArc>,
    Query(params): Query<RelevantHistoryQuery>,
) -> Result<Json<RelevantHistoryResponse>, ServiceError> {
    let relevant_history = state
        .blocking(move |service| {
            service.relevant_history(
                &params.query,
                params.session_id.as_deref(),
                params.top_k.unwrap_or(DEFAULT_TOP_K),
            )
        })
        .await??;
    Ok(Json(RelevantHistoryResponse { relevant_history }))
}

#[derive(Debug, Deserialize)]
struct SessionHistoryQuery {
    session_id: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SessionHistoryResponse {
    session_history: Vec<HistoryMessage>,
}

async fn get_session_history(
    State(state): State<AppStateArc>,
    Query(params): Query<SessionHistoryQuery>,
) -> Json<SessionHistoryResponse> {
    let session_history = state
        .service
        .session_history(&params.session_id, params.limit.unwrap_or(DEFAULT_LIMIT));
    Json(SessionHistoryResponse { session_history })
}

// ============================================================================
// NLP Utility Routes
// ============================================================================

pub fn nlp_routes() -> Router<AppStateArc> {
    Router::new().route("/extract_entities", post(extract_entities))
}

#[derive(Serialize)]
struct EntitiesResponse {
    entities: BTreeMap<String, String>,
}

async fn extract_entities(
    State(state): State<AppStateArc>,
    Json(req): Json<TextRequest>,
) -> Result<Json<EntitiesResponse>, ServiceError> {
    let entities = state
        .blocking(move |service| service.extract_entities(&req.text))
        .await?;
    Ok(Json(EntitiesResponse { entities }))
}

// ============================================================================
// Admin Routes
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/configure", post(configure))
        .route("/change_domain", post(change_domain))
        .route("/get_domains", get(get_domains))
        .route("/health", get(health))
}

async fn configure(
    State(state): State<AppStateArc>,
    Json(req): Json<ConfigureRequest>,
) -> Result<Json<ConfigureSummary>, ServiceError> {
    info!("🔧 Reconfiguring service");
    let summary = state.blocking(move |service| service.configure(req)).await??;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct DomainChangeRequest {
    domain: String,
}

async fn change_domain(
    State(state): State<AppStateArc>,
    Json(req): Json<DomainChangeRequest>,
) -> Result<Json<DomainChange>, ServiceError> {
    let change = state
        .blocking(move |service| service.change_domain(&req.domain))
        .await??;
    Ok(Json(change))
}

async fn get_domains(State(state): State<AppStateArc>) -> Json<DomainListing> {
    Json(state.service.domains())
}

#[derive(Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    report: HealthReport,
    uptime_secs: u64,
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        report: state.service.health(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
