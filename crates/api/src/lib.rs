mod config;
mod rate_limit;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Query, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use occacia_agents::{AiFlow, LangflowClient, PlanningAgent};
use occacia_core::PlanRequest;
use occacia_observability::AppMetrics;
use occacia_storage::{seed_demo_catalog, Store};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use crate::config::{parse_origins, ApiConfig, DEFAULT_API_KEY};
use crate::rate_limit::{IpRateLimiter, RateDecision};

const MAX_QUERY_CHARS: usize = 4_000;
const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Clone)]
pub struct ApiState<F = LangflowClient>
where
    F: AiFlow + Clone,
{
    pub agent: Arc<PlanningAgent<Store, F>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
    pub ai_flow_configured: bool,
    pub store_backend: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    store: &'static str,
    ai_flow_configured: bool,
    metrics: occacia_observability::MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    session_id: String,
    limit: Option<usize>,
}

/// Builds the production router: Langflow client plus the configured store.
pub async fn build_app(config: ApiConfig) -> Result<Router> {
    let flow = LangflowClient::new(config.flow.clone())?;
    build_app_with_flow(config, flow).await
}

pub async fn build_app_with_flow<F>(config: ApiConfig, flow: F) -> Result<Router>
where
    F: AiFlow + Clone + 'static,
{
    let metrics = AppMetrics::shared();

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };
    if config.seed_demo {
        seed_demo_catalog(&store).await?;
    }
    let store_backend = store.backend_name();

    let ai_flow_configured = config.flow.is_configured();
    let agent = PlanningAgent::new(Arc::new(store), flow, metrics.clone())
        .with_history_limit(config.history_limit);

    let state = ApiState {
        agent: Arc::new(agent),
        metrics,
        api_key: config.api_key,
        limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        allowed_origins: Arc::new(config.allowed_origins),
        ai_flow_configured,
        store_backend,
    };

    info!(
        store = store_backend,
        ai_flow_configured,
        "planning api assembled"
    );

    Ok(build_router(state))
}

pub fn build_router<F>(state: ApiState<F>) -> Router
where
    F: AiFlow + Clone + 'static,
{
    Router::new()
        .route("/health", get(health::<F>))
        .route("/api/planning/generate", post(generate_plan::<F>))
        .route("/api/catalog/packages", get(list_packages::<F>))
        .route("/api/chat/history", get(chat_history::<F>))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware::<F>,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware::<F>,
        ))
        .with_state(state)
}

async fn health<F>(State(state): State<ApiState<F>>) -> impl IntoResponse
where
    F: AiFlow + Clone + 'static,
{
    Json(HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        store: state.store_backend,
        ai_flow_configured: state.ai_flow_configured,
        metrics: state.metrics.snapshot(),
    })
}

async fn generate_plan<F>(
    State(state): State<ApiState<F>>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Response
where
    F: AiFlow + Clone + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(rejection.status(), "invalid_request", &rejection.body_text())
        }
    };

    let query_chars = request.user_query.trim().chars().count();
    if query_chars == 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "user_query must not be empty",
        );
    }
    if query_chars > MAX_QUERY_CHARS {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "user_query is too long",
        );
    }

    match state.agent.generate_plan(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            error!(error = %err, "planning request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "planning_failed",
                "An unexpected error occurred. Please try again.",
            )
        }
    }
}

async fn list_packages<F>(
    State(state): State<ApiState<F>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    F: AiFlow + Clone + 'static,
{
    match state.agent.list_packages(clamp_limit(query.limit)).await {
        Ok(packages) => (StatusCode::OK, Json(packages)).into_response(),
        Err(err) => {
            error!(error = %err, "catalog listing failed");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "catalog_unavailable",
                "The catalog is unavailable right now.",
            )
        }
    }
}

async fn chat_history<F>(
    State(state): State<ApiState<F>>,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    F: AiFlow + Clone + 'static,
{
    let session_id = query.session_id.trim();
    if session_id.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "session_id must not be empty",
        );
    }

    match state.agent.history(session_id, clamp_limit(query.limit)).await {
        Ok(turns) => (StatusCode::OK, Json(turns)).into_response(),
        Err(err) => {
            error!(error = %err, "history lookup failed");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "history_unavailable",
                "Conversation history is unavailable right now.",
            )
        }
    }
}

async fn api_key_middleware<F>(
    State(state): State<ApiState<F>>,
    request: Request<Body>,
    next: Next,
) -> Response
where
    F: AiFlow + Clone + 'static,
{
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid x-api-key",
        );
    }

    next.run(request).await
}

async fn rate_limit_middleware<F>(
    State(state): State<ApiState<F>>,
    request: Request<Body>,
    next: Next,
) -> Response
where
    F: AiFlow + Clone + 'static,
{
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    if let RateDecision::Limited { retry_after } = state.limiter.check(&request_ip(&request)) {
        let mut response = error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded for this IP",
        );
        let seconds = retry_after.as_secs().max(1);
        if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(request).await
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message
        })),
    )
        .into_response()
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5173")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}
