use std::str::FromStr;

use agentscope_core::AgentscopeError;
use agentscope_core::filter::Period;
use agentscope_core::model::{Status, TraceRecord};
use agentscope_core::query::{
    DEFAULT_TRACE_LIMIT, MAX_TRACE_LIMIT, MetricsRequest, MetricsSummary, ModelUsage,
    TraceDetail, TraceListItem, TracesRequest,
};
use agentscope_core::time::parse_window;
use agentscope_store::Store;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::auth::presented_key;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

pub fn router(store: Store, cors_origins: &[String]) -> Router {
    let origins = cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignored invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/traces", get(list_traces).post(create_trace))
        .route("/api/v1/traces/{trace_id}", get(get_trace))
        .route("/api/v1/metrics", get(metrics))
        .route("/api/v1/metrics/models", get(model_usage))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(AppState { store })
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "agentscope",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn create_trace(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TraceRecord>, JsonRejection>,
) -> Result<Json<TraceListItem>, ApiError> {
    let Some(key) = presented_key(&headers) else {
        return Err(ApiError::unauthorized("missing API key"));
    };
    let Json(trace) = body?;

    let item = blocking(state.store, move |store| {
        store.authorize(&trace.project_id, &key)?;
        store.insert_trace(&trace)
    })
    .await?;
    tracing::debug!(trace_id = %item.id, project_id = %item.project_id, spans = item.span_count, "trace ingested");
    Ok(Json(item))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    project_id: String,
    limit: Option<usize>,
    offset: Option<usize>,
    status: Option<String>,
    since: Option<String>,
    until: Option<String>,
}

async fn list_traces(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<TraceListItem>>, ApiError> {
    let Query(params) = params?;

    let limit = params.limit.unwrap_or(DEFAULT_TRACE_LIMIT);
    if !(1..=MAX_TRACE_LIMIT).contains(&limit) {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_TRACE_LIMIT}"
        )));
    }
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Status::from_str)
        .transpose()?;
    let window = parse_window(params.since.as_deref(), params.until.as_deref())?;

    let req = TracesRequest {
        project_id: params.project_id,
        status,
        window,
        limit,
        offset: params.offset.unwrap_or(0),
    };
    let items = blocking(state.store, move |store| store.list_traces(&req)).await?;
    Ok(Json(items))
}

async fn get_trace(
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
) -> Result<Json<TraceDetail>, ApiError> {
    let detail = blocking(state.store, move |store| store.get_trace(&trace_id)).await?;
    detail
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Trace not found"))
}

#[derive(Debug, Deserialize)]
struct MetricsParams {
    project_id: String,
    period: Option<String>,
}

impl MetricsParams {
    fn into_request(self) -> MetricsRequest {
        MetricsRequest {
            project_id: self.project_id,
            period: self
                .period
                .as_deref()
                .map(Period::parse_lenient)
                .unwrap_or_default(),
        }
    }
}

async fn metrics(
    State(state): State<AppState>,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> Result<Json<MetricsSummary>, ApiError> {
    let req = params?.0.into_request();
    let summary = blocking(state.store, move |store| store.project_metrics(&req)).await?;
    Ok(Json(summary))
}

async fn model_usage(
    State(state): State<AppState>,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> Result<Json<Vec<ModelUsage>>, ApiError> {
    let req = params?.0.into_request();
    let usage = blocking(state.store, move |store| store.model_usage(&req)).await?;
    Ok(Json(usage))
}

// DuckDB calls block; keep them off the async workers.
async fn blocking<T, F>(store: Store, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> agentscope_core::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| AgentscopeError::Internal(format!("store task failed: {e}")))?
        .map_err(ApiError::from)
}
