use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::{Period, TimeWindow};
use crate::model::span::{SpanRecord, Status};

pub const DEFAULT_TRACE_LIMIT: usize = 50;
pub const MAX_TRACE_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracesRequest {
    pub project_id: String,
    pub status: Option<Status>,
    pub window: TimeWindow,
    pub limit: usize,
    pub offset: usize,
}

impl TracesRequest {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            status: None,
            window: TimeWindow::all(),
            limit: DEFAULT_TRACE_LIMIT,
            offset: 0,
        }
    }
}

/// Persisted trace without its spans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceListItem {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: Status,
    pub error_message: Option<String>,
    pub total_tokens: Option<i64>,
    pub total_cost_usd: Option<f64>,
    pub span_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceDetail {
    #[serde(flatten)]
    pub trace: TraceListItem,
    pub metadata: Option<Value>,
    pub spans: Vec<SpanRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRequest {
    pub project_id: String,
    pub period: Period,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    pub total_traces: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub error_rate: f64,

    pub avg_duration_ms: Option<f64>,
    pub p50_duration_ms: Option<i64>,
    pub p95_duration_ms: Option<i64>,

    pub total_tokens: i64,
    pub total_cost_usd: f64,

    pub total_spans: usize,
    pub avg_spans_per_trace: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelUsage {
    pub model: String,
    pub call_count: usize,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub db_path: String,
    pub projects_count: usize,
    pub traces_count: usize,
    pub spans_count: usize,
    pub oldest_trace: Option<DateTime<Utc>>,
    pub newest_trace: Option<DateTime<Utc>>,
}
