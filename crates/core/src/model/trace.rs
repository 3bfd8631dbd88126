use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentscopeError, Result};
use crate::ids::new_trace_id;
use crate::model::span::{Outcome, SpanRecord, Status, elapsed_ms};
use crate::query::TraceListItem;

/// Values derived from a trace's span sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rollups {
    pub span_count: usize,
    pub total_tokens: Option<i64>,
    pub total_cost_usd: Option<f64>,
}

impl Rollups {
    pub fn from_spans(spans: &[SpanRecord]) -> Self {
        let mut total_tokens = None;
        let mut total_cost_usd = None;
        for span in spans {
            if let Some(tokens) = span.token_count() {
                let sum = total_tokens.get_or_insert(0i64);
                *sum = sum.saturating_add(tokens);
            }
            if let Some(cost) = span.cost_usd {
                *total_cost_usd.get_or_insert(0.0) += cost;
            }
        }
        Self {
            span_count: spans.len(),
            total_tokens,
            total_cost_usd,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceRecord {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default = "Status::completed")]
    pub status: Status,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, alias = "extra_metadata")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub spans: Vec<SpanRecord>,
    #[serde(default)]
    pub span_count: usize,
    #[serde(default)]
    pub total_tokens: Option<i64>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
}

impl TraceRecord {
    pub fn start(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_trace_id(),
            project_id: project_id.into(),
            name: name.into(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            status: Status::Running,
            error_message: None,
            metadata: None,
            spans: Vec::new(),
            span_count: 0,
            total_tokens: None,
            total_cost_usd: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    /// Appends a completed span; spans are kept in completion order.
    pub fn push_span(&mut self, span: SpanRecord) {
        self.spans.push(span);
        self.recompute_rollups();
    }

    pub fn finish(&mut self, outcome: Outcome) -> bool {
        self.finish_at(outcome, Utc::now())
    }

    pub fn finish_at(&mut self, outcome: Outcome, end_time: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.end_time = Some(end_time);
        self.duration_ms = Some(elapsed_ms(self.start_time, end_time));
        self.status = outcome.status();
        self.error_message = outcome.error_message().map(str::to_string);
        self.recompute_rollups();
        true
    }

    pub fn rollups(&self) -> Rollups {
        Rollups::from_spans(&self.spans)
    }

    pub fn recompute_rollups(&mut self) {
        let rollups = self.rollups();
        self.span_count = rollups.span_count;
        self.total_tokens = rollups.total_tokens;
        self.total_cost_usd = rollups.total_cost_usd;
    }

    pub fn list_item(&self, created_at: DateTime<Utc>) -> TraceListItem {
        let rollups = self.rollups();
        TraceListItem {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            name: self.name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration_ms,
            status: self.status,
            error_message: self.error_message.clone(),
            total_tokens: rollups.total_tokens,
            total_cost_usd: rollups.total_cost_usd,
            span_count: rollups.span_count,
            created_at,
        }
    }

    /// Span ids must be non-empty and unique, and every parent must be a span of this trace.
    pub fn validate_span_tree(&self) -> Result<()> {
        let mut ids = HashSet::with_capacity(self.spans.len());
        for span in &self.spans {
            if span.id.trim().is_empty() {
                return Err(AgentscopeError::InvalidArgument(
                    "span id must not be empty".to_string(),
                ));
            }
            if !ids.insert(span.id.as_str()) {
                return Err(AgentscopeError::InvalidArgument(format!(
                    "duplicate span id {}",
                    span.id
                )));
            }
        }
        for span in &self.spans {
            if let Some(parent) = span.parent_span_id.as_deref()
                && !ids.contains(parent)
            {
                return Err(AgentscopeError::InvalidArgument(format!(
                    "span {} references unknown parent {parent}",
                    span.id
                )));
            }
        }
        Ok(())
    }
}
