use agentscope_core::error::{AgentscopeError, Result};
use agentscope_core::model::TraceRecord;
use agentscope_core::query::TraceListItem;
use chrono::{DateTime, Utc};
use duckdb::params;

use crate::Store;
use crate::db::ts_param;

impl Store {
    /// Persists a trace with its spans, recomputing rollups from the spans.
    /// A trace id seen before replaces the earlier trace and its spans, but only
    /// within the same project; an id owned by another project is a conflict.
    pub fn insert_trace(&self, trace: &TraceRecord) -> Result<TraceListItem> {
        self.insert_trace_at(trace, Utc::now())
    }

    pub fn insert_trace_at(
        &self,
        trace: &TraceRecord,
        created_at: DateTime<Utc>,
    ) -> Result<TraceListItem> {
        if trace.id.trim().is_empty() {
            return Err(AgentscopeError::InvalidArgument(
                "trace id must not be empty".to_string(),
            ));
        }
        trace.validate_span_tree()?;

        let item = trace.list_item(created_at);
        let metadata = trace
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AgentscopeError::Internal(format!("encode metadata failed: {e}")))?;

        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(|e| AgentscopeError::Store(format!("begin tx failed: {e}")))?;

        let owner = {
            let mut stmt = tx
                .prepare("SELECT project_id FROM traces WHERE id = ? LIMIT 1")
                .map_err(|e| AgentscopeError::Store(format!("prepare trace owner failed: {e}")))?;
            let mut rows = stmt
                .query_map(params![trace.id], |row| row.get::<_, String>(0))
                .map_err(|e| AgentscopeError::Store(format!("query trace owner failed: {e}")))?;
            rows.next()
                .transpose()
                .map_err(|e| AgentscopeError::Store(format!("read trace owner failed: {e}")))?
        };
        if let Some(owner) = owner.as_deref()
            && owner != trace.project_id
        {
            tracing::warn!(trace_id = %trace.id, project_id = %trace.project_id, "trace id owned by another project");
            return Err(AgentscopeError::Conflict(format!(
                "trace {} belongs to another project",
                trace.id
            )));
        }

        let replaced = if owner.is_some() {
            tx.execute(
                "DELETE FROM spans WHERE trace_id IN
                 (SELECT id FROM traces WHERE id = ? AND project_id = ?)",
                params![trace.id, trace.project_id],
            )
            .map_err(|e| AgentscopeError::Store(format!("delete previous spans failed: {e}")))?;
            tx.execute(
                "DELETE FROM traces WHERE id = ? AND project_id = ?",
                params![trace.id, trace.project_id],
            )
            .map_err(|e| AgentscopeError::Store(format!("delete previous trace failed: {e}")))?
        } else {
            0
        };

        tx.execute(
            "INSERT INTO traces
             (id, project_id, name, start_time, end_time, duration_ms, status, error_message,
              metadata_json, span_count, total_tokens, total_cost_usd, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                item.id,
                item.project_id,
                item.name,
                ts_param(item.start_time),
                item.end_time.map(ts_param),
                item.duration_ms,
                item.status.as_str(),
                item.error_message,
                metadata,
                item.span_count as i64,
                item.total_tokens,
                item.total_cost_usd,
                ts_param(item.created_at),
            ],
        )
        .map_err(|e| AgentscopeError::Store(format!("insert trace failed: {e}")))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO spans
                     (id, trace_id, parent_span_id, name, span_type, start_time, end_time, duration_ms,
                      model, input_tokens, output_tokens, cost_usd, input_json, output_json, status, error_message)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| AgentscopeError::Store(format!("prepare insert spans failed: {e}")))?;

            for span in &trace.spans {
                let input = encode_payload(span.input_data.as_ref())?;
                let output = encode_payload(span.output_data.as_ref())?;
                stmt.execute(params![
                    span.id,
                    trace.id,
                    span.parent_span_id,
                    span.name,
                    span.span_type.as_str(),
                    ts_param(span.start_time),
                    span.end_time.map(ts_param),
                    span.duration_ms,
                    span.model,
                    span.input_tokens,
                    span.output_tokens,
                    span.cost_usd,
                    input,
                    output,
                    span.status.as_str(),
                    span.error_message,
                ])
                .map_err(|e| AgentscopeError::Store(format!("insert span failed: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| AgentscopeError::Store(format!("commit trace failed: {e}")))?;

        tracing::debug!(
            trace_id = %item.id,
            project_id = %item.project_id,
            spans = item.span_count,
            replaced = replaced > 0,
            "trace stored"
        );
        Ok(item)
    }
}

fn encode_payload(value: Option<&serde_json::Value>) -> Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AgentscopeError::Internal(format!("encode payload failed: {e}")))
}
