use agentscope_core::aggregate::{compute_metrics, compute_model_usage};
use agentscope_core::error::{AgentscopeError, Result};
use agentscope_core::filter::TimeWindow;
use agentscope_core::model::{SpanKind, SpanRecord, Status};
use agentscope_core::query::{
    MetricsRequest, MetricsSummary, ModelUsage, TraceDetail, TraceListItem, TracesRequest,
};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Row, params, params_from_iter};

use crate::Store;
use crate::db::{json_column, naive_to_utc, parse_column, ts_param};

const TRACE_COLUMNS: &str = "id, project_id, name, start_time, end_time, duration_ms, status, error_message,
     total_tokens, total_cost_usd, span_count, created_at";

const SPAN_COLUMNS: &str = "s.id, s.parent_span_id, s.name, s.span_type, s.start_time, s.end_time, s.duration_ms,
     s.model, s.input_tokens, s.output_tokens, s.cost_usd, s.input_json, s.output_json, s.status, s.error_message";

impl Store {
    /// Newest first by ingestion time.
    pub fn list_traces(&self, req: &TracesRequest) -> Result<Vec<TraceListItem>> {
        self.fetch_trace_items(
            &req.project_id,
            req.status,
            &req.window,
            Some((req.limit, req.offset)),
        )
    }

    pub fn get_trace(&self, trace_id: &str) -> Result<Option<TraceDetail>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TRACE_COLUMNS}, metadata_json FROM traces WHERE id = ? LIMIT 1"
            ))
            .map_err(|e| AgentscopeError::Store(format!("prepare trace failed: {e}")))?;
        let mut rows = stmt
            .query_map(params![trace_id], |row| {
                Ok((trace_item_from_row(row)?, json_column(12, row.get(12)?)?))
            })
            .map_err(|e| AgentscopeError::Store(format!("query trace failed: {e}")))?;

        let Some(row) = rows.next() else {
            return Ok(None);
        };
        let (trace, metadata) =
            row.map_err(|e| AgentscopeError::Store(format!("map trace row failed: {e}")))?;
        drop(rows);
        drop(stmt);
        drop(conn);

        let spans = self.fetch_trace_spans(trace_id)?;
        Ok(Some(TraceDetail {
            trace,
            metadata,
            spans,
        }))
    }

    /// Summary over the project's traces ingested during the period ending now.
    pub fn project_metrics(&self, req: &MetricsRequest) -> Result<MetricsSummary> {
        let now = Utc::now();
        let window = req.period.window_ending(now);
        let traces = self.fetch_trace_items(&req.project_id, None, &window, None)?;
        let since = window.since.unwrap_or(now);
        Ok(compute_metrics(&traces, since, now))
    }

    pub fn model_usage(&self, req: &MetricsRequest) -> Result<Vec<ModelUsage>> {
        let window = req.period.window_ending(Utc::now());
        let spans = self.fetch_llm_spans(&req.project_id, &window)?;
        Ok(compute_model_usage(&spans))
    }

    fn fetch_trace_items(
        &self,
        project_id: &str,
        status: Option<Status>,
        window: &TimeWindow,
        page: Option<(usize, usize)>,
    ) -> Result<Vec<TraceListItem>> {
        let mut sql = format!("SELECT {TRACE_COLUMNS} FROM traces WHERE project_id = ?");
        let mut args = vec![project_id.to_string()];
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        push_window(&mut sql, &mut args, "created_at", window);
        sql.push_str(" ORDER BY created_at DESC, id ASC");
        if let Some((limit, offset)) = page {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AgentscopeError::Store(format!("prepare traces failed: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), trace_item_from_row)
            .map_err(|e| AgentscopeError::Store(format!("query traces failed: {e}")))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| AgentscopeError::Store(format!("map traces row failed: {e}")))?);
        }
        Ok(items)
    }

    fn fetch_trace_spans(&self, trace_id: &str) -> Result<Vec<SpanRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SPAN_COLUMNS}
                 FROM spans s
                 WHERE s.trace_id = ?
                 ORDER BY s.start_time ASC, s.id ASC"
            ))
            .map_err(|e| AgentscopeError::Store(format!("prepare trace spans failed: {e}")))?;

        let rows = stmt
            .query_map(params![trace_id], span_from_row)
            .map_err(|e| AgentscopeError::Store(format!("query trace spans failed: {e}")))?;

        let mut spans = Vec::new();
        for row in rows {
            spans.push(row.map_err(|e| AgentscopeError::Store(format!("map trace span failed: {e}")))?);
        }
        Ok(spans)
    }

    fn fetch_llm_spans(&self, project_id: &str, window: &TimeWindow) -> Result<Vec<SpanRecord>> {
        let mut sql = format!(
            "SELECT {SPAN_COLUMNS}
             FROM spans s
             JOIN traces t ON t.id = s.trace_id
             WHERE t.project_id = ? AND s.span_type = ? AND s.model IS NOT NULL"
        );
        let mut args = vec![project_id.to_string(), SpanKind::Llm.as_str().to_string()];
        push_window(&mut sql, &mut args, "t.created_at", window);
        sql.push_str(" ORDER BY t.created_at ASC, s.start_time ASC, s.id ASC");

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AgentscopeError::Store(format!("prepare llm spans failed: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), span_from_row)
            .map_err(|e| AgentscopeError::Store(format!("query llm spans failed: {e}")))?;

        let mut spans = Vec::new();
        for row in rows {
            spans.push(row.map_err(|e| AgentscopeError::Store(format!("map llm span failed: {e}")))?);
        }
        Ok(spans)
    }
}

fn push_window(sql: &mut String, args: &mut Vec<String>, column: &str, window: &TimeWindow) {
    if let Some(since) = window.since {
        sql.push_str(&format!(" AND {column} >= CAST(? AS TIMESTAMP)"));
        args.push(ts_param(since));
    }
    if let Some(until) = window.until {
        sql.push_str(&format!(" AND {column} < CAST(? AS TIMESTAMP)"));
        args.push(ts_param(until));
    }
}

fn trace_item_from_row(row: &Row<'_>) -> duckdb::Result<TraceListItem> {
    Ok(TraceListItem {
        id: row.get::<_, String>(0)?,
        project_id: row.get::<_, String>(1)?,
        name: row.get::<_, String>(2)?,
        start_time: naive_to_utc(row.get::<_, NaiveDateTime>(3)?),
        end_time: row.get::<_, Option<NaiveDateTime>>(4)?.map(naive_to_utc),
        duration_ms: row.get::<_, Option<i64>>(5)?,
        status: parse_column(6, &row.get::<_, String>(6)?)?,
        error_message: row.get::<_, Option<String>>(7)?,
        total_tokens: row.get::<_, Option<i64>>(8)?,
        total_cost_usd: row.get::<_, Option<f64>>(9)?,
        span_count: row.get::<_, i64>(10)? as usize,
        created_at: naive_to_utc(row.get::<_, NaiveDateTime>(11)?),
    })
}

fn span_from_row(row: &Row<'_>) -> duckdb::Result<SpanRecord> {
    Ok(SpanRecord {
        id: row.get::<_, String>(0)?,
        parent_span_id: row.get::<_, Option<String>>(1)?,
        name: row.get::<_, String>(2)?,
        span_type: parse_column(3, &row.get::<_, String>(3)?)?,
        start_time: naive_to_utc(row.get::<_, NaiveDateTime>(4)?),
        end_time: row.get::<_, Option<NaiveDateTime>>(5)?.map(naive_to_utc),
        duration_ms: row.get::<_, Option<i64>>(6)?,
        model: row.get::<_, Option<String>>(7)?,
        input_tokens: row.get::<_, Option<i64>>(8)?,
        output_tokens: row.get::<_, Option<i64>>(9)?,
        cost_usd: row.get::<_, Option<f64>>(10)?,
        input_data: json_column(11, row.get(11)?)?,
        output_data: json_column(12, row.get(12)?)?,
        status: parse_column(13, &row.get::<_, String>(13)?)?,
        error_message: row.get::<_, Option<String>>(14)?,
    })
}

#[cfg(test)]
mod tests {
    use agentscope_core::filter::{Period, TimeWindow};
    use agentscope_core::model::{Status, TraceRecord};
    use agentscope_core::query::{MetricsRequest, TracesRequest};
    use chrono::{Duration, Utc};

    use crate::Store;

    fn seed(store: &Store, project: &str, n: i64) -> Vec<TraceRecord> {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                let trace = testkit::simple_trace(project, &format!("run-{i}"), now, 100 * (i + 1));
                store
                    .insert_trace_at(&trace, now - Duration::minutes(n - i))
                    .unwrap();
                trace
            })
            .collect()
    }

    #[test]
    fn list_is_newest_first_and_paginated() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "p1", 5);
        seed(&store, "p2", 2);

        let all = store.list_traces(&TracesRequest::for_project("p1")).unwrap();
        let names = all.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["run-4", "run-3", "run-2", "run-1", "run-0"]);

        let page = store
            .list_traces(&TracesRequest {
                limit: 2,
                offset: 1,
                ..TracesRequest::for_project("p1")
            })
            .unwrap();
        let names = page.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["run-3", "run-2"]);
    }

    #[test]
    fn list_filters_by_status_and_window() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "p1", 3);
        store.insert_trace(&testkit::sample_trace("p1")).unwrap();

        let errors = store
            .list_traces(&TracesRequest {
                status: Some(Status::Error),
                ..TracesRequest::for_project("p1")
            })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "support_agent");

        let recent = store
            .list_traces(&TracesRequest {
                window: TimeWindow {
                    since: Some(Utc::now() - Duration::seconds(90)),
                    until: None,
                },
                ..TracesRequest::for_project("p1")
            })
            .unwrap();
        // run-2 (1 minute ago) and the sample trace (now)
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn detail_round_trips_spans_in_start_order() {
        let store = Store::open_in_memory().unwrap();
        let trace = testkit::sample_trace("p1");
        store.insert_trace(&trace).unwrap();

        let detail = store.get_trace(&trace.id).unwrap().unwrap();
        assert_eq!(detail.trace.id, trace.id);
        assert_eq!(detail.metadata, trace.metadata);
        let names = detail.spans.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["support_agent", "plan", "lookup_order", "apologize"]);

        let plan = &detail.spans[1];
        assert_eq!(plan.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(plan.duration_ms, Some(400));
        assert_eq!(plan.parent_span_id.as_deref(), Some(detail.spans[0].id.as_str()));
        assert_eq!(
            detail.spans[0].input_data,
            Some(serde_json::json!({"query": "where is my order?"}))
        );

        assert!(store.get_trace("missing").unwrap().is_none());
    }

    #[test]
    fn persisted_rollups_match_finalize_time_rollups() {
        let store = Store::open_in_memory().unwrap();
        let trace = testkit::sample_trace("p1");
        let at_finalize = trace.rollups();
        store.insert_trace(&trace).unwrap();

        let detail = store.get_trace(&trace.id).unwrap().unwrap();
        assert_eq!(detail.trace.span_count, at_finalize.span_count);
        assert_eq!(detail.trace.total_tokens, at_finalize.total_tokens);
        assert_eq!(detail.trace.total_cost_usd, at_finalize.total_cost_usd);
        assert_eq!(detail.spans.len(), detail.trace.span_count);
    }

    #[test]
    fn metrics_cover_only_the_period() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "p1", 5);
        let old = testkit::simple_trace("p1", "old", Utc::now(), 10);
        store
            .insert_trace_at(&old, Utc::now() - Duration::days(2))
            .unwrap();

        let m = store
            .project_metrics(&MetricsRequest {
                project_id: "p1".into(),
                period: Period::Hour,
            })
            .unwrap();
        assert_eq!(m.total_traces, 5);
        assert_eq!(m.success_count, 5);
        assert_eq!(m.p50_duration_ms, Some(300));
        assert_eq!(m.p95_duration_ms, Some(500));
        assert_eq!(m.avg_duration_ms, Some(300.0));
        assert_eq!(m.total_spans, 5);

        let week = store
            .project_metrics(&MetricsRequest {
                project_id: "p1".into(),
                period: Period::Week,
            })
            .unwrap();
        assert_eq!(week.total_traces, 6);
        assert!(week.period_start < m.period_start);
    }

    #[test]
    fn model_usage_reads_llm_spans_of_the_project() {
        let store = Store::open_in_memory().unwrap();
        store.insert_trace(&testkit::sample_trace("p1")).unwrap();
        store.insert_trace(&testkit::sample_trace("p1")).unwrap();
        store.insert_trace(&testkit::sample_trace("other")).unwrap();

        let usage = store
            .model_usage(&MetricsRequest {
                project_id: "p1".into(),
                period: Period::Day,
            })
            .unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].model, "gpt-4o-mini");
        assert_eq!(usage[0].call_count, 2);
        assert_eq!(usage[0].total_tokens, 300);
        assert_eq!(usage[0].avg_duration_ms, 400.0);
        assert_eq!(usage[1].model, "gpt-4o");
        assert_eq!(usage[1].total_tokens, 560);
        assert_eq!(usage[1].total_cost_usd, 0.021);
    }
}
