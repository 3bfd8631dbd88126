use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use agentscope_core::model::{LlmUsage, Outcome, SpanKind, SpanRecord, TraceRecord};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// Agent run with an LLM call, a failing tool call and a retry, ending in error.
pub fn sample_trace(project_id: &str) -> TraceRecord {
    sample_trace_at(project_id, base_time())
}

pub fn sample_trace_at(project_id: &str, base: DateTime<Utc>) -> TraceRecord {
    let mut trace = TraceRecord::start(project_id, "support_agent");
    trace.start_time = base;
    trace.metadata = Some(json!({"user": "u-42"}));

    let mut root = SpanRecord::start_at("support_agent", SpanKind::Agent, None, base);
    root.input_data = Some(json!({"query": "where is my order?"}));

    let mut llm = SpanRecord::start_at(
        "plan",
        SpanKind::Llm,
        Some(root.id.clone()),
        base + Duration::milliseconds(10),
    );
    llm.apply_llm(LlmUsage::new("gpt-4o-mini").tokens(120, 30).cost(0.0021));
    llm.finish_at(Outcome::Success, base + Duration::milliseconds(410));

    let mut tool = SpanRecord::start_at(
        "lookup_order",
        SpanKind::Tool,
        Some(root.id.clone()),
        base + Duration::milliseconds(420),
    );
    tool.finish_at(
        Outcome::Error("order service timeout".into()),
        base + Duration::milliseconds(900),
    );

    let mut retry = SpanRecord::start_at(
        "apologize",
        SpanKind::Llm,
        Some(root.id.clone()),
        base + Duration::milliseconds(910),
    );
    retry.apply_llm(LlmUsage::new("gpt-4o").tokens(200, 80).cost(0.0105));
    retry.finish_at(Outcome::Success, base + Duration::milliseconds(1500));

    let outcome = Outcome::Error("order service timeout".into());
    root.finish_at(outcome.clone(), base + Duration::milliseconds(1510));

    // completion order: children before their parent
    trace.push_span(llm);
    trace.push_span(tool);
    trace.push_span(retry);
    trace.push_span(root);
    trace.finish_at(outcome, base + Duration::milliseconds(1510));
    trace
}

/// Successful single-span trace lasting `duration_ms`.
pub fn simple_trace(project_id: &str, name: &str, start: DateTime<Utc>, duration_ms: i64) -> TraceRecord {
    let mut trace = TraceRecord::start(project_id, name);
    trace.start_time = start;
    let end = start + Duration::milliseconds(duration_ms);

    let mut span = SpanRecord::start_at(name, SpanKind::Function, None, start);
    span.finish_at(Outcome::Success, end);
    trace.push_span(span);
    trace.finish_at(Outcome::Success, end);
    trace
}
