use std::collections::HashMap;

use agentscope_core::model::{SpanRecord, Status};
use agentscope_core::query::{MetricsSummary, ModelUsage, TraceDetail, TraceListItem};
use chrono::SecondsFormat;
use owo_colors::OwoColorize;

pub fn print_traces_human(items: &[TraceListItem]) {
    for item in items {
        println!(
            "{} {} trace={} duration={} spans={} tokens={} cost={} name=\"{}\"",
            item.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            status_label(item.status),
            item.id,
            millis(item.duration_ms),
            item.span_count,
            opt(item.total_tokens),
            cost(item.total_cost_usd),
            item.name
        );
    }
    println!("-- {} traces --", items.len());
}

pub fn print_trace_human(detail: &TraceDetail) {
    let trace = &detail.trace;
    println!(
        "TRACE {} {} project={} duration={} spans={} tokens={} cost={}",
        trace.id.bold(),
        status_label(trace.status),
        trace.project_id,
        millis(trace.duration_ms),
        trace.span_count,
        opt(trace.total_tokens),
        cost(trace.total_cost_usd)
    );
    if let Some(err) = &trace.error_message {
        println!("error: {}", err.red());
    }
    if let Some(metadata) = &detail.metadata {
        println!("metadata={metadata}");
    }
    print_span_tree(&detail.spans);
}

pub fn print_metrics_human(m: &MetricsSummary) {
    println!(
        "window {} .. {}",
        m.period_start.to_rfc3339_opts(SecondsFormat::Secs, true),
        m.period_end.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    println!(
        "traces={} success={} error={} error_rate={:.2}%",
        m.total_traces, m.success_count, m.error_count, m.error_rate
    );
    println!(
        "duration avg={} p50={} p95={}",
        m.avg_duration_ms
            .map(|v| format!("{v:.2}ms"))
            .unwrap_or_else(|| "-".to_string()),
        millis(m.p50_duration_ms),
        millis(m.p95_duration_ms)
    );
    println!(
        "tokens={} cost=${:.4} spans={} spans/trace={:.2}",
        m.total_tokens, m.total_cost_usd, m.total_spans, m.avg_spans_per_trace
    );
}

pub fn print_models_human(models: &[ModelUsage]) {
    for usage in models {
        println!(
            "model={} calls={} tokens={} cost=${:.4} avg={:.2}ms",
            usage.model.cyan(),
            usage.call_count,
            usage.total_tokens,
            usage.total_cost_usd,
            usage.avg_duration_ms
        );
    }
    println!("-- {} models --", models.len());
}

fn status_label(status: Status) -> String {
    match status {
        Status::Success => "OK".green().to_string(),
        Status::Error => "ERROR".red().to_string(),
        Status::Running => "RUNNING".yellow().to_string(),
    }
}

fn millis(v: Option<i64>) -> String {
    v.map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string())
}

fn opt(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

fn cost(v: Option<f64>) -> String {
    v.map(|c| format!("${c:.4}"))
        .unwrap_or_else(|| "-".to_string())
}

fn print_span_tree(spans: &[SpanRecord]) {
    let mut children: HashMap<Option<&str>, Vec<&SpanRecord>> = HashMap::new();
    for span in spans {
        children
            .entry(span.parent_span_id.as_deref())
            .or_default()
            .push(span);
    }
    if let Some(roots) = children.get(&None) {
        for root in roots {
            print_node(root, &children, 0);
        }
    }
}

fn print_node(span: &SpanRecord, children: &HashMap<Option<&str>, Vec<&SpanRecord>>, depth: usize) {
    let indent = "  ".repeat(depth);
    let mut line = format!(
        "{indent}{} [{}] {} {}",
        span.name,
        span.span_type,
        millis(span.duration_ms),
        status_label(span.status)
    );
    if let Some(model) = &span.model {
        line.push_str(&format!(" model={} tokens={}", model.cyan(), opt(span.token_count())));
    }
    if let Some(err) = &span.error_message {
        line.push_str(&format!(" error=\"{err}\""));
    }
    println!("{line}");

    if let Some(kids) = children.get(&Some(span.id.as_str())) {
        for child in kids {
            print_node(child, children, depth + 1);
        }
    }
}
