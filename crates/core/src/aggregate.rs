//! Metric aggregation over persisted traces and spans.
//!
//! Everything here is a pure function of its inputs. Missing optional numbers are
//! treated as zero/absent and rounding is applied only when building the output.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::span::{SpanKind, SpanRecord, Status};
use crate::query::{MetricsSummary, ModelUsage, TraceListItem};

pub fn compute_metrics(
    traces: &[TraceListItem],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> MetricsSummary {
    let total_traces = traces.len();
    let success_count = traces
        .iter()
        .filter(|t| t.status == Status::Success)
        .count();
    let error_count = traces.iter().filter(|t| t.status == Status::Error).count();
    let error_rate = if total_traces == 0 {
        0.0
    } else {
        error_count as f64 / total_traces as f64 * 100.0
    };

    let mut durations = traces
        .iter()
        .filter_map(|t| t.duration_ms)
        .collect::<Vec<_>>();
    durations.sort_unstable();
    let avg_duration_ms = mean(&durations);

    let total_tokens = traces
        .iter()
        .map(|t| t.total_tokens.unwrap_or(0))
        .fold(0i64, i64::saturating_add);
    let total_cost_usd = traces
        .iter()
        .map(|t| t.total_cost_usd.unwrap_or(0.0))
        .sum::<f64>();

    let total_spans = traces.iter().map(|t| t.span_count).sum::<usize>();
    let avg_spans_per_trace = if total_traces == 0 {
        0.0
    } else {
        total_spans as f64 / total_traces as f64
    };

    MetricsSummary {
        period_start,
        period_end,
        total_traces,
        success_count,
        error_count,
        error_rate: round_to(error_rate, 2),
        avg_duration_ms: avg_duration_ms.map(|v| round_to(v, 2)),
        p50_duration_ms: percentile(&durations, 0.50),
        p95_duration_ms: percentile(&durations, 0.95),
        total_tokens,
        total_cost_usd: round_to(total_cost_usd, 4),
        total_spans,
        avg_spans_per_trace: round_to(avg_spans_per_trace, 2),
    }
}

#[derive(Default)]
struct ModelAccumulator {
    call_count: usize,
    total_tokens: i64,
    total_cost_usd: f64,
    durations: Vec<i64>,
}

/// Per-model usage of LLM spans, busiest model first.
pub fn compute_model_usage(spans: &[SpanRecord]) -> Vec<ModelUsage> {
    let mut order: Vec<(String, ModelAccumulator)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for span in spans {
        if span.span_type != SpanKind::Llm {
            continue;
        }
        let Some(model) = &span.model else {
            continue;
        };

        let slot = *index.entry(model.clone()).or_insert_with(|| {
            order.push((model.clone(), ModelAccumulator::default()));
            order.len() - 1
        });
        let acc = &mut order[slot].1;
        acc.call_count += 1;
        acc.total_tokens = acc
            .total_tokens
            .saturating_add(span.token_count().unwrap_or(0));
        acc.total_cost_usd += span.cost_usd.unwrap_or(0.0);
        if let Some(duration) = span.duration_ms {
            acc.durations.push(duration);
        }
    }

    let mut usage = order
        .into_iter()
        .map(|(model, acc)| ModelUsage {
            model,
            call_count: acc.call_count,
            total_tokens: acc.total_tokens,
            total_cost_usd: round_to(acc.total_cost_usd, 4),
            avg_duration_ms: round_to(mean(&acc.durations).unwrap_or(0.0), 2),
        })
        .collect::<Vec<_>>();
    // stable: ties keep encounter order
    usage.sort_by_key(|u| Reverse(u.call_count));
    usage
}

/// Index `floor(pct * n)` into an ascending slice, clamped to the last element.
/// No interpolation, so the median of an even-sized set is the upper middle value.
pub fn percentile(sorted: &[i64], pct: f64) -> Option<i64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (sorted.len() as f64 * pct).floor() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::model::span::{LlmUsage, Outcome};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn item(status: Status, duration_ms: Option<i64>) -> TraceListItem {
        TraceListItem {
            id: crate::ids::new_trace_id(),
            project_id: "p1".into(),
            name: "run".into(),
            start_time: base(),
            end_time: duration_ms.map(|d| base() + Duration::milliseconds(d)),
            duration_ms,
            status,
            error_message: None,
            total_tokens: None,
            total_cost_usd: None,
            span_count: 0,
            created_at: base(),
        }
    }

    fn llm(model: &str, input: i64, output: i64, cost: f64, duration_ms: i64) -> SpanRecord {
        let mut span = SpanRecord::start_at("chat", SpanKind::Llm, None, base());
        span.apply_llm(LlmUsage::new(model).tokens(input, output).cost(cost));
        span.finish_at(Outcome::Success, base() + Duration::milliseconds(duration_ms));
        span
    }

    #[test]
    fn empty_input_yields_zeroes_and_nulls() {
        let m = compute_metrics(&[], base(), base());
        assert_eq!(m.total_traces, 0);
        assert_eq!(m.error_rate, 0.0);
        assert_eq!(m.avg_duration_ms, None);
        assert_eq!(m.p50_duration_ms, None);
        assert_eq!(m.p95_duration_ms, None);
        assert_eq!(m.total_tokens, 0);
        assert_eq!(m.total_cost_usd, 0.0);
        assert_eq!(m.avg_spans_per_trace, 0.0);
    }

    #[test]
    fn percentiles_use_floor_index() {
        let traces = [300, 100, 500, 200, 400]
            .into_iter()
            .map(|d| item(Status::Success, Some(d)))
            .collect::<Vec<_>>();
        let m = compute_metrics(&traces, base(), base());
        assert_eq!(m.p50_duration_ms, Some(300));
        assert_eq!(m.p95_duration_ms, Some(500));
        assert_eq!(m.avg_duration_ms, Some(300.0));
    }

    #[test]
    fn even_sized_median_picks_upper_middle() {
        assert_eq!(percentile(&[10, 20, 30, 40], 0.5), Some(30));
        assert_eq!(percentile(&[10], 0.95), Some(10));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn counts_statuses_and_error_rate() {
        let traces = vec![
            item(Status::Success, Some(10)),
            item(Status::Error, Some(20)),
            item(Status::Error, None),
            item(Status::Running, None),
            item(Status::Success, Some(30)),
            item(Status::Success, Some(40)),
        ];
        let m = compute_metrics(&traces, base(), base());
        assert_eq!(m.total_traces, 6);
        assert_eq!(m.success_count, 3);
        assert_eq!(m.error_count, 2);
        assert_eq!(m.error_rate, 33.33);
        assert_eq!(m.avg_duration_ms, Some(25.0));
    }

    #[test]
    fn sums_rollups_treating_null_as_zero() {
        let mut a = item(Status::Success, Some(10));
        a.total_tokens = Some(120);
        a.total_cost_usd = Some(0.012345);
        a.span_count = 3;
        let mut b = item(Status::Success, Some(10));
        b.span_count = 2;
        let m = compute_metrics(&[a, b], base(), base());
        assert_eq!(m.total_tokens, 120);
        assert_eq!(m.total_cost_usd, 0.0123);
        assert_eq!(m.total_spans, 5);
        assert_eq!(m.avg_spans_per_trace, 2.5);
    }

    #[test]
    fn model_usage_groups_and_orders() {
        let spans = vec![
            llm("a", 60, 40, 0.1, 100),
            llm("b", 10, 0, 0.01, 50),
            llm("a", 50, 0, 0.05, 300),
        ];
        let usage = compute_model_usage(&spans);
        assert_eq!(
            usage.iter().map(|u| u.model.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(usage[0].call_count, 2);
        assert_eq!(usage[0].total_tokens, 150);
        assert_eq!(usage[0].total_cost_usd, 0.15);
        assert_eq!(usage[0].avg_duration_ms, 200.0);
        assert_eq!(usage[1].call_count, 1);
        assert_eq!(usage[1].total_tokens, 10);
        assert_eq!(usage[1].total_cost_usd, 0.01);
    }

    #[test]
    fn token_totals_saturate() {
        let usage = compute_model_usage(&[llm("a", i64::MAX, 1, 0.0, 10), llm("a", 5, 5, 0.0, 10)]);
        assert_eq!(usage[0].total_tokens, i64::MAX);

        let mut big = item(Status::Success, Some(10));
        big.total_tokens = Some(i64::MAX);
        let mut more = item(Status::Success, Some(20));
        more.total_tokens = Some(10);
        let summary = compute_metrics(&[big, more], base(), base());
        assert_eq!(summary.total_tokens, i64::MAX);
        assert_eq!(summary.avg_duration_ms, Some(15.0));
    }

    #[test]
    fn model_usage_ties_keep_encounter_order() {
        let spans = vec![
            llm("zeta", 1, 1, 0.0, 10),
            llm("alpha", 1, 1, 0.0, 10),
            llm("alpha", 1, 1, 0.0, 10),
            llm("zeta", 1, 1, 0.0, 10),
            llm("mid", 1, 1, 0.0, 10),
        ];
        let usage = compute_model_usage(&spans);
        assert_eq!(
            usage.iter().map(|u| u.model.as_str()).collect::<Vec<_>>(),
            vec!["zeta", "alpha", "mid"]
        );
    }

    #[test]
    fn model_usage_skips_non_llm_and_missing_fields() {
        let mut tool = SpanRecord::start_at("search", SpanKind::Tool, None, base());
        tool.model = Some("a".into());
        let no_model = SpanRecord::start_at("chat", SpanKind::Llm, None, base());
        let mut sparse = SpanRecord::start_at("chat", SpanKind::Llm, None, base());
        sparse.model = Some("a".into());

        let usage = compute_model_usage(&[tool, no_model, sparse]);
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].call_count, 1);
        assert_eq!(usage[0].total_tokens, 0);
        assert_eq!(usage[0].total_cost_usd, 0.0);
        assert_eq!(usage[0].avg_duration_ms, 0.0);
    }
}
