use std::time::Duration;

use agentscope::{LlmUsage, SpanKind, Tracer};
use serde_json::json;

const AGENTS: [&str; 5] = [
    "CustomerSupportAI",
    "TranslationBot",
    "DataAnalyzer",
    "RiskAssessor",
    "AutoCoder",
];
const MODELS: [&str; 4] = ["gpt-4o", "gpt-4o-mini", "claude-3-sonnet", "gpt-3.5-turbo"];
const COST_PER_1K_TOKENS: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub count: usize,
    pub interval: Duration,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DemoReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Shape of the `n`th demo run. Every tenth run fails in its tool call.
#[derive(Debug, Clone, PartialEq)]
struct Scenario {
    agent: &'static str,
    planner: &'static str,
    writer: &'static str,
    prompt_tokens: i64,
    steps: usize,
    fails: bool,
    latency: Duration,
}

impl Scenario {
    fn nth(n: usize) -> Self {
        let mix = n.wrapping_mul(2_654_435_761) >> 7;
        Self {
            agent: AGENTS[n % AGENTS.len()],
            planner: MODELS[mix % MODELS.len()],
            writer: MODELS[(mix / 3 + 1) % MODELS.len()],
            prompt_tokens: 100 + (mix % 1900) as i64,
            steps: 1 + mix % 3,
            fails: n % 10 == 9,
            latency: Duration::from_millis(20 + (mix % 80) as u64),
        }
    }
}

pub async fn run_demo(tracer: &Tracer, opts: &DemoOptions) -> DemoReport {
    let mut report = DemoReport::default();
    for n in 0..opts.count {
        let scenario = Scenario::nth(n);
        match run_agent(tracer, &scenario).await {
            Ok(_) => {
                report.succeeded += 1;
                println!("sent trace: {} (success)", scenario.agent);
            }
            Err(err) => {
                report.failed += 1;
                println!("sent trace: {} (error: {err})", scenario.agent);
            }
        }
        if !opts.interval.is_zero() && n + 1 < opts.count {
            tokio::time::sleep(opts.interval).await;
        }
    }
    report
}

async fn run_agent(tracer: &Tracer, scenario: &Scenario) -> anyhow::Result<String> {
    tracer
        .span(scenario.agent, SpanKind::Agent)
        .input(&json!({ "query": "hello" }))
        .run_async(async {
            let plan = llm_call(tracer, "plan", scenario.planner, scenario.prompt_tokens, scenario.latency).await;

            let mut findings = Vec::with_capacity(scenario.steps);
            for step in 0..scenario.steps {
                let finding = tool_call(tracer, step, scenario).await?;
                findings.push(finding);
            }

            let answer = llm_call(
                tracer,
                "respond",
                scenario.writer,
                scenario.prompt_tokens / 2 + 50 * findings.len() as i64,
                scenario.latency,
            )
            .await;
            Ok::<_, anyhow::Error>(format!("{plan} / {answer}"))
        })
        .await
}

async fn llm_call(tracer: &Tracer, name: &str, model: &str, tokens: i64, latency: Duration) -> String {
    let mut span = tracer
        .span(name, SpanKind::Llm)
        .input(&json!({ "model": model, "messages": [{"role": "user", "content": "hello"}] }))
        .enter();
    tokio::time::sleep(latency).await;

    let output_tokens = tokens / 2;
    let cost = (tokens + output_tokens) as f64 / 1000.0 * COST_PER_1K_TOKENS;
    span.set_llm(LlmUsage::new(model).tokens(tokens, output_tokens).cost(cost));
    span.set_output(&json!({ "response": "hi" }));
    format!("{model}:{name}")
}

async fn tool_call(tracer: &Tracer, step: usize, scenario: &Scenario) -> anyhow::Result<String> {
    let fails = scenario.fails && step + 1 == scenario.steps;
    tracer
        .span(format!("step_{}", step + 1), SpanKind::Tool)
        .input(&json!({ "step": step + 1 }))
        .run_async(async move {
            tokio::time::sleep(scenario.latency / 2).await;
            if fails {
                anyhow::bail!("Rate limit exceeded");
            }
            Ok::<_, anyhow::Error>(format!("result {}", step + 1))
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_run_in_ten_fails() {
        let failing = (0..100).filter(|n| Scenario::nth(*n).fails).count();
        assert_eq!(failing, 10);
        for n in 0..100 {
            let s = Scenario::nth(n);
            assert!((100..2000).contains(&s.prompt_tokens));
            assert!((1..=3).contains(&s.steps));
        }
    }

    #[tokio::test]
    async fn demo_builds_nested_traces() {
        let (tracer, sink) = Tracer::in_memory(agentscope::SdkConfig::default().with_project("demo"));
        let report = run_demo(
            &tracer,
            &DemoOptions {
                count: 10,
                interval: Duration::ZERO,
            },
        )
        .await;
        assert_eq!(report, DemoReport { succeeded: 9, failed: 1 });

        let traces = sink.take();
        assert_eq!(traces.len(), 10);
        for (n, trace) in traces.iter().enumerate() {
            let scenario = Scenario::nth(n);
            assert_eq!(trace.name, scenario.agent);
            assert_eq!(trace.project_id, "demo");

            let root = trace.spans.last().unwrap();
            assert_eq!(root.span_type, SpanKind::Agent);
            assert!(root.parent_span_id.is_none());
            assert!(
                trace.spans[..trace.spans.len() - 1]
                    .iter()
                    .all(|s| s.parent_span_id.as_deref() == Some(root.id.as_str()))
            );
            assert!(trace.total_tokens.unwrap_or(0) > 0);
        }
        assert_eq!(traces[9].status, agentscope::Status::Error);
        assert_eq!(traces[9].error_message.as_deref(), Some("Rate limit exceeded"));
    }
}
