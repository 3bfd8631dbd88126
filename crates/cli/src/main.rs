mod demo;
mod output;
mod telemetry;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use agentscope::{CollectorClient, SdkConfig, TraceListParams, Tracer};
use agentscope_collector::CollectorOptions;
use agentscope_core::config::Config;
use agentscope_core::filter::Period;
use agentscope_core::model::Status;
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::demo::{DemoOptions, run_demo};
use crate::output::{print_metrics_human, print_models_human, print_trace_human, print_traces_human};
use crate::telemetry::{init_cli_tracing, init_serve_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "agentscope")]
#[command(about = "Trace collector and query tool for LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Collector base URL")]
    endpoint: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the collector")]
    Serve {
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long)]
        listen_addr: Option<String>,
    },
    #[command(about = "List recent traces of a project")]
    Traces {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    #[command(about = "Show one trace with its span tree")]
    Trace { trace_id: String },
    #[command(about = "Aggregate metrics for a project")]
    Metrics {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "24h", help = "1h, 24h, 7d or 30d")]
        period: String,
    },
    #[command(about = "Per-model LLM usage for a project")]
    Models {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "24h", help = "1h, 24h, 7d or 30d")]
        period: String,
    },
    #[command(about = "Send instrumented demo traces to the collector")]
    Demo {
        #[arg(long, default_value_t = 20)]
        count: usize,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "0s", help = "Pause between traces (e.g. 2s)")]
        interval: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            db_path,
            listen_addr,
        } => run_serve(db_path, listen_addr).await,
        Commands::Traces {
            project,
            status,
            limit,
            offset,
        } => {
            init_cli_tracing();
            let client = query_client(cli.endpoint, project)?;
            let params = TraceListParams {
                status: status
                    .as_deref()
                    .map(Status::from_str)
                    .transpose()
                    .context("parse --status")?,
                limit: Some(limit),
                offset: Some(offset),
            };
            let items = client.list_traces(&params).await?;
            print_or_json(&items, cli.json, |v| print_traces_human(v))
        }
        Commands::Trace { trace_id } => {
            init_cli_tracing();
            let client = query_client(cli.endpoint, None)?;
            let detail = client.get_trace(&trace_id).await?;
            print_or_json(&detail, cli.json, print_trace_human)
        }
        Commands::Metrics { project, period } => {
            init_cli_tracing();
            let client = query_client(cli.endpoint, project)?;
            let summary = client.metrics(parse_period(&period)?).await?;
            print_or_json(&summary, cli.json, print_metrics_human)
        }
        Commands::Models { project, period } => {
            init_cli_tracing();
            let client = query_client(cli.endpoint, project)?;
            let usage = client.model_usage(parse_period(&period)?).await?;
            print_or_json(&usage, cli.json, |v| print_models_human(v))
        }
        Commands::Demo {
            count,
            project,
            interval,
        } => {
            init_cli_tracing();
            let interval = agentscope_core::time::parse_duration_str(&interval)
                .context("parse --interval")?;
            run_demo_command(cli.endpoint, project, count, interval, cli.json).await
        }
    }
}

async fn run_serve(db_path: Option<PathBuf>, listen_addr: Option<String>) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = db_path {
        cfg.db_path = v;
    }
    if let Some(v) = listen_addr {
        cfg.listen_addr = v;
    }

    init_serve_tracing();
    let opts = CollectorOptions::from_config(&cfg)?;
    let store = agentscope_store::Store::open(&cfg.db_path)
        .with_context(|| format!("open store at {}", cfg.db_path.display()))?;

    eprintln!("agentscope serve");
    eprintln!("  db: {}", cfg.db_path.display());
    eprintln!("  listen: http://{}", opts.listen_addr);
    eprintln!("  cors: {}", opts.cors_origins.join(", "));
    eprintln!("  tip: run `agentscope demo` in another shell");

    let result = agentscope_collector::run_collector(store, opts).await;
    shutdown_tracing();
    result.map_err(Into::into)
}

async fn run_demo_command(
    endpoint: Option<String>,
    project: Option<String>,
    count: usize,
    interval: Duration,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = sdk_config(endpoint, project)?;
    let client = CollectorClient::new(&cfg)?;
    if !client.health().await.unwrap_or(false) {
        anyhow::bail!("collector at {} is not reachable", cfg.endpoint);
    }

    let tracer = Tracer::http(cfg)?;
    let report = run_demo(&tracer, &DemoOptions { count, interval }).await;
    // the submit worker joins on shutdown; keep it off the async runtime
    tokio::task::spawn_blocking(move || tracer.shutdown())
        .await
        .context("flush demo traces")?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "succeeded": report.succeeded, "failed": report.failed })
        );
    } else {
        println!(
            "-- {} traces sent ({} succeeded, {} failed) --",
            report.succeeded + report.failed,
            report.succeeded,
            report.failed
        );
    }
    Ok(())
}

fn sdk_config(endpoint: Option<String>, project: Option<String>) -> anyhow::Result<SdkConfig> {
    let mut cfg = SdkConfig::load().context("load config")?;
    if let Some(endpoint) = endpoint {
        cfg = cfg.with_endpoint(endpoint);
    }
    if let Some(project) = project {
        cfg = cfg.with_project(project);
    }
    Ok(cfg)
}

fn query_client(endpoint: Option<String>, project: Option<String>) -> anyhow::Result<CollectorClient> {
    let cfg = sdk_config(endpoint, project)?;
    Ok(CollectorClient::new(&cfg)?)
}

fn parse_period(raw: &str) -> anyhow::Result<Period> {
    Period::from_str(raw).context("parse --period")
}

fn print_or_json<T: Serialize>(value: &T, json: bool, human: impl Fn(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}
