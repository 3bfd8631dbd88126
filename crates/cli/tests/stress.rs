use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serial_test::serial;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_agentscope")
}

fn spawn_collector(temp: &Path) -> (Child, String) {
    let port = free_port();
    let child = Command::new(bin())
        .arg("serve")
        .arg("--db-path")
        .arg(temp.join("agentscope-stress.duckdb"))
        .arg("--listen-addr")
        .arg(format!("127.0.0.1:{port}"))
        .env("AGENTSCOPE_CONFIG", temp.join("absent.toml"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn agentscope serve");
    (child, format!("http://127.0.0.1:{port}"))
}

async fn wait_ready(endpoint: &str, child: &mut Child) {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        assert!(
            child.try_wait().expect("try_wait").is_none(),
            "agentscope serve exited before ready"
        );
        if client
            .get(format!("{endpoint}/health"))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
        {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for collector");
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}

#[tokio::test]
#[serial]
#[ignore = "stress test; run manually"]
async fn stress_concurrent_submissions_and_metrics() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (mut child, endpoint) = spawn_collector(temp.path());
    wait_ready(&endpoint, &mut child).await;

    const WORKERS: usize = 40;
    const PER_WORKER: usize = 25;
    let expected = WORKERS * PER_WORKER;

    let client = reqwest::Client::new();
    let mut tasks = tokio::task::JoinSet::new();
    let start = Instant::now();
    for _ in 0..WORKERS {
        let client = client.clone();
        let endpoint = endpoint.clone();
        tasks.spawn(async move {
            for _ in 0..PER_WORKER {
                let trace = testkit::sample_trace("stress");
                let resp = client
                    .post(format!("{endpoint}/api/v1/traces"))
                    .header("X-API-KEY", "sk_stress")
                    .json(&trace)
                    .send()
                    .await
                    .expect("post trace");
                assert!(resp.status().is_success(), "ingest request failed");
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("join ingest task");
    }
    let ingest_elapsed = start.elapsed();

    let out = Command::new(bin())
        .arg("--json")
        .arg("--endpoint")
        .arg(&endpoint)
        .arg("metrics")
        .arg("--project")
        .arg("stress")
        .arg("--period")
        .arg("1h")
        .env("AGENTSCOPE_CONFIG", temp.path().join("absent.toml"))
        .output()
        .expect("metrics output");
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).expect("metrics json parse");
    assert_eq!(value["total_traces"].as_u64(), Some(expected as u64));
    assert_eq!(value["total_spans"].as_u64(), Some(4 * expected as u64));

    let _ = child.kill();
    let _ = child.wait();

    eprintln!("stress complete: {expected} traces in {ingest_elapsed:?}");
}
