use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use agentscope_core::model::TraceRecord;
use agentscope_core::{AgentscopeError, Result};
use reqwest::Client;
use tokio::sync::mpsc;

use crate::config::SdkConfig;

const QUEUE_DEPTH: usize = 256;

/// Ships a finished trace somewhere. Must not block the caller.
pub trait Submitter: Send + Sync {
    /// Returns whether the trace was accepted for delivery.
    fn submit(&self, trace: &TraceRecord) -> bool;

    /// Flushes anything still queued. Called once at process exit.
    fn shutdown(&self) {}
}

/// Posts traces to a collector from a dedicated worker thread.
pub struct HttpSubmitter {
    tx: Mutex<Option<mpsc::Sender<TraceRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HttpSubmitter {
    pub fn new(cfg: &SdkConfig) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<TraceRecord>(QUEUE_DEPTH);
        let url = format!("{}/api/v1/traces", cfg.endpoint.trim_end_matches('/'));
        let api_key = cfg.api_key.clone();
        let timeout = cfg.submit_timeout;

        let worker = std::thread::Builder::new()
            .name("agentscope-submit".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        tracing::warn!(error = ?err, "failed to start submit runtime; traces will be dropped");
                        return;
                    }
                };

                runtime.block_on(async move {
                    let client = Client::builder()
                        .timeout(timeout)
                        .build()
                        .unwrap_or_else(|e| {
                            tracing::warn!(error = ?e, "failed to build submit http client; using defaults");
                            Client::new()
                        });

                    while let Some(trace) = rx.recv().await {
                        post_trace(&client, &url, &api_key, &trace).await;
                    }
                });
            })
            .map_err(|e| AgentscopeError::Io(format!("spawn submit worker failed: {e}")))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl Submitter for HttpSubmitter {
    fn submit(&self, trace: &TraceRecord) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            tracing::debug!(trace_id = %trace.id, "submitter shut down; dropping trace");
            return false;
        };

        match tx.try_send(trace.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(trace_id = %trace.id, "submit queue full; dropping trace");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(trace_id = %trace.id, "submit worker gone; dropping trace");
                false
            }
        }
    }

    fn shutdown(&self) {
        // closing the channel lets the worker drain and exit
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker
            && worker.join().is_err()
        {
            tracing::warn!("submit worker panicked");
        }
    }
}

impl Drop for HttpSubmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn post_trace(client: &Client, url: &str, api_key: &str, trace: &TraceRecord) {
    let result = client
        .post(url)
        .header("X-API-KEY", api_key)
        .bearer_auth(api_key)
        .json(trace)
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(trace_id = %trace.id, spans = trace.spans.len(), "trace submitted");
        }
        Ok(resp) => {
            tracing::warn!(trace_id = %trace.id, status = %resp.status(), url = %url, "collector rejected trace");
        }
        Err(err) => {
            tracing::warn!(trace_id = %trace.id, error = ?err, url = %url, "trace submission failed");
        }
    }
}

/// Keeps submitted traces in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySubmitter {
    traces: Arc<Mutex<Vec<TraceRecord>>>,
}

impl MemorySubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<TraceRecord> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<TraceRecord> {
        std::mem::take(&mut *self.traces.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Submitter for MemorySubmitter {
    fn submit(&self, trace: &TraceRecord) -> bool {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(trace.clone());
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubmitter;

impl Submitter for NoopSubmitter {
    fn submit(&self, _trace: &TraceRecord) -> bool {
        false
    }
}
