use std::future::Future;
use std::net::SocketAddr;

use agentscope_core::config::Config;
use agentscope_core::error::{AgentscopeError, Result};
use agentscope_store::Store;

use crate::api;

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub listen_addr: SocketAddr,
    pub cors_origins: Vec<String>,
}

impl CollectorOptions {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let listen_addr = cfg.listen_addr.parse::<SocketAddr>().map_err(|e| {
            AgentscopeError::Config(format!("bad listen_addr {}: {e}", cfg.listen_addr))
        })?;
        Ok(Self {
            listen_addr,
            cors_origins: cfg.cors_origins.clone(),
        })
    }
}

/// Serves the collector API until ctrl-c.
pub async fn run_collector(store: Store, opts: CollectorOptions) -> Result<()> {
    run_collector_until(store, opts, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

pub async fn run_collector_until<F>(store: Store, opts: CollectorOptions, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = api::router(store, &opts.cors_origins);
    let listener = tokio::net::TcpListener::bind(opts.listen_addr)
        .await
        .map_err(|e| AgentscopeError::Io(format!("bind {} failed: {e}", opts.listen_addr)))?;
    let local = listener
        .local_addr()
        .map_err(|e| AgentscopeError::Io(e.to_string()))?;
    tracing::info!(addr = %local, "collector listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AgentscopeError::Internal(format!("collector server failed: {e}")))?;
    tracing::info!("collector stopped");
    Ok(())
}
