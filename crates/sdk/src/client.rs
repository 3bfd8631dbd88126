use agentscope_core::filter::Period;
use agentscope_core::model::{Status, TraceRecord};
use agentscope_core::query::{MetricsSummary, ModelUsage, TraceDetail, TraceListItem};
use agentscope_core::{AgentscopeError, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::SdkConfig;

/// Query parameters for [`CollectorClient::list_traces`].
#[derive(Debug, Clone, Default)]
pub struct TraceListParams {
    pub status: Option<Status>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Async client for a collector's HTTP API.
#[derive(Debug, Clone)]
pub struct CollectorClient {
    http: Client,
    endpoint: String,
    project_id: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

impl CollectorClient {
    pub fn new(cfg: &SdkConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.submit_timeout)
            .build()
            .map_err(|e| AgentscopeError::Internal(format!("build http client failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            project_id: cfg.project_id.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub async fn health(&self) -> Result<bool> {
        let resp = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .map_err(transport_error)?;
        Ok(resp.status().is_success())
    }

    /// Synchronous-ack counterpart of the fire-and-forget submitter.
    pub async fn send_trace(&self, trace: &TraceRecord) -> Result<TraceListItem> {
        let req = self
            .http
            .post(self.url("/api/v1/traces"))
            .header("X-API-KEY", &self.api_key)
            .json(trace);
        self.fetch(req).await
    }

    pub async fn list_traces(&self, params: &TraceListParams) -> Result<Vec<TraceListItem>> {
        let mut query = vec![("project_id", self.project_id.clone())];
        if let Some(status) = params.status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(limit) = params.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = params.offset {
            query.push(("offset", offset.to_string()));
        }

        let req = self.http.get(self.url("/api/v1/traces")).query(&query);
        self.fetch(req).await
    }

    pub async fn get_trace(&self, trace_id: &str) -> Result<TraceDetail> {
        let req = self.http.get(self.url(&format!("/api/v1/traces/{trace_id}")));
        self.fetch(req).await
    }

    pub async fn metrics(&self, period: Period) -> Result<MetricsSummary> {
        let req = self
            .http
            .get(self.url("/api/v1/metrics"))
            .query(&[("project_id", self.project_id.as_str()), ("period", period.as_str())]);
        self.fetch(req).await
    }

    pub async fn model_usage(&self, period: Period) -> Result<Vec<ModelUsage>> {
        let req = self
            .http
            .get(self.url("/api/v1/metrics/models"))
            .query(&[("project_id", self.project_id.as_str()), ("period", period.as_str())]);
        self.fetch(req).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| AgentscopeError::Parse(format!("decode collector response failed: {e}")));
        }

        let detail = match resp.json::<ErrorBody>().await {
            Ok(body) => body.detail,
            Err(_) => status.to_string(),
        };
        Err(match status {
            StatusCode::UNAUTHORIZED => AgentscopeError::Unauthorized(detail),
            StatusCode::NOT_FOUND => AgentscopeError::NotFound(detail),
            StatusCode::CONFLICT => AgentscopeError::Conflict(detail),
            StatusCode::BAD_REQUEST => AgentscopeError::InvalidArgument(detail),
            _ => AgentscopeError::Internal(format!("collector returned {status}: {detail}")),
        })
    }
}

fn transport_error(err: reqwest::Error) -> AgentscopeError {
    AgentscopeError::Io(format!("collector request failed: {err}"))
}
