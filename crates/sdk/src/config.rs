use std::time::Duration;

use agentscope_core::Result;
use agentscope_core::config::Config;

use crate::capture::DEFAULT_MAX_PAYLOAD_BYTES;

/// The subset of [`Config`] the instrumentation side needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkConfig {
    pub endpoint: String,
    pub project_id: String,
    pub api_key: String,
    pub enabled: bool,
    pub debug: bool,
    pub submit_timeout: Duration,
    pub max_payload_bytes: usize,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SdkConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            project_id: cfg.project_id.clone(),
            api_key: cfg.effective_api_key(),
            enabled: cfg.enabled,
            debug: cfg.debug,
            submit_timeout: cfg.submit_timeout,
            max_payload_bytes: cfg.max_payload_bytes,
        }
    }

    /// Defaults, config file and `AGENTSCOPE_*` environment variables.
    pub fn load() -> Result<Self> {
        Ok(Self::from_config(&Config::load()?))
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(&Config::from_env()?))
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn payload_cap(&self) -> usize {
        if self.max_payload_bytes == 0 {
            DEFAULT_MAX_PAYLOAD_BYTES
        } else {
            self.max_payload_bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_from_config() {
        let cfg = Config {
            project_id: "support-bot".into(),
            api_key: None,
            ..Config::default()
        };
        let sdk = SdkConfig::from_config(&cfg);
        assert_eq!(sdk.project_id, "support-bot");
        assert_eq!(sdk.api_key, "support-bot");
        assert!(sdk.enabled);
    }

    #[test]
    fn builders_adjust_fields() {
        let sdk = SdkConfig::default()
            .with_project("p")
            .with_endpoint("http://127.0.0.1:9/")
            .with_api_key("sk_x")
            .disabled();
        assert_eq!(sdk.endpoint, "http://127.0.0.1:9");
        assert_eq!(sdk.api_key, "sk_x");
        assert!(!sdk.enabled);
    }
}
