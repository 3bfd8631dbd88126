use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentscopeError, Result};

/// Process configuration shared by the collector, the CLI and the SDK.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub listen_addr: String,
    pub endpoint: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub enabled: bool,
    pub debug: bool,
    pub submit_timeout: Duration,
    pub max_payload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home).join(".local/share"));

        Self {
            db_path: data_root.join("agentscope/agentscope.duckdb"),
            listen_addr: "127.0.0.1:8000".to_string(),
            endpoint: "http://localhost:8000".to_string(),
            project_id: "default".to_string(),
            api_key: None,
            enabled: true,
            debug: false,
            submit_timeout: Duration::from_secs(10),
            max_payload_bytes: 4096,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

impl Config {
    /// Defaults, then the config file, then the environment.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(file_overrides) = load_file_overrides(&config_file_path())? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        apply_overrides(&mut cfg, load_env_overrides()?, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        apply_overrides(&mut cfg, load_env_overrides()?, "environment")?;
        Ok(cfg)
    }

    /// Secret sent with submissions; falls back to the project id so that a
    /// freshly auto-provisioned project still has a stable key.
    pub fn effective_api_key(&self) -> String {
        self.api_key
            .clone()
            .unwrap_or_else(|| self.project_id.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    listen_addr: Option<String>,
    endpoint: Option<String>,
    project_id: Option<String>,
    api_key: Option<String>,
    enabled: Option<bool>,
    debug: Option<bool>,
    submit_timeout: Option<String>,
    max_payload_bytes: Option<usize>,
    cors_origins: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("AGENTSCOPE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("agentscope/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AgentscopeError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw).map_err(|e| {
        AgentscopeError::Config(format!("failed parsing {}: {e}", path.display()))
    })?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let max_payload_bytes = match env::var("AGENTSCOPE_MAX_PAYLOAD_BYTES") {
        Ok(v) => Some(v.parse::<usize>().map_err(|e| {
            AgentscopeError::Config(format!(
                "bad AGENTSCOPE_MAX_PAYLOAD_BYTES in environment: {e}"
            ))
        })?),
        Err(_) => None,
    };

    let enabled = env_flag("AGENTSCOPE_ENABLED")?;
    let debug = env_flag("AGENTSCOPE_DEBUG")?;

    Ok(ConfigOverrides {
        db_path: env::var("AGENTSCOPE_DB_PATH").ok().map(PathBuf::from),
        listen_addr: env::var("AGENTSCOPE_LISTEN_ADDR").ok(),
        endpoint: env::var("AGENTSCOPE_ENDPOINT").ok(),
        project_id: env::var("AGENTSCOPE_PROJECT_ID").ok(),
        api_key: env::var("AGENTSCOPE_API_KEY").ok(),
        enabled,
        debug,
        submit_timeout: env::var("AGENTSCOPE_SUBMIT_TIMEOUT").ok(),
        max_payload_bytes,
        cors_origins: env::var("AGENTSCOPE_CORS_ORIGINS").ok(),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.listen_addr {
        cfg.listen_addr = v;
    }
    if let Some(v) = overrides.endpoint {
        cfg.endpoint = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = overrides.project_id {
        cfg.project_id = v;
    }
    if let Some(v) = overrides.api_key {
        cfg.api_key = Some(v);
    }
    if let Some(v) = overrides.enabled {
        cfg.enabled = v;
    }
    if let Some(v) = overrides.debug {
        cfg.debug = v;
    }
    if let Some(v) = overrides.submit_timeout {
        cfg.submit_timeout = humantime::parse_duration(&v).map_err(|e| {
            AgentscopeError::Config(format!("bad submit_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.max_payload_bytes {
        cfg.max_payload_bytes = v;
    }
    if let Some(v) = overrides.cors_origins {
        cfg.cors_origins = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    Ok(())
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    match env::var(name) {
        Ok(v) => parse_flag(&v)
            .map(Some)
            .ok_or_else(|| AgentscopeError::Config(format!("bad {name} in environment: {v}"))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_collector() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_addr, "127.0.0.1:8000");
        assert_eq!(cfg.endpoint, "http://localhost:8000");
        assert_eq!(cfg.project_id, "default");
        assert!(cfg.enabled);
        assert!(!cfg.debug);
        assert_eq!(cfg.submit_timeout, Duration::from_secs(10));
    }

    #[test]
    fn parse_flag_variants() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn apply_file_overrides_updates_sdk_fields() {
        let mut cfg = Config::default();
        let file = ConfigOverrides {
            endpoint: Some("http://collector:8000/".to_string()),
            project_id: Some("support-bot".to_string()),
            api_key: Some("sk_demo_key_12345".to_string()),
            enabled: Some(false),
            debug: Some(true),
            submit_timeout: Some("3s".to_string()),
            cors_origins: Some("http://a.test, http://b.test,".to_string()),
            ..ConfigOverrides::default()
        };

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.endpoint, "http://collector:8000");
        assert_eq!(cfg.project_id, "support-bot");
        assert_eq!(cfg.effective_api_key(), "sk_demo_key_12345");
        assert!(!cfg.enabled);
        assert!(cfg.debug);
        assert_eq!(cfg.submit_timeout, Duration::from_secs(3));
        assert_eq!(cfg.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn file_overrides_parse_from_toml() {
        let parsed: ConfigOverrides = toml::from_str(
            "project_id = \"rag\"\nenabled = false\nmax_payload_bytes = 512\n",
        )
        .unwrap();
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, parsed, "config file").unwrap();
        assert_eq!(cfg.project_id, "rag");
        assert!(!cfg.enabled);
        assert_eq!(cfg.max_payload_bytes, 512);
    }

    #[test]
    fn bad_timeout_names_its_source() {
        let mut cfg = Config::default();
        let env = ConfigOverrides {
            submit_timeout: Some("soon".to_string()),
            ..ConfigOverrides::default()
        };
        let err = apply_overrides(&mut cfg, env, "environment").unwrap_err();
        assert!(err.to_string().contains("environment"));
    }

    #[test]
    fn api_key_falls_back_to_project_id() {
        let cfg = Config::default();
        assert_eq!(cfg.effective_api_key(), "default");
    }
}
