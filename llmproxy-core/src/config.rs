use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ProxyError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, rename = "config")]
    pub settings: std::collections::BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    Priority,
    RoundRobin,
    LeastLoad,
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        RoutingStrategy::Priority
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoutingCfg {
    #[serde(default)]
    pub strategy: RoutingStrategy,
    #[serde(default = "default_true")]
    pub fallback: bool,
}

impl Default for RoutingCfg {
    fn default() -> Self {
        RoutingCfg {
            strategy: RoutingStrategy::default(),
            fallback: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    #[serde(default)]
    pub routing: RoutingCfg,
    #[serde(default)]
    pub http: HttpCfg,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            providers: Vec::new(),
            routing: RoutingCfg::default(),
            http: HttpCfg::default(),
        }
    }
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(ProxyError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| ProxyError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| ProxyError::Other(e.into()))?
            }
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| ProxyError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| ProxyError::Other(e.into()))
                .or_else(|_| toml::from_str::<Self>(s).map_err(|e| ProxyError::Other(e.into())))?,
        };
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sample configuration used by the `config` CLI subcommand, mirroring
    /// the two-provider example the original proxy shipped: a cloud-hosted
    /// runtime at higher priority, a local one as a lower-priority fallback.
    pub fn sample() -> Self {
        let mut cloud_settings = std::collections::BTreeMap::new();
        cloud_settings.insert(
            "host".to_string(),
            serde_json::Value::String("https://ollama.com".to_string()),
        );
        let mut local_settings = std::collections::BTreeMap::new();
        local_settings.insert(
            "host".to_string(),
            serde_json::Value::String("http://localhost:11434".to_string()),
        );
        Config {
            host: default_host(),
            port: default_port(),
            providers: vec![
                ProviderSpec {
                    name: "runtime-cloud".to_string(),
                    kind: "local".to_string(),
                    enabled: true,
                    priority: 10,
                    settings: cloud_settings,
                },
                ProviderSpec {
                    name: "runtime-local".to_string(),
                    kind: "local".to_string(),
                    enabled: true,
                    priority: 5,
                    settings: local_settings,
                },
            ],
            routing: RoutingCfg {
                strategy: RoutingStrategy::Priority,
                fallback: true,
            },
            http: HttpCfg::default(),
        }
    }
}
