//! Configuration management for the DPE.
//!
//! Values come from three layers, later layers winning: built-in defaults, an
//! optional TOML file, and `DPE_*` environment variables.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub http: HttpConfig,
    pub dedup: DedupConfig,
    pub hub: HubConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// gRPC listen address for publisher sessions
    pub bind_addr: SocketAddr,
    /// Capacity of the shared inbound queue feeding the dedup worker
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address for the query API and subscription endpoint
    pub bind_addr: SocketAddr,
    /// Directory served under `/web`, if any
    pub web_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Number of recent records kept for partner lookups
    pub ring_capacity: usize,
    /// Seconds after which a partner's publication stops suppressing
    pub window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound frames buffered per subscriber before eviction
    pub subscriber_queue_capacity: usize,
    /// Published records buffered between the dedup worker and the hub
    pub publish_queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9009)),
            queue_capacity: 2_000_000,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            web_root: None,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 50,
            window_secs: 5,
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
            publish_queue_capacity: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

impl FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(CoreError::InvalidConfig {
                key: "logging.format".to_string(),
                reason: format!("unknown log format '{}'", other),
            }),
        }
    }
}

impl Config {
    /// Load a configuration file. Missing sections fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the effective configuration: defaults, then `path` if given,
    /// then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DPE_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DPE_BIND_RPC") {
            self.ingest.bind_addr = parse_var("DPE_BIND_RPC", &v)?;
        }
        if let Some(v) = lookup("DPE_INBOUND_QUEUE_CAPACITY") {
            self.ingest.queue_capacity = parse_var("DPE_INBOUND_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("DPE_BIND_HTTP") {
            self.http.bind_addr = parse_var("DPE_BIND_HTTP", &v)?;
        }
        if let Some(v) = lookup("DPE_SERVE_PATH") {
            self.http.web_root = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = lookup("DPE_RING_CAPACITY") {
            self.dedup.ring_capacity = parse_var("DPE_RING_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("DPE_DEDUP_WINDOW_SECS") {
            self.dedup.window_secs = parse_var("DPE_DEDUP_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("DPE_SUBSCRIBER_QUEUE_CAPACITY") {
            self.hub.subscriber_queue_capacity = parse_var("DPE_SUBSCRIBER_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("DPE_PUBLISH_QUEUE_CAPACITY") {
            self.hub.publish_queue_capacity = parse_var("DPE_PUBLISH_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("DPE_LOG_FORMAT") {
            self.logging.format = v.parse()?;
        }
        if let Some(v) = lookup("DPE_LOG_FILTER") {
            self.logging.filter = v;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("ingest.queue_capacity", self.ingest.queue_capacity),
            ("dedup.ring_capacity", self.dedup.ring_capacity),
            ("hub.subscriber_queue_capacity", self.hub.subscriber_queue_capacity),
            ("hub.publish_queue_capacity", self.hub.publish_queue_capacity),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(CoreError::InvalidConfig {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.dedup.window_secs == 0 {
            return Err(CoreError::InvalidConfig {
                key: "dedup.window_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| CoreError::InvalidConfig {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
