//! Agent configuration
//!
//! Layered: config file (TOML or YAML), then environment / command line
//! overrides, then validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Directories searched for `config.{toml,yaml,yml}` when no path is given
pub const SEARCH_DIRS: &[&str] = &[".", "/etc/rayagent"];

const EXTENSIONS: &[&str] = &["toml", "yaml", "yml"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub raydash: RayDashConfig,

    #[serde(default)]
    pub v2ray: V2RayConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Control plane access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RayDashConfig {
    /// Base URL, e.g. `https://raydash.example.com/api`
    #[serde(default)]
    pub url: String,

    /// Node this agent manages
    #[serde(rename = "nodeID", default)]
    pub node_id: u64,

    /// Node token; sent as `Bearer node.<token>`
    #[serde(default)]
    pub token: String,

    /// Service poll interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
}

/// Proxy engine access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2RayConfig {
    /// gRPC API address, e.g. `127.0.0.1:10085`
    #[serde(default)]
    pub grpcaddr: String,

    /// Tag of the shared inbound in single-inbound mode
    #[serde(default = "default_inbound")]
    pub inbound: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for RayDashConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            node_id: 0,
            token: String::new(),
            interval: default_interval(),
        }
    }
}

impl Default for V2RayConfig {
    fn default() -> Self {
        Self {
            grpcaddr: String::new(),
            inbound: default_inbound(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_interval() -> u64 { 5 }
fn default_inbound() -> String { "rayagent".to_string() }
fn default_connect_timeout() -> u64 { 10 }
fn default_level() -> String { "info".to_string() }

/// Settings that can be given on the command line or through `RAYAGENT_*`
/// environment variables. Anything set here wins over the config file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Control plane base URL
    #[arg(long, env = "RAYAGENT_RAYDASH_URL")]
    pub raydash_url: Option<String>,

    /// Node ID
    #[arg(long, env = "RAYAGENT_RAYDASH_NODEID")]
    pub node_id: Option<u64>,

    /// Node token
    #[arg(long, env = "RAYAGENT_RAYDASH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Service poll interval in seconds
    #[arg(long, env = "RAYAGENT_RAYDASH_INTERVAL")]
    pub interval: Option<u64>,

    /// v2ray gRPC API address
    #[arg(long, env = "RAYAGENT_V2RAY_GRPCADDR")]
    pub grpc_addr: Option<String>,

    /// Shared inbound tag
    #[arg(long, env = "RAYAGENT_V2RAY_INBOUND")]
    pub inbound: Option<String>,

    /// Log level (debug, info, warn, error)
    #[arg(long, env = "RAYAGENT_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load a config file. The file must exist; callers with no file at
    /// all start from `Config::default()`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Parse `content` in the format named by `path`'s extension
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// First existing config file in `SEARCH_DIRS`
    pub fn discover() -> Option<PathBuf> {
        let dirs: Vec<PathBuf> = SEARCH_DIRS.iter().map(PathBuf::from).collect();
        Self::discover_in(&dirs)
    }

    pub fn discover_in(dirs: &[PathBuf]) -> Option<PathBuf> {
        dirs.iter()
            .flat_map(|dir| EXTENSIONS.iter().map(move |ext| dir.join(format!("config.{ext}"))))
            .find(|candidate| candidate.is_file())
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.raydash_url {
            self.raydash.url = url.clone();
        }
        if let Some(node_id) = overrides.node_id {
            self.raydash.node_id = node_id;
        }
        if let Some(token) = &overrides.token {
            self.raydash.token = token.clone();
        }
        if let Some(interval) = overrides.interval {
            self.raydash.interval = interval;
        }
        if let Some(addr) = &overrides.grpc_addr {
            self.v2ray.grpcaddr = addr.clone();
        }
        if let Some(inbound) = &overrides.inbound {
            self.v2ray.inbound = inbound.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.log.level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.raydash.url.is_empty() {
            return Err(ConfigError::Missing("raydash.url"));
        }
        if let Err(e) = reqwest::Url::parse(&self.raydash.url) {
            return Err(ConfigError::Invalid {
                field: "raydash.url",
                reason: e.to_string(),
            });
        }
        if self.raydash.node_id == 0 {
            return Err(ConfigError::Missing("raydash.nodeID"));
        }
        if self.raydash.token.is_empty() {
            return Err(ConfigError::Missing("raydash.token"));
        }
        if self.raydash.interval == 0 {
            return Err(ConfigError::Invalid {
                field: "raydash.interval",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.v2ray.grpcaddr.is_empty() {
            return Err(ConfigError::Missing("v2ray.grpcaddr"));
        }
        if self.v2ray.inbound.is_empty() {
            return Err(ConfigError::Missing("v2ray.inbound"));
        }
        if self.v2ray.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "v2ray.connect_timeout_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.raydash.interval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.v2ray.connect_timeout_secs)
    }
}
