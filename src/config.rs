use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::services::discovery::{RegistrationKey, ServiceDef};
use crate::services::discovery::key::KEY_SEPARATOR;
use crate::services::registration::RegistrationConfig;

/// 指向 TOML 配置文件的环境变量；未设置时从环境变量读取配置
pub const CONFIG_FILE_ENV: &str = "HTTPSD_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid environment configuration: {0}")]
    Env(#[from] envy::Error),

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// etcd 节点地址，环境变量中以逗号分隔
    pub etcd_servers: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    #[serde(default = "default_renew_interval_secs")]
    pub renew_interval_secs: u64,
    #[serde(default = "default_max_renewal_failures")]
    pub max_renewal_failures: u32,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    // 自身存在标记
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_job")]
    pub job: String,
    #[serde(default = "default_instance")]
    pub instance: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,
}

fn default_port() -> u16 {
    8080
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_discovery_prefix() -> String {
    KEY_SEPARATOR.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_lease_ttl_secs() -> u64 {
    15
}

fn default_renew_interval_secs() -> u64 {
    5
}

fn default_max_renewal_failures() -> u32 {
    3
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_category() -> String {
    "discovery".to_string()
}

fn default_job() -> String {
    "etcd-httpsd".to_string()
}

fn default_instance() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_metrics_url() -> String {
    "/metrics".to_string()
}

impl Config {
    /// 优先从 `HTTPSD_CONFIG` 指定的 TOML 文件加载，否则读取环境变量，并校验结果
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => envy::from_env::<Config>()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.etcd_servers.iter().all(|endpoint| endpoint.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "at least one etcd endpoint is required".to_string(),
            ));
        }
        for (name, segment) in [
            ("category", &self.category),
            ("job", &self.job),
            ("instance", &self.instance),
        ] {
            if segment.is_empty() || segment.contains(KEY_SEPARATOR) {
                return Err(ConfigError::Invalid(format!(
                    "{name} {segment:?} must be non-empty and must not contain {KEY_SEPARATOR:?}"
                )));
            }
        }
        self.registration()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.etcd_servers
            .iter()
            .map(|endpoint| endpoint.trim().to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .collect()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn registration(&self) -> RegistrationConfig {
        RegistrationConfig {
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
            renew_interval: Duration::from_secs(self.renew_interval_secs),
            max_renewal_failures: self.max_renewal_failures,
            key: RegistrationKey::format(&self.category, &self.job, &self.instance),
            service: ServiceDef {
                service_port: i64::from(self.port),
                metrics_port: i64::from(self.metrics_port.unwrap_or(self.port)),
                metrics_url: self.metrics_url.clone(),
            },
        }
    }
}
