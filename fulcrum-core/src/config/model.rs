use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::server::Server;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default)]
    pub settings: BalancerSettings,
}

/// 服务发现配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryConfig {
    /// 固定服务器列表，每项为 `host`、`host:port`、`[ipv6]` 或 `[ipv6]:port`
    Static {
        #[serde(default)]
        servers: Vec<String>,
    },
    /// Consul 服务目录
    Consul {
        base_url: String,
        service: String,
        #[serde(default)]
        dc: Option<String>,
        #[serde(default)]
        near: Option<String>,
        #[serde(default)]
        tag: Option<String>,
        #[serde(default = "default_discovery_timeout")]
        timeout_seconds: u64,
    },
}

/// 健康探测配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    AlwaysAlive,
    Tcp {
        #[serde(default = "default_probe_timeout_ms")]
        timeout_ms: u64,
    },
    Http {
        #[serde(default)]
        secure: bool,
        #[serde(default = "default_probe_timeout_ms")]
        timeout_ms: u64,
    },
    /// 固定结果的模拟探测，用于测试和引导
    Fixed {
        #[serde(default = "default_true")]
        alive: bool,
        #[serde(default)]
        delay_ms: u64,
    },
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::Tcp {
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// 探测并发模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Sequential,
    ThreadPool {
        #[serde(default)]
        max_workers: Option<usize>,
    },
    ProcessPool {
        #[serde(default = "default_worker_path")]
        worker_path: PathBuf,
        #[serde(default)]
        max_workers: Option<usize>,
    },
    Cooperative,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::ThreadPool { max_workers: None }
    }
}

/// 选择策略
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    RoundRobin,
    Random,
}

/// 服务发现失败时的处理方式
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryFailurePolicy {
    /// 保留上一次的快照，只记录失败
    #[default]
    RetainStale,
    /// 保留上一次的快照，并把错误返回给刷新调用方
    Propagate,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BalancerSettings {
    #[serde(default = "default_true")]
    pub probe_on_start: bool,
    /// 定时刷新间隔，0 表示只按需刷新
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    #[serde(default)]
    pub discovery_failure: DiscoveryFailurePolicy,
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            probe_on_start: true,
            refresh_interval_seconds: default_refresh_interval(),
            discovery_failure: DiscoveryFailurePolicy::default(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_discovery_timeout() -> u64 {
    10
}

fn default_worker_path() -> PathBuf {
    PathBuf::from("fulcrum-probe-worker")
}

impl Config {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        self.validate_discovery()?;
        self.validate_probe()?;
        self.validate_strategy()?;
        Ok(())
    }

    fn validate_discovery(&self) -> Result<()> {
        match &self.discovery {
            DiscoveryConfig::Static { servers } => {
                for spec in servers {
                    if Server::parse(spec).is_none() {
                        anyhow::bail!("Invalid static server entry: '{}'", spec);
                    }
                }
            }
            DiscoveryConfig::Consul {
                base_url,
                service,
                timeout_seconds,
                ..
            } => {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    anyhow::bail!(
                        "Consul base_url has invalid format: '{}'. Must start with http:// or https://",
                        base_url
                    );
                }
                if service.is_empty() {
                    anyhow::bail!("Consul discovery has empty service name");
                }
                if *timeout_seconds == 0 {
                    anyhow::bail!("Consul discovery timeout must be greater than 0");
                }
            }
        }
        Ok(())
    }

    fn validate_probe(&self) -> Result<()> {
        match &self.probe {
            ProbeConfig::Tcp { timeout_ms } | ProbeConfig::Http { timeout_ms, .. } => {
                if *timeout_ms == 0 {
                    anyhow::bail!("Probe timeout must be greater than 0");
                }
            }
            ProbeConfig::AlwaysAlive | ProbeConfig::Fixed { .. } => {}
        }
        Ok(())
    }

    fn validate_strategy(&self) -> Result<()> {
        match &self.strategy {
            StrategyConfig::ThreadPool { max_workers }
            | StrategyConfig::ProcessPool { max_workers, .. } => {
                if *max_workers == Some(0) {
                    anyhow::bail!("Strategy max_workers must be greater than 0");
                }
            }
            StrategyConfig::Sequential | StrategyConfig::Cooperative => {}
        }

        if let StrategyConfig::ProcessPool { worker_path, .. } = &self.strategy {
            if worker_path.as_os_str().is_empty() {
                anyhow::bail!("Process pool strategy has empty worker_path");
            }
        }
        Ok(())
    }
}
