use anyhow::{Context, Result};
use fulcrum_core::{
    Config, ConsulServerSource, DiscoveryConfig, PolicyKind, Server, ServerSource,
    StaticServerSource, StrategyConfig,
};
use std::sync::Arc;
use std::time::Duration;

use super::balancer::{Balancer, RefreshHandle};
use super::policy::{RandomPolicy, RoundRobinPolicy, SelectionPolicy};
use super::probe::build_probe;
use super::process::ProcessPoolStrategy;
use super::strategy::{CooperativeStrategy, ProbeStrategy, SequentialStrategy, ThreadPoolStrategy};

/// 负载均衡器工厂
/// 根据配置创建服务器来源、探测、探测策略和选择策略
pub struct BalancerFactory;

impl BalancerFactory {
    /// 根据配置创建负载均衡器
    pub async fn from_config(config: &Config) -> Result<Balancer> {
        config.validate()?;

        let balancer = Balancer::builder(Self::create_source(&config.discovery)?)
            .probe(build_probe(&config.probe))
            .strategy(Self::create_strategy(&config.strategy))
            .policy(Self::create_policy(&config.policy))
            .probe_on_start(config.settings.probe_on_start)
            .discovery_failure(config.settings.discovery_failure)
            .build()
            .await
            .context("Failed to build balancer")?;

        Ok(balancer)
    }

    /// 创建负载均衡器，并在配置了刷新间隔时启动定时刷新
    pub async fn start(config: &Config) -> Result<(Balancer, Option<RefreshHandle>)> {
        let balancer = Self::from_config(config).await?;

        let handle = match config.settings.refresh_interval_seconds {
            0 => None,
            seconds => Some(balancer.spawn_refresh_loop(Duration::from_secs(seconds))),
        };

        Ok((balancer, handle))
    }

    /// 创建服务器来源
    pub fn create_source(discovery: &DiscoveryConfig) -> Result<Arc<dyn ServerSource>> {
        match discovery {
            DiscoveryConfig::Static { servers } => {
                let servers = servers
                    .iter()
                    .map(|spec| {
                        Server::parse(spec)
                            .with_context(|| format!("Invalid static server entry: '{}'", spec))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(StaticServerSource::from_servers(servers)))
            }
            DiscoveryConfig::Consul {
                base_url,
                service,
                dc,
                near,
                tag,
                timeout_seconds,
            } => {
                let mut source = ConsulServerSource::new(
                    base_url.as_str(),
                    service.as_str(),
                    Duration::from_secs(*timeout_seconds),
                )?;
                if let Some(dc) = dc {
                    source = source.with_datacenter(dc.as_str());
                }
                if let Some(near) = near {
                    source = source.with_near(near.as_str());
                }
                if let Some(tag) = tag {
                    source = source.with_tag(tag.as_str());
                }
                Ok(Arc::new(source))
            }
        }
    }

    /// 创建探测策略
    pub fn create_strategy(strategy: &StrategyConfig) -> Arc<dyn ProbeStrategy> {
        match strategy {
            StrategyConfig::Sequential => Arc::new(SequentialStrategy),
            StrategyConfig::ThreadPool { max_workers } => match max_workers {
                Some(n) => Arc::new(ThreadPoolStrategy::with_max_workers(*n)),
                None => Arc::new(ThreadPoolStrategy::new()),
            },
            StrategyConfig::ProcessPool {
                worker_path,
                max_workers,
            } => {
                let pool = ProcessPoolStrategy::new(worker_path.clone());
                match max_workers {
                    Some(n) => Arc::new(pool.with_max_workers(*n)),
                    None => Arc::new(pool),
                }
            }
            StrategyConfig::Cooperative => Arc::new(CooperativeStrategy),
        }
    }

    /// 创建选择策略
    pub fn create_policy(policy: &PolicyKind) -> Arc<dyn SelectionPolicy> {
        match policy {
            PolicyKind::RoundRobin => Arc::new(RoundRobinPolicy::new()),
            PolicyKind::Random => Arc::new(RandomPolicy::new()),
        }
    }
}
