use chrono::{DateTime, Utc};
use fulcrum_core::{BalancerResult, DiscoveryFailurePolicy, Server, ServerSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::policy::{RoundRobinPolicy, SelectionPolicy};
use super::probe::{AlwaysAliveProbe, HealthProbe};
use super::snapshot::{Snapshot, SnapshotCell};
use super::strategy::{ProbeStrategy, SequentialStrategy};

/// 负载均衡器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerState {
    /// 尚未完成任何刷新
    Uninitialized,
    /// 至少完成过一次刷新
    Ready,
}

/// 负载均衡器统计
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BalancerStats {
    pub total_servers: usize,
    pub alive_servers: usize,
    pub refresh_count: u64,
    pub discovery_failures: u64,
    pub last_probe_duration: Option<Duration>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_discovery_error: Option<String>,
}

struct BalancerInner {
    source: Arc<dyn ServerSource>,
    probe: Arc<dyn HealthProbe>,
    strategy: Arc<dyn ProbeStrategy>,
    policy: Arc<dyn SelectionPolicy>,
    snapshots: SnapshotCell,
    failure_policy: DiscoveryFailurePolicy,
    stats: Mutex<BalancerStats>,
    // 刷新串行执行，避免旧结果覆盖新结果
    refresh_lock: tokio::sync::Mutex<()>,
}

/// 负载均衡器
///
/// 持有服务器来源、健康探测、探测策略和选择策略，维护当前可达服务器的快照。
/// 刷新与选择可以在不同线程上并发进行：快照通过一次原子替换发布，
/// 选择看到的要么是完整的旧快照，要么是完整的新快照。
#[derive(Clone)]
pub struct Balancer {
    inner: Arc<BalancerInner>,
}

/// 负载均衡器构造器
pub struct BalancerBuilder {
    source: Arc<dyn ServerSource>,
    probe: Arc<dyn HealthProbe>,
    strategy: Arc<dyn ProbeStrategy>,
    policy: Arc<dyn SelectionPolicy>,
    probe_on_start: bool,
    failure_policy: DiscoveryFailurePolicy,
}

impl BalancerBuilder {
    pub fn new(source: Arc<dyn ServerSource>) -> Self {
        Self {
            source,
            probe: Arc::new(AlwaysAliveProbe),
            strategy: Arc::new(SequentialStrategy),
            policy: Arc::new(RoundRobinPolicy::new()),
            probe_on_start: true,
            failure_policy: DiscoveryFailurePolicy::default(),
        }
    }

    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn ProbeStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn policy(mut self, policy: Arc<dyn SelectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn probe_on_start(mut self, probe_on_start: bool) -> Self {
        self.probe_on_start = probe_on_start;
        self
    }

    pub fn discovery_failure(mut self, failure_policy: DiscoveryFailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// 构造负载均衡器；开启 `probe_on_start` 时返回前先完成一次刷新
    pub async fn build(self) -> BalancerResult<Balancer> {
        self.strategy.check_probe(self.probe.as_ref())?;

        let snapshots = SnapshotCell::new();
        self.policy.bind(snapshots.clone())?;

        info!(
            "Creating balancer: source={}, probe={}, strategy={}, policy={}",
            self.source.name(),
            self.probe.name(),
            self.strategy.name(),
            self.policy.name()
        );

        let balancer = Balancer {
            inner: Arc::new(BalancerInner {
                source: self.source,
                probe: self.probe,
                strategy: self.strategy,
                policy: self.policy,
                snapshots,
                failure_policy: self.failure_policy,
                stats: Mutex::new(BalancerStats::default()),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        };

        if self.probe_on_start {
            balancer.refresh().await?;
        }

        Ok(balancer)
    }
}

impl Balancer {
    pub fn builder(source: Arc<dyn ServerSource>) -> BalancerBuilder {
        BalancerBuilder::new(source)
    }

    /// 使用给定组件创建负载均衡器
    pub async fn new(
        source: Arc<dyn ServerSource>,
        probe: Arc<dyn HealthProbe>,
        strategy: Arc<dyn ProbeStrategy>,
        policy: Arc<dyn SelectionPolicy>,
        probe_on_start: bool,
    ) -> BalancerResult<Self> {
        BalancerBuilder::new(source)
            .probe(probe)
            .strategy(strategy)
            .policy(policy)
            .probe_on_start(probe_on_start)
            .build()
            .await
    }

    /// 刷新快照
    ///
    /// 重新解析服务器来源，用探测策略探测全部服务器，然后原子替换当前快照。
    /// 服务发现失败时保留上一次的快照；`Propagate` 策略下同时返回错误。
    pub async fn refresh(&self) -> BalancerResult<()> {
        let _guard = self.inner.refresh_lock.lock().await;

        let servers = match self.inner.source.resolve().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!(
                    "Failed to resolve servers from {}: {}, keeping previous snapshot",
                    self.inner.source.name(),
                    e
                );
                {
                    let mut stats = self.inner.stats.lock();
                    stats.discovery_failures += 1;
                    stats.last_discovery_error = Some(e.to_string());
                }
                return match self.inner.failure_policy {
                    DiscoveryFailurePolicy::RetainStale => Ok(()),
                    DiscoveryFailurePolicy::Propagate => Err(e.into()),
                };
            }
        };

        debug!(
            "Resolved {} servers from {}",
            servers.len(),
            self.inner.source.name()
        );

        let report = self
            .inner
            .strategy
            .run(self.inner.probe.clone(), servers)
            .await;

        let generation = self.inner.snapshots.load().generation() + 1;
        let snapshot = Snapshot::new(generation, report.servers);
        let total = snapshot.servers().len();
        let alive = snapshot.alive_count();
        self.inner.snapshots.store(snapshot);

        {
            let mut stats = self.inner.stats.lock();
            stats.total_servers = total;
            stats.alive_servers = alive;
            stats.refresh_count += 1;
            stats.last_probe_duration = Some(report.elapsed);
            stats.last_refresh_at = Some(Utc::now());
            stats.last_discovery_error = None;
        }

        info!(
            "Refreshed servers: {}/{} alive (probe took {}ms)",
            alive,
            total,
            report.elapsed.as_millis()
        );
        Ok(())
    }

    /// 通过选择策略选择一个可达服务器
    pub fn choose(&self) -> BalancerResult<Server> {
        self.inner.policy.choose()
    }

    pub fn state(&self) -> BalancerState {
        if self.inner.snapshots.load().generation() == 0 {
            BalancerState::Uninitialized
        } else {
            BalancerState::Ready
        }
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshots.load()
    }

    /// 当前快照中的全部服务器
    pub fn servers(&self) -> Vec<Server> {
        self.snapshot().servers().to_vec()
    }

    /// 当前快照中的可达服务器
    pub fn alive_servers(&self) -> Vec<Server> {
        self.snapshot().alive_servers().cloned().collect()
    }

    pub fn stats(&self) -> BalancerStats {
        self.inner.stats.lock().clone()
    }

    /// 最近一次探测耗时
    pub fn last_probe_duration(&self) -> Option<Duration> {
        self.inner.stats.lock().last_probe_duration
    }

    /// 启动定时刷新
    pub fn spawn_refresh_loop(&self, period: Duration) -> RefreshHandle {
        let balancer = self.clone();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        info!("Starting refresh loop with interval: {:?}", period);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = balancer.refresh().await {
                            error!("Refresh failed: {}", e);
                        }
                    }
                }
            }

            info!("Refresh loop stopped");
        });

        RefreshHandle { token, task }
    }
}

/// 定时刷新任务句柄
pub struct RefreshHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// 停止定时刷新并等待任务退出
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!("Refresh loop task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
