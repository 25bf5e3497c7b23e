use async_trait::async_trait;
use fulcrum_core::{BalancerResult, Server};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use super::probe::HealthProbe;

/// 一次探测的结果
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// 与输入一一对应、顺序相同的服务器，每个都已设置可达性
    pub servers: Vec<Server>,
    /// 本次探测的总耗时
    pub elapsed: Duration,
}

impl ProbeReport {
    pub fn alive_count(&self) -> usize {
        self.servers.iter().filter(|s| s.is_alive()).count()
    }
}

/// 探测策略
///
/// 用某种并发模型把探测应用到整组服务器上。返回前必须回收所有并发资源，
/// 输出与输入一一对应，单个探测失败只会把对应服务器标记为不可达。
#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    async fn run(&self, probe: Arc<dyn HealthProbe>, servers: Vec<Server>) -> ProbeReport;

    /// 策略名称（用于日志）
    fn name(&self) -> &'static str;

    /// 检查探测能否在该策略下执行
    fn check_probe(&self, _probe: &dyn HealthProbe) -> BalancerResult<()> {
        Ok(())
    }
}

/// 执行单个探测，探测 panic 时视为不可达
pub(crate) async fn probe_one(probe: &dyn HealthProbe, mut server: Server) -> Server {
    let alive = match AssertUnwindSafe(probe.is_alive(&server))
        .catch_unwind()
        .await
    {
        Ok(alive) => alive,
        Err(_) => {
            error!("Probe '{}' panicked for server: {}", probe.name(), server);
            false
        }
    };
    server.set_alive(alive);
    server
}

pub(crate) fn finish(strategy: &str, servers: Vec<Server>, start: Instant) -> ProbeReport {
    let elapsed = start.elapsed();
    debug!(
        "[{}] Pinged {} servers in {:?}",
        strategy,
        servers.len(),
        elapsed
    );
    ProbeReport { servers, elapsed }
}

/// 顺序探测
///
/// 按输入顺序逐个探测，总耗时约为 N × L。
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

#[async_trait]
impl ProbeStrategy for SequentialStrategy {
    async fn run(&self, probe: Arc<dyn HealthProbe>, servers: Vec<Server>) -> ProbeReport {
        let start = Instant::now();

        let mut results = Vec::with_capacity(servers.len());
        for server in servers {
            results.push(probe_one(probe.as_ref(), server).await);
        }

        finish(self.name(), results, start)
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// 线程池探测
///
/// 每个服务器在独立的阻塞线程上探测，线程共享同一地址空间。默认线程数等于服务器数，
/// 总耗时约为 L 加上调度开销；阻塞式探测同样可以并行。
#[derive(Debug, Clone, Default)]
pub struct ThreadPoolStrategy {
    max_workers: Option<usize>,
}

impl ThreadPoolStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 限制同时运行的探测线程数
    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            max_workers: Some(max_workers.clamp(1, Semaphore::MAX_PERMITS)),
        }
    }
}

#[async_trait]
impl ProbeStrategy for ThreadPoolStrategy {
    async fn run(&self, probe: Arc<dyn HealthProbe>, servers: Vec<Server>) -> ProbeReport {
        let start = Instant::now();
        let handle = Handle::current();
        let limiter = self.max_workers.map(|n| Arc::new(Semaphore::new(n)));

        let mut tasks = Vec::with_capacity(servers.len());
        for server in servers {
            let permit = match &limiter {
                Some(limiter) => limiter.clone().acquire_owned().await.ok(),
                None => None,
            };

            let fallback = server.clone();
            let probe = probe.clone();
            let handle = handle.clone();
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                handle.block_on(probe_one(probe.as_ref(), server))
            });
            tasks.push((fallback, task));
        }

        // 等待所有线程结束，按输入顺序收集
        let mut results = Vec::with_capacity(tasks.len());
        for (mut fallback, task) in tasks {
            match task.await {
                Ok(server) => results.push(server),
                Err(e) => {
                    error!("Probe thread failed for server {}: {}", fallback, e);
                    fallback.set_alive(false);
                    results.push(fallback);
                }
            }
        }

        finish(self.name(), results, start)
    }

    fn name(&self) -> &'static str {
        "thread_pool"
    }
}

/// 单线程协作式探测
///
/// 所有探测作为同一任务内的协作式 future 并发执行，只占用调用方的一个线程。
/// 只有探测在 I/O 处让出执行权时才有并发效果（总耗时约为 L）；
/// 如果探测内部使用阻塞调用，结果依然正确，但会退化为顺序执行（约 N × L），
/// 这是该模型的已知特性。
#[derive(Debug, Clone, Copy, Default)]
pub struct CooperativeStrategy;

#[async_trait]
impl ProbeStrategy for CooperativeStrategy {
    async fn run(&self, probe: Arc<dyn HealthProbe>, servers: Vec<Server>) -> ProbeReport {
        let start = Instant::now();

        let units = servers
            .into_iter()
            .map(|server| probe_one(probe.as_ref(), server));
        let results = futures::future::join_all(units).await;

        finish(self.name(), results, start)
    }

    fn name(&self) -> &'static str {
        "cooperative"
    }
}
