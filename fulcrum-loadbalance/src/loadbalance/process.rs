//! Isolated-process probe pool.
//!
//! Each server is probed by a short-lived `fulcrum-probe-worker` child process.
//! Only the probe description and the target address cross the process
//! boundary, as one JSON [`ProbeJob`] on the child's stdin; the child answers
//! with one JSON [`ProbeVerdict`] on stdout. Workers set up their own logging.

use async_trait::async_trait;
use fulcrum_core::{BalancerError, BalancerResult, ProbeConfig, Server};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use super::probe::{build_probe, HealthProbe};
use super::strategy::{finish, ProbeReport, ProbeStrategy};

/// 跨进程传输的探测目标，只包含探测所需的地址和端口
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub address: String,
    pub port: u16,
}

impl From<&Server> for ProbeTarget {
    fn from(server: &Server) -> Self {
        Self {
            address: server.address.clone(),
            port: server.port,
        }
    }
}

impl From<ProbeTarget> for Server {
    fn from(target: ProbeTarget) -> Self {
        Server::new(target.address, target.port)
    }
}

/// 发送给工作进程的任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeJob {
    pub probe: ProbeConfig,
    pub target: ProbeTarget,
}

/// 工作进程返回的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeVerdict {
    pub alive: bool,
}

/// 工作进程错误，只在进程池内部使用，最终都转换为不可达
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("工作进程 I/O 失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("工作进程消息编解码失败: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("工作进程异常退出: {0}")]
    Exit(ExitStatus),
}

/// 在当前进程内执行任务（工作进程的入口逻辑）
pub async fn execute_job(job: ProbeJob) -> ProbeVerdict {
    let probe = build_probe(&job.probe);
    let server = Server::from(job.target);
    ProbeVerdict {
        alive: probe.is_alive(&server).await,
    }
}

/// 进程池探测
///
/// 每个服务器由独立的工作进程探测，进程间不共享地址空间。默认进程数等于服务器数，
/// 总耗时约为 L 加上进程启动开销，比线程池慢但远小于 N × L。
/// 只能使用可以描述为 [`ProbeConfig`] 的探测。
#[derive(Debug, Clone)]
pub struct ProcessPoolStrategy {
    worker_path: PathBuf,
    max_workers: Option<usize>,
}

impl ProcessPoolStrategy {
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_path: worker_path.into(),
            max_workers: None,
        }
    }

    /// 限制同时存活的工作进程数
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers.clamp(1, Semaphore::MAX_PERMITS));
        self
    }

    pub fn worker_path(&self) -> &Path {
        &self.worker_path
    }

    async fn probe_in_worker(&self, job: &ProbeJob) -> Result<bool, WorkerError> {
        let payload = serde_json::to_vec(job)?;

        let mut child = Command::new(&self.worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(WorkerError::Exit(output.status));
        }

        let verdict: ProbeVerdict = serde_json::from_slice(&output.stdout)?;
        Ok(verdict.alive)
    }

    async fn probe_unit(
        &self,
        spec: &ProbeConfig,
        limiter: Option<&Arc<Semaphore>>,
        mut server: Server,
    ) -> Server {
        let _permit = match limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        let job = ProbeJob {
            probe: spec.clone(),
            target: ProbeTarget::from(&server),
        };

        let alive = match self.probe_in_worker(&job).await {
            Ok(alive) => alive,
            Err(e) => {
                warn!("Probe worker failed for server {}: {}", server, e);
                false
            }
        };
        server.set_alive(alive);
        server
    }
}

#[async_trait]
impl ProbeStrategy for ProcessPoolStrategy {
    async fn run(&self, probe: Arc<dyn HealthProbe>, servers: Vec<Server>) -> ProbeReport {
        let start = Instant::now();

        let Some(spec) = probe.spec() else {
            error!(
                "Probe '{}' cannot be sent to a worker process, marking {} servers down",
                probe.name(),
                servers.len()
            );
            let servers = servers
                .into_iter()
                .map(|mut server| {
                    server.set_alive(false);
                    server
                })
                .collect();
            return finish(self.name(), servers, start);
        };

        debug!(
            "Spawning up to {} probe workers from {}",
            self.max_workers.unwrap_or(servers.len()),
            self.worker_path.display()
        );

        let limiter = self.max_workers.map(|n| Arc::new(Semaphore::new(n)));
        let units = servers
            .into_iter()
            .map(|server| self.probe_unit(&spec, limiter.as_ref(), server));
        let results = futures::future::join_all(units).await;

        finish(self.name(), results, start)
    }

    fn name(&self) -> &'static str {
        "process_pool"
    }

    fn check_probe(&self, probe: &dyn HealthProbe) -> BalancerResult<()> {
        if probe.spec().is_none() {
            return Err(BalancerError::PredicateNotTransferable {
                probe: probe.name().to_string(),
            });
        }
        Ok(())
    }
}
