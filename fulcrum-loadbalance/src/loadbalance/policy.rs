use fulcrum_core::{BalancerError, BalancerResult, Server};
use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::snapshot::{Snapshot, SnapshotCell};

/// 选择策略
///
/// 只从绑定的负载均衡器当前快照中的可达服务器里选择。
pub trait SelectionPolicy: Send + Sync {
    /// 绑定到负载均衡器的快照；已绑定到其他负载均衡器时返回 `AlreadyBound`
    fn bind(&self, snapshots: SnapshotCell) -> BalancerResult<()>;

    /// 选择一个服务器
    fn choose(&self) -> BalancerResult<Server>;

    /// 策略名称
    fn name(&self) -> &'static str;
}

/// 快照绑定，供各策略复用
#[derive(Debug, Default)]
struct Binding {
    snapshots: RwLock<Option<SnapshotCell>>,
}

impl Binding {
    fn set(&self, snapshots: SnapshotCell) -> BalancerResult<()> {
        let mut bound = self.snapshots.write();
        match bound.as_ref() {
            Some(current) if !current.same_cell(&snapshots) => Err(BalancerError::AlreadyBound),
            _ => {
                *bound = Some(snapshots);
                Ok(())
            }
        }
    }

    /// 当前快照；未绑定时返回 `NotBound`，没有可达服务器时返回 `NoServerAvailable`
    fn alive_snapshot(&self) -> BalancerResult<Arc<Snapshot>> {
        let snapshot = self
            .snapshots
            .read()
            .as_ref()
            .map(SnapshotCell::load)
            .ok_or(BalancerError::NotBound)?;

        if snapshot.alive_count() == 0 {
            return Err(BalancerError::NoServerAvailable);
        }
        Ok(snapshot)
    }
}

/// 轮询选择
///
/// 计数器在整个策略生命周期内共享，刷新时不重置；每次选择用一次原子自增取得序号，
/// 并发调用不会拿到重复序号，也不会跳过序号。
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    binding: Binding,
    counter: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionPolicy for RoundRobinPolicy {
    fn bind(&self, snapshots: SnapshotCell) -> BalancerResult<()> {
        self.binding.set(snapshots)
    }

    fn choose(&self) -> BalancerResult<Server> {
        let snapshot = self.binding.alive_snapshot()?;
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % snapshot.alive_count();

        snapshot
            .alive_at(index)
            .cloned()
            .ok_or(BalancerError::NoServerAvailable)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// 随机选择
#[derive(Debug, Default)]
pub struct RandomPolicy {
    binding: Binding,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionPolicy for RandomPolicy {
    fn bind(&self, snapshots: SnapshotCell) -> BalancerResult<()> {
        self.binding.set(snapshots)
    }

    fn choose(&self) -> BalancerResult<Server> {
        let snapshot = self.binding.alive_snapshot()?;
        let index = rand::rng().random_range(0..snapshot.alive_count());

        snapshot
            .alive_at(index)
            .cloned()
            .ok_or(BalancerError::NoServerAvailable)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
