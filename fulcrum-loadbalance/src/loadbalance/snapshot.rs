use arc_swap::ArcSwap;
use fulcrum_core::Server;
use std::sync::Arc;

/// 一次刷新得到的服务器快照，发布后不再修改
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    servers: Vec<Server>,
    alive: Vec<usize>,
}

impl Snapshot {
    pub fn new(generation: u64, servers: Vec<Server>) -> Self {
        let alive = servers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_alive())
            .map(|(i, _)| i)
            .collect();

        Self {
            generation,
            servers,
            alive,
        }
    }

    /// 快照序号，0 表示还没有完成过刷新
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 按发现顺序排列的全部服务器
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    /// 第 `index` 个可达服务器（按发现顺序）
    pub fn alive_at(&self, index: usize) -> Option<&Server> {
        self.alive.get(index).map(|&i| &self.servers[i])
    }

    pub fn alive_servers(&self) -> impl Iterator<Item = &Server> {
        self.alive.iter().map(move |&i| &self.servers[i])
    }
}

/// 当前快照的共享引用
///
/// 读取无锁，发布是一次原子指针替换：读者看到的要么是完整的旧快照，要么是完整的新快照。
#[derive(Debug, Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    pub fn store(&self, snapshot: Snapshot) {
        self.inner.store(Arc::new(snapshot));
    }

    /// 是否与 `other` 指向同一个快照槽
    pub fn same_cell(&self, other: &SnapshotCell) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
