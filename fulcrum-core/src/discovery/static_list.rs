use async_trait::async_trait;
use parking_lot::RwLock;

use super::ServerSource;
use crate::error::DiscoveryError;
use crate::server::{Server, DEFAULT_PORT};

/// 固定服务器列表
///
/// 可以在运行中通过 `add` 追加服务器，下一次 `resolve` 即可看到。
#[derive(Debug, Default)]
pub struct StaticServerSource {
    servers: RwLock<Vec<Server>>,
}

impl StaticServerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从地址列表创建，全部使用默认端口
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = Self::new();
        for address in addresses {
            source.add(address, None);
        }
        source
    }

    pub fn from_servers(servers: Vec<Server>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    /// 添加服务器，端口缺省为 80
    pub fn add(&self, address: impl Into<String>, port: Option<u16>) {
        let server = Server::new(address, port.unwrap_or(DEFAULT_PORT));
        tracing::debug!("Adding static server {}", server);
        self.servers.write().push(server);
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

#[async_trait]
impl ServerSource for StaticServerSource {
    async fn resolve(&self) -> Result<Vec<Server>, DiscoveryError> {
        // 每次返回新的副本，探测状态不会跨刷新保留
        Ok(self
            .servers
            .read()
            .iter()
            .map(|s| {
                let mut server = Server::new(s.address.clone(), s.port);
                server.ttl = s.ttl;
                server.tags = s.tags.clone();
                server
            })
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}
