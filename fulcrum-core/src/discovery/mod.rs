//! Server discovery backends.

pub mod consul;
pub mod static_list;

use async_trait::async_trait;

use crate::error::DiscoveryError;
use crate::server::Server;

pub use consul::ConsulServerSource;
pub use static_list::StaticServerSource;

/// 服务器来源
///
/// 每次调用 `resolve` 都独立地返回当前的服务器序列，数量、顺序和成员都可能变化。
/// 返回的服务器尚未探测，可达性由探测策略负责填写。
#[async_trait]
pub trait ServerSource: Send + Sync {
    async fn resolve(&self) -> Result<Vec<Server>, DiscoveryError>;

    /// 来源名称（用于日志）
    fn name(&self) -> &str;
}
