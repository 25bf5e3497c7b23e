use thiserror::Error;

/// 服务发现错误
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("服务发现请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("服务发现返回错误: {url} 状态码 {status}")]
    Status { url: String, status: u16 },
    #[error("服务发现响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("无效的服务发现地址: {0}")]
    InvalidUrl(String),
    #[error("服务发现不可用: {0}")]
    Unavailable(String),
}

/// 负载均衡错误
///
/// 只有 `NotBound` 和 `NoServerAvailable` 会在选择服务器时返回给调用方，
/// 其余错误在刷新或构造阶段出现。
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("selection policy is not bound to a balancer")]
    NotBound,
    #[error("no server available")]
    NoServerAvailable,
    #[error("selection policy is already bound to another balancer")]
    AlreadyBound,
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("probe '{probe}' cannot be sent to a worker process")]
    PredicateNotTransferable { probe: String },
}

pub type BalancerResult<T> = Result<T, BalancerError>;
