use async_trait::async_trait;
use fulcrum_core::{ProbeConfig, Server};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// 健康探测
///
/// 探测必须是无状态的：结果只取决于服务器的地址端口和探测自身的不可变配置，
/// 这样才能在其他线程、进程或协作任务中执行。任何传输或协议错误都在内部转换为 `false`，
/// 不会抛给调用方。
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 检查服务器是否可达
    async fn is_alive(&self, server: &Server) -> bool;

    /// 探测名称（用于日志）
    fn name(&self) -> &str;

    /// 可以跨进程传输的探测描述；返回 `None` 表示只能在本进程内执行
    fn spec(&self) -> Option<ProbeConfig> {
        None
    }
}

/// 根据配置构造探测
pub fn build_probe(config: &ProbeConfig) -> Arc<dyn HealthProbe> {
    match config {
        ProbeConfig::AlwaysAlive => Arc::new(AlwaysAliveProbe),
        ProbeConfig::Tcp { timeout_ms } => {
            Arc::new(TcpProbe::new(Duration::from_millis(*timeout_ms)))
        }
        ProbeConfig::Http { secure, timeout_ms } => Arc::new(HttpProbe::new(
            *secure,
            Duration::from_millis(*timeout_ms),
        )),
        ProbeConfig::Fixed { alive, delay_ms } => {
            Arc::new(FixedProbe::new(*alive, Duration::from_millis(*delay_ms)))
        }
    }
}

/// 向上取整到毫秒，避免亚毫秒的超时在描述中变成 0
fn whole_millis(duration: Duration) -> u64 {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// 总是认为服务器可达
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAliveProbe;

#[async_trait]
impl HealthProbe for AlwaysAliveProbe {
    async fn is_alive(&self, server: &Server) -> bool {
        debug!("Ping succeeded for server: {}", server);
        true
    }

    fn name(&self) -> &str {
        "always_alive"
    }

    fn spec(&self) -> Option<ProbeConfig> {
        Some(ProbeConfig::AlwaysAlive)
    }
}

/// TCP 连接探测
///
/// 在超时时间内建立连接即为可达，连接随后立即关闭。
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn is_alive(&self, server: &Server) -> bool {
        let connect = TcpStream::connect((server.address.as_str(), server.port));

        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => {
                drop(stream);
                debug!("Ping succeeded for server: {}", server);
                true
            }
            Ok(Err(e)) => {
                warn!("Ping failed for server: {} ({})", server, e);
                false
            }
            Err(_) => {
                warn!(
                    "Ping failed for server: {} (timed out after {:?})",
                    server, self.timeout
                );
                false
            }
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }

    fn spec(&self) -> Option<ProbeConfig> {
        Some(ProbeConfig::Tcp {
            timeout_ms: whole_millis(self.timeout),
        })
    }
}

/// HTTP GET 探测
///
/// 请求 `{scheme}://{address}:{port}`，状态码小于 400 视为可达。
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    secure: bool,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(secure: bool, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            secure,
            timeout,
        }
    }

    /// 探测地址
    pub fn url(&self, server: &Server) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, server.host(), server.port)
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn is_alive(&self, server: &Server) -> bool {
        let url = self.url(server);

        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    warn!("Ping failed for server: {} (HTTP {})", server, status);
                    false
                } else {
                    debug!("Ping succeeded for server: {} (HTTP {})", server, status);
                    true
                }
            }
            Err(e) => {
                warn!("Ping failed for server: {} ({})", server, e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    fn spec(&self) -> Option<ProbeConfig> {
        Some(ProbeConfig::Http {
            secure: self.secure,
            timeout_ms: whole_millis(self.timeout),
        })
    }
}

/// 固定结果的模拟探测
///
/// 等待 `delay`（让出执行权）后返回固定结果，用来模拟探测延迟。
#[derive(Debug, Clone)]
pub struct FixedProbe {
    alive: bool,
    delay: Duration,
}

impl FixedProbe {
    pub fn new(alive: bool, delay: Duration) -> Self {
        Self { alive, delay }
    }
}

#[async_trait]
impl HealthProbe for FixedProbe {
    async fn is_alive(&self, server: &Server) -> bool {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        debug!("Fixed ping for server {}: {}", server, self.alive);
        self.alive
    }

    fn name(&self) -> &str {
        "fixed"
    }

    fn spec(&self) -> Option<ProbeConfig> {
        Some(ProbeConfig::Fixed {
            alive: self.alive,
            delay_ms: whole_millis(self.delay),
        })
    }
}
