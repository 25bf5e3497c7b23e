use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 未指定端口时使用的默认端口
pub const DEFAULT_PORT: u16 = 80;

/// 后端服务器
///
/// 身份由 `(address, port)` 决定：两次发现返回的同一地址端口被视为同一个逻辑端点，
/// 即使 ttl、tags 或可达性不同。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub address: String,
    pub port: u16,
    /// 缓存有效期提示（秒），仅供参考
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 探测结果；`None` 表示尚未探测
    #[serde(skip)]
    alive: Option<bool>,
}

impl Server {
    /// 创建新的服务器，可达性未知
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ttl: None,
            tags: BTreeSet::new(),
            alive: None,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// 解析 `host`、`host:port`、`[ipv6]` 或 `[ipv6]:port` 形式的地址
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }

        if let Some(rest) = spec.strip_prefix('[') {
            let (host, tail) = rest.split_once(']')?;
            if host.is_empty() {
                return None;
            }
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => tail.strip_prefix(':')?.parse::<u16>().ok()?,
            };
            return Some(Self::new(host, port));
        }

        match spec.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port.parse::<u16>().ok()?;
                Some(Self::new(host, port))
            }
            Some(_) => None,
            None => Some(Self::new(spec, DEFAULT_PORT)),
        }
    }

    /// 是否可达；未探测的服务器视为不可达
    pub fn is_alive(&self) -> bool {
        self.alive.unwrap_or(false)
    }

    /// 是否已经被探测过
    pub fn is_probed(&self) -> bool {
        self.alive.is_some()
    }

    pub fn set_alive(&mut self, alive: bool) {
        self.alive = Some(alive);
    }

    /// 地址中的主机部分，IPv6 地址加方括号
    pub fn host(&self) -> Cow<'_, str> {
        if self.address.contains(':') {
            Cow::Owned(format!("[{}]", self.address))
        } else {
            Cow::Borrowed(&self.address)
        }
    }

    /// 标识字符串 `address:port`
    pub fn key(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.port)
    }
}
