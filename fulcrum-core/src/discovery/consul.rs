use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::ServerSource;
use crate::error::DiscoveryError;
use crate::server::Server;

/// 目录记录未携带 TTL 时使用的默认值（秒）
pub const DEFAULT_TTL: u32 = 10;

const CATALOG_PATH: &str = "/v1/catalog/service";

/// Consul 目录中的单条服务记录
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogRecord {
    address: String,
    service_port: u16,
    #[serde(default)]
    service_tags: Option<Vec<String>>,
    #[serde(default, rename = "TTL")]
    ttl: Option<u32>,
}

impl From<CatalogRecord> for Server {
    fn from(record: CatalogRecord) -> Self {
        let mut server =
            Server::new(record.address, record.service_port).with_ttl(record.ttl.unwrap_or(DEFAULT_TTL));
        server.tags = record.service_tags.unwrap_or_default().into_iter().collect();
        server
    }
}

/// 通过 Consul HTTP 目录接口发现服务器
#[derive(Debug, Clone)]
pub struct ConsulServerSource {
    client: Client,
    base_url: String,
    service: String,
    dc: Option<String>,
    near: Option<String>,
    tag: Option<String>,
}

impl ConsulServerSource {
    /// 创建新的 Consul 服务来源
    pub fn new(
        base_url: impl Into<String>,
        service: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(DiscoveryError::InvalidUrl(base_url));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service: service.into(),
            dc: None,
            near: None,
            tag: None,
        })
    }

    pub fn with_datacenter(mut self, dc: impl Into<String>) -> Self {
        self.dc = Some(dc.into());
        self
    }

    pub fn with_near(mut self, near: impl Into<String>) -> Self {
        self.near = Some(near.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// 目录查询地址（不含查询参数）
    pub fn catalog_url(&self) -> String {
        format!("{}{}/{}", self.base_url, CATALOG_PATH, self.service)
    }

    fn query_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = Vec::new();
        if let Some(dc) = &self.dc {
            params.push(("dc", dc.as_str()));
        }
        if let Some(near) = &self.near {
            params.push(("near", near.as_str()));
        }
        if let Some(tag) = &self.tag {
            params.push(("tag", tag.as_str()));
        }
        params
    }
}

#[async_trait]
impl ServerSource for ConsulServerSource {
    async fn resolve(&self) -> Result<Vec<Server>, DiscoveryError> {
        let url = self.catalog_url();
        debug!("Resolving service '{}' from {}", self.service, url);

        let response = self
            .client
            .get(&url)
            .query(&self.query_params())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Catalog lookup for '{}' returned {}", self.service, status);
            return Err(DiscoveryError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let records: Vec<CatalogRecord> = serde_json::from_slice(&body)?;
        let servers: Vec<Server> = records.into_iter().map(Server::from).collect();

        debug!(
            "Resolved {} servers for service '{}'",
            servers.len(),
            self.service
        );
        Ok(servers)
    }

    fn name(&self) -> &str {
        &self.service
    }
}
