//! 远程用户目录客户端
//!
//! 通过 HTTP 调用用户目录 API 实现 DirectoryClient trait。
//! 每个请求携带节点 ID 与 API Key 请求头。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error};

use common::protocol::directory::{DirectoryClient, DirectoryUnavailable, SubmitOutcome};
use common::protocol::traffic::TrafficRecord;
use common::protocol::user::{User, UserListResponse};

const USER_AGENT: &str = "v2ray-agent";
const HEADER_NODE_ID: &str = "Nodeid";
const HEADER_API_KEY: &str = "Apikey";

/// HTTP 用户目录客户端
pub struct HttpDirectoryClient {
    base_url: String,
    node_id: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpDirectoryClient {
    pub fn new(base_url: String, node_id: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url,
            node_id,
            api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn fetch_desired_users(&self) -> Result<Vec<User>, DirectoryUnavailable> {
        let url = self.url("userapi");
        debug!("从用户目录拉取用户列表: {}", url);

        let resp = self.client
            .get(&url)
            .header(HEADER_NODE_ID, &self.node_id)
            .header(HEADER_API_KEY, &self.api_key)
            .send()
            .await
            .map_err(|e| DirectoryUnavailable(format!("请求 {} 失败: {}", url, e)))?;

        if resp.status() != StatusCode::OK {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!("用户目录返回错误 ({}): {}", status, body);
            return Err(DirectoryUnavailable(format!("用户目录返回错误 ({})", status)));
        }

        let list: UserListResponse = resp
            .json()
            .await
            .map_err(|e| DirectoryUnavailable(format!("解析用户列表失败: {}", e)))?;

        debug!("用户目录返回 {} 个用户", list.users.len());
        Ok(list.users)
    }

    async fn submit_traffic(&self, record: &TrafficRecord) -> SubmitOutcome {
        let url = self.url("trafficapi");
        debug!("上报流量: 节点 ↑{} ↓{}, {} 个用户", record.node.uplink, record.node.downlink, record.users.len());

        match self.client
            .post(&url)
            .header(HEADER_NODE_ID, &self.node_id)
            .header(HEADER_API_KEY, &self.api_key)
            .json(record)
            .send()
            .await
        {
            Ok(resp) if resp.status() == StatusCode::OK || resp.status() == StatusCode::ACCEPTED => {
                SubmitOutcome::Accepted
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!("用户目录拒绝流量上报 ({}): {}", status, body);
                SubmitOutcome::Rejected(status.as_u16())
            }
            Err(e) => {
                error!("流量上报请求失败: {}", e);
                SubmitOutcome::TransportError(e.to_string())
            }
        }
    }
}
