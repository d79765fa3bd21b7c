//! 本地代理控制实现
//!
//! 组合 V2Ray gRPC API 客户端与配置文件存储，实现 ProxyController trait。

use anyhow::Result;
use async_trait::async_trait;

use common::config::V2rayConfig;
use common::protocol::control::{AddUserError, ConfigStoreError, ProxyController, RemoveUserError};
use common::protocol::traffic::TrafficSnapshot;
use common::protocol::user::User;

use super::config_store::ConfigStore;
use super::v2ray_api::V2rayApiClient;

/// V2Ray 代理控制
///
/// 运行中进程走 gRPC，持久化配置走本地文件。
pub struct V2rayProxyControl {
    api: V2rayApiClient,
    store: ConfigStore,
}

impl V2rayProxyControl {
    pub fn new(api: V2rayApiClient, store: ConfigStore) -> Self {
        Self { api, store }
    }
}

#[async_trait]
impl ProxyController for V2rayProxyControl {
    async fn add_live_user(&self, inbound_tag: &str, user: &User) -> Result<(), AddUserError> {
        self.api.add_user(inbound_tag, user).await
    }

    async fn remove_live_user(&self, inbound_tag: &str, user_id: &str) -> Result<(), RemoveUserError> {
        self.api.remove_user(inbound_tag, user_id).await
    }

    async fn read_all_traffic(&self, reset: bool) -> Result<TrafficSnapshot> {
        self.api
            .query_all_traffic(reset)
            .await
            .map_err(|status| anyhow::anyhow!("查询流量统计失败: {:?} {}", status.code(), status.message()))
    }

    async fn read_persisted_config(&self) -> Result<V2rayConfig, ConfigStoreError> {
        self.store.load().await
    }

    async fn write_persisted_config(&self, config: &V2rayConfig) -> Result<(), ConfigStoreError> {
        self.store.save(config).await
    }
}
