//! 代理控制 trait 和相关类型
//!
//! 定义了节点代理（V2Ray）一侧的控制接口：运行中进程的用户增删、流量读取，
//! 以及持久化配置文件的读写。

use async_trait::async_trait;
use thiserror::Error;

use crate::config::V2rayConfig;
use crate::protocol::traffic::TrafficSnapshot;
use crate::protocol::user::User;

/// 向运行中的代理添加用户失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddUserError {
    /// 用户已存在（预期内的竞争，不视为故障）
    #[error("用户已存在")]
    AlreadyExists,

    #[error("{0}")]
    Other(String),
}

/// 从运行中的代理删除用户失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoveUserError {
    /// 用户不存在（预期内的竞争，不视为故障）
    #[error("用户不存在")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

/// 持久化配置读写失败
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("无法读取配置文件 {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置文件 {path} 失败: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("写入配置文件 {path} 失败: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("配置中没有 tag 为 {tag} 的入站")]
    InboundNotFound { tag: String },

    #[error("序列化配置失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 代理控制接口
///
/// 运行中进程通过 RPC 控制，持久化配置为磁盘上的配置文件。
/// 两者必须由对账流程保持一致。
#[async_trait]
pub trait ProxyController: Send + Sync {
    /// 指定入站在持久化配置中的用户 id
    async fn list_live_users(&self, inbound_tag: &str) -> Result<Vec<String>, ConfigStoreError> {
        let config = self.read_persisted_config().await?;
        config
            .client_ids(inbound_tag)
            .ok_or_else(|| ConfigStoreError::InboundNotFound {
                tag: inbound_tag.to_string(),
            })
    }

    /// 向运行中的代理添加用户
    async fn add_live_user(&self, inbound_tag: &str, user: &User) -> Result<(), AddUserError>;

    /// 从运行中的代理删除用户
    async fn remove_live_user(&self, inbound_tag: &str, user_id: &str) -> Result<(), RemoveUserError>;

    /// 读取全部流量计数
    ///
    /// `reset` 为 true 时读取即清零，每个上报周期只能调用一次。
    async fn read_all_traffic(&self, reset: bool) -> anyhow::Result<TrafficSnapshot>;

    /// 读取持久化配置
    async fn read_persisted_config(&self) -> Result<V2rayConfig, ConfigStoreError>;

    /// 整体替换持久化配置
    async fn write_persisted_config(&self, config: &V2rayConfig) -> Result<(), ConfigStoreError>;
}
