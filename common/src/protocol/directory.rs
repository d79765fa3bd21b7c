//! 用户目录接口
//!
//! 节点通过该接口拉取期望的用户集合，并上报流量。
//! 可由 HTTP 实现，测试中使用内存实现。

use async_trait::async_trait;
use thiserror::Error;

use super::traffic::TrafficRecord;
use super::user::User;

/// 用户目录不可用（传输失败、非 200 状态或返回内容无法解析）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("用户目录不可用: {0}")]
pub struct DirectoryUnavailable(pub String);

/// 流量上报结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 用户目录已接收
    Accepted,
    /// 用户目录返回了非成功状态码
    Rejected(u16),
    /// 请求未能完成
    TransportError(String),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted)
    }
}

/// 用户目录客户端接口
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// 拉取当前应当启用的用户
    async fn fetch_desired_users(&self) -> Result<Vec<User>, DirectoryUnavailable>;

    /// 上报流量记录
    async fn submit_traffic(&self, record: &TrafficRecord) -> SubmitOutcome;
}
