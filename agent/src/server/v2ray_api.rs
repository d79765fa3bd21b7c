//! V2Ray gRPC API 客户端
//!
//! 通过 HandlerService 增删入站用户，通过 StatsService 读取流量计数。

use std::time::Duration;

use anyhow::{Context, Result};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::debug;

use common::grpc::{
    self, proxyman, stats, HandlerServiceClient, ProtoUser, StatsServiceClient, VmessAccount,
};
use common::protocol::control::{AddUserError, RemoveUserError};
use common::protocol::traffic::TrafficSnapshot;
use common::protocol::user::User;

/// V2Ray gRPC API 客户端
#[derive(Clone)]
pub struct V2rayApiClient {
    channel: Channel,
}

impl V2rayApiClient {
    /// 创建客户端（惰性连接，首次调用时才建立连接，断开后自动重连）
    pub fn connect_lazy(endpoint: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .with_context(|| format!("无效的 V2Ray API 地址: {}", endpoint))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect_lazy();

        Ok(Self { channel })
    }

    fn handler(&self) -> HandlerServiceClient<Channel> {
        HandlerServiceClient::new(self.channel.clone())
    }

    fn stats(&self) -> StatsServiceClient<Channel> {
        StatsServiceClient::new(self.channel.clone())
    }

    /// 向入站添加 VMess 用户，email 与用户 id 相同
    pub async fn add_user(&self, inbound_tag: &str, user: &User) -> Result<(), AddUserError> {
        let account = VmessAccount {
            id: user.user_id.clone(),
            alter_id: user.alter_id,
        };
        let operation = proxyman::AddUserOperation {
            user: Some(ProtoUser {
                level: user.level,
                email: user.user_id.clone(),
                account: Some(grpc::to_typed_message(grpc::VMESS_ACCOUNT, &account)),
            }),
        };
        let request = proxyman::AlterInboundRequest {
            tag: inbound_tag.to_string(),
            operation: Some(grpc::to_typed_message(grpc::ADD_USER_OPERATION, &operation)),
        };

        debug!("gRPC 添加用户: tag={}, user={}", inbound_tag, user.user_id);
        self.handler()
            .alter_inbound(request)
            .await
            .map(|_| ())
            .map_err(|status| classify_add_error(&status))
    }

    /// 从入站删除用户
    pub async fn remove_user(&self, inbound_tag: &str, email: &str) -> Result<(), RemoveUserError> {
        let operation = proxyman::RemoveUserOperation {
            email: email.to_string(),
        };
        let request = proxyman::AlterInboundRequest {
            tag: inbound_tag.to_string(),
            operation: Some(grpc::to_typed_message(grpc::REMOVE_USER_OPERATION, &operation)),
        };

        debug!("gRPC 删除用户: tag={}, user={}", inbound_tag, email);
        self.handler()
            .alter_inbound(request)
            .await
            .map(|_| ())
            .map_err(|status| classify_remove_error(&status))
    }

    /// 查询全部流量统计
    pub async fn query_all_traffic(&self, reset: bool) -> Result<TrafficSnapshot, Status> {
        let request = stats::QueryStatsRequest {
            pattern: String::new(),
            reset,
        };

        let resp = self.stats().query_stats(request).await?.into_inner();
        debug!("gRPC 查询流量统计: {} 项 (reset={})", resp.stat.len(), reset);

        Ok(TrafficSnapshot::from_stats(
            resp.stat.iter().map(|s| (s.name.as_str(), s.value)),
        ))
    }
}

fn status_text(status: &Status) -> String {
    format!("{:?}: {}", status.code(), status.message())
}

fn classify_add_error(status: &Status) -> AddUserError {
    if status.message().to_lowercase().contains("already exists") {
        AddUserError::AlreadyExists
    } else {
        AddUserError::Other(status_text(status))
    }
}

fn classify_remove_error(status: &Status) -> RemoveUserError {
    if status.message().to_lowercase().contains("not found") {
        RemoveUserError::NotFound
    } else {
        RemoveUserError::Other(status_text(status))
    }
}
