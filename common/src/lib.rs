//! 节点 agent 共享库
//!
//! 包含协议类型、V2Ray 配置文件模型以及 V2Ray 控制 API 的 gRPC 绑定。

pub mod config;
pub mod grpc;
pub mod protocol;

pub use config::{ClientEntry, InboundConfig, InboundSettings, V2rayConfig};
pub use protocol::control::{AddUserError, ConfigStoreError, ProxyController, RemoveUserError};
pub use protocol::directory::{DirectoryClient, DirectoryUnavailable, SubmitOutcome};
pub use protocol::traffic::{TrafficCounter, TrafficRecord, TrafficSnapshot};
pub use protocol::user::{User, UserListResponse};
