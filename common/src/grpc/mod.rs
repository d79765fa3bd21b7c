//! V2Ray 控制 API 的 gRPC 绑定
//!
//! 模块层级与 proto package 保持一致，生成代码中的跨包引用（`super::super::...`）才能解析。

pub mod v2ray {
    pub mod core {
        pub mod common {
            pub mod serial {
                tonic::include_proto!("v2ray.core.common.serial");
            }
            pub mod protocol {
                tonic::include_proto!("v2ray.core.common.protocol");
            }
        }
        pub mod proxy {
            pub mod vmess {
                tonic::include_proto!("v2ray.core.proxy.vmess");
            }
        }
        pub mod app {
            pub mod proxyman {
                pub mod command {
                    tonic::include_proto!("v2ray.core.app.proxyman.command");
                }
            }
            pub mod stats {
                pub mod command {
                    tonic::include_proto!("v2ray.core.app.stats.command");
                }
            }
        }
    }
}

// 重新导出常用类型
pub use v2ray::core::app::proxyman::command as proxyman;
pub use v2ray::core::app::stats::command as stats;
pub use v2ray::core::common::protocol::User as ProtoUser;
pub use v2ray::core::common::serial::TypedMessage;
pub use v2ray::core::proxy::vmess::Account as VmessAccount;

pub use proxyman::handler_service_client::HandlerServiceClient;
pub use proxyman::handler_service_server::{HandlerService, HandlerServiceServer};
pub use stats::stats_service_client::StatsServiceClient;
pub use stats::stats_service_server::{StatsService, StatsServiceServer};

use prost::Message;

pub const ADD_USER_OPERATION: &str = "v2ray.core.app.proxyman.command.AddUserOperation";
pub const REMOVE_USER_OPERATION: &str = "v2ray.core.app.proxyman.command.RemoveUserOperation";
pub const VMESS_ACCOUNT: &str = "v2ray.core.proxy.vmess.Account";

/// 将消息包装为 TypedMessage
pub fn to_typed_message<M: Message>(type_name: &str, message: &M) -> TypedMessage {
    TypedMessage {
        r#type: type_name.to_string(),
        value: message.encode_to_vec(),
    }
}
