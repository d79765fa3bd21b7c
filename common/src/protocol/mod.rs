//! 节点代理协议类型定义
//!
//! 此模块定义了节点 agent 与用户目录、与本地代理之间的共享类型，
//! 包括 ProxyController trait、DirectoryClient trait 以及相关的请求/响应结构体。

pub mod control;
pub mod directory;
pub mod traffic;
pub mod user;
