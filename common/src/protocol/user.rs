//! 用户目录相关类型
//!
//! 定义了从用户目录拉取的期望用户集合。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 期望存在于代理中的用户
///
/// 差异比较只看 `user_id`，`level` 与 `alter_id` 仅在添加时下发。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// 用户 UUID，同时作为代理侧的 email 标识
    pub user_id: String,
    pub level: u32,
    pub alter_id: u32,
}

/// 用户目录返回的用户列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
}

/// 按 user_id 去重，保留首次出现的条目
pub fn dedup_users(users: &[User]) -> Vec<User> {
    let mut seen = HashSet::new();
    users
        .iter()
        .filter(|u| seen.insert(u.user_id.as_str()))
        .cloned()
        .collect()
}
