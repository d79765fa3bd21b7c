//! 用户对账
//!
//! 以用户目录中的期望用户为准，对比代理中现有的用户，
//! 先修改运行中的代理，再修改持久化配置，有变更时整体写回配置文件。

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use common::config::V2rayConfig;
use common::protocol::control::{AddUserError, ProxyController, RemoveUserError};
use common::protocol::directory::{DirectoryClient, DirectoryUnavailable};
use common::protocol::user::{dedup_users, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOperation {
    Add,
    Remove,
}

impl fmt::Display for UserOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserOperation::Add => write!(f, "添加"),
            UserOperation::Remove => write!(f, "删除"),
        }
    }
}

/// 因操作失败而跳过的用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUser {
    pub user_id: String,
    pub operation: UserOperation,
    pub reason: String,
}

/// 一次对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub skipped: Vec<SkippedUser>,
    pub config_written: bool,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.skipped.is_empty()
    }
}

/// 计算差异：需要添加的期望用户，以及需要删除的现有用户 id
///
/// 只按 user_id 比较。删除列表保持现有用户的顺序。
pub fn diff_users<'a>(desired: &'a [User], live: &[String]) -> (Vec<&'a User>, Vec<String>) {
    let mut remaining: HashSet<&str> = live.iter().map(String::as_str).collect();
    let mut additions = Vec::new();

    for user in desired {
        if !remaining.remove(user.user_id.as_str()) {
            additions.push(user);
        }
    }

    let removals = live
        .iter()
        .filter(|id| remaining.contains(id.as_str()))
        .cloned()
        .collect();

    (additions, removals)
}

/// 对账引擎
pub struct ReconciliationEngine {
    controller: Arc<dyn ProxyController>,
    directory: Arc<dyn DirectoryClient>,
}

impl ReconciliationEngine {
    pub fn new(controller: Arc<dyn ProxyController>, directory: Arc<dyn DirectoryClient>) -> Self {
        Self {
            controller,
            directory,
        }
    }

    /// 拉取期望用户并执行一次对账
    ///
    /// 拉取失败时直接返回，不做任何修改。
    pub async fn run_cycle(&self, inbound_tag: &str) -> Result<ReconcileReport, DirectoryUnavailable> {
        let desired = match self.directory.fetch_desired_users().await {
            Ok(users) => users,
            Err(e) => {
                error!("拉取用户列表失败，跳过本次对账: {}", e);
                return Err(e);
            }
        };

        Ok(self.reconcile(&desired, inbound_tag).await)
    }

    /// 使指定入站的用户与期望用户一致
    pub async fn reconcile(&self, desired: &[User], inbound_tag: &str) -> ReconcileReport {
        let desired = dedup_users(desired);

        let live = match self.controller.list_live_users(inbound_tag).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("读取现有用户失败，按空列表处理: {}", e);
                Vec::new()
            }
        };

        let (additions, removals) = diff_users(&desired, &live);
        let mut report = ReconcileReport::default();

        if additions.is_empty() && removals.is_empty() {
            debug!("入站 {} 的用户已是最新 ({} 个)", inbound_tag, live.len());
            return report;
        }

        info!(
            "入站 {}: 待添加 {} 个用户，待删除 {} 个用户",
            inbound_tag,
            additions.len(),
            removals.len()
        );

        // 配置不可读时不写回，只修改运行中的代理
        let mut document: Option<V2rayConfig> = match self.controller.read_persisted_config().await {
            Ok(config) => Some(config),
            Err(e) => {
                error!("读取持久化配置失败，本次不写回配置文件: {}", e);
                None
            }
        };
        let mut dirty = false;

        for user in additions {
            match self.controller.add_live_user(inbound_tag, user).await {
                Ok(()) => info!("已添加用户 {} (level={}, alter_id={})", user.user_id, user.level, user.alter_id),
                Err(AddUserError::AlreadyExists) => {
                    warn!("用户 {} 已在运行中的代理内，仅同步配置文件", user.user_id);
                }
                Err(AddUserError::Other(reason)) => {
                    error!("添加用户 {} 失败: {}", user.user_id, reason);
                    report.skipped.push(SkippedUser {
                        user_id: user.user_id.clone(),
                        operation: UserOperation::Add,
                        reason,
                    });
                    continue;
                }
            }

            report.added.push(user.user_id.clone());
            if let Some(doc) = document.as_mut() {
                dirty |= doc.add_client(inbound_tag, user);
            }
        }

        for user_id in removals {
            match self.controller.remove_live_user(inbound_tag, &user_id).await {
                Ok(()) => info!("已删除用户 {}", user_id),
                Err(RemoveUserError::NotFound) => {
                    warn!("用户 {} 不在运行中的代理内，仅同步配置文件", user_id);
                }
                Err(RemoveUserError::Other(reason)) => {
                    error!("删除用户 {} 失败: {}", user_id, reason);
                    report.skipped.push(SkippedUser {
                        user_id,
                        operation: UserOperation::Remove,
                        reason,
                    });
                    continue;
                }
            }

            if let Some(doc) = document.as_mut() {
                dirty |= doc.remove_client(inbound_tag, &user_id);
            }
            report.removed.push(user_id);
        }

        if let (true, Some(doc)) = (dirty, document.as_ref()) {
            match self.controller.write_persisted_config(doc).await {
                Ok(()) => {
                    report.config_written = true;
                    info!("持久化配置已更新");
                }
                Err(e) => error!("写回持久化配置失败: {}", e),
            }
        } else if document.is_some() && !report.added.is_empty() {
            warn!("配置文件中没有 tag 为 {} 的入站，未写回", inbound_tag);
        }

        report
    }
}
