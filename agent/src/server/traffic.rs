//! 流量上报
//!
//! 每个周期对代理计数做一次破坏性读取（读后清零），与上次未送达的记录合并后上报。
//! 上报失败时合并结果留待下个周期，保证两次成功上报之间的流量不丢失也不重复。

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use common::protocol::control::ProxyController;
use common::protocol::directory::{DirectoryClient, SubmitOutcome};
use common::protocol::traffic::TrafficRecord;

/// 未送达的流量记录，最多保留一条
#[derive(Debug, Default)]
pub struct PendingTraffic {
    record: Option<TrafficRecord>,
}

impl PendingTraffic {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_record(record: TrafficRecord) -> Self {
        Self {
            record: Some(record),
        }
    }

    pub fn take(&mut self) -> Option<TrafficRecord> {
        self.record.take()
    }

    /// 替换（而不是追加）当前保留的记录
    pub fn store(&mut self, record: TrafficRecord) {
        self.record = Some(record);
    }

    #[cfg(test)]
    pub fn get(&self) -> Option<&TrafficRecord> {
        self.record.as_ref()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.record.is_none()
    }
}

/// 一次上报的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Submitted,
    /// 上报失败，合并后的记录已保留
    Retained(SubmitOutcome),
}

/// 流量统计上报器
pub struct TrafficAccountant {
    controller: Arc<dyn ProxyController>,
    directory: Arc<dyn DirectoryClient>,
    pending: Mutex<PendingTraffic>,
}

impl TrafficAccountant {
    pub fn new(controller: Arc<dyn ProxyController>, directory: Arc<dyn DirectoryClient>) -> Self {
        Self::with_pending(controller, directory, PendingTraffic::new())
    }

    pub fn with_pending(
        controller: Arc<dyn ProxyController>,
        directory: Arc<dyn DirectoryClient>,
        pending: PendingTraffic,
    ) -> Self {
        Self {
            controller,
            directory,
            pending: Mutex::new(pending),
        }
    }

    /// 当前保留的未送达记录
    #[cfg(test)]
    pub async fn pending_snapshot(&self) -> Option<TrafficRecord> {
        self.pending.lock().await.get().cloned()
    }

    /// 读取、合并并上报一次流量
    ///
    /// 读取计数失败时源头未清零，直接返回错误，保留的记录不变。
    pub async fn report_traffic(&self, inbound_tag: &str) -> Result<ReportOutcome> {
        // 整个周期持有锁，两次上报不会交错
        let mut pending = self.pending.lock().await;

        let snapshot = match self.controller.read_all_traffic(true).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("读取流量计数失败: {:#}", e);
                return Err(e);
            }
        };

        let mut record = TrafficRecord::from_snapshot(snapshot, inbound_tag);
        if let Some(previous) = pending.take() {
            debug!(
                "合并上次未送达的流量: 节点 ↑{} ↓{}, {} 个用户",
                previous.node.uplink,
                previous.node.downlink,
                previous.users.len()
            );
            record.merge(&previous);
        }

        let outcome = self.directory.submit_traffic(&record).await;
        if outcome.is_accepted() {
            info!(
                "流量上报成功: 节点 ↑{} ↓{}, {} 个用户",
                record.node.uplink,
                record.node.downlink,
                record.users.len()
            );
            return Ok(ReportOutcome::Submitted);
        }

        warn!("流量上报失败 ({:?})，记录保留到下个周期", outcome);
        pending.store(record);
        Ok(ReportOutcome::Retained(outcome))
    }
}
