//! 流量上报相关类型
//!
//! 定义了节点向用户目录上报流量数据的结构体，以及跨周期累加未送达记录的合并规则。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const STAT_SEPARATOR: &str = ">>>";

/// 上下行字节计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounter {
    pub uplink: u64,
    pub downlink: u64,
}

impl TrafficCounter {
    pub fn new(uplink: u64, downlink: u64) -> Self {
        Self { uplink, downlink }
    }

    pub fn add(&mut self, other: &TrafficCounter) {
        self.uplink = self.uplink.saturating_add(other.uplink);
        self.downlink = self.downlink.saturating_add(other.downlink);
    }

    pub fn is_zero(&self) -> bool {
        self.uplink == 0 && self.downlink == 0
    }
}

/// 一次从代理读取到的原始流量（按入站 tag 和用户 email 归类）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficSnapshot {
    pub inbounds: HashMap<String, TrafficCounter>,
    pub users: HashMap<String, TrafficCounter>,
}

impl TrafficSnapshot {
    /// 从统计项列表构建快照
    ///
    /// 统计项名称形如 `user>>>{email}>>>traffic>>>uplink` 或
    /// `inbound>>>{tag}>>>traffic>>>downlink`，其它统计项忽略。
    pub fn from_stats<'a, I>(stats: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut snapshot = Self::default();

        for (name, value) in stats {
            let parts: Vec<&str> = name.split(STAT_SEPARATOR).collect();
            if parts.len() != 4 || parts[2] != "traffic" {
                continue;
            }

            let bucket = match parts[0] {
                "inbound" => &mut snapshot.inbounds,
                "user" => &mut snapshot.users,
                _ => continue,
            };

            let value = value.max(0) as u64;
            match parts[3] {
                "uplink" => bucket.entry(parts[1].to_string()).or_default().add(&TrafficCounter::new(value, 0)),
                "downlink" => bucket.entry(parts[1].to_string()).or_default().add(&TrafficCounter::new(0, value)),
                _ => {}
            }
        }

        snapshot
    }
}

/// 上报给用户目录的流量记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub node: TrafficCounter,
    pub users: BTreeMap<String, TrafficCounter>,
}

impl TrafficRecord {
    /// 以指定入站的计数作为节点流量，入站不存在时节点流量为 0
    pub fn from_snapshot(snapshot: TrafficSnapshot, inbound_tag: &str) -> Self {
        let node = snapshot
            .inbounds
            .get(inbound_tag)
            .copied()
            .unwrap_or_default();

        Self {
            node,
            users: snapshot.users.into_iter().collect(),
        }
    }

    /// 将另一条记录累加进来，用户取并集，缺失的一侧按 0 计
    pub fn merge(&mut self, other: &TrafficRecord) {
        self.node.add(&other.node);
        for (user_id, counter) in &other.users {
            self.users.entry(user_id.clone()).or_default().add(counter);
        }
    }
}
