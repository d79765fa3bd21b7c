//! V2Ray 持久化配置定义
//!
//! 只对 `inbounds[].tag` 与 `inbounds[].settings.clients` 建模，
//! 其余字段通过 `#[serde(flatten)]` 原样保留，回写时不丢失。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::user::User;

/// V2Ray 配置文件（config.json）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V2rayConfig {
    #[serde(default)]
    pub inbounds: Vec<InboundConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 入站配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<InboundSettings>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 入站协议设置
///
/// `clients` 原样保留：不同协议的用户条目结构不同（如 trojan 没有 `id`），
/// 只有目标入站的条目才按 [`ClientEntry`] 解释。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 入站用户条目（VMess）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    #[serde(rename = "alterId", default, skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&User> for ClientEntry {
    fn from(user: &User) -> Self {
        Self {
            id: user.user_id.clone(),
            email: Some(user.user_id.clone()),
            level: Some(user.level),
            alter_id: Some(user.alter_id),
            extra: Map::new(),
        }
    }
}

impl From<&ClientEntry> for Value {
    fn from(entry: &ClientEntry) -> Self {
        let mut object = entry.extra.clone();
        object.insert("id".to_string(), Value::from(entry.id.clone()));
        if let Some(email) = &entry.email {
            object.insert("email".to_string(), Value::from(email.clone()));
        }
        if let Some(level) = entry.level {
            object.insert("level".to_string(), Value::from(level));
        }
        if let Some(alter_id) = entry.alter_id {
            object.insert("alterId".to_string(), Value::from(alter_id));
        }
        Value::Object(object)
    }
}

fn entry_id(entry: &Value) -> Option<&str> {
    entry.get("id").and_then(Value::as_str)
}

impl InboundConfig {
    /// 原始用户条目，未配置或不是数组时为空
    fn client_values(&self) -> &[Value] {
        self.settings
            .as_ref()
            .and_then(|s| s.clients.as_ref())
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 按 VMess 结构解析的用户条目，无法解析的条目跳过
    pub fn clients(&self) -> Vec<ClientEntry> {
        self.client_values()
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// `clients` 存在但不是数组时返回 None
    fn clients_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.settings
            .get_or_insert_with(InboundSettings::default)
            .clients
            .get_or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
    }
}

impl V2rayConfig {
    /// 解析配置文件内容
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// 序列化为配置文件内容（键排序、两空格缩进、非 ASCII 原样输出）
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        // 先转为 Value：serde_json::Map 默认基于 BTreeMap，键自然有序
        let value = serde_json::to_value(self)?;
        serde_json::to_string_pretty(&value)
    }

    pub fn inbound(&self, tag: &str) -> Option<&InboundConfig> {
        self.inbounds
            .iter()
            .find(|inbound| inbound.tag.as_deref() == Some(tag))
    }

    pub fn inbound_mut(&mut self, tag: &str) -> Option<&mut InboundConfig> {
        self.inbounds
            .iter_mut()
            .find(|inbound| inbound.tag.as_deref() == Some(tag))
    }

    /// 指定入站中的用户 id（去重，保持文件中的顺序）
    pub fn client_ids(&self, tag: &str) -> Option<Vec<String>> {
        let inbound = self.inbound(tag)?;
        let mut ids: Vec<String> = Vec::new();
        for id in inbound.client_values().iter().filter_map(entry_id) {
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
        Some(ids)
    }

    /// 向指定入站追加用户，入站不存在或无法追加时返回 false
    pub fn add_client(&mut self, tag: &str, user: &User) -> bool {
        match self.inbound_mut(tag).and_then(InboundConfig::clients_mut) {
            Some(clients) => {
                clients.push(Value::from(&ClientEntry::from(user)));
                true
            }
            None => false,
        }
    }

    /// 从指定入站删除用户的所有条目，没有删除任何条目时返回 false
    pub fn remove_client(&mut self, tag: &str, user_id: &str) -> bool {
        match self.inbound_mut(tag) {
            Some(inbound) if inbound.client_values().iter().any(|v| entry_id(v) == Some(user_id)) => {
                if let Some(clients) = inbound.clients_mut() {
                    clients.retain(|v| entry_id(v) != Some(user_id));
                }
                true
            }
            _ => false,
        }
    }
}
