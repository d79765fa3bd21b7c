//! Agent 配置模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "v2ray-agent.toml";

const ENV_NODE_ID: &str = "V2RAY_NODE_ID";
const ENV_API_KEY: &str = "V2RAY_NODE_API_KEY";

/// Agent 配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// 当前节点 ID（可由环境变量 V2RAY_NODE_ID 覆盖）
    #[serde(default)]
    pub node_id: String,

    /// 请求用户目录使用的 API Key（可由环境变量 V2RAY_NODE_API_KEY 覆盖）
    #[serde(default)]
    pub api_key: String,

    /// 用户目录地址
    #[serde(default = "default_directory_url")]
    pub directory_url: String,

    /// 同步用户的间隔（秒）
    #[serde(default = "default_check_user_interval")]
    pub check_user_interval: u64,

    /// 上报流量的间隔（秒）
    #[serde(default = "default_update_traffic_interval")]
    pub update_traffic_interval: u64,

    /// V2Ray gRPC API 地址
    #[serde(default = "default_v2ray_api_host")]
    pub v2ray_api_host: String,

    /// V2Ray gRPC API 端口
    #[serde(default = "default_v2ray_api_port")]
    pub v2ray_api_port: u16,

    /// 需要同步的入站 tag
    #[serde(default = "default_inbound_tag")]
    pub inbound_tag: String,

    /// V2Ray 配置文件路径
    #[serde(default = "default_v2ray_config_path")]
    pub v2ray_config_path: String,

    /// 网络请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_directory_url() -> String {
    "https://example.com".to_string()
}

fn default_check_user_interval() -> u64 {
    60
}

fn default_update_traffic_interval() -> u64 {
    600
}

fn default_v2ray_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_v2ray_api_port() -> u16 {
    1234
}

fn default_inbound_tag() -> String {
    "master".to_string()
}

fn default_v2ray_config_path() -> String {
    "v2ray_config/config.json".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            api_key: String::new(),
            directory_url: default_directory_url(),
            check_user_interval: default_check_user_interval(),
            update_traffic_interval: default_update_traffic_interval(),
            v2ray_api_host: default_v2ray_api_host(),
            v2ray_api_port: default_v2ray_api_port(),
            inbound_tag: default_inbound_tag(),
            v2ray_config_path: default_v2ray_config_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)
            .with_context(|| format!("无法读取配置文件: {}", path_ref.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path_ref.display()))?;

        Ok(config)
    }

    /// 加载配置：指定路径时必须存在；未指定时尝试默认文件，不存在则使用默认值。
    /// 之后应用环境变量并校验。
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_overrides(
            std::env::var(ENV_NODE_ID).ok(),
            std::env::var(ENV_API_KEY).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// 用外部提供的节点 ID / API Key 覆盖配置，空值忽略
    pub fn apply_overrides(&mut self, node_id: Option<String>, api_key: Option<String>) {
        if let Some(id) = node_id.filter(|s| !s.is_empty()) {
            self.node_id = id;
        }
        if let Some(key) = api_key.filter(|s| !s.is_empty()) {
            self.api_key = key;
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            anyhow::bail!("未配置节点 ID（node_id 或环境变量 {}）", ENV_NODE_ID);
        }
        if self.api_key.is_empty() {
            anyhow::bail!("未配置 API Key（api_key 或环境变量 {}）", ENV_API_KEY);
        }
        if self.directory_url.is_empty() {
            anyhow::bail!("未配置用户目录地址 directory_url");
        }
        if self.v2ray_api_host.is_empty() || self.v2ray_api_port == 0 {
            anyhow::bail!(
                "无效的 V2Ray API 地址: {}:{}",
                self.v2ray_api_host,
                self.v2ray_api_port
            );
        }
        if self.check_user_interval == 0 || self.update_traffic_interval == 0 {
            anyhow::bail!("同步间隔和上报间隔必须大于 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("请求超时 request_timeout_secs 必须大于 0");
        }
        if self.inbound_tag.is_empty() {
            anyhow::bail!("未配置入站 tag");
        }
        Ok(())
    }

    /// V2Ray gRPC API 的 URI
    pub fn v2ray_api_endpoint(&self) -> String {
        format!("http://{}:{}", self.v2ray_api_host, self.v2ray_api_port)
    }

    pub fn check_user_interval(&self) -> Duration {
        Duration::from_secs(self.check_user_interval)
    }

    pub fn update_traffic_interval(&self) -> Duration {
        Duration::from_secs(self.update_traffic_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
