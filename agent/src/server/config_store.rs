//! V2Ray 配置文件读写
//!
//! 写入时先写同目录下的临时文件并 fsync，再 rename 覆盖目标文件，
//! 读者要么看到旧内容，要么看到完整的新内容。

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use common::config::V2rayConfig;
use common::protocol::control::ConfigStoreError;

/// 基于文件的 V2Ray 配置存储
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// 读取并解析配置文件
    pub async fn load(&self) -> Result<V2rayConfig, ConfigStoreError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigStoreError::Unreadable {
                path: self.display_path(),
                source,
            })?;

        V2rayConfig::from_json(&content).map_err(|source| ConfigStoreError::Malformed {
            path: self.display_path(),
            source,
        })
    }

    /// 整体替换配置文件
    pub async fn save(&self, config: &V2rayConfig) -> Result<(), ConfigStoreError> {
        let content = config.to_pretty_json()?;
        let temp = self.temp_path();

        let result = self.write_and_rename(&temp, content.as_bytes()).await;
        if result.is_err() {
            let _ = fs::remove_file(&temp).await;
        }

        result.map_err(|source| ConfigStoreError::WriteFailed {
            path: self.display_path(),
            source,
        })
    }

    async fn write_and_rename(&self, temp: &Path, content: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(temp, &self.path).await?;
        debug!("配置已写入 {}", self.path.display());
        Ok(())
    }
}
