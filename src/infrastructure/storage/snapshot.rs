//! 文件快照存储
//!
//! 把缓存驻留 key 列表写成 JSON 数组：
//! ```json
//! ["o2", "o3", "o4"]
//! ```
//! 写入流程：先写临时文件，再原子 rename 覆盖目标文件，
//! 进程在写入途中崩溃时旧快照保持完整。

use crate::domain::ports::{SnapshotError, SnapshotStore};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 基于文件的快照存储
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn write(&self, keys: &[String]) -> Result<(), SnapshotError> {
        let content = serde_json::to_vec(keys)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.temp_path();

        // 写入临时文件
        if let Err(e) = tokio::fs::write(&temp_path, &content).await {
            warn!(path = ?temp_path, error = %e, "failed to write snapshot temp file");
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        // 原子替换
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            warn!(path = ?self.path, error = %e, "failed to move snapshot into place");
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = ?self.path, keys = keys.len(), "cache snapshot persisted");
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<String>>, SnapshotError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let keys: Vec<String> = serde_json::from_slice(&content)?;
        Ok(Some(keys))
    }
}
