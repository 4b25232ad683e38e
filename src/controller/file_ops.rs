use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context as AnyhowContext, Result, anyhow};
use tracing::warn;

/// Task blobs, stored flat under one directory by file name.
#[derive(Debug, Clone)]
pub struct FileOps {
    temp_dir: PathBuf,
}

impl FileOps {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Only the final component of `file_path` is used, so a task cannot
    /// point outside the blob directory.
    pub fn resolve(&self, file_path: &str) -> Option<PathBuf> {
        Path::new(file_path).file_name().map(|name| self.temp_dir.join(name))
    }

    pub async fn exists(&self, file_path: &str) -> bool {
        match self.resolve(file_path) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    pub async fn save(&self, file_path: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self
            .resolve(file_path)
            .ok_or_else(|| anyhow!("invalid task file name: {file_path:?}"))?;
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.temp_dir.display()))?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write task file {}", path.display()))?;
        Ok(path)
    }

    /// Already-deleted blobs are fine; anything else is logged.
    pub async fn remove(&self, file_path: &str) {
        let Some(path) = self.resolve(file_path) else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove task file"),
        }
    }
}
