//! Key/value persistence for client-side state.

use super::ClientError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key holding the queued, not-yet-confirmed sales.
pub const PENDING_SALES_KEY: &str = "pending_sales";
/// Key holding the last dashboard snapshot.
pub const DASHBOARD_CACHE_KEY: &str = "dashboard_cache";

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, ClientError>;
    async fn save(&self, key: &str, value: &str) -> Result<(), ClientError>;
    async fn remove(&self, key: &str) -> Result<(), ClientError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn storage_error(context: &str, path: &Path, err: std::io::Error) -> ClientError {
    ClientError::Storage(format!("{context} {}: {err}", path.display()))
}

#[async_trait]
impl LocalStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<String>, ClientError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("failed to read", &path, e)),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), ClientError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error("failed creating directory", &self.dir, e))?;

        // Write-then-rename: readers never see a truncated file.
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| storage_error("failed writing", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error("failed replacing", &path, e))?;
        debug!(key, path = %path.display(), "client state saved");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("failed to remove", &path, e)),
        }
    }
}

/// In-process store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.entries.remove(key);
        Ok(())
    }
}
