use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::error::{PortalError, PortalResult};

/// Durable key-value storage for the session store. Values are written whole.
#[async_trait]
pub trait IdentityCache: Send + Sync {
    async fn get(&self, key: &str) -> PortalResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PortalResult<()>;
    async fn remove(&self, key: &str) -> PortalResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryIdentityCache {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityCache for InMemoryIdentityCache {
    async fn get(&self, key: &str) -> PortalResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortalResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileIdentityCache {
    dir: PathBuf,
}

impl FileIdentityCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PortalResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(PortalError::Validation(format!("Invalid cache key: {key}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl IdentityCache for FileIdentityCache {
    async fn get(&self, key: &str) -> PortalResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Readers never see a partial entry.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, value).await?;
        tokio::fs::rename(&staging, &path).await?;
        debug!("Persisted cache entry {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortalResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_cache_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileIdentityCache::new(dir.path().join("state"));

        assert_eq!(cache.get("identity").await.unwrap(), None);

        cache.set("identity", r#"{"name":"a"}"#).await.unwrap();
        cache.set("identity", r#"{"name":"b"}"#).await.unwrap();
        assert_eq!(
            cache.get("identity").await.unwrap().as_deref(),
            Some(r#"{"name":"b"}"#)
        );

        cache.remove("identity").await.unwrap();
        cache.remove("identity").await.unwrap();
        assert_eq!(cache.get("identity").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cache_rejects_path_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileIdentityCache::new(dir.path());
        assert!(cache.set("../escape", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = InMemoryIdentityCache::new();
        cache.set("k", "v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.remove("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
