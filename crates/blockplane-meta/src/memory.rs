use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::error::MetaError;
use crate::info::MetaInfo;
use crate::store::{MetaStore, VolumeLock};

#[derive(Debug, Default)]
struct VolumeData {
    /// Raw log text per block, appended exactly like the on-disk files.
    blocks: HashMap<String, String>,
    /// Backing "files" by gbid, value is the size.
    backing: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct Inner {
    volumes: HashMap<String, VolumeData>,
}

/// In-memory implementation of [`MetaStore`].
///
/// All data is lost on process exit. Suitable for tests and single-process
/// demos; only the in-process half of the volume lock exists here.
#[derive(Clone, Default)]
pub struct InMemoryMetaStore {
    inner: Arc<RwLock<Inner>>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_lock(&self, volume: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.locks.lock().expect("volume lock registry poisoned");
        map.entry(volume.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Raw log text of a block, for transition-history assertions in tests.
    pub fn raw_log(&self, volume: &str, block: &str) -> Option<String> {
        let guard = self.inner.read().unwrap();
        guard
            .volumes
            .get(volume)
            .and_then(|v| v.blocks.get(block))
            .cloned()
    }
}

#[async_trait]
impl MetaStore for InMemoryMetaStore {
    async fn open_volume(&self, volume: &str) -> Result<(), MetaError> {
        let mut guard = self.inner.write().unwrap();
        guard.volumes.entry(volume.to_string()).or_default();
        Ok(())
    }

    async fn lock(&self, volume: &str) -> Result<VolumeLock, MetaError> {
        self.open_volume(volume).await?;
        let process = self.process_lock(volume).lock_owned().await;
        Ok(VolumeLock::new(process, None))
    }

    async fn read_meta(&self, volume: &str, block: &str) -> Result<MetaInfo, MetaError> {
        let guard = self.inner.read().unwrap();
        let text = guard
            .volumes
            .get(volume)
            .and_then(|v| v.blocks.get(block))
            .ok_or_else(|| MetaError::NotFound(block.to_string()))?;
        MetaInfo::parse(block, text)
    }

    async fn append(&self, volume: &str, block: &str, lines: &[String]) -> Result<(), MetaError> {
        let mut guard = self.inner.write().unwrap();
        let volume = guard.volumes.entry(volume.to_string()).or_default();
        let log = volume.blocks.entry(block.to_string()).or_default();
        for line in lines {
            log.push_str(line);
            log.push('\n');
        }
        Ok(())
    }

    async fn exists(&self, volume: &str, block: &str) -> Result<bool, MetaError> {
        let guard = self.inner.read().unwrap();
        Ok(guard
            .volumes
            .get(volume)
            .is_some_and(|v| v.blocks.contains_key(block)))
    }

    async fn list_blocks(&self, volume: &str) -> Result<Vec<String>, MetaError> {
        let guard = self.inner.read().unwrap();
        let mut blocks: Vec<String> = guard
            .volumes
            .get(volume)
            .map(|v| v.blocks.keys().cloned().collect())
            .unwrap_or_default();
        blocks.sort();
        Ok(blocks)
    }

    async fn delete_meta(&self, volume: &str, block: &str) -> Result<(), MetaError> {
        let mut guard = self.inner.write().unwrap();
        let removed = guard
            .volumes
            .get_mut(volume)
            .and_then(|v| v.blocks.remove(block));
        if removed.is_none() {
            return Err(MetaError::NotFound(block.to_string()));
        }
        Ok(())
    }

    async fn create_backing(
        &self,
        volume: &str,
        gbid: &str,
        size: u64,
        _prealloc: bool,
    ) -> Result<(), MetaError> {
        let mut guard = self.inner.write().unwrap();
        let volume = guard.volumes.entry(volume.to_string()).or_default();
        if volume.backing.contains_key(gbid) {
            return Err(MetaError::Io {
                path: gbid.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            });
        }
        volume.backing.insert(gbid.to_string(), size);
        Ok(())
    }

    async fn delete_backing(&self, volume: &str, gbid: &str) -> Result<(), MetaError> {
        let mut guard = self.inner.write().unwrap();
        if let Some(v) = guard.volumes.get_mut(volume) {
            v.backing.remove(gbid);
        }
        Ok(())
    }

    async fn backing_exists(&self, volume: &str, gbid: &str) -> Result<bool, MetaError> {
        let guard = self.inner.read().unwrap();
        Ok(guard
            .volumes
            .get(volume)
            .is_some_and(|v| v.backing.contains_key(gbid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn append_and_read() {
        let store = InMemoryMetaStore::new();
        store
            .append("v1", "b1", &["GBID: g".into(), "HA: 1".into()])
            .await
            .unwrap();
        let info = store.read_meta("v1", "b1").await.unwrap();
        assert_eq!(info.gbid, "g");
    }

    #[tokio::test]
    async fn delete_meta_removes_block() {
        let store = InMemoryMetaStore::new();
        store.append("v1", "b1", &["GBID: g".into(), "HA: 1".into()]).await.unwrap();
        store.delete_meta("v1", "b1").await.unwrap();
        assert!(!store.exists("v1", "b1").await.unwrap());
        assert!(store.delete_meta("v1", "b1").await.is_err());
    }

    #[tokio::test]
    async fn lock_serializes_commands_on_one_volume() {
        let store = Arc::new(InMemoryMetaStore::new());
        let guard = store.lock("v1").await.unwrap();
        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.lock("v1").await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), contender)
            .await
            .unwrap()
            .unwrap();
    }
}
