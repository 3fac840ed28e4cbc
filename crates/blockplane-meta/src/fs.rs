use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nix::fcntl::{Flock, FlockArg};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::MetaError;
use crate::info::MetaInfo;
use crate::store::{MetaStore, VolumeLock};

const LOCKFILE: &str = "meta.lock";
const BACKING_DIR: &str = "blocks";

/// [`MetaStore`] rooted at a directory on the shared cluster filesystem.
///
/// Layout per volume:
/// ```text
/// <root>/<volume>/meta.lock         exclusive-flock target
/// <root>/<volume>/<block_name>      append-only status log
/// <root>/<volume>/blocks/<gbid>     backing file exported as the LUN
/// ```
pub struct FsMetaStore {
    root: PathBuf,
    /// One mutex per volume; flock is advisory, so in-process callers are
    /// serialized here first.
    volume_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Serializes appends so fan-out workers never interleave lines.
    write_mu: tokio::sync::Mutex<()>,
}

impl FsMetaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsMetaStore {
            root: root.into(),
            volume_locks: Mutex::new(HashMap::new()),
            write_mu: tokio::sync::Mutex::new(()),
        }
    }

    fn volume_dir(&self, volume: &str) -> PathBuf {
        self.root.join(volume)
    }

    fn meta_path(&self, volume: &str, block: &str) -> PathBuf {
        self.volume_dir(volume).join(block)
    }

    fn backing_path(&self, volume: &str, gbid: &str) -> PathBuf {
        self.volume_dir(volume).join(BACKING_DIR).join(gbid)
    }

    fn process_lock(&self, volume: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.volume_locks.lock().expect("volume lock registry poisoned");
        map.entry(volume.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

async fn flock_exclusive(path: PathBuf) -> Result<Flock<std::fs::File>, MetaError> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| MetaError::io(path.display(), e))?;
        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            MetaError::io(path.display(), std::io::Error::from_raw_os_error(errno as i32))
        })
    })
    .await
    .map_err(|e| MetaError::Io {
        path: "meta.lock".to_string(),
        source: std::io::Error::other(e),
    })?
}

fn map_read_err(block: &str, path: &Path, e: std::io::Error) -> MetaError {
    if e.kind() == std::io::ErrorKind::NotFound {
        MetaError::NotFound(block.to_string())
    } else {
        MetaError::io(path.display(), e)
    }
}

#[async_trait]
impl MetaStore for FsMetaStore {
    async fn open_volume(&self, volume: &str) -> Result<(), MetaError> {
        let dir = self.volume_dir(volume);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MetaError::VolumeUnavailable {
                volume: volume.to_string(),
                reason: e.to_string(),
            })
    }

    async fn lock(&self, volume: &str) -> Result<VolumeLock, MetaError> {
        self.open_volume(volume).await?;
        let process = self.process_lock(volume).lock_owned().await;
        let file = flock_exclusive(self.volume_dir(volume).join(LOCKFILE)).await?;
        debug!(volume, "metadata lock acquired");
        Ok(VolumeLock::new(process, Some(file)))
    }

    async fn read_meta(&self, volume: &str, block: &str) -> Result<MetaInfo, MetaError> {
        let path = self.meta_path(volume, block);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| map_read_err(block, &path, e))?;
        MetaInfo::parse(block, &text)
    }

    async fn append(&self, volume: &str, block: &str, lines: &[String]) -> Result<(), MetaError> {
        let _guard = self.write_mu.lock().await;
        let path = self.meta_path(volume, block);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| MetaError::io(path.display(), e))?;
        let mut buf = String::new();
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| MetaError::io(path.display(), e))?;
        file.flush().await.map_err(|e| MetaError::io(path.display(), e))
    }

    async fn exists(&self, volume: &str, block: &str) -> Result<bool, MetaError> {
        Ok(tokio::fs::try_exists(self.meta_path(volume, block))
            .await
            .unwrap_or(false))
    }

    async fn list_blocks(&self, volume: &str) -> Result<Vec<String>, MetaError> {
        let dir = self.volume_dir(volume);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| MetaError::VolumeUnavailable {
                volume: volume.to_string(),
                reason: e.to_string(),
            })?;
        let mut blocks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MetaError::io(dir.display(), e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LOCKFILE || name == BACKING_DIR {
                continue;
            }
            if entry
                .file_type()
                .await
                .map_err(|e| MetaError::io(dir.display(), e))?
                .is_file()
            {
                blocks.push(name);
            }
        }
        blocks.sort();
        Ok(blocks)
    }

    async fn delete_meta(&self, volume: &str, block: &str) -> Result<(), MetaError> {
        let path = self.meta_path(volume, block);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| map_read_err(block, &path, e))
    }

    async fn create_backing(
        &self,
        volume: &str,
        gbid: &str,
        size: u64,
        prealloc: bool,
    ) -> Result<(), MetaError> {
        let path = self.backing_path(volume, gbid);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MetaError::io(parent.display(), e))?;
        }
        let path_for_err = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            use std::io::Write;

            let mut file = std::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)?;
            if prealloc {
                // Full allocation: back every byte now so the export can
                // never hit ENOSPC mid-write.
                let chunk = vec![0u8; 1 << 20];
                let mut left = size as usize;
                while left > 0 {
                    let n = left.min(chunk.len());
                    file.write_all(&chunk[..n])?;
                    left -= n;
                }
                file.flush()?;
            } else {
                file.set_len(size)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| MetaError::Io {
            path: path_for_err.display().to_string(),
            source: std::io::Error::other(e),
        })?
        .map_err(|e| MetaError::io(path_for_err.display(), e))
    }

    async fn delete_backing(&self, volume: &str, gbid: &str) -> Result<(), MetaError> {
        let path = self.backing_path(volume, gbid);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MetaError::io(path.display(), e)),
        }
    }

    async fn backing_exists(&self, volume: &str, gbid: &str) -> Result<bool, MetaError> {
        Ok(tokio::fs::try_exists(self.backing_path(volume, gbid))
            .await
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn store() -> (tempfile::TempDir, FsMetaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetaStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let (_dir, store) = store();
        store.open_volume("v1").await.unwrap();
        store
            .append(
                "v1",
                "b1",
                &[
                    "VOLUME: v1".into(),
                    "GBID: 5f4dcc3b-aa12-4b1e-9a2f-000000000001".into(),
                    "HA: 1".into(),
                    "h1: CONFIGSUCCESS".into(),
                ],
            )
            .await
            .unwrap();

        let info = store.read_meta("v1", "b1").await.unwrap();
        assert_eq!(info.mpath, 1);
        assert_eq!(info.exported_hosts(), vec!["h1"]);
    }

    #[tokio::test]
    async fn read_missing_block_is_not_found() {
        let (_dir, store) = store();
        store.open_volume("v1").await.unwrap();
        assert!(store.read_meta("v1", "nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_skips_lockfile_and_backing_dir() {
        let (_dir, store) = store();
        store.open_volume("v1").await.unwrap();
        let _lock = store.lock("v1").await.unwrap();
        store.append("v1", "b1", &["GBID: x".into()]).await.unwrap();
        store.append("v1", "b2", &["GBID: x".into()]).await.unwrap();
        store
            .create_backing("v1", "5f4dcc3b-aa12-4b1e-9a2f-000000000001", 4096, false)
            .await
            .unwrap();

        let blocks = store.list_blocks("v1").await.unwrap();
        assert_eq!(blocks, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn backing_lifecycle() {
        let (_dir, store) = store();
        store.open_volume("v1").await.unwrap();
        let gbid = "5f4dcc3b-aa12-4b1e-9a2f-000000000001";
        store.create_backing("v1", gbid, 1 << 20, false).await.unwrap();
        assert!(store.backing_exists("v1", gbid).await.unwrap());
        // Double create must fail: the gbid is unique per block lifetime.
        assert!(store.create_backing("v1", gbid, 1 << 20, false).await.is_err());
        store.delete_backing("v1", gbid).await.unwrap();
        assert!(!store.backing_exists("v1", gbid).await.unwrap());
        // Deleting again is fine.
        store.delete_backing("v1", gbid).await.unwrap();
    }

    #[tokio::test]
    async fn volume_lock_is_exclusive_in_process() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        store.open_volume("v1").await.unwrap();

        let guard = store.lock("v1").await.unwrap();
        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _second = store.lock("v1").await.unwrap();
            })
        };

        // The contender cannot finish while we hold the lock.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), contender)
            .await
            .expect("contender should acquire the lock after release")
            .unwrap();
    }

    #[tokio::test]
    async fn locks_on_different_volumes_are_independent() {
        let (_dir, store) = store();
        let _a = store.lock("v1").await.unwrap();
        let _b = store.lock("v2").await.unwrap();
    }
}
