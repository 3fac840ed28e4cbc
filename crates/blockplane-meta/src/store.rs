use async_trait::async_trait;
use nix::fcntl::Flock;
use tokio::sync::OwnedMutexGuard;

use crate::error::MetaError;
use crate::info::MetaInfo;

/// Token proving the holder owns a volume's metadata.
///
/// Two layers, released together on drop: an in-process per-volume mutex
/// (the file lock below is advisory, so a second orchestrator in the same
/// process must be stopped here) and an exclusive flock on the volume's
/// `meta.lock` file, which serializes managers across nodes through the
/// shared filesystem. The in-memory store carries only the first layer.
pub struct VolumeLock {
    _process: OwnedMutexGuard<()>,
    _file: Option<Flock<std::fs::File>>,
}

impl VolumeLock {
    pub(crate) fn new(process: OwnedMutexGuard<()>, file: Option<Flock<std::fs::File>>) -> Self {
        VolumeLock { _process: process, _file: file }
    }
}

/// Per-volume metadata on the shared filesystem (§ lockfile + append-only
/// per-block status log).
///
/// The store never verifies that a caller holds the [`VolumeLock`]; taking
/// it before any read-modify cycle is the orchestrator's discipline. The one
/// guarantee the store itself makes is that concurrent `append` calls never
/// interleave partial lines.
#[async_trait]
pub trait MetaStore: Send + Sync + 'static {
    /// Ensure the volume's metadata directory exists.
    async fn open_volume(&self, volume: &str) -> Result<(), MetaError>;

    /// Take the volume's exclusive metadata lock, blocking until available.
    async fn lock(&self, volume: &str) -> Result<VolumeLock, MetaError>;

    async fn read_meta(&self, volume: &str, block: &str) -> Result<MetaInfo, MetaError>;

    /// Atomically append `lines` to the block's log.
    async fn append(&self, volume: &str, block: &str, lines: &[String]) -> Result<(), MetaError>;

    async fn exists(&self, volume: &str, block: &str) -> Result<bool, MetaError>;

    /// Block names in the volume, excluding the lockfile and backing store.
    async fn list_blocks(&self, volume: &str) -> Result<Vec<String>, MetaError>;

    /// Remove the block's metadata file (after `ENTRYDELETE: SUCCESS`).
    async fn delete_meta(&self, volume: &str, block: &str) -> Result<(), MetaError>;

    /// Create the backing file for a block, `size` bytes, optionally
    /// preallocated.
    async fn create_backing(
        &self,
        volume: &str,
        gbid: &str,
        size: u64,
        prealloc: bool,
    ) -> Result<(), MetaError>;

    /// Unlink the backing file. Missing file is not an error.
    async fn delete_backing(&self, volume: &str, gbid: &str) -> Result<(), MetaError>;

    async fn backing_exists(&self, volume: &str, gbid: &str) -> Result<bool, MetaError>;
}
