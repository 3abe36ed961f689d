//! # State Cache
//!
//! The last snapshot received from the authority, kept in
//! `<state_dir>/state.json` so the site keeps working through WAN outages
//! and restarts.
//!
//! ## Atomic Swap
//! ```text
//! save(snapshot)
//!   1. write  <state_dir>/.state.json
//!   2. fsync  .state.json
//!   3. rename .state.json ──► state.json     (atomic on POSIX)
//!   4. fsync  <state_dir>                     (makes the rename durable)
//!
//! A reader opening state.json sees the complete old file or the complete
//! new one. A crash before step 3 leaves a stray .state.json that the next
//! save overwrites.
//! ```

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use outpost_core::StateSnapshot;

use crate::error::SyncResult;
use crate::fsync::fsync_dir;

const STATE_FILE: &str = "state.json";
const STAGING_FILE: &str = ".state.json";

/// Disk-backed copy of the latest [`StateSnapshot`].
#[derive(Debug, Clone)]
pub struct StateCache {
    dir: PathBuf,
    path: PathBuf,
    staging: PathBuf,
}

impl StateCache {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let dir = state_dir.as_ref();
        StateCache {
            dir: dir.to_path_buf(),
            path: dir.join(STATE_FILE),
            staging: dir.join(STAGING_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached snapshot. `None` if nothing has been cached yet.
    pub async fn load(&self) -> SyncResult<Option<StateSnapshot>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replaces the cached snapshot atomically.
    pub async fn save(&self, snapshot: &StateSnapshot) -> SyncResult<()> {
        let json = serde_json::to_vec(snapshot)?;

        let mut file = fs::File::create(&self.staging).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&self.staging, &self.path).await?;
        fsync_dir(&self.dir).await?;
        debug!(revision = snapshot.revision, "State cache swapped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::new(dir.path());
        assert_eq!(cache.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::new(dir.path());

        let big = StateSnapshot::new(2, (0..1000).collect());
        cache.save(&big).await.unwrap();
        let small = StateSnapshot::new(3, vec![7]);
        cache.save(&small).await.unwrap();

        assert_eq!(cache.load().await.unwrap(), Some(small));
        assert!(!dir.path().join(STAGING_FILE).exists());
    }

    #[tokio::test]
    async fn test_interrupted_write_leaves_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::new(dir.path());
        let good = StateSnapshot::new(5, vec![1, 2, 3]);
        cache.save(&good).await.unwrap();

        // A crash after writing half the staging file but before the rename
        std::fs::write(dir.path().join(STAGING_FILE), br#"{"revision":6,"enabled_f"#).unwrap();

        assert_eq!(cache.load().await.unwrap(), Some(good));

        // The next save simply overwrites the stray staging file
        let next = StateSnapshot::new(6, vec![4]);
        cache.save(&next).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), Some(next));
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), b"{nope").unwrap();

        assert!(StateCache::new(dir.path()).load().await.is_err());
    }
}
