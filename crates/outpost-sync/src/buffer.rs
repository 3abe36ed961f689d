//! # Event Buffer
//!
//! Events not yet acknowledged by the authority, one file each under
//! `<state_dir>/events/`. A file existing means "not delivered yet".
//!
//! ## Layout
//! ```text
//! events/
//! ├── .tmp                    staging path, renamed into place
//! ├── .bad-<key>              unreadable event set aside, newest 100 kept
//! ├── 01729350000123456789    ┐
//! ├── 01729350000123456790    ├─ zero-padded nanosecond keys:
//! └── 01729350000987654321    ┘  lexical order == creation order
//! ```
//!
//! Producers serialize through one mutex and pick a key strictly greater
//! than the previous one, so rapid appends never collide and always sort
//! in creation order. The push loop lists the directory without that lock:
//! renames are atomic, and a file that shows up mid-listing is simply
//! picked up on the next tick.
//!
//! Every rename and delete is followed by a directory fsync, so an event
//! acknowledged to a local producer survives a power cut.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use outpost_core::Event;

use crate::error::SyncResult;
use crate::fsync::fsync_dir;

const EVENTS_DIR: &str = "events";
const STAGING_FILE: &str = ".tmp";
const QUARANTINE_PREFIX: &str = ".bad-";

/// Quarantined files kept for inspection; older ones are pruned on open.
pub const MAX_QUARANTINED: usize = 100;

/// One event read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedEvent {
    pub key: String,
    pub path: PathBuf,
    pub event: Event,
}

/// Disk-backed FIFO of undelivered events.
#[derive(Debug)]
pub struct EventBuffer {
    dir: PathBuf,
    staging: PathBuf,

    /// Last key handed out. Held across the write so appends are serialized.
    last_key: Mutex<u128>,
}

impl EventBuffer {
    /// Opens (creating if needed) `<state_dir>/events`.
    pub async fn open(state_dir: impl AsRef<Path>) -> SyncResult<Self> {
        let dir = state_dir.as_ref().join(EVENTS_DIR);
        fs::create_dir_all(&dir).await?;

        let mut last_key = 0u128;
        let mut quarantined = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(key) = name.strip_prefix(QUARANTINE_PREFIX) {
                quarantined.push(key.to_string());
            } else if let Some(key) = parse_key(&name) {
                last_key = last_key.max(key);
            }
        }

        debug!(dir = %dir.display(), last_key = %last_key, "Event buffer opened");
        let buffer = EventBuffer {
            staging: dir.join(STAGING_FILE),
            dir,
            last_key: Mutex::new(last_key),
        };
        buffer.prune_quarantine(quarantined).await?;
        Ok(buffer)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably appends one event and returns its key.
    pub async fn append(&self, event: &Event) -> SyncResult<String> {
        let json = serde_json::to_vec(event)?;

        let mut last_key = self.last_key.lock().await;
        let key = now_nanos().max(*last_key + 1);
        let name = format_key(key);

        let mut file = fs::File::create(&self.staging).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&self.staging, self.dir.join(&name)).await?;
        fsync_dir(&self.dir).await?;
        *last_key = key;

        debug!(key = %name, uid = %event.uid, "Event buffered");
        Ok(name)
    }

    /// Reads up to `limit` of the oldest buffered events.
    ///
    /// A file that no longer parses is renamed aside so it cannot block
    /// the queue.
    pub async fn read_batch(&self, limit: usize) -> SyncResult<Vec<BufferedEvent>> {
        let mut keys = self.list_keys().await?;
        keys.sort_unstable();

        let mut batch = Vec::with_capacity(limit.min(keys.len()));
        for key in keys {
            if batch.len() >= limit {
                break;
            }

            let path = self.dir.join(&key);
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                // Removed since listing
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_slice::<Event>(&bytes) {
                Ok(event) => batch.push(BufferedEvent { key, path, event }),
                Err(e) => {
                    warn!(key = %key, error = %e, "Quarantining unreadable buffered event");
                    fs::rename(&path, self.quarantine_path(&key)).await?;
                    fsync_dir(&self.dir).await?;
                }
            }
        }

        Ok(batch)
    }

    /// Deletes exactly the given events.
    pub async fn remove(&self, events: &[BufferedEvent]) -> SyncResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        for buffered in events {
            remove_if_present(&buffered.path).await?;
        }
        fsync_dir(&self.dir).await?;
        Ok(())
    }

    /// Number of unreadable events set aside.
    pub async fn quarantined(&self) -> SyncResult<usize> {
        let mut count = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(QUARANTINE_PREFIX) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Number of buffered events.
    pub async fn len(&self) -> SyncResult<usize> {
        Ok(self.list_keys().await?.len())
    }

    pub async fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len().await? == 0)
    }

    fn quarantine_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{QUARANTINE_PREFIX}{key}"))
    }

    /// Keeps the newest [`MAX_QUARANTINED`] quarantined files.
    async fn prune_quarantine(&self, mut keys: Vec<String>) -> SyncResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        keys.sort_unstable();

        let excess = keys.len().saturating_sub(MAX_QUARANTINED);
        for key in &keys[..excess] {
            remove_if_present(&self.quarantine_path(key)).await?;
        }
        if excess > 0 {
            fsync_dir(&self.dir).await?;
        }

        warn!(
            dir = %self.dir.display(),
            quarantined = keys.len() - excess,
            pruned = excess,
            "Event buffer holds unreadable events"
        );
        Ok(())
    }

    async fn list_keys(&self) -> SyncResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        Ok(keys)
    }
}

async fn remove_if_present(path: &Path) -> SyncResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

fn format_key(key: u128) -> String {
    format!("{key:020}")
}

fn parse_key(name: &str) -> Option<u128> {
    if name.starts_with('.') {
        return None;
    }
    name.parse().ok()
}

// =============================================================================
// Tests
// =============================================================================
