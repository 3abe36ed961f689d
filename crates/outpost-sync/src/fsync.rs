//! Directory fsync.
//!
//! A rename or delete only changes the parent directory's entry list, and
//! that list reaches disk when the directory itself is synced. Syncing the
//! file first and the directory after is what makes a rename survive a
//! power cut.

use std::io;
use std::path::Path;

/// Syncs `dir` so entries created, renamed or removed in it are durable.
#[cfg(unix)]
pub async fn fsync_dir(dir: &Path) -> io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

/// Directories cannot be opened as files here; rename durability is left
/// to the filesystem.
#[cfg(not(unix))]
pub async fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
