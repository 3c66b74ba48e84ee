//! Content-addressed cache for derived artifacts: thumbnails, transcoded
//! videos and extracted archive trees.
//!
//! Every artifact is addressed by a [`CacheKey`] and created lazily on the
//! first miss. Hits refresh the artifact's modification time, which is the
//! only recency signal the [`CacheJanitor`](janitor::CacheJanitor) consults.

pub mod janitor;
mod placeholder;
pub(crate) mod single_flight;
pub mod thumbnails;
pub mod transcode;

use filetime::FileTime;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub use janitor::{CacheJanitor, SweepReport};
pub use thumbnails::{DerivedAssetCache, ThumbnailKind};
pub use transcode::{PlayableVideo, VideoGate};

/// Digest identifying one derived artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a file addressed inside a library root.
    pub fn for_library(library_id: &str, relative_path: &str) -> Self {
        Self::digest(library_id, relative_path)
    }

    /// Key for a file found inside an extraction tree. The extraction root
    /// stands in for the library id.
    pub fn for_extracted(extraction_root: &str, relative_path: &str) -> Self {
        Self::digest(&format!("extracted:{extraction_root}"), relative_path)
    }

    /// The namespace is length-prefixed so no `(namespace, path)` split of
    /// the same bytes can produce another key.
    fn digest(namespace: &str, relative_path: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((namespace.len() as u64).to_be_bytes());
        hasher.update(namespace.as_bytes());
        hasher.update(relative_path.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three cache directories. Each family lives in its own directory so
/// identical digests never collide across families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirs {
    pub thumbnails: PathBuf,
    pub extracted: PathBuf,
    pub transcoded: PathBuf,
}

impl CacheDirs {
    /// Standard layout underneath one storage directory.
    pub fn under(storage: &Path) -> Self {
        Self {
            thumbnails: storage.join("thumbnails"),
            extracted: storage.join("extracted"),
            transcoded: storage.join("transcoded"),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.thumbnails, &self.extracted, &self.transcoded]
    }

    pub async fn ensure(&self) -> io::Result<()> {
        for dir in self.all() {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

/// Upper bounds on external tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTimeouts {
    pub thumbnail: Duration,
    pub transcode: Duration,
    pub extract: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            thumbnail: Duration::from_secs(30),
            transcode: Duration::from_secs(2 * 60 * 60),
            extract: Duration::from_secs(10 * 60),
        }
    }
}

/// Everything the cache layers need, built once at start-up.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dirs: CacheDirs,
    pub ttl: Duration,
    pub cleanup_interval: Duration,
    pub timeouts: ToolTimeouts,
    pub archive_max_depth: usize,
}

impl CacheSettings {
    pub fn new(dirs: CacheDirs) -> Self {
        Self {
            dirs,
            ttl: Duration::from_secs(6 * 60 * 60),
            cleanup_interval: Duration::from_secs(30 * 60),
            timeouts: ToolTimeouts::default(),
            archive_max_depth: 4,
        }
    }
}

/// Refreshes the modification time of `path`.
pub fn touch(path: &Path) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::now())
}

/// Refreshes every entry underneath `root`, `root` included. Errors on
/// individual entries are ignored.
pub fn touch_tree(root: &Path) {
    let now = FileTime::now();
    for entry in walkdir::WalkDir::new(root).into_iter().flatten() {
        if let Err(err) = filetime::set_file_mtime(entry.path(), now) {
            debug!(path = %entry.path().display(), error = %err, "touch failed");
        }
    }
}

/// Sibling temp path for `target`: `<stem>.partial-<uuid>.<ext>`.
pub(crate) fn partial_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}.partial-{}.{}", Uuid::new_v4(), ext.to_string_lossy()),
        None => format!("{stem}.partial-{}", Uuid::new_v4()),
    };
    target.with_file_name(name)
}

/// True when `path` is a regular file with content.
pub(crate) async fn is_nonempty_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

/// Moves a finished `partial` onto `target`. An absent or empty partial is
/// removed and reported as `false`; the target is left untouched.
pub(crate) async fn publish(partial: &Path, target: &Path) -> io::Result<bool> {
    if !is_nonempty_file(partial).await {
        discard(partial).await;
        return Ok(false);
    }
    if let Err(err) = tokio::fs::rename(partial, target).await {
        discard(partial).await;
        return Err(err);
    }
    Ok(true)
}

pub(crate) async fn discard(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            debug!(path = %partial.display(), error = %err, "could not remove partial file")
        }
    }
}
