use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::CacheDirs;

/// Outcome of one sweep over every cache root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: usize,
}

/// Deletes cached artifacts whose modification time is older than the TTL.
///
/// Only the cache roots are ever visited; library content is never touched.
#[derive(Debug, Clone)]
pub struct CacheJanitor {
    roots: Vec<PathBuf>,
    ttl: Duration,
}

impl CacheJanitor {
    pub fn new(dirs: &CacheDirs, ttl: Duration) -> Self {
        Self::with_roots(dirs.all().iter().map(|dir| dir.to_path_buf()).collect(), ttl)
    }

    pub fn with_roots(roots: Vec<PathBuf>, ttl: Duration) -> Self {
        Self { roots, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Runs one sweep as of `now`. Children are processed before their
    /// directory, so a stale directory emptied by this sweep goes with it.
    /// The cache roots themselves always survive.
    pub fn sweep(&self, now: SystemTime) -> SweepReport {
        let cutoff = now.checked_sub(self.ttl).unwrap_or(UNIX_EPOCH);
        let mut report = SweepReport::default();

        for root in &self.roots {
            if let Err(err) = fs::create_dir_all(root) {
                warn!(root = %root.display(), error = %err, "cache root unavailable");
                report.failures += 1;
                continue;
            }
            sweep_dir(root, cutoff, true, &mut report);
        }

        report
    }

    /// Sweeps immediately, then every `interval`, on the blocking pool.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let janitor = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || janitor.sweep(SystemTime::now())).await {
                    Ok(report) => info!(
                        files_removed = report.files_removed,
                        dirs_removed = report.dirs_removed,
                        failures = report.failures,
                        "Cache sweep completed"
                    ),
                    Err(e) => warn!("Cache sweep task failed: {}", e),
                }
            }
        })
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::symlink_metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Output still being written: `.<key>.partial-<uuid>` extraction trees and
/// `<stem>.partial-<uuid>.<ext>` files.
fn is_staging(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(".partial-"))
}

/// A staging entry is never swept piecemeal. It goes as a whole once its
/// own mtime shows it was abandoned.
fn sweep_staging(path: &Path, is_dir: bool, cutoff: SystemTime, report: &mut SweepReport) {
    if !modified(path).is_some_and(|mtime| mtime < cutoff) {
        debug!(path = %path.display(), "staging output in progress, skipped");
        return;
    }

    let removed = if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) if is_dir => report.dirs_removed += 1,
        Ok(()) => report.files_removed += 1,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to remove abandoned staging output"
            );
            report.failures += 1;
        }
    }
}

fn sweep_dir(dir: &Path, cutoff: SystemTime, is_root: bool, report: &mut SweepReport) {
    // Judge the directory by its age before children are removed; removing
    // a child bumps the directory's own mtime.
    let stale = modified(dir).is_some_and(|mtime| mtime < cutoff);

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "cannot read cache directory");
            report.failures += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "cannot read cache entry");
                report.failures += 1;
                continue;
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);

        if is_staging(&path) {
            sweep_staging(&path, is_dir, cutoff, report);
            continue;
        }
        if is_dir {
            sweep_dir(&path, cutoff, false, report);
            continue;
        }

        if !modified(&path).is_some_and(|mtime| mtime < cutoff) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "expired cache file removed");
                report.files_removed += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove cache file");
                report.failures += 1;
            }
        }
    }

    if is_root || !stale {
        return;
    }
    let empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if !empty {
        return;
    }
    match fs::remove_dir(dir) {
        Ok(()) => report.dirs_removed += 1,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed to remove cache directory");
            report.failures += 1;
        }
    }
}
