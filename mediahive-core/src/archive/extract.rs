use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::natural::natural_cmp;
use crate::cache::single_flight::{Flight, SingleFlight};
use crate::cache::{CacheKey, touch_tree};
use crate::error::{LibraryError, Result};
use crate::library::resolver::relative_to;
use crate::media::kind::{is_archive, is_image};
use crate::tools::{Tool, ToolError, ToolRunner};

/// An extraction directory inside the extracted cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub dir: PathBuf,
    /// Set when this call performed the extraction.
    pub fresh: bool,
}

/// Unpacks archives into `<extracted>/<key>/`, expanding archives nested
/// inside them into sibling directories named after their stem.
pub struct ArchiveExtractor {
    dir: PathBuf,
    runner: Arc<dyn ToolRunner>,
    timeout: Duration,
    max_depth: usize,
    flights: Arc<SingleFlight>,
}

impl fmt::Debug for ArchiveExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveExtractor")
            .field("dir", &self.dir)
            .field("timeout", &self.timeout)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl ArchiveExtractor {
    pub fn new(
        dir: PathBuf,
        runner: Arc<dyn ToolRunner>,
        timeout: Duration,
        max_depth: usize,
    ) -> Self {
        Self {
            dir,
            runner,
            timeout,
            max_depth,
            flights: SingleFlight::new(),
        }
    }

    /// The extracted cache directory.
    pub fn root(&self) -> &Path {
        &self.dir
    }

    pub fn target_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Extracts `archive` unless a non-empty extraction for `key` already
    /// exists. Either way the tree's modification times are refreshed.
    pub async fn ensure_extracted(&self, archive: &Path, key: &CacheKey) -> Result<Extraction> {
        let target = self.target_for(key);
        loop {
            if has_entries(&target).await {
                debug!(key = %key, "extraction cache hit");
                refresh(&target).await;
                return Ok(Extraction {
                    dir: target,
                    fresh: false,
                });
            }

            match self.flights.join(key.as_str()) {
                Flight::Follower(wait) => wait.await,
                Flight::Leader(_guard) => {
                    self.extract(archive, key, &target).await?;
                    return Ok(Extraction {
                        dir: target,
                        fresh: true,
                    });
                }
            }
        }
    }

    async fn extract(&self, archive: &Path, key: &CacheKey, target: &Path) -> Result<()> {
        let subject = archive.display().to_string();
        tokio::fs::create_dir_all(&self.dir).await?;

        let staging = self.dir.join(format!(".{key}.partial-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging).await?;

        if let Err(err) = self.unzip(archive, &staging).await {
            remove_tree(&staging).await;
            return Err(LibraryError::from_extraction(&subject, err));
        }
        self.expand_nested(&staging).await;

        if let Err(err) = self.promote(&staging, target).await {
            remove_tree(&staging).await;
            warn!(archive = %subject, error = %err, "could not move extraction into place");
            return Err(LibraryError::Extraction(subject));
        }

        refresh(target).await;
        info!(archive = %subject, target = %target.display(), "archive extracted");
        Ok(())
    }

    /// Unpacks with `-DD` so every extracted file carries the current time
    /// rather than the one stored in the archive.
    async fn unzip(&self, archive: &Path, dest: &Path) -> std::result::Result<(), ToolError> {
        let args: Vec<OsString> = vec![
            "-qq".into(),
            "-o".into(),
            "-DD".into(),
            archive.into(),
            "-d".into(),
            dest.into(),
        ];
        self.runner.run(Tool::Unzip, args, self.timeout).await
    }

    /// Moves a finished staging tree onto `target`. Loses gracefully to a
    /// concurrent writer that got there first.
    async fn promote(&self, staging: &Path, target: &Path) -> io::Result<()> {
        if tokio::fs::metadata(target).await.is_ok() && !has_entries(target).await {
            tokio::fs::remove_dir(target).await?;
        }
        match tokio::fs::rename(staging, target).await {
            Ok(()) => Ok(()),
            Err(_) if has_entries(target).await => {
                remove_tree(staging).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Unpacks nested archives level by level, up to `max_depth` levels.
    /// An archive identity (path inside the job plus content digest) is
    /// unpacked at most once per job. Nested failures are logged and
    /// skipped; the outer extraction still succeeds.
    async fn expand_nested(&self, root: &Path) {
        let mut visited: HashSet<(String, String)> = HashSet::new();
        let mut frontier = vec![root.to_path_buf()];

        for depth in 0..self.max_depth {
            let archives = find_archives(frontier.clone()).await;
            if archives.is_empty() {
                break;
            }

            let mut next = Vec::new();
            for (archive, digest) in archives {
                let relative = relative_to(root, &archive).unwrap_or_default();
                if !visited.insert((relative, digest)) {
                    debug!(archive = %archive.display(), "nested archive already unpacked");
                    continue;
                }

                let dest = archive.with_extension("");
                if has_entries(&dest).await {
                    continue;
                }
                if let Err(err) = tokio::fs::create_dir_all(&dest).await {
                    warn!(
                        dest = %dest.display(),
                        error = %err,
                        "cannot create nested extraction dir"
                    );
                    continue;
                }
                match self.unzip(&archive, &dest).await {
                    Ok(()) => next.push(dest),
                    Err(err) => {
                        warn!(
                            archive = %archive.display(),
                            depth,
                            error = %err,
                            "nested archive skipped"
                        );
                        remove_tree(&dest).await;
                    }
                }
            }
            frontier = next;
        }
    }
}

async fn has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

async fn refresh(dir: &Path) {
    let dir = dir.to_path_buf();
    if let Err(err) = tokio::task::spawn_blocking(move || touch_tree(&dir)).await {
        warn!(error = %err, "touch task aborted");
    }
}

async fn remove_tree(dir: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(dir = %dir.display(), error = %err, "could not remove staging directory");
    }
}

/// SHA-256 of a file's bytes, hex encoded.
fn content_digest(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Archives underneath `dirs` with their content digests.
async fn find_archives(dirs: Vec<PathBuf>) -> Vec<(PathBuf, String)> {
    tokio::task::spawn_blocking(move || {
        let mut found = Vec::new();
        for dir in dirs {
            for entry in WalkDir::new(&dir).into_iter().flatten() {
                if !(entry.file_type().is_file() && is_archive(entry.path())) {
                    continue;
                }
                let digest = content_digest(entry.path()).unwrap_or_else(|err| {
                    debug!(archive = %entry.path().display(), error = %err, "cannot hash archive");
                    String::new()
                });
                found.push((entry.into_path(), digest));
            }
        }
        found.sort_by(|a, b| natural_cmp(&a.0.to_string_lossy(), &b.0.to_string_lossy()));
        found
    })
    .await
    .unwrap_or_default()
}

/// Image files underneath `dir`, as `/`-joined paths relative to it, in
/// natural order.
pub fn list_images_blocking(dir: &Path) -> Vec<String> {
    let mut pages: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
        .filter_map(|entry| relative_to(dir, entry.path()))
        .collect();
    pages.sort_by(|a, b| natural_cmp(a, b));
    pages
}

/// Async wrapper over [`list_images_blocking`].
pub async fn list_images(dir: &Path) -> Vec<String> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || list_images_blocking(&dir))
        .await
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    fn extractor(dir: &Path, runner: Arc<FakeRunner>, depth: usize) -> ArchiveExtractor {
        ArchiveExtractor::new(dir.join("extracted"), runner, Duration::from_secs(5), depth)
    }

    #[tokio::test]
    async fn extraction_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.register_archive(
            "vol1.cbz",
            [("page10.jpg", "x"), ("page2.jpg", "x"), ("page1.jpg", "x")],
        );
        let extractor = extractor(dir.path(), runner.clone(), 4);
        let key = CacheKey::for_library("comics", "vol1.cbz");
        let archive = dir.path().join("vol1.cbz");

        let first = extractor.ensure_extracted(&archive, &key).await.unwrap();
        let pages_first = list_images(&first.dir).await;
        let second = extractor.ensure_extracted(&archive, &key).await.unwrap();
        let pages_second = list_images(&second.dir).await;

        assert!(first.fresh);
        assert!(!second.fresh);
        assert_eq!(pages_first, ["page1.jpg", "page2.jpg", "page10.jpg"]);
        assert_eq!(pages_first, pages_second);
        assert_eq!(runner.calls(Tool::Unzip), 1);
    }

    #[tokio::test]
    async fn nested_archives_expand_into_sibling_directories() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.register_archive("box.zip", [("vol1.cbz", "zip"), ("cover.png", "x")]);
        runner.register_archive("vol1.cbz", [("001.jpg", "x"), ("002.jpg", "x")]);
        let extractor = extractor(dir.path(), runner.clone(), 4);
        let key = CacheKey::for_library("comics", "box.zip");

        let extraction = extractor
            .ensure_extracted(&dir.path().join("box.zip"), &key)
            .await
            .unwrap();

        assert!(extraction.dir.join("vol1").join("001.jpg").is_file());
        assert_eq!(
            list_images(&extraction.dir).await,
            ["cover.png", "vol1/001.jpg", "vol1/002.jpg"]
        );
        assert_eq!(runner.calls(Tool::Unzip), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.set_delay(Duration::from_millis(50));
        runner.register_archive("vol1.cbz", [("001.jpg", "x"), ("002.jpg", "x")]);
        let extractor = extractor(dir.path(), runner.clone(), 4);
        let key = CacheKey::for_library("comics", "vol1.cbz");
        let archive = dir.path().join("vol1.cbz");

        let results = futures::future::join_all(
            (0..6).map(|_| extractor.ensure_extracted(&archive, &key)),
        )
        .await;

        let dirs: HashSet<PathBuf> = results.into_iter().map(|r| r.unwrap().dir).collect();
        assert_eq!(dirs.len(), 1);
        assert_eq!(runner.calls(Tool::Unzip), 1);
        let entries: Vec<_> = std::fs::read_dir(extractor.root())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, [OsString::from(key.as_str())]);
    }

    #[tokio::test]
    async fn identically_named_nested_archives_each_expand() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.register_archive(
            "box.zip",
            [("part1/extras.zip", "zip"), ("part2/extras.zip", "zip")],
        );
        runner.register_archive("extras.zip", [("bonus.jpg", "x")]);
        let extractor = extractor(dir.path(), runner.clone(), 4);

        let extraction = extractor
            .ensure_extracted(
                &dir.path().join("box.zip"),
                &CacheKey::for_library("comics", "box.zip"),
            )
            .await
            .unwrap();

        assert!(extraction.dir.join("part1/extras/bonus.jpg").is_file());
        assert!(extraction.dir.join("part2/extras/bonus.jpg").is_file());
        assert_eq!(runner.calls(Tool::Unzip), 3);
    }

    #[tokio::test]
    async fn unreadable_nested_archive_is_skipped_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        // `broken.zip` is not registered, so unpacking it fails.
        runner.register_archive("box.zip", [("broken.zip", "??"), ("cover.jpg", "x")]);
        let extractor = extractor(dir.path(), runner.clone(), 4);

        let extraction = extractor
            .ensure_extracted(
                &dir.path().join("box.zip"),
                &CacheKey::for_library("comics", "box.zip"),
            )
            .await
            .unwrap();

        assert!(extraction.dir.join("broken.zip").is_file());
        assert!(!extraction.dir.join("broken").exists());
        assert_eq!(list_images(&extraction.dir).await, ["cover.jpg"]);
    }

    #[tokio::test]
    async fn unzip_keeps_the_extraction_time() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.register_archive("vol1.cbz", [("001.jpg", "x")]);
        let extractor = extractor(dir.path(), runner.clone(), 4);

        extractor
            .ensure_extracted(
                &dir.path().join("vol1.cbz"),
                &CacheKey::for_library("comics", "vol1.cbz"),
            )
            .await
            .unwrap();

        let args = runner.last_args(Tool::Unzip).unwrap();
        assert!(args.iter().any(|arg| arg == "-DD"), "{args:?}");
    }

    #[tokio::test]
    async fn self_referencing_archives_stop_at_the_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        // Every level unpacks another copy of itself under a new name.
        runner.register_archive("outer.zip", [("a.zip", "nested")]);
        runner.register_archive("a.zip", [("b.zip", "nested")]);
        runner.register_archive("b.zip", [("c.zip", "nested")]);
        runner.register_archive("c.zip", [("d.zip", "nested")]);
        let extractor = extractor(dir.path(), runner.clone(), 2);

        let extraction = extractor
            .ensure_extracted(
                &dir.path().join("outer.zip"),
                &CacheKey::for_library("x", "outer.zip"),
            )
            .await
            .unwrap();

        assert!(extraction.dir.join("a").join("b").is_dir());
        assert!(!extraction.dir.join("a").join("b").join("c").exists());
        assert_eq!(runner.calls(Tool::Unzip), 3);
    }

    #[tokio::test]
    async fn failed_extraction_is_an_error_and_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.set_failing(Tool::Unzip);
        let extractor = extractor(dir.path(), runner, 4);
        let key = CacheKey::for_library("comics", "bad.cbz");

        let err = extractor
            .ensure_extracted(&dir.path().join("bad.cbz"), &key)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Extraction(_)));
        let leftovers = std::fs::read_dir(extractor.root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn missing_unzip_is_reported_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.set_missing(Tool::Unzip);
        let extractor = extractor(dir.path(), runner, 4);

        let err = extractor
            .ensure_extracted(
                &dir.path().join("a.cbz"),
                &CacheKey::for_library("c", "a.cbz"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::ToolUnavailable(Tool::Unzip)));
    }
}
