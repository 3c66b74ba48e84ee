use image::ImageFormat;
use image::imageops::FilterType;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::single_flight::{Flight, SingleFlight};
use super::{CacheDirs, CacheKey, discard, is_nonempty_file, partial_path, placeholder, publish};
use crate::tools::{Tool, ToolRunner};

/// URL prefix the server mounts the thumbnail directory under.
pub const THUMBNAIL_URL_PREFIX: &str = "/thumbnails";

const THUMBNAIL_WIDTH: u32 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbnailKind {
    Video,
    Archive,
    Directory,
    Image,
}

impl ThumbnailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbnailKind::Video => "video",
            ThumbnailKind::Archive => "archive",
            ThumbnailKind::Directory => "directory",
            ThumbnailKind::Image => "image",
        }
    }
}

impl fmt::Display for ThumbnailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thumbnail family of the derived asset cache. Files are
/// `<key>-<kind>.png` inside the thumbnail directory.
pub struct DerivedAssetCache {
    dirs: CacheDirs,
    runner: Arc<dyn ToolRunner>,
    timeout: Duration,
    flights: Arc<SingleFlight>,
}

impl fmt::Debug for DerivedAssetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAssetCache")
            .field("dirs", &self.dirs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DerivedAssetCache {
    pub fn new(dirs: CacheDirs, runner: Arc<dyn ToolRunner>, timeout: Duration) -> Self {
        Self {
            dirs,
            runner,
            timeout,
            flights: SingleFlight::new(),
        }
    }

    pub fn dirs(&self) -> &CacheDirs {
        &self.dirs
    }

    pub fn thumbnail_path(&self, kind: ThumbnailKind, key: &CacheKey) -> PathBuf {
        self.dirs.thumbnails.join(format!("{key}-{kind}.png"))
    }

    /// Public URL of a thumbnail file.
    pub fn thumbnail_url(path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        Some(format!("{THUMBNAIL_URL_PREFIX}/{name}"))
    }

    /// Refreshes an artifact's modification time. Returns false when the
    /// artifact no longer exists.
    pub fn touch(&self, path: &Path) -> bool {
        match super::touch(path) {
            Ok(()) => true,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "touch skipped");
                false
            }
        }
    }

    /// Returns the thumbnail for `key`, creating it on a miss.
    ///
    /// `source` is the video for [`ThumbnailKind::Video`] and an image for the
    /// other kinds (first page, first contained image, the image itself).
    /// Every failure degrades to the built-in placeholder; `None` only means
    /// even the placeholder could not be written.
    pub async fn thumbnail(
        &self,
        kind: ThumbnailKind,
        key: &CacheKey,
        source: Option<&Path>,
    ) -> Option<PathBuf> {
        let target = self.thumbnail_path(kind, key);
        loop {
            if is_nonempty_file(&target).await {
                self.touch(&target);
                debug!(%kind, key = %key, "thumbnail cache hit");
                return Some(target);
            }

            match self.flights.join(&format!("{key}-{kind}")) {
                Flight::Follower(wait) => wait.await,
                Flight::Leader(_guard) => return self.create(kind, source, &target).await,
            }
        }
    }

    /// Drops a cached thumbnail so the next request derives it again.
    pub async fn invalidate(&self, kind: ThumbnailKind, key: &CacheKey) {
        discard(&self.thumbnail_path(kind, key)).await;
    }

    async fn create(
        &self,
        kind: ThumbnailKind,
        source: Option<&Path>,
        target: &Path,
    ) -> Option<PathBuf> {
        if let Err(err) = tokio::fs::create_dir_all(&self.dirs.thumbnails).await {
            warn!(error = %err, "cannot create thumbnail directory");
            return None;
        }

        let partial = partial_path(target);
        let rendered = match (kind, source) {
            (ThumbnailKind::Video, Some(video)) => self.grab_frame(video, &partial).await,
            (_, Some(image)) => scale_image(image, &partial).await,
            (_, None) => false,
        };

        if rendered {
            match publish(&partial, target).await {
                Ok(true) => {
                    info!(%kind, target = %target.display(), "thumbnail created");
                    return Some(target.to_path_buf());
                }
                Ok(false) => warn!(%kind, "thumbnail tool produced no output"),
                Err(err) => warn!(%kind, error = %err, "could not publish thumbnail"),
            }
        } else {
            discard(&partial).await;
        }

        self.write_placeholder(kind, target).await
    }

    async fn grab_frame(&self, video: &Path, output: &Path) -> bool {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-ss".into(),
            "00:00:01".into(),
            "-i".into(),
            video.into(),
            "-vframes".into(),
            "1".into(),
            "-vf".into(),
            format!("scale={THUMBNAIL_WIDTH}:-1").into(),
            output.into(),
        ];
        match self.runner.run(Tool::Ffmpeg, args, self.timeout).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    video = %video.display(),
                    error = %err,
                    "frame extraction failed, using placeholder"
                );
                false
            }
        }
    }

    async fn write_placeholder(&self, kind: ThumbnailKind, target: &Path) -> Option<PathBuf> {
        let bytes = placeholder::png(kind);
        if bytes.is_empty() {
            return None;
        }
        let partial = partial_path(target);
        if let Err(err) = tokio::fs::write(&partial, bytes).await {
            warn!(error = %err, "could not write placeholder thumbnail");
            discard(&partial).await;
            return None;
        }
        match publish(&partial, target).await {
            Ok(true) => Some(target.to_path_buf()),
            Ok(false) => None,
            Err(err) => {
                warn!(error = %err, "could not publish placeholder thumbnail");
                None
            }
        }
    }
}

/// Re-encodes `source` as a PNG bounded to the thumbnail width.
async fn scale_image(source: &Path, output: &Path) -> bool {
    let source = source.to_path_buf();
    let output = output.to_path_buf();
    let result = tokio::task::spawn_blocking(move || -> image::ImageResult<()> {
        let img = image::open(&source)?;
        img.resize(THUMBNAIL_WIDTH, u32::MAX, FilterType::Triangle)
            .save_with_format(&output, ImageFormat::Png)
    })
    .await;

    match result {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(error = %err, "image thumbnail failed, using placeholder");
            false
        }
        Err(err) => {
            warn!(error = %err, "image thumbnail task aborted");
            false
        }
    }
}
