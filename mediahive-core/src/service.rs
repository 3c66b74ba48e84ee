//! [`MediaLibrary`]: the operations exposed to transports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::archive::{
    ArchiveBrowseContext, ArchiveBrowseRequest, ArchiveBrowser, ArchiveExtractor, ArchivePages,
};
use crate::cache::{CacheJanitor, CacheKey, CacheSettings, DerivedAssetCache, VideoGate};
use crate::error::{LibraryError, Result};
use crate::library::{Access, LibraryRoot, LibraryRoots, ResolvedPath};
use crate::listing::{DirectoryListing, Lister};
use crate::media::{MediaKind, classify, content_type_for, modified_at};
use crate::stream::MediaStream;
use crate::tools::ToolRunner;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub stats: FileStats,
    pub media_kind: MediaKind,
    pub library_root: LibraryRoot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedArchive {
    /// Extraction directory relative to the extracted cache directory.
    pub extracted_path: String,
}

/// Library browsing, streaming and archive access over a fixed set of roots.
#[derive(Debug)]
pub struct MediaLibrary {
    roots: Arc<LibraryRoots>,
    settings: CacheSettings,
    thumbnails: Arc<DerivedAssetCache>,
    videos: VideoGate,
    archives: ArchiveBrowser,
}

impl MediaLibrary {
    pub fn new(roots: LibraryRoots, settings: CacheSettings, runner: Arc<dyn ToolRunner>) -> Self {
        let roots = Arc::new(roots);
        let dirs = settings.dirs.clone();
        let timeouts = settings.timeouts;

        let thumbnails = Arc::new(DerivedAssetCache::new(
            dirs.clone(),
            Arc::clone(&runner),
            timeouts.thumbnail,
        ));
        let videos = VideoGate::new(
            dirs.transcoded.clone(),
            Arc::clone(&runner),
            timeouts.transcode,
        );
        let extractor = Arc::new(ArchiveExtractor::new(
            dirs.extracted.clone(),
            runner,
            timeouts.extract,
            settings.archive_max_depth,
        ));
        let archives = ArchiveBrowser::new(Arc::clone(&roots), extractor, Arc::clone(&thumbnails));

        Self {
            roots,
            settings,
            thumbnails,
            videos,
            archives,
        }
    }

    /// Creates the cache directories.
    pub async fn prepare(&self) -> Result<()> {
        self.settings.dirs.ensure().await?;
        Ok(())
    }

    pub fn roots(&self) -> &LibraryRoots {
        &self.roots
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// A janitor over this library's cache directories.
    pub fn janitor(&self) -> CacheJanitor {
        CacheJanitor::new(&self.settings.dirs, self.settings.ttl)
    }

    /// Lists a directory. Without `library_id` the first root visible to
    /// `access` is used.
    pub async fn browse(
        &self,
        path: &str,
        library_id: Option<&str>,
        access: Access,
    ) -> Result<DirectoryListing> {
        let resolved = self.roots.resolve(path, library_id, access)?;
        let lister = Lister {
            thumbnails: &self.thumbnails,
            extractor: self.archives.extractor(),
        };
        let items = lister.list(&resolved).await?;
        debug!(
            library = %resolved.root.id,
            path = %resolved.relative,
            items = items.len(),
            "directory listed"
        );

        Ok(DirectoryListing {
            current_path: resolved.relative,
            items,
            library_root: resolved.root,
            library_roots: self.roots.visible(access).into_iter().cloned().collect(),
        })
    }

    pub async fn file_info(
        &self,
        path: &str,
        library_id: Option<&str>,
        access: Access,
    ) -> Result<FileInfo> {
        let resolved = self.roots.resolve(path, library_id, access)?;
        self.describe_file(resolved).await
    }

    async fn describe_file(&self, resolved: ResolvedPath) -> Result<FileInfo> {
        let metadata = match tokio::fs::metadata(&resolved.absolute).await {
            Ok(meta) => meta,
            Err(_) => return Err(LibraryError::NotFound(resolved.relative)),
        };
        if !metadata.is_file() {
            return Err(LibraryError::NotAFile(resolved.relative));
        }

        Ok(FileInfo {
            media_kind: classify(&resolved.absolute, false),
            stats: FileStats {
                size: metadata.len(),
                modified_at: modified_at(&metadata),
            },
            absolute_path: resolved.absolute,
            relative_path: resolved.relative,
            library_root: resolved.root,
        })
    }

    /// Opens a file for streaming. Videos go through the readiness gate
    /// first, so an incompatible source is transcoded before the first byte.
    pub async fn open_stream(
        &self,
        path: &str,
        library_id: Option<&str>,
        access: Access,
        range: Option<&str>,
        force_transcode: bool,
    ) -> Result<MediaStream> {
        let info = self.file_info(path, library_id, access).await?;

        if info.media_kind == MediaKind::Video {
            let key = CacheKey::for_library(&info.library_root.id, &info.relative_path);
            let playable = self
                .videos
                .ensure_playable(&info.absolute_path, &key, force_transcode)
                .await?;
            return MediaStream::open(
                playable.path,
                playable.content_type.to_string(),
                range,
                playable.transcoded,
            )
            .await;
        }

        let content_type = content_type_for(&info.absolute_path).to_string();
        MediaStream::open(info.absolute_path, content_type, range, false).await
    }

    pub async fn browse_archive(
        &self,
        request: &ArchiveBrowseRequest,
        access: Access,
    ) -> Result<ArchiveBrowseContext> {
        self.archives.browse(request, access).await
    }

    /// Extracts a library archive. Idempotent.
    pub async fn extract_archive(
        &self,
        path: &str,
        library_id: Option<&str>,
        access: Access,
    ) -> Result<ExtractedArchive> {
        let (info, key) = self.archive_info(path, library_id, access).await?;
        let extraction = self
            .archives
            .extract_library_archive(&info.absolute_path, &key, &info.library_root.id)
            .await?;
        let extracted_path = extraction
            .dir
            .strip_prefix(self.archives.extractor().root())
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_else(|_| key.to_string());
        Ok(ExtractedArchive { extracted_path })
    }

    /// Page URLs of a library archive in reading order.
    pub async fn archive_pages(
        &self,
        path: &str,
        library_id: Option<&str>,
        access: Access,
    ) -> Result<ArchivePages> {
        let (info, key) = self.archive_info(path, library_id, access).await?;
        let pages = self
            .archives
            .pages(&info.absolute_path, &key, &info.library_root.id)
            .await?;
        if pages.pages.is_empty() {
            return Err(LibraryError::NotFound(format!(
                "no pages found in {}",
                info.relative_path
            )));
        }
        Ok(pages)
    }

    async fn archive_info(
        &self,
        path: &str,
        library_id: Option<&str>,
        access: Access,
    ) -> Result<(FileInfo, CacheKey)> {
        let info = self.file_info(path, library_id, access).await?;
        if info.media_kind != MediaKind::Archive {
            return Err(LibraryError::NotAnArchive(info.relative_path));
        }
        let key = CacheKey::for_library(&info.library_root.id, &info.relative_path);
        Ok((info, key))
    }
}
