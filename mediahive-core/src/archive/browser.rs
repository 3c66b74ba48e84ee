use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::extract::{ArchiveExtractor, Extraction, list_images, list_images_blocking};
use super::extracted_url;
use super::natural::natural_cmp;
use crate::cache::{CacheKey, DerivedAssetCache, ThumbnailKind, touch_tree};
use crate::error::{LibraryError, Result};
use crate::library::resolver::{relative_to, resolve_within};
use crate::library::{Access, LibraryRoots};
use crate::media::{EntrySource, EntryType, MediaKind, classify, modified_at};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveScope {
    /// The archive is a file inside a library root.
    #[default]
    Library,
    /// The archive was found inside an extraction tree.
    Extracted,
}

/// Everything the client resends to continue an archive exploration. The
/// server keeps no navigation state between requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveBrowseRequest {
    pub archive_path: String,
    #[serde(default)]
    pub library_id: Option<String>,
    #[serde(default)]
    pub scope: ArchiveScope,
    #[serde(default)]
    pub subpath: Option<String>,
    /// Extraction root holding the archive, for [`ArchiveScope::Extracted`].
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

/// Cumulative trail for a `/`-joined path: `a/b` gives `a` then `a/b`.
pub fn breadcrumbs(path: &str) -> Vec<Breadcrumb> {
    let mut trail = Vec::new();
    let mut acc = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(segment);
        trail.push(Breadcrumb {
            name: segment.to_string(),
            path: acc.clone(),
        });
    }
    trail
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub name: String,
    /// Path relative to the extraction root.
    pub path: String,
    /// Path relative to the extracted cache directory.
    pub extracted_path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub media_kind: MediaKind,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub source: EntrySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub archive_path: String,
    pub archive_name: String,
    pub scope: ArchiveScope,
    pub extracted_root: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveBrowseContext {
    pub archive_path: String,
    pub archive_name: String,
    pub scope: ArchiveScope,
    pub library_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_source_root: Option<String>,
    pub extracted_root: String,
    pub current_path: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub items: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivePages {
    /// Page URLs under the extracted mount, in reading order.
    pub pages: Vec<String>,
    pub extracted_path: String,
}

/// The archive a browse request points at, before listing.
struct Located {
    archive_path: String,
    archive_name: String,
    library_id: Option<String>,
    source_root: Option<String>,
    extraction_dir: PathBuf,
    extracted_root: String,
}

pub struct ArchiveBrowser {
    roots: Arc<LibraryRoots>,
    extractor: Arc<ArchiveExtractor>,
    thumbnails: Arc<DerivedAssetCache>,
    /// Library id each top-level extraction directory was unpacked from.
    owners: Mutex<HashMap<String, String>>,
}

impl fmt::Debug for ArchiveBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveBrowser")
            .field("extracted", &self.extractor.root())
            .finish()
    }
}

impl ArchiveBrowser {
    pub fn new(
        roots: Arc<LibraryRoots>,
        extractor: Arc<ArchiveExtractor>,
        thumbnails: Arc<DerivedAssetCache>,
    ) -> Self {
        Self {
            roots,
            extractor,
            thumbnails,
            owners: Mutex::new(HashMap::new()),
        }
    }

    pub fn extractor(&self) -> &ArchiveExtractor {
        &self.extractor
    }

    /// Extracts an archive of library `library_id` on demand, dropping its
    /// cached archive thumbnail when the extraction is new so the next
    /// listing derives it from the first page.
    pub async fn extract_library_archive(
        &self,
        archive: &Path,
        key: &CacheKey,
        library_id: &str,
    ) -> Result<Extraction> {
        let extraction = self.extractor.ensure_extracted(archive, key).await?;
        self.record_owner(key.as_str(), library_id);
        if extraction.fresh {
            self.thumbnails.invalidate(ThumbnailKind::Archive, key).await;
        }
        Ok(extraction)
    }

    /// Lists one directory level inside an archive's extraction.
    pub async fn browse(
        &self,
        request: &ArchiveBrowseRequest,
        access: Access,
    ) -> Result<ArchiveBrowseContext> {
        let located = match request.scope {
            ArchiveScope::Library => self.locate_in_library(request, access).await?,
            ArchiveScope::Extracted => self.locate_in_extraction(request, access).await?,
        };

        let subpath = request.subpath.as_deref().unwrap_or_default();
        let current = resolve_within(&located.extraction_dir, subpath)
            .map_err(|_| LibraryError::InvalidSubpath(subpath.to_string()))?;
        match tokio::fs::metadata(&current.absolute).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(LibraryError::NotADirectory(current.relative)),
            Err(_) => return Err(LibraryError::NotFound(current.relative)),
        }

        let items = self.list_children(&located, &current.absolute).await?;
        debug!(
            archive = %located.archive_path,
            subpath = %current.relative,
            items = items.len(),
            "archive browsed"
        );

        Ok(ArchiveBrowseContext {
            archive_path: located.archive_path,
            archive_name: located.archive_name,
            scope: request.scope,
            library_id: located.library_id,
            archive_source_root: located.source_root,
            extracted_root: located.extracted_root,
            breadcrumbs: breadcrumbs(&current.relative),
            current_path: current.relative,
            items,
        })
    }

    /// Flat, naturally ordered page list of a library archive.
    pub async fn pages(
        &self,
        archive: &Path,
        key: &CacheKey,
        library_id: &str,
    ) -> Result<ArchivePages> {
        let extraction = self.extract_library_archive(archive, key, library_id).await?;
        let extracted_path = self.extracted_relative(&extraction.dir);
        let pages = list_images(&extraction.dir)
            .await
            .into_iter()
            .map(|page| extracted_url(&format!("{extracted_path}/{page}")))
            .collect();
        Ok(ArchivePages {
            pages,
            extracted_path,
        })
    }

    fn extracted_relative(&self, dir: &Path) -> String {
        relative_to(self.extractor.root(), dir).unwrap_or_default()
    }

    fn record_owner(&self, extraction: &str, library_id: &str) {
        self.owners
            .lock()
            .insert(extraction.to_string(), library_id.to_string());
    }

    /// Library the extraction holding `root` was unpacked from, if this
    /// process unpacked or revisited it.
    fn owner_of(&self, root: &str) -> Option<String> {
        let top = root.split('/').next().unwrap_or_default();
        self.owners.lock().get(top).cloned()
    }

    /// Owner of an extraction root as seen by `access`. Public callers only
    /// reach extractions whose owner is an allow-listed root; anything else,
    /// including extractions of unknown origin, looks absent to them.
    fn owner_for(
        &self,
        root: &str,
        access: Access,
        requested: Option<&str>,
    ) -> Result<Option<String>> {
        let owner = self.owner_of(root);
        match access {
            Access::Authenticated => Ok(owner.or_else(|| requested.map(str::to_string))),
            Access::Public => {
                let public = self.roots.visible(Access::Public);
                owner
                    .filter(|id| public.iter().any(|public_root| public_root.id == *id))
                    .map(Some)
                    .ok_or_else(|| LibraryError::NotFound(root.to_string()))
            }
        }
    }

    async fn locate_in_library(
        &self,
        request: &ArchiveBrowseRequest,
        access: Access,
    ) -> Result<Located> {
        let resolved =
            self.roots
                .resolve(&request.archive_path, request.library_id.as_deref(), access)?;
        ensure_archive_file(&resolved.absolute, &resolved.relative).await?;

        let key = CacheKey::for_library(&resolved.root.id, &resolved.relative);
        let extraction = self
            .extract_library_archive(&resolved.absolute, &key, &resolved.root.id)
            .await?;

        Ok(Located {
            archive_name: file_name(&resolved.absolute),
            archive_path: resolved.relative,
            library_id: Some(resolved.root.id),
            source_root: None,
            extracted_root: self.extracted_relative(&extraction.dir),
            extraction_dir: extraction.dir,
        })
    }

    async fn locate_in_extraction(
        &self,
        request: &ArchiveBrowseRequest,
        access: Access,
    ) -> Result<Located> {
        let root_name = request.root.as_deref().unwrap_or_default();
        let root = resolve_within(self.extractor.root(), root_name)
            .ok()
            .filter(|root| !root.relative.is_empty())
            .ok_or_else(|| LibraryError::InvalidSubpath(root_name.to_string()))?;
        let owner = self.owner_for(&root.relative, access, request.library_id.as_deref())?;
        match tokio::fs::metadata(&root.absolute).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(LibraryError::NotFound(root.relative)),
        }

        let archive = resolve_within(&root.absolute, &request.archive_path)
            .map_err(|_| LibraryError::InvalidSubpath(request.archive_path.clone()))?;
        ensure_archive_file(&archive.absolute, &archive.relative).await?;

        // Nested archives are normally unpacked in place next to themselves.
        let sibling = archive.absolute.with_extension("");
        let extraction_dir = if has_entries(&sibling).await {
            let dir = sibling.clone();
            if let Err(err) = tokio::task::spawn_blocking(move || touch_tree(&dir)).await {
                warn!(error = %err, "touch task aborted");
            }
            sibling
        } else {
            let key = CacheKey::for_extracted(&root.relative, &archive.relative);
            let extraction = self
                .extractor
                .ensure_extracted(&archive.absolute, &key)
                .await?;
            if let Some(owner) = &owner {
                self.record_owner(key.as_str(), owner);
            }
            if extraction.fresh {
                self.thumbnails.invalidate(ThumbnailKind::Archive, &key).await;
            }
            extraction.dir
        };

        Ok(Located {
            archive_name: file_name(&archive.absolute),
            archive_path: archive.relative,
            library_id: owner,
            source_root: Some(root.relative),
            extracted_root: self.extracted_relative(&extraction_dir),
            extraction_dir,
        })
    }

    async fn list_children(&self, located: &Located, dir: &Path) -> Result<Vec<ArchiveEntry>> {
        let mut reader = tokio::fs::read_dir(dir).await?;
        let mut items = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let absolute = entry.path();
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let media_kind = classify(&absolute, metadata.is_dir());
            if !media_kind.is_listable() {
                continue;
            }
            let Some(path) = relative_to(&located.extraction_dir, &absolute) else {
                continue;
            };
            let extracted_path = format!("{}/{}", located.extracted_root, path);
            let key = CacheKey::for_extracted(&located.extracted_root, &path);

            let (thumbnail, page_count) = self
                .decorate(media_kind, &absolute, &extracted_path, &key)
                .await;

            items.push(ArchiveEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                entry_type: EntryType::of(&metadata),
                media_kind,
                size: metadata.len(),
                modified_at: modified_at(&metadata),
                source: EntrySource::Extracted,
                url: (media_kind != MediaKind::Directory).then(|| extracted_url(&extracted_path)),
                thumbnail,
                page_count,
                breadcrumbs: breadcrumbs(&path),
                archive_path: located.archive_path.clone(),
                archive_name: located.archive_name.clone(),
                scope: if located.source_root.is_some() {
                    ArchiveScope::Extracted
                } else {
                    ArchiveScope::Library
                },
                extracted_root: located.extracted_root.clone(),
                path,
                extracted_path,
            });
        }

        items.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        Ok(items)
    }

    /// Thumbnail URL and page count for one entry inside an extraction.
    async fn decorate(
        &self,
        kind: MediaKind,
        absolute: &Path,
        extracted_path: &str,
        key: &CacheKey,
    ) -> (Option<String>, Option<usize>) {
        match kind {
            MediaKind::Image => (Some(extracted_url(extracted_path)), None),
            MediaKind::Video => {
                let thumbnail = self
                    .derived(ThumbnailKind::Video, key, Some(absolute))
                    .await;
                (thumbnail, None)
            }
            MediaKind::Directory => {
                let first = first_image(absolute.to_path_buf()).await;
                let thumbnail = match first {
                    Some(image) => {
                        self.derived(ThumbnailKind::Directory, key, Some(&image))
                            .await
                    }
                    None => None,
                };
                (thumbnail, None)
            }
            MediaKind::Archive => {
                let sibling = absolute.with_extension("");
                let pages = list_images(&sibling).await;
                let first = pages.first().map(|page| sibling.join(page));
                let thumbnail = self
                    .derived(ThumbnailKind::Archive, key, first.as_deref())
                    .await;
                (thumbnail, (!pages.is_empty()).then_some(pages.len()))
            }
            _ => (None, None),
        }
    }

    async fn derived(
        &self,
        kind: ThumbnailKind,
        key: &CacheKey,
        source: Option<&Path>,
    ) -> Option<String> {
        let path = self.thumbnails.thumbnail(kind, key, source).await?;
        DerivedAssetCache::thumbnail_url(&path)
    }
}

async fn ensure_archive_file(absolute: &Path, relative: &str) -> Result<()> {
    match tokio::fs::metadata(absolute).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(LibraryError::NotAFile(relative.to_string())),
        Err(_) => return Err(LibraryError::NotFound(relative.to_string())),
    }
    if classify(absolute, false) != MediaKind::Archive {
        return Err(LibraryError::NotAnArchive(relative.to_string()));
    }
    Ok(())
}

async fn has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

async fn first_image(dir: PathBuf) -> Option<PathBuf> {
    tokio::task::spawn_blocking(move || {
        list_images_blocking(&dir)
            .into_iter()
            .next()
            .map(|page| dir.join(page))
    })
    .await
    .ok()
    .flatten()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
