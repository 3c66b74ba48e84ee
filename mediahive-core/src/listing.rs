//! Directory listings: classification plus per-entry thumbnails, subtitles
//! and archive page counts.

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveExtractor, list_images, natural_cmp};
use crate::cache::{CacheKey, DerivedAssetCache, ThumbnailKind};
use crate::error::{LibraryError, Result};
use crate::library::{LibraryRoot, ResolvedPath};
use crate::media::kind::{is_image, is_passthrough_video};
use crate::media::{EntryType, MediaKind, classify, modified_at};

/// Entries described concurrently per listing.
const DESCRIBE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    /// Path relative to the library root.
    pub path: String,
    pub library_id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub media_kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ios_optimized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_auto_transcode: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub current_path: String,
    pub items: Vec<DirectoryEntry>,
    pub library_root: LibraryRoot,
    pub library_roots: Vec<LibraryRoot>,
}

struct RawEntry {
    name: String,
    absolute: PathBuf,
    metadata: Metadata,
    kind: MediaKind,
}

pub(crate) struct Lister<'a> {
    pub(crate) thumbnails: &'a DerivedAssetCache,
    pub(crate) extractor: &'a ArchiveExtractor,
}

impl Lister<'_> {
    /// Lists the listable children of `dir`, naturally ordered by name.
    pub(crate) async fn list(&self, dir: &ResolvedPath) -> Result<Vec<DirectoryEntry>> {
        match tokio::fs::metadata(&dir.absolute).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(LibraryError::NotADirectory(dir.relative.clone())),
            Err(_) => return Err(LibraryError::NotFound(dir.relative.clone())),
        }

        let mut reader = tokio::fs::read_dir(&dir.absolute).await?;
        let mut raw = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let absolute = entry.path();
            raw.push(RawEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: classify(&absolute, metadata.is_dir()),
                absolute,
                metadata,
            });
        }

        let subtitles = sidecar_index(&raw, &dir.relative);
        let subtitles = &subtitles;

        let listable = raw.into_iter().filter(|entry| entry.kind.is_listable());
        let mut items: Vec<DirectoryEntry> = stream::iter(listable)
            .map(|entry| self.describe(entry, dir, subtitles))
            .buffered(DESCRIBE_CONCURRENCY)
            .collect()
            .await;

        items.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        Ok(items)
    }

    async fn describe(
        &self,
        entry: RawEntry,
        dir: &ResolvedPath,
        subtitles: &HashMap<String, Vec<String>>,
    ) -> DirectoryEntry {
        let path = join_relative(&dir.relative, &entry.name);
        let key = CacheKey::for_library(&dir.root.id, &path);

        let mut item = DirectoryEntry {
            name: entry.name.clone(),
            library_id: dir.root.id.clone(),
            entry_type: EntryType::of(&entry.metadata),
            size: entry.metadata.len(),
            modified_at: modified_at(&entry.metadata),
            media_kind: entry.kind,
            thumbnail: None,
            subtitles: None,
            page_count: None,
            extraction_target: None,
            ios_optimized: None,
            supports_auto_transcode: None,
            path,
        };

        match entry.kind {
            MediaKind::Video => {
                item.thumbnail = self
                    .thumbnail(ThumbnailKind::Video, &key, Some(&entry.absolute))
                    .await;
                item.ios_optimized = Some(is_passthrough_video(&entry.absolute));
                item.supports_auto_transcode = Some(true);
                let stem = stem_of(&entry.name);
                item.subtitles = Some(subtitles.get(stem).cloned().unwrap_or_default());
            }
            MediaKind::Archive => {
                let target = self.extractor.target_for(&key);
                let pages = list_images(&target).await;
                let first = pages.first().map(|page| target.join(page));
                item.thumbnail = self
                    .thumbnail(ThumbnailKind::Archive, &key, first.as_deref())
                    .await;
                item.page_count = (!pages.is_empty()).then_some(pages.len());
                item.extraction_target = Some(key.to_string());
            }
            MediaKind::Image => {
                item.thumbnail = self
                    .thumbnail(ThumbnailKind::Image, &key, Some(&entry.absolute))
                    .await;
            }
            MediaKind::Directory => {
                if let Some(image) = first_image_in(&entry.absolute).await {
                    item.thumbnail = self
                        .thumbnail(ThumbnailKind::Directory, &key, Some(&image))
                        .await;
                }
            }
            MediaKind::Epub | MediaKind::Subtitle | MediaKind::File => {}
        }

        item
    }

    async fn thumbnail(
        &self,
        kind: ThumbnailKind,
        key: &CacheKey,
        source: Option<&Path>,
    ) -> Option<String> {
        let path = self.thumbnails.thumbnail(kind, key, source).await?;
        DerivedAssetCache::thumbnail_url(&path)
    }
}

pub(crate) fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn stem_of(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Subtitle files of one directory keyed by stem, as root-relative paths.
fn sidecar_index(entries: &[RawEntry], parent: &str) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for entry in entries {
        if entry.kind != MediaKind::Subtitle {
            continue;
        }
        index
            .entry(stem_of(&entry.name).to_string())
            .or_default()
            .push(join_relative(parent, &entry.name));
    }
    for paths in index.values_mut() {
        paths.sort_by(|a, b| natural_cmp(a, b));
    }
    index
}

/// First image directly inside `dir`, in natural order.
async fn first_image_in(dir: &Path) -> Option<PathBuf> {
    let mut reader = tokio::fs::read_dir(dir).await.ok()?;
    let mut images = Vec::new();
    while let Ok(Some(entry)) = reader.next_entry().await {
        let path = entry.path();
        if is_image(&path) && entry.file_type().await.is_ok_and(|ft| ft.is_file()) {
            images.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    images.sort_by(|a, b| natural_cmp(a, b));
    images.into_iter().next().map(|name| dir.join(name))
}
