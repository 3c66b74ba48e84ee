use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "avi", "flv", "wmv", "webm"];
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz", "cbr"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "bmp"];
pub const EPUB_EXTENSIONS: &[&str] = &["epub"];
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "smi"];

/// Containers the browser client plays without a transcode.
pub const PASSTHROUGH_VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Directory,
    Video,
    Archive,
    Image,
    Epub,
    Subtitle,
    File,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Directory => "directory",
            MediaKind::Video => "video",
            MediaKind::Archive => "archive",
            MediaKind::Image => "image",
            MediaKind::Epub => "epub",
            MediaKind::Subtitle => "subtitle",
            MediaKind::File => "file",
        }
    }

    /// Kinds surfaced in directory listings. Subtitles ride along on their
    /// video instead and plain files are hidden, though both stay streamable.
    pub fn is_listable(&self) -> bool {
        matches!(
            self,
            MediaKind::Directory
                | MediaKind::Video
                | MediaKind::Archive
                | MediaKind::Image
                | MediaKind::Epub
        )
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased extension without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn has_extension(path: &Path, list: &[&str]) -> bool {
    extension_of(path).is_some_and(|ext| list.contains(&ext.as_str()))
}

pub fn classify(path: &Path, is_dir: bool) -> MediaKind {
    if is_dir {
        return MediaKind::Directory;
    }
    let Some(ext) = extension_of(path) else {
        return MediaKind::File;
    };
    let ext = ext.as_str();
    if VIDEO_EXTENSIONS.contains(&ext) {
        MediaKind::Video
    } else if ARCHIVE_EXTENSIONS.contains(&ext) {
        MediaKind::Archive
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        MediaKind::Image
    } else if EPUB_EXTENSIONS.contains(&ext) {
        MediaKind::Epub
    } else if SUBTITLE_EXTENSIONS.contains(&ext) {
        MediaKind::Subtitle
    } else {
        MediaKind::File
    }
}

pub fn is_image(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

pub fn is_archive(path: &Path) -> bool {
    has_extension(path, ARCHIVE_EXTENSIONS)
}

pub fn is_passthrough_video(path: &Path) -> bool {
    has_extension(path, PASSTHROUGH_VIDEO_EXTENSIONS)
}

/// Content type of a video served without transcoding.
pub fn passthrough_content_type(path: &Path) -> Option<&'static str> {
    match extension_of(path)?.as_str() {
        "mp4" => Some("video/mp4"),
        "m4v" => Some("video/x-m4v"),
        "mov" => Some("video/quicktime"),
        _ => None,
    }
}

/// Content type used when streaming a non-video file.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = extension_of(path).unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "epub" => "application/epub+zip",
        "srt" | "smi" => "text/plain; charset=utf-8",
        "mp4" | "m4v" | "mov" => passthrough_content_type(path).unwrap_or("video/mp4"),
        _ => "application/octet-stream",
    }
}
