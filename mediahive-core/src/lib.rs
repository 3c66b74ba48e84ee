//! Core of the MediaHive library server: library roots and safe path
//! resolution, media classification, the derived asset cache (thumbnails,
//! transcodes, extracted archives), archive browsing, the cache janitor and
//! byte-range streaming.

pub mod archive;
pub mod cache;
pub mod error;
pub mod library;
pub mod listing;
pub mod media;
pub mod service;
pub mod stream;
pub mod tools;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use archive::{ArchiveBrowseContext, ArchiveBrowseRequest, ArchivePages, ArchiveScope};
pub use cache::{CacheDirs, CacheJanitor, CacheKey, CacheSettings, SweepReport, ToolTimeouts};
pub use error::{ErrorClass, LibraryError, Result};
pub use library::{Access, LibraryRoot, LibraryRoots, RootSpec};
pub use listing::{DirectoryEntry, DirectoryListing};
pub use media::{MediaKind, classify, content_type_for};
pub use service::{ExtractedArchive, FileInfo, FileStats, MediaLibrary};
pub use stream::{ByteRange, MediaStream, parse_range};
pub use tools::{ProcessRunner, Tool, ToolError, ToolRunner};
