//! Archive extraction and browsing of extracted trees as a virtual
//! filesystem.

pub mod browser;
pub mod extract;
pub mod natural;

pub use browser::{
    ArchiveBrowseContext, ArchiveBrowseRequest, ArchiveBrowser, ArchiveEntry, ArchivePages,
    ArchiveScope, Breadcrumb,
};
pub use extract::{ArchiveExtractor, Extraction, list_images, list_images_blocking};
pub use natural::natural_cmp;

/// URL prefix the server mounts the extracted cache directory under.
pub const EXTRACTED_URL_PREFIX: &str = "/extracted";

/// Public URL of a file inside the extracted cache directory.
pub fn extracted_url(relative: &str) -> String {
    format!("{EXTRACTED_URL_PREFIX}/{relative}")
}
