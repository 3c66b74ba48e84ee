//! Library handlers shared by the private and public routers. The router
//! decides the [`Access`](mediahive_core::Access) and injects it as an
//! extension.

pub mod handle_archive;
pub mod handle_browse;
pub mod handle_stream;

use serde::Deserialize;

use crate::errors::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct LibraryQuery {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, alias = "libraryId")]
    pub library: Option<String>,
}

impl LibraryQuery {
    pub fn path_or_root(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    pub fn required_path(&self) -> Result<&str, AppError> {
        self.path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .ok_or_else(|| AppError::bad_request("Missing required `path` parameter"))
    }

    pub fn library_id(&self) -> Option<&str> {
        self.library.as_deref()
    }
}
