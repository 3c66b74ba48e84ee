use thiserror::Error;

use crate::tools::{Tool, ToolError};

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Invalid path: {0} escapes its library root")]
    Traversal(String),

    #[error("Unknown library: {requested}. Available: {available}")]
    UnknownLibrary { requested: String, available: String },

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Target is not an archive: {0}")]
    NotAnArchive(String),

    #[error("Invalid archive subpath: {0}")]
    InvalidSubpath(String),

    #[error("{0} is required but is not installed")]
    ToolUnavailable(Tool),

    #[error("Failed to transcode {0} into a playable stream")]
    Transcode(String),

    #[error("Failed to extract archive {0}")]
    Extraction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

/// Coarse classification callers use to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    NotFound,
    Internal,
}

impl LibraryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LibraryError::Traversal(_)
            | LibraryError::UnknownLibrary { .. }
            | LibraryError::NotAnArchive(_)
            | LibraryError::InvalidSubpath(_) => ErrorClass::BadRequest,
            LibraryError::NotFound(_)
            | LibraryError::NotADirectory(_)
            | LibraryError::NotAFile(_) => ErrorClass::NotFound,
            LibraryError::ToolUnavailable(_)
            | LibraryError::Transcode(_)
            | LibraryError::Extraction(_)
            | LibraryError::Io(_) => ErrorClass::Internal,
        }
    }

    /// Maps a tool failure that happened while transcoding `subject`.
    pub(crate) fn from_transcode(subject: &str, err: ToolError) -> Self {
        match err {
            ToolError::Missing(tool) => LibraryError::ToolUnavailable(tool),
            _ => LibraryError::Transcode(subject.to_string()),
        }
    }

    /// Maps a tool failure that happened while unpacking `subject`.
    pub(crate) fn from_extraction(subject: &str, err: ToolError) -> Self {
        match err {
            ToolError::Missing(tool) => LibraryError::ToolUnavailable(tool),
            _ => LibraryError::Extraction(subject.to_string()),
        }
    }
}
