pub mod kind;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;

pub use kind::{MediaKind, classify, content_type_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

impl EntryType {
    pub fn of(metadata: &Metadata) -> Self {
        if metadata.is_dir() {
            EntryType::Directory
        } else {
            EntryType::File
        }
    }
}

/// Where a listed entry physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Library,
    Extracted,
}

pub(crate) fn modified_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}
