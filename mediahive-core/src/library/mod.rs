//! Configured library roots and safe resolution of client paths against them.

pub mod resolver;

use serde::Serialize;
use std::path::PathBuf;

use crate::error::{LibraryError, Result};
use resolver::resolve_within;

/// A top-level directory the server is willing to browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryRoot {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// How a root is requested before it is built into a [`LibraryRoot`].
#[derive(Debug, Clone, Default)]
pub struct RootSpec {
    pub path: PathBuf,
    pub id: Option<String>,
    pub name: Option<String>,
}

impl RootSpec {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Which principal is asking. Public callers only ever see the allow-listed
/// roots; authenticated callers see every root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authenticated,
    Public,
}

/// A client path resolved inside a specific root.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub root: LibraryRoot,
    pub absolute: PathBuf,
    /// `/`-joined path relative to the root directory.
    pub relative: String,
}

/// The immutable set of roots loaded at start-up.
#[derive(Debug, Clone)]
pub struct LibraryRoots {
    roots: Vec<LibraryRoot>,
    public: Vec<String>,
}

impl LibraryRoots {
    /// Builds roots from specs, deriving ids from the directory name when
    /// not given. Ids stay unique by suffixing `-2`, `-3`, ...
    pub fn build(specs: Vec<RootSpec>, public: Vec<String>) -> Self {
        let mut roots: Vec<LibraryRoot> = Vec::with_capacity(specs.len());

        for (index, spec) in specs.into_iter().enumerate() {
            let fallback = format!("library-{}", index + 1);
            let base_name = spec
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| fallback.clone());

            let base_slug = spec
                .id
                .as_deref()
                .map(slugify)
                .filter(|slug| !slug.is_empty())
                .unwrap_or_else(|| {
                    let slug = slugify(&base_name);
                    if slug.is_empty() { fallback.clone() } else { slug }
                });

            let mut id = base_slug.clone();
            let mut counter = 1;
            while roots.iter().any(|root| root.id == id) {
                counter += 1;
                id = format!("{base_slug}-{counter}");
            }

            roots.push(LibraryRoot {
                id,
                name: spec.name.unwrap_or(base_name),
                path: spec.path,
            });
        }

        Self { roots, public }
    }

    /// Roots for plain directories, ids and names derived from the paths.
    pub fn from_dirs<P: Into<PathBuf>>(
        dirs: impl IntoIterator<Item = P>,
        public: Vec<String>,
    ) -> Self {
        Self::build(dirs.into_iter().map(RootSpec::from_path).collect(), public)
    }

    pub fn all(&self) -> &[LibraryRoot] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Allow-listed public ids that actually name a configured root.
    pub fn public_ids(&self) -> Vec<&str> {
        self.public
            .iter()
            .map(String::as_str)
            .filter(|id| self.roots.iter().any(|root| root.id == *id))
            .collect()
    }

    /// Roots visible to `access`, in configuration order.
    pub fn visible(&self, access: Access) -> Vec<&LibraryRoot> {
        match access {
            Access::Authenticated => self.roots.iter().collect(),
            Access::Public => self
                .roots
                .iter()
                .filter(|root| self.public.iter().any(|id| *id == root.id))
                .collect(),
        }
    }

    /// Selects a root. With no id the first visible root is used.
    pub fn select(&self, id: Option<&str>, access: Access) -> Result<&LibraryRoot> {
        let visible = self.visible(access);
        let id = id.map(str::trim).filter(|id| !id.is_empty());

        let found = match id {
            None => visible.first().copied(),
            Some(id) => visible.iter().copied().find(|root| root.id == id),
        };

        found.ok_or_else(|| LibraryError::UnknownLibrary {
            requested: id.unwrap_or_default().to_string(),
            available: visible
                .iter()
                .map(|root| root.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Resolves `requested` inside the selected root without touching the
    /// filesystem.
    pub fn resolve(
        &self,
        requested: &str,
        id: Option<&str>,
        access: Access,
    ) -> Result<ResolvedPath> {
        let root = self.select(id, access)?;
        let contained = resolve_within(&root.path, requested)
            .map_err(|_| LibraryError::Traversal(requested.to_string()))?;

        Ok(ResolvedPath {
            root: root.clone(),
            absolute: contained.absolute,
            relative: contained.relative,
        })
    }
}

/// Lowercase ASCII slug with `-` separators.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
