use std::path::{Component, Path, PathBuf};

/// Why a requested path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    ParentSegment,
    Absolute,
}

/// A requested path resolved underneath a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contained {
    pub absolute: PathBuf,
    /// `/`-joined path relative to the base; empty for the base itself.
    pub relative: String,
}

/// Resolves an untrusted, client supplied path underneath `base`.
///
/// A single leading separator is ignored so `/a/b` and `a/b` are the same
/// request. Any `..` segment or absolute form (root, drive prefix) is refused
/// before the filesystem is consulted; this is pure path math.
pub fn resolve_within(base: &Path, requested: &str) -> Result<Contained, Escape> {
    let trimmed = requested
        .strip_prefix('/')
        .or_else(|| requested.strip_prefix('\\'))
        .unwrap_or(requested);

    let mut segments: Vec<String> = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                // Clients on Windows send `\` separators; never let one hide a parent marker.
                if part.split('\\').any(|p| p == "..") {
                    return Err(Escape::ParentSegment);
                }
                segments.push(part.into_owned());
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(Escape::ParentSegment),
            Component::RootDir | Component::Prefix(_) => return Err(Escape::Absolute),
        }
    }

    let mut absolute = base.to_path_buf();
    for segment in &segments {
        absolute.push(segment);
    }

    Ok(Contained {
        absolute,
        relative: segments.join("/"),
    })
}

/// `/`-joined form of `path` relative to `base`, if it lies underneath it.
pub fn relative_to(base: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(base).ok()?;
    let parts: Option<Vec<&str>> = rest
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    parts.map(|parts| parts.join("/"))
}
