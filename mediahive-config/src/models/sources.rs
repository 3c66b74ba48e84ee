use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::util::{parse_duration, parse_hours, parse_list, parse_minutes};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub library: FileLibraryConfig,
    #[serde(default)]
    pub cache: FileCacheConfig,
    #[serde(default)]
    pub tools: FileToolsConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLibraryConfig {
    /// Plain directories; ids and names are derived from the paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dirs: Vec<PathBuf>,
    /// Roots with an explicit id or display name. Listed after `dirs`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<FileLibraryRoot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileLibraryRoot {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Durations are humantime strings (`"6h"`, `"30m"`).
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcoded: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_max_depth: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileToolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unzip_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_tokens: Option<Vec<String>>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub library_dirs: Option<Vec<PathBuf>>,
    pub public_libraries: Option<Vec<String>>,
    pub storage_dir: Option<PathBuf>,
    pub thumbnail_dir: Option<PathBuf>,
    pub extract_dir: Option<PathBuf>,
    pub transcoded_dir: Option<PathBuf>,
    pub cache_ttl: Option<Duration>,
    pub cleanup_interval: Option<Duration>,
    pub ffmpeg_path: Option<PathBuf>,
    pub unzip_path: Option<PathBuf>,
    pub thumbnail_timeout: Option<Duration>,
    pub transcode_timeout: Option<Duration>,
    pub extract_timeout: Option<Duration>,
    pub archive_max_depth: Option<usize>,
    pub api_tokens: Option<Vec<String>>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment layer from any variable source. Blank values
    /// count as unset; unparsable ones are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let parsed = |name: &str, parse: &dyn Fn(&str) -> Option<Duration>| {
            var(name).and_then(|raw| {
                let value = parse(&raw);
                if value.is_none() {
                    warn!(variable = name, value = %raw, "ignoring unparsable duration");
                }
                value
            })
        };

        let library_dirs = var("LIBRARY_DIRS")
            .map(|raw| parse_list(&raw))
            .filter(|dirs| !dirs.is_empty())
            .or_else(|| var("LIBRARY_DIR").map(|dir| vec![dir.trim().to_string()]))
            .map(|dirs| dirs.into_iter().map(PathBuf::from).collect());

        Self {
            config_path: var("MEDIAHIVE_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: var("PORT").and_then(|raw| parse_number(&raw, "PORT")),
            library_dirs,
            public_libraries: var("PUBLIC_LIBRARIES").map(|raw| parse_list(&raw)),
            storage_dir: var("STORAGE_DIR").map(PathBuf::from),
            thumbnail_dir: var("THUMBNAIL_DIR").map(PathBuf::from),
            extract_dir: var("ARCHIVE_EXTRACT_DIR").map(PathBuf::from),
            transcoded_dir: var("TRANSCODED_DIR").map(PathBuf::from),
            cache_ttl: parsed("CACHE_TTL_HOURS", &parse_hours),
            cleanup_interval: parsed("CACHE_CLEANUP_INTERVAL_MINUTES", &parse_minutes),
            ffmpeg_path: var("FFMPEG_PATH").map(PathBuf::from),
            unzip_path: var("UNZIP_PATH").map(PathBuf::from),
            thumbnail_timeout: parsed("THUMBNAIL_TIMEOUT", &parse_duration),
            transcode_timeout: parsed("TRANSCODE_TIMEOUT", &parse_duration),
            extract_timeout: parsed("EXTRACT_TIMEOUT", &parse_duration),
            archive_max_depth: var("ARCHIVE_MAX_DEPTH")
                .and_then(|raw| parse_number(&raw, "ARCHIVE_MAX_DEPTH")),
            api_tokens: var("API_TOKENS").map(|raw| parse_list(&raw)),
        }
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, name: &str) -> Option<T> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        warn!(variable = name, value = %raw, "ignoring unparsable number");
    }
    parsed
}
