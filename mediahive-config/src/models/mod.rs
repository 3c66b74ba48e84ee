pub mod sources;

use mediahive_core::{
    CacheDirs, CacheSettings, LibraryRoots, ProcessRunner, RootSpec, ToolTimeouts,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub cache: CacheConfig,
    pub tools: ToolsConfig,
    pub auth: AuthConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Builds the root set handed to the core.
    pub fn library_roots(&self) -> LibraryRoots {
        LibraryRoots::build(self.library.roots.clone(), self.library.public.clone())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            dirs: CacheDirs {
                thumbnails: self.cache.thumbnails.clone(),
                extracted: self.cache.extracted.clone(),
                transcoded: self.cache.transcoded.clone(),
            },
            ttl: self.cache.ttl,
            cleanup_interval: self.cache.cleanup_interval,
            timeouts: self.tools.timeouts,
            archive_max_depth: self.cache.archive_max_depth,
        }
    }

    pub fn tool_runner(&self) -> ProcessRunner {
        ProcessRunner::new(&self.tools.ffmpeg_path, &self.tools.unzip_path)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub roots: Vec<RootSpec>,
    /// Root ids reachable without a bearer token.
    pub public: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub storage: PathBuf,
    pub thumbnails: PathBuf,
    pub extracted: PathBuf,
    pub transcoded: PathBuf,
    pub ttl: Duration,
    pub cleanup_interval: Duration,
    pub archive_max_depth: usize,
}

#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub ffmpeg_path: PathBuf,
    pub unzip_path: PathBuf,
    pub timeouts: ToolTimeouts,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub api_tokens: Vec<String>,
}

impl AuthConfig {
    pub fn has_tokens(&self) -> bool {
        !self.api_tokens.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
