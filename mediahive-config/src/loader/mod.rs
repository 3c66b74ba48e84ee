pub mod error;

use once_cell::sync::Lazy;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use mediahive_core::{LibraryRoots, RootSpec, ToolTimeouts};

use crate::models::sources::{EnvConfig, FileConfig};
use crate::models::{
    AuthConfig, CacheConfig, Config, ConfigMetadata, LibraryConfig, ServerConfig, ToolsConfig,
};
use crate::util::parse_duration;
use crate::validation::{self, ConfigWarnings};
use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("mediahive.toml"),
        PathBuf::from("config/mediahive.toml"),
    ]
});

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_ARCHIVE_MAX_DEPTH: usize = 4;
const DEFAULT_PUBLIC_ID: &str = "public";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, then reads the process environment and the TOML file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Same as [`load`](Self::load) with an explicit environment layer and
    /// no `.env` handling.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        compose(file_config, env, config_path)
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => path.clone(),
                None => return Ok((None, None)),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

/// Merges the environment over the file over the defaults. Pure apart from
/// the existence checks the guard rails make.
pub fn compose(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<ConfigLoad, ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if config_path.is_none() {
        warnings.push_with_hint(
            "No mediahive.toml detected; using environment variables and defaults",
            "Pass --config or set MEDIAHIVE_CONFIG to point at a configuration file",
        );
    }

    let FileConfig {
        server: file_server,
        library: file_library,
        cache: file_cache,
        tools: file_tools,
        auth: file_auth,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
    };

    let roots = match env.library_dirs {
        Some(dirs) => dirs.into_iter().map(RootSpec::from_path).collect(),
        None => {
            let mut roots: Vec<RootSpec> = file_library
                .dirs
                .into_iter()
                .map(RootSpec::from_path)
                .collect();
            roots.extend(file_library.roots.into_iter().map(|root| RootSpec {
                path: root.path,
                id: root.id,
                name: root.name,
            }));
            if roots.is_empty() {
                roots.push(RootSpec::from_path("library"));
            }
            roots
        }
    };
    // Without an explicit allow-list only a root literally named `public` is public.
    let public = match env.public_libraries.or(file_library.public) {
        Some(ids) => ids,
        None => {
            let derived = LibraryRoots::build(roots.clone(), Vec::new());
            derived
                .all()
                .iter()
                .filter(|root| root.id == DEFAULT_PUBLIC_ID)
                .map(|root| root.id.clone())
                .collect()
        }
    };
    let library = LibraryConfig { roots, public };

    let storage = env
        .storage_dir
        .or(file_cache.storage_dir)
        .unwrap_or_else(|| PathBuf::from("storage"));
    let cache = CacheConfig {
        thumbnails: env
            .thumbnail_dir
            .or(file_cache.thumbnails)
            .unwrap_or_else(|| storage.join("thumbnails")),
        extracted: env
            .extract_dir
            .or(file_cache.extracted)
            .unwrap_or_else(|| storage.join("extracted")),
        transcoded: env
            .transcoded_dir
            .or(file_cache.transcoded)
            .unwrap_or_else(|| storage.join("transcoded")),
        ttl: pick_duration(env.cache_ttl, file_cache.ttl, "cache.ttl")?.unwrap_or(DEFAULT_TTL),
        cleanup_interval: pick_duration(
            env.cleanup_interval,
            file_cache.cleanup_interval,
            "cache.cleanup_interval",
        )?
        .unwrap_or(DEFAULT_CLEANUP_INTERVAL),
        archive_max_depth: env
            .archive_max_depth
            .or(file_cache.archive_max_depth)
            .unwrap_or(DEFAULT_ARCHIVE_MAX_DEPTH),
        storage,
    };

    if cache.ttl.is_zero() {
        return Err(ConfigLoadError::InvalidValue {
            field: "cache.ttl",
            value: "0s".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if cache.cleanup_interval.is_zero() {
        return Err(ConfigLoadError::InvalidValue {
            field: "cache.cleanup_interval",
            value: "0s".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let defaults = ToolTimeouts::default();
    let tools = ToolsConfig {
        ffmpeg_path: env
            .ffmpeg_path
            .or(file_tools.ffmpeg_path)
            .unwrap_or_else(|| PathBuf::from("ffmpeg")),
        unzip_path: env
            .unzip_path
            .or(file_tools.unzip_path)
            .unwrap_or_else(|| PathBuf::from("unzip")),
        timeouts: ToolTimeouts {
            thumbnail: pick_duration(
                env.thumbnail_timeout,
                file_tools.thumbnail_timeout,
                "tools.thumbnail_timeout",
            )?
            .unwrap_or(defaults.thumbnail),
            transcode: pick_duration(
                env.transcode_timeout,
                file_tools.transcode_timeout,
                "tools.transcode_timeout",
            )?
            .unwrap_or(defaults.transcode),
            extract: pick_duration(
                env.extract_timeout,
                file_tools.extract_timeout,
                "tools.extract_timeout",
            )?
            .unwrap_or(defaults.extract),
        },
    };

    let auth = AuthConfig {
        api_tokens: env
            .api_tokens
            .or(file_auth.api_tokens)
            .unwrap_or_default()
            .into_iter()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .collect(),
    };

    let config = Config {
        server,
        library,
        cache,
        tools,
        auth,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    };

    warnings.extend(validation::apply_guard_rails(&config));

    Ok(ConfigLoad { config, warnings })
}

/// Environment value first, then the humantime string from the file.
fn pick_duration(
    env: Option<Duration>,
    file: Option<String>,
    field: &'static str,
) -> Result<Option<Duration>, ConfigLoadError> {
    if env.is_some() {
        return Ok(env);
    }
    match file {
        None => Ok(None),
        Some(raw) => parse_duration(&raw)
            .map(Some)
            .ok_or_else(|| ConfigLoadError::InvalidValue {
                field,
                value: raw,
                reason: "expected a duration such as `30s`, `10m` or `6h`".into(),
            }),
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_any_source() {
        let load = compose(None, EnvConfig::default(), None).unwrap();
        let config = load.config;

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.library.roots.len(), 1);
        assert_eq!(config.library.roots[0].path, PathBuf::from("library"));
        assert!(config.library.public.is_empty());
        assert_eq!(config.cache.thumbnails, PathBuf::from("storage/thumbnails"));
        assert_eq!(config.cache.ttl, Duration::from_secs(6 * 3600));
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(1800));
        assert_eq!(config.cache.archive_max_depth, 4);
        assert_eq!(config.tools.timeouts, ToolTimeouts::default());
        assert!(!config.auth.has_tokens());
    }

    #[test]
    fn environment_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 8080
            host = "127.0.0.1"

            [cache]
            storage_dir = "/var/lib/mediahive"
            ttl = "1h"
            "#,
        )
        .unwrap();
        let env = EnvConfig {
            server_port: Some(9000),
            cache_ttl: Some(Duration::from_secs(120)),
            ..EnvConfig::default()
        };

        let config = compose(Some(file), env, Some("mediahive.toml".into()))
            .unwrap()
            .config;
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert_eq!(
            config.cache.extracted,
            PathBuf::from("/var/lib/mediahive/extracted")
        );
    }

    #[test]
    fn env_library_dirs_replace_file_roots() {
        let file: FileConfig = toml::from_str(
            r#"
            [[library.roots]]
            path = "/srv/kids"
            id = "kids"
            "#,
        )
        .unwrap();
        let env = EnvConfig {
            library_dirs: Some(vec!["/srv/movies".into()]),
            ..EnvConfig::default()
        };

        let config = compose(Some(file), env, None).unwrap().config;
        let ids: Vec<_> = config
            .library_roots()
            .all()
            .iter()
            .map(|root| root.id.clone())
            .collect();
        assert_eq!(ids, ["movies"]);
    }

    #[test]
    fn a_root_named_public_is_public_by_default() {
        let env = EnvConfig {
            library_dirs: Some(vec!["/srv/movies".into(), "/srv/public".into()]),
            ..EnvConfig::default()
        };
        let config = compose(None, env, None).unwrap().config;
        assert_eq!(config.library.public, ["public"]);

        let env = EnvConfig {
            library_dirs: Some(vec!["/srv/movies".into()]),
            public_libraries: Some(vec!["movies".into()]),
            ..EnvConfig::default()
        };
        let config = compose(None, env, None).unwrap().config;
        assert_eq!(config.library.public, ["movies"]);
    }

    #[test]
    fn bad_file_duration_is_an_error() {
        let file: FileConfig = toml::from_str("[tools]\nextract_timeout = \"later\"").unwrap();
        let err = compose(Some(file), EnvConfig::default(), None).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidValue {
                field: "tools.extract_timeout",
                ..
            }
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let env = EnvConfig {
            cache_ttl: Some(Duration::ZERO),
            ..EnvConfig::default()
        };
        assert!(compose(None, env, None).is_err());
    }

    #[test]
    fn blank_tokens_are_dropped() {
        let env = EnvConfig {
            api_tokens: Some(vec![" secret ".into(), "  ".into()]),
            ..EnvConfig::default()
        };
        let config = compose(None, env, None).unwrap().config;
        assert_eq!(config.auth.api_tokens, ["secret"]);
    }
}
