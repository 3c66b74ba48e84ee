//! Configuration for MediaHive.
//!
//! Values come from the environment (after an optional `.env`), then a TOML
//! file, then built-in defaults. The result is an immutable [`Config`] that
//! is turned into the core's [`LibraryRoots`](mediahive_core::LibraryRoots)
//! and [`CacheSettings`](mediahive_core::CacheSettings) once at start-up.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    AuthConfig, CacheConfig, Config, ConfigMetadata, LibraryConfig, ServerConfig, ToolsConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
