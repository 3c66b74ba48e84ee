#![allow(dead_code)]

use async_trait::async_trait;
use mediahive_core::{
    CacheDirs, CacheSettings, LibraryRoots, MediaLibrary, RootSpec, Tool, ToolError, ToolRunner,
};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Tool runner that records invocations. "ffmpeg" writes a payload to its
/// last argument; "unzip" reads the archive as a manifest, one entry per
/// line, where `name|a;b` creates a nested manifest archive listing `a`, `b`.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Tool>>,
}

impl RecordingRunner {
    pub fn count(&self, tool: Tool) -> usize {
        self.calls.lock().iter().filter(|t| **t == tool).count()
    }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn available(&self, _tool: Tool) -> bool {
        true
    }

    async fn run(
        &self,
        tool: Tool,
        args: Vec<OsString>,
        _timeout: Duration,
    ) -> Result<(), ToolError> {
        self.calls.lock().push(tool);
        let io = |source: std::io::Error| ToolError::Io { tool, source };
        match tool {
            Tool::Ffmpeg => {
                let out = PathBuf::from(args.last().cloned().unwrap_or_default());
                std::fs::write(out, b"ffmpeg output").map_err(io)
            }
            Tool::Unzip => {
                let dest_at = args.iter().position(|arg| arg == "-d").expect("-d argument");
                let archive = PathBuf::from(&args[dest_at - 1]);
                let dest = PathBuf::from(&args[dest_at + 1]);
                let manifest = std::fs::read_to_string(&archive).map_err(io)?;
                for line in manifest.lines().filter(|l| !l.trim().is_empty()) {
                    let (name, nested) = match line.split_once('|') {
                        Some((name, nested)) => (name, nested.replace(';', "\n")),
                        None => (line, "page".to_string()),
                    };
                    let path = dest.join(name);
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(io)?;
                    }
                    std::fs::write(path, nested).map_err(io)?;
                }
                Ok(())
            }
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub runner: Arc<RecordingRunner>,
    pub library: MediaLibrary,
}

impl Fixture {
    /// Roots `movies`, `comics` and `public`; only `public` is allow-listed.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        for root in ["movies", "comics", "public"] {
            std::fs::create_dir_all(dir.path().join("library").join(root)).expect("root");
        }
        let roots = LibraryRoots::build(
            ["movies", "comics", "public"]
                .iter()
                .map(|name| RootSpec::from_path(dir.path().join("library").join(name)))
                .collect(),
            vec!["public".to_string()],
        );
        let settings = CacheSettings::new(CacheDirs::under(&dir.path().join("storage")));
        let runner = Arc::new(RecordingRunner::default());
        let library = MediaLibrary::new(roots, settings, runner.clone());
        library.prepare().await.expect("cache dirs");
        Self {
            dir,
            runner,
            library,
        }
    }

    pub fn root(&self, id: &str) -> PathBuf {
        self.dir.path().join("library").join(id)
    }

    pub fn write(&self, root: &str, relative: &str, contents: &str) -> PathBuf {
        let path = self.root(root).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("parent");
        }
        std::fs::write(&path, contents).expect("write");
        path
    }

    pub fn storage(&self) -> &Path {
        self.library.settings().dirs.thumbnails.parent().expect("storage")
    }
}
