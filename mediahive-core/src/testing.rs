//! In-memory [`ToolRunner`] for tests. It never spawns a process: "ffmpeg"
//! writes a fixed payload to its output argument and "unzip" materialises
//! registered archive contents into the destination directory.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::tools::{Tool, ToolError, ToolRunner};

pub const FAKE_FFMPEG_OUTPUT: &[u8] = b"fake ffmpeg output";

#[derive(Debug, Default)]
struct State {
    missing: HashSet<Tool>,
    failing: HashSet<Tool>,
    calls: HashMap<Tool, usize>,
    last_args: HashMap<Tool, Vec<OsString>>,
    archives: HashMap<String, Vec<(String, Vec<u8>)>>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct FakeRunner {
    state: Mutex<State>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `tool` look uninstalled.
    pub fn set_missing(&self, tool: Tool) {
        self.state.lock().missing.insert(tool);
    }

    /// Makes every run of `tool` exit non-zero.
    pub fn set_failing(&self, tool: Tool) {
        self.state.lock().failing.insert(tool);
    }

    /// Slows every run down, to widen race windows in concurrency tests.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Contents "unzip" produces for an archive with this file name.
    pub fn register_archive<N, B>(&self, file_name: &str, entries: impl IntoIterator<Item = (N, B)>)
    where
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, bytes)| (name.into(), bytes.into()))
            .collect();
        self.state
            .lock()
            .archives
            .insert(file_name.to_string(), entries);
    }

    pub fn calls(&self, tool: Tool) -> usize {
        self.state.lock().calls.get(&tool).copied().unwrap_or(0)
    }

    /// Arguments of the most recent run of `tool`.
    pub fn last_args(&self, tool: Tool) -> Option<Vec<OsString>> {
        self.state.lock().last_args.get(&tool).cloned()
    }

    fn unzip(&self, args: &[OsString]) -> Result<(), ToolError> {
        let failed = ToolError::Failed {
            tool: Tool::Unzip,
            code: Some(9),
        };
        let Some(dest_at) = args.iter().position(|arg| arg == "-d") else {
            return Err(failed);
        };
        let (Some(archive), Some(dest)) = (args.get(dest_at.wrapping_sub(1)), args.get(dest_at + 1))
        else {
            return Err(failed);
        };
        let name = Path::new(archive)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entries = match self.state.lock().archives.get(&name) {
            Some(entries) => entries.clone(),
            None => return Err(failed),
        };

        let dest = PathBuf::from(dest);
        for (relative, bytes) in entries {
            let path = dest.join(relative);
            write(&path, &bytes).map_err(|source| ToolError::Io {
                tool: Tool::Unzip,
                source,
            })?;
        }
        Ok(())
    }
}

fn write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn available(&self, tool: Tool) -> bool {
        !self.state.lock().missing.contains(&tool)
    }

    async fn run(
        &self,
        tool: Tool,
        args: Vec<OsString>,
        _timeout: Duration,
    ) -> Result<(), ToolError> {
        let delay = {
            let mut state = self.state.lock();
            if state.missing.contains(&tool) {
                return Err(ToolError::Missing(tool));
            }
            *state.calls.entry(tool).or_default() += 1;
            state.last_args.insert(tool, args.clone());
            if state.failing.contains(&tool) {
                return Err(ToolError::Failed {
                    tool,
                    code: Some(1),
                });
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match tool {
            Tool::Ffmpeg => {
                let output = args.last().map(PathBuf::from).ok_or(ToolError::Failed {
                    tool,
                    code: Some(1),
                })?;
                write(&output, FAKE_FFMPEG_OUTPUT).map_err(|source| ToolError::Io { tool, source })
            }
            Tool::Unzip => self.unzip(&args),
        }
    }
}
