//! External command-line tools (ffmpeg, unzip) behind a small trait so the
//! cache layers never spawn processes directly.

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Unzip,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Unzip => "unzip",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} is not installed")]
    Missing(Tool),

    #[error("{tool} exited with code {code:?}")]
    Failed { tool: Tool, code: Option<i32> },

    #[error("{tool} did not finish within {after:?}")]
    TimedOut { tool: Tool, after: Duration },

    #[error("{tool} could not be started: {source}")]
    Io {
        tool: Tool,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external tools. Implementations must not leave a child process
/// running once `run` returns.
#[async_trait]
pub trait ToolRunner: Send + Sync + fmt::Debug {
    /// Whether `tool` can be invoked at all.
    async fn available(&self, tool: Tool) -> bool;

    /// Runs `tool` with `args`, failing on a non-zero exit status or when
    /// `timeout` elapses.
    async fn run(
        &self,
        tool: Tool,
        args: Vec<OsString>,
        timeout: Duration,
    ) -> Result<(), ToolError>;
}

/// Spawns the real binaries with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    ffmpeg: PathBuf,
    unzip: PathBuf,
}

impl ProcessRunner {
    pub fn new(ffmpeg: impl Into<PathBuf>, unzip: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            unzip: unzip.into(),
        }
    }

    fn program(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Unzip => &self.unzip,
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new("ffmpeg", "unzip")
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn available(&self, tool: Tool) -> bool {
        let program = self.program(tool);
        if program.components().count() > 1 {
            return program.is_file();
        }
        which::which(program).is_ok()
    }

    async fn run(
        &self,
        tool: Tool,
        args: Vec<OsString>,
        timeout: Duration,
    ) -> Result<(), ToolError> {
        let mut cmd = tokio::process::Command::new(self.program(tool));
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(tool = %tool, ?args, "running external tool");

        let child = cmd.spawn().map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ToolError::Missing(tool),
            _ => ToolError::Io { tool, source },
        })?;

        // Dropping the pending future on timeout kills the child.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Io { tool, source })?,
            Err(_) => {
                warn!(tool = %tool, ?timeout, "external tool timed out");
                return Err(ToolError::TimedOut {
                    tool,
                    after: timeout,
                });
            }
        };

        if !output.status.success() {
            warn!(
                tool = %tool,
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "external tool failed"
            );
            return Err(ToolError::Failed {
                tool,
                code: output.status.code(),
            });
        }

        Ok(())
    }
}
