use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::single_flight::{Flight, SingleFlight};
use super::{CacheKey, discard, is_nonempty_file, partial_path, publish, touch};
use crate::error::{LibraryError, Result};
use crate::media::kind::passthrough_content_type;
use crate::tools::{Tool, ToolRunner};

/// A video ready to be streamed to the browser client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableVideo {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Whether `path` is a cached transcode rather than the source.
    pub transcoded: bool,
}

/// Decides between pass-through and transcode-then-serve, and owns the
/// transcoded family of the cache (`<key>.mp4`).
pub struct VideoGate {
    dir: PathBuf,
    runner: Arc<dyn ToolRunner>,
    timeout: Duration,
    flights: Arc<SingleFlight>,
}

impl fmt::Debug for VideoGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoGate")
            .field("dir", &self.dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl VideoGate {
    pub fn new(dir: PathBuf, runner: Arc<dyn ToolRunner>, timeout: Duration) -> Self {
        Self {
            dir,
            runner,
            timeout,
            flights: SingleFlight::new(),
        }
    }

    pub fn transcode_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.mp4"))
    }

    /// Returns a playable rendition of `source`.
    ///
    /// Compatible containers pass through untouched unless `force` is set.
    /// Anything else is transcoded once with a fixed H.264/AAC profile; the
    /// call waits for the transcode on a miss.
    pub async fn ensure_playable(
        &self,
        source: &Path,
        key: &CacheKey,
        force: bool,
    ) -> Result<PlayableVideo> {
        if !force && let Some(content_type) = passthrough_content_type(source) {
            return Ok(PlayableVideo {
                path: source.to_path_buf(),
                content_type,
                transcoded: false,
            });
        }

        if !self.runner.available(Tool::Ffmpeg).await {
            return Err(LibraryError::ToolUnavailable(Tool::Ffmpeg));
        }

        let target = self.transcode_path(key);
        loop {
            if is_nonempty_file(&target).await {
                if let Err(err) = touch(&target) {
                    warn!(target = %target.display(), error = %err, "could not refresh transcode");
                }
                debug!(key = %key, "transcode cache hit");
                return Ok(self.transcoded(target));
            }

            match self.flights.join(key.as_str()) {
                Flight::Follower(wait) => wait.await,
                Flight::Leader(_guard) => {
                    self.transcode(source, &target).await?;
                    return Ok(self.transcoded(target));
                }
            }
        }
    }

    fn transcoded(&self, path: PathBuf) -> PlayableVideo {
        PlayableVideo {
            path,
            content_type: "video/mp4",
            transcoded: true,
        }
    }

    async fn transcode(&self, source: &Path, target: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let partial = partial_path(target);
        let subject = source.display().to_string();

        info!(source = %subject, "transcoding video for playback");

        let args: Vec<OsString> = [
            OsString::from("-y"),
            "-i".into(),
            source.into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-c:a".into(),
            "aac".into(),
            "-ac".into(),
            "2".into(),
            "-b:a".into(),
            "160k".into(),
            partial.as_os_str().to_owned(),
        ]
        .into();

        if let Err(err) = self.runner.run(Tool::Ffmpeg, args, self.timeout).await {
            discard(&partial).await;
            return Err(LibraryError::from_transcode(&subject, err));
        }

        match publish(&partial, target).await {
            Ok(true) => {
                info!(source = %subject, target = %target.display(), "transcode cached");
                Ok(())
            }
            Ok(false) => {
                warn!(source = %subject, "transcoder produced no output");
                Err(LibraryError::Transcode(subject))
            }
            Err(err) => {
                warn!(source = %subject, error = %err, "could not publish transcode");
                Err(LibraryError::Transcode(subject))
            }
        }
    }
}
