use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ExternalTool};
use crate::utils::process::run_captured;
use crate::{PipelineError, Result};

/// Transient audio file owned by one pipeline run.
///
/// The file is deleted when the value is dropped, so every exit path of the run
/// (success, error or cancellation) removes it.
#[derive(Debug)]
pub struct AudioArtifact {
    path: PathBuf,
    removed: bool,
}

impl AudioArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path, removed: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now instead of waiting for drop
    pub fn discard(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed temporary audio {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove temporary audio {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Extracts an audio track from a video with the external transcoder
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    tool: ExternalTool,
    codec: String,
    bitrate: String,
    sample_rate: u32,
}

impl AudioExtractor {
    pub fn new(
        tool: ExternalTool,
        codec: impl Into<String>,
        bitrate: impl Into<String>,
        sample_rate: u32,
    ) -> Self {
        Self {
            tool,
            codec: codec.into(),
            bitrate: bitrate.into(),
            sample_rate,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tools.transcoder.clone(),
            config.tools.audio_codec.clone(),
            config.tools.audio_bitrate.clone(),
            config.tools.audio_sample_rate,
        )
    }

    /// Audio path next to the video: same stem, codec extension
    pub fn audio_path_for(&self, video_path: &Path) -> PathBuf {
        let extension = self.codec.as_str();
        let same_extension = video_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if same_extension {
            // Never transcode a file onto itself
            let stem = video_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            video_path.with_file_name(format!("{}.audio.{}", stem, extension))
        } else {
            video_path.with_extension(extension)
        }
    }

    /// Extract the audio track of `video_path`.
    ///
    /// The token is checked before anything is spawned. A running transcoder is
    /// killed on cancellation and its partial output removed.
    pub async fn extract(&self, video_path: &Path, token: &CancellationToken) -> Result<AudioArtifact> {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        if !video_path.is_file() {
            return Err(PipelineError::Extraction(format!(
                "video file not found: {}",
                video_path.display()
            )));
        }

        let artifact = AudioArtifact::new(self.audio_path_for(video_path));
        tracing::debug!("Converting {} to {}", video_path.display(), artifact.path().display());

        let sample_rate = self.sample_rate.to_string();
        let mut command = self.tool.command();
        command
            .arg("-i")
            .arg(video_path)
            .args([
                "-vn",
                "-acodec",
                self.codec.as_str(),
                "-ab",
                self.bitrate.as_str(),
                "-ar",
                sample_rate.as_str(),
                "-y",
            ])
            .arg(artifact.path());

        let (_, output) = run_captured(command, &self.tool.program, token)
            .await
            .map_err(|e| e.into_pipeline(PipelineError::Extraction))?;

        if !output.success() {
            return Err(PipelineError::Extraction(format!(
                "{} failed for {}: {}",
                self.tool.program,
                video_path.display(),
                last_lines(&output.failure_reason(), 5)
            )));
        }

        if !artifact.path().is_file() {
            return Err(PipelineError::Extraction(format!(
                "{} exited successfully but {} was not created",
                self.tool.program,
                artifact.path().display()
            )));
        }

        tracing::info!("Extracted audio to {}", artifact.path().display());
        Ok(artifact)
    }
}

/// ffmpeg prints its banner first; the cause is at the end
fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
