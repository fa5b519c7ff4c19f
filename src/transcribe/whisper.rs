use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{Segment, TranscriptResult, TranscriptionEngine};
use crate::config::WhisperConfig;
use crate::utils::process::run_captured;
use crate::{PipelineError, Result};

/// JSON document written by the whisper CLI with `--output_format json`
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

/// Local transcription through the whisper command line tool
pub struct WhisperCliEngine {
    config: WhisperConfig,
}

impl WhisperCliEngine {
    pub fn new(config: WhisperConfig) -> Self {
        Self { config }
    }

    fn parse_output(json: &str) -> Result<TranscriptResult> {
        let output: WhisperOutput = serde_json::from_str(json)
            .map_err(|e| PipelineError::Transcription(format!("invalid whisper output: {}", e)))?;

        let segments = output
            .segments
            .into_iter()
            .map(|s| Segment {
                start: s.start,
                end: s.end,
                text: s.text,
            })
            .collect();

        Ok(TranscriptResult::from_raw(output.text, segments))
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperCliEngine {
    async fn transcribe(&self, audio: &Path, token: &CancellationToken) -> Result<TranscriptResult> {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let output_dir = TempDir::new().map_err(|e| {
            PipelineError::Transcription(format!("failed to create temporary directory: {}", e))
        })?;

        tracing::info!("Transcribing {} with whisper ({})", audio.display(), self.config.model);

        let mut command = self.config.program.command();
        command
            .arg(audio)
            .args(["--model", self.config.model.as_str(), "--output_format", "json", "--output_dir"])
            .arg(output_dir.path());
        if let Some(language) = &self.config.language {
            command.args(["--language", language.as_str()]);
        }

        let (_, output) = run_captured(command, &self.config.program.program, token)
            .await
            .map_err(|e| e.into_pipeline(PipelineError::Transcription))?;

        if !output.success() {
            return Err(PipelineError::Transcription(format!(
                "{} failed: {}",
                self.config.program.program,
                output.failure_reason()
            )));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let json_path = output_dir.path().join(format!("{}.json", stem));
        let json = fs_err::read_to_string(&json_path).map_err(|e| {
            PipelineError::Transcription(format!("whisper produced no transcript: {}", e))
        })?;

        let result = Self::parse_output(&json)?;
        tracing::debug!(
            "Whisper returned {} characters in {} segments",
            result.text.chars().count(),
            result.segments.len()
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}
