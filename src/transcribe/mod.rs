use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod aws;
pub mod whisper;

pub use aws::AwsTranscribeEngine;
pub use whisper::WhisperCliEngine;

use crate::config::{Config, EngineKind};
use crate::Result;

/// Time-coded span of transcript text, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Full transcript plus ordered segments
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,

    /// Ordered by non-decreasing `start`, each with `end >= start`
    pub segments: Vec<Segment>,
}

impl TranscriptResult {
    /// Normalize engine output: segments sorted by start, inverted spans clamped,
    /// text trimmed. An empty `text` is rebuilt from the segments.
    pub fn from_raw(text: impl Into<String>, segments: Vec<Segment>) -> Self {
        let mut segments: Vec<Segment> = segments
            .into_iter()
            .filter(|s| s.start.is_finite() && s.end.is_finite())
            .map(|s| Segment {
                start: s.start.max(0.0),
                end: s.end.max(s.start.max(0.0)),
                text: s.text.trim().to_string(),
            })
            .collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut text = text.into().trim().to_string();
        if text.is_empty() && !segments.is_empty() {
            text = segments
                .iter()
                .map(|s| s.text.as_str())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
        }

        Self { text, segments }
    }

    /// Transcript without engine segments
    pub fn text_only(text: impl Into<String>) -> Self {
        Self::from_raw(text, Vec::new())
    }

    pub fn has_segments(&self) -> bool {
        !self.segments.is_empty()
    }
}

/// A speech-to-text engine the pipeline hands audio files to
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe the audio file at `audio`
    async fn transcribe(&self, audio: &Path, token: &CancellationToken) -> Result<TranscriptResult>;

    /// Get the name of this engine
    fn name(&self) -> &'static str;
}

/// Build the engine selected in the configuration
pub async fn engine_from_config(config: &Config) -> Result<Arc<dyn TranscriptionEngine>> {
    let engine: Arc<dyn TranscriptionEngine> = match config.transcription.engine {
        EngineKind::Whisper => Arc::new(WhisperCliEngine::new(config.transcription.whisper.clone())),
        EngineKind::Aws => Arc::new(AwsTranscribeEngine::new(config.transcription.aws.clone()).await?),
    };

    tracing::info!("Using transcription engine: {}", engine.name());
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn segments_are_ordered_and_clamped() {
        let result = TranscriptResult::from_raw(
            " hello world ",
            vec![seg(5.0, 7.0, " world"), seg(0.0, 4.0, "hello "), seg(8.0, 6.0, "tail")],
        );

        assert_eq!(result.text, "hello world");
        let starts: Vec<f64> = result.segments.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0.0, 5.0, 8.0]);
        assert!(result.segments.iter().all(|s| s.end >= s.start));
        assert_eq!(result.segments[0].text, "hello");
        assert_eq!(result.segments[2].end, 8.0);
    }

    #[test]
    fn empty_text_is_rebuilt_from_segments() {
        let result = TranscriptResult::from_raw("", vec![seg(0.0, 1.0, "one"), seg(1.0, 2.0, "two")]);
        assert_eq!(result.text, "one two");
    }

    #[test]
    fn non_finite_segments_are_dropped() {
        let result = TranscriptResult::from_raw("x", vec![seg(f64::NAN, 1.0, "bad"), seg(0.0, 1.0, "ok")]);
        assert_eq!(result.segments.len(), 1);
        assert!(!TranscriptResult::text_only("x").has_segments());
    }
}
