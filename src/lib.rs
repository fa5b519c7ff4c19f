//! Reelscribe - download creator videos, transcribe them and build content analysis
//!
//! This library drives an external fetcher (yt-dlp compatible), an external transcoder
//! (ffmpeg compatible), a transcription engine and an optional generative text service,
//! and persists transcripts and analysis into a per-uploader directory tree.

pub mod analysis;
pub mod audio;
pub mod cli;
pub mod config;
pub mod fetcher;
pub mod filter;
pub mod output;
pub mod pipeline;
pub mod transcribe;
pub mod utils;

pub use analysis::{AnalysisResult, ContentAnalyzer};
pub use audio::{AudioArtifact, AudioExtractor};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use fetcher::{DownloadArtifact, DurationClass, FetchTool, ListingEntry, VideoMetadata};
pub use filter::FilterCriteria;
pub use output::{AnalysisIndexEntry, ArtifactStore};
pub use pipeline::{PipelineCoordinator, PipelineState, RunOutcome};
pub use transcribe::{Segment, TranscriptResult, TranscriptionEngine};

/// Result type used throughout the library
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Error taxonomy of the acquisition and analysis pipeline
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Metadata resolution failed: {0}")]
    Metadata(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Persisting artifacts failed: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A user-requested stop. Never reported as a failure.
    #[error("Operation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Short stage-style label, used in batch failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Metadata(_) => "metadata",
            PipelineError::Download(_) => "download",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::Transcription(_) => "transcription",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::Config(_) => "config",
            PipelineError::Cancelled => "cancelled",
        }
    }
}
