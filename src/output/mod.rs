use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod export;
pub mod markdown;

use crate::analysis::writer::{ShortsKind, WritingSource};
use crate::analysis::AnalysisResult;
use crate::fetcher::VideoMetadata;
use crate::transcribe::{Segment, TranscriptResult};
use crate::utils::path_component;
use crate::{PipelineError, Result};

const SCRIPTS_DIR: &str = "video_scripts";
const ANALYSIS_DIR: &str = "video_analysis";
const SHORTS_DIR: &str = "shorts";
const ANALYSIS_SUFFIX: &str = "_analysis.json";
const UNKNOWN_TITLE: &str = "Unknown Title";

/// Transcript document as written to `{id}_transcript.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTranscript {
    pub video_title: String,

    pub transcript_text: String,

    #[serde(default)]
    pub segments: Vec<Segment>,

    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// One previously completed analysis found in the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisIndexEntry {
    pub video_id: String,
    pub title: String,
    pub uploader: String,
    pub analysis_file_path: PathBuf,
}

/// A saved analysis loaded back together with its transcript and blog draft
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub entry: AnalysisIndexEntry,
    pub analysis: AnalysisResult,
    pub transcript: Option<StoredTranscript>,
    pub blog_draft: Option<String>,
}

impl StoredResult {
    pub fn transcript_text(&self) -> &str {
        self.transcript
            .as_ref()
            .map(|t| t.transcript_text.as_str())
            .unwrap_or_default()
    }

    pub fn writing_source(&self) -> WritingSource<'_> {
        WritingSource {
            title: &self.entry.title,
            transcript: self.transcript_text(),
            analysis: &self.analysis,
        }
    }
}

/// Per-uploader artifact tree rooted at the download directory.
///
/// Uploader names and video ids are passed through [`path_component`] before they
/// become directory or file names.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, uploader: &str, dir: &str, video_id: &str, suffix: &str) -> PathBuf {
        self.root
            .join(path_component(uploader))
            .join(dir)
            .join(format!("{}{}", path_component(video_id), suffix))
    }

    pub fn transcript_path(&self, uploader: &str, video_id: &str) -> PathBuf {
        self.artifact_path(uploader, SCRIPTS_DIR, video_id, "_transcript.json")
    }

    pub fn transcript_document_path(&self, uploader: &str, video_id: &str) -> PathBuf {
        self.artifact_path(uploader, SCRIPTS_DIR, video_id, ".md")
    }

    pub fn analysis_path(&self, uploader: &str, video_id: &str) -> PathBuf {
        self.artifact_path(uploader, ANALYSIS_DIR, video_id, ANALYSIS_SUFFIX)
    }

    pub fn blog_draft_path(&self, uploader: &str, video_id: &str) -> PathBuf {
        self.artifact_path(uploader, SCRIPTS_DIR, video_id, "_blog_draft.md")
    }

    pub fn shorts_path(&self, uploader: &str, video_id: &str, kind: ShortsKind) -> PathBuf {
        self.artifact_path(uploader, SHORTS_DIR, video_id, &format!("_{}.md", kind.file_suffix()))
    }

    /// Write the transcript JSON and its markdown companion, returning the JSON path
    pub fn save_transcript(&self, metadata: &VideoMetadata, transcript: &TranscriptResult) -> Result<PathBuf> {
        let path = self.transcript_path(&metadata.uploader, &metadata.id);
        let stored = StoredTranscript {
            video_title: metadata.title.clone(),
            transcript_text: transcript.text.clone(),
            segments: transcript.segments.clone(),
            saved_at: Some(Utc::now()),
        };
        write_json(&path, &stored)?;
        tracing::info!("Transcript saved to {}", path.display());

        let markdown_path = self.transcript_document_path(&metadata.uploader, &metadata.id);
        let document = markdown::render_transcript_document(&metadata.title, &transcript.text);
        fs_err::write(&markdown_path, document).map_err(persistence)?;
        tracing::debug!("Markdown transcript saved to {}", markdown_path.display());

        Ok(path)
    }

    /// Write `{id}_analysis.json`, replacing any earlier result for the same id
    pub fn save_analysis(&self, metadata: &VideoMetadata, analysis: &AnalysisResult) -> Result<PathBuf> {
        let path = self.analysis_path(&metadata.uploader, &metadata.id);
        write_json(&path, analysis)?;
        tracing::info!("Analysis saved to {}", path.display());
        Ok(path)
    }

    pub fn load_analysis(&self, path: &Path) -> Result<AnalysisResult> {
        read_json(path)
    }

    pub fn load_transcript(&self, path: &Path) -> Result<StoredTranscript> {
        read_json(path)
    }

    /// Write the blog draft for a stored video, replacing an earlier draft
    pub fn save_blog_draft(&self, entry: &AnalysisIndexEntry, draft: &str) -> Result<PathBuf> {
        let path = self.blog_draft_path(&entry.uploader, &entry.video_id);
        write_text(&path, draft)?;
        tracing::info!("Blog draft saved to {}", path.display());
        Ok(path)
    }

    pub fn save_shorts(&self, entry: &AnalysisIndexEntry, kind: ShortsKind, text: &str) -> Result<PathBuf> {
        let path = self.shorts_path(&entry.uploader, &entry.video_id, kind);
        write_text(&path, text)?;
        tracing::info!("Shorts {} saved to {}", kind, path.display());
        Ok(path)
    }

    /// Load a saved analysis by video id, optionally restricted to one uploader.
    ///
    /// When several uploaders share the id, the first in index order wins.
    pub fn find_result(&self, video_id: &str, uploader: Option<&str>) -> Result<Option<StoredResult>> {
        let entry = self
            .list_analyses()?
            .into_iter()
            .find(|e| e.video_id == video_id && uploader.map_or(true, |u| e.uploader == u));
        let Some(entry) = entry else {
            return Ok(None);
        };

        let analysis = self.load_analysis(&entry.analysis_file_path)?;
        let transcript = self
            .load_transcript(&self.transcript_path(&entry.uploader, &entry.video_id))
            .ok();
        let draft_path = self.blog_draft_path(&entry.uploader, &entry.video_id);
        let blog_draft = if draft_path.is_file() {
            Some(fs_err::read_to_string(&draft_path).map_err(persistence)?)
        } else {
            None
        };

        Ok(Some(StoredResult {
            entry,
            analysis,
            transcript,
            blog_draft,
        }))
    }

    /// Every `{id}_analysis.json` under the root, sorted by uploader then id.
    ///
    /// Titles come from the sibling transcript file when it can be read.
    pub fn list_analyses(&self) -> Result<Vec<AnalysisIndexEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for uploader_dir in fs_err::read_dir(&self.root).map_err(persistence)? {
            let uploader_dir = match uploader_dir {
                Ok(dir) => dir.path(),
                Err(e) => {
                    tracing::warn!("Skipping unreadable store entry: {}", e);
                    continue;
                }
            };
            let analysis_dir = uploader_dir.join(ANALYSIS_DIR);
            if !analysis_dir.is_dir() {
                continue;
            }
            match self.uploader_analyses(&uploader_dir, &analysis_dir) {
                Ok(found) => entries.extend(found),
                Err(e) => tracing::warn!("Skipping {}: {}", analysis_dir.display(), e),
            }
        }

        entries.sort_by(|a, b| a.uploader.cmp(&b.uploader).then_with(|| a.video_id.cmp(&b.video_id)));
        Ok(entries)
    }

    fn uploader_analyses(&self, uploader_dir: &Path, analysis_dir: &Path) -> std::io::Result<Vec<AnalysisIndexEntry>> {
        let uploader = uploader_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut entries = Vec::new();
        for file in fs_err::read_dir(analysis_dir)? {
            let path = file?.path();
            let Some(video_id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(ANALYSIS_SUFFIX))
                .map(str::to_string)
            else {
                continue;
            };

            if let Err(e) = self.load_analysis(&path) {
                tracing::warn!("Skipping unreadable analysis {}: {}", path.display(), e);
                continue;
            }

            let title = self
                .load_transcript(&self.transcript_path(&uploader, &video_id))
                .map(|t| t.video_title)
                .unwrap_or_else(|_| UNKNOWN_TITLE.to_string());

            entries.push(AnalysisIndexEntry {
                video_id,
                title,
                uploader: uploader.clone(),
                analysis_file_path: path,
            });
        }
        Ok(entries)
    }
}

fn persistence(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Persistence(e.to_string())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent).map_err(persistence)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(persistence)?;
    fs_err::write(path, json).map_err(persistence)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent).map_err(persistence)?;
    }
    fs_err::write(path, text).map_err(persistence)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs_err::read_to_string(path).map_err(persistence)?;
    serde_json::from_str(&content)
        .map_err(|e| PipelineError::Persistence(format!("{}: {}", path.display(), e)))
}
