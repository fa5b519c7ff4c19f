use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

pub mod download;

pub use download::{DownloadArtifact, Downloader};

use crate::config::ExternalTool;
use crate::utils::process::{run_captured, ProcessError};
use crate::utils::uploader_dir_name;
use crate::{PipelineError, Result};

/// Metadata of one video as reported by the fetcher. Never mutated after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,

    pub title: String,

    /// Uploader handle with any leading `@` removed
    pub uploader: String,

    pub duration_seconds: Option<f64>,

    pub source_url: String,
}

impl VideoMetadata {
    /// Build metadata from one fetcher JSON object.
    ///
    /// Missing fields fall back the way the fetcher's own output does: title to id,
    /// uploader to channel and then to `unknown_uploader`, url to `requested_url`.
    pub fn from_json(info: &Value, requested_url: &str, unknown_uploader: &str) -> Self {
        let id = info["id"].as_str().unwrap_or("Unknown_ID").to_string();
        let title = info["title"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| id.clone());
        let uploader = info["uploader"]
            .as_str()
            .or_else(|| info["channel"].as_str())
            .map(uploader_dir_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| unknown_uploader.to_string());
        let source_url = info["webpage_url"]
            .as_str()
            .unwrap_or(requested_url)
            .to_string();

        Self {
            id,
            title,
            uploader,
            duration_seconds: info["duration"].as_f64(),
            source_url,
        }
    }
}

/// Short-form / long-form category, which also names the storage subdirectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    ShortForm,
    LongForm,
}

impl DurationClass {
    /// Classify with the default policy: more than 60 seconds is long-form
    pub fn from_seconds(duration_seconds: Option<f64>) -> Self {
        ClassificationPolicy::default().classify(duration_seconds)
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            DurationClass::ShortForm => "short_form",
            DurationClass::LongForm => "long_form",
        }
    }
}

impl fmt::Display for DurationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for DurationClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "short" | "short_form" | "shortform" | "shorts" => Ok(DurationClass::ShortForm),
            "long" | "long_form" | "longform" => Ok(DurationClass::LongForm),
            other => Err(format!("unknown duration class '{}', expected short or long", other)),
        }
    }
}

/// Threshold and unknown-duration policy used for every classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationPolicy {
    pub threshold_secs: f64,
    pub unknown: DurationClass,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            threshold_secs: 60.0,
            unknown: DurationClass::ShortForm,
        }
    }
}

impl ClassificationPolicy {
    pub fn classify(&self, duration_seconds: Option<f64>) -> DurationClass {
        match duration_seconds {
            Some(d) if d > self.threshold_secs => DurationClass::LongForm,
            Some(_) => DurationClass::ShortForm,
            None => self.unknown,
        }
    }
}

/// One loosely structured entry of a channel or playlist listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingEntry(pub Value);

impl ListingEntry {
    pub fn id(&self) -> Option<&str> {
        self.0["id"].as_str()
    }

    pub fn title(&self) -> &str {
        self.0["title"].as_str().unwrap_or("")
    }

    pub fn description(&self) -> &str {
        self.0["description"].as_str().unwrap_or("")
    }

    /// View count, treating a missing or malformed value as zero
    pub fn view_count(&self) -> u64 {
        let views = &self.0["view_count"];
        views
            .as_u64()
            .or_else(|| views.as_f64().map(|v| v.max(0.0) as u64))
            .unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.0["duration"].as_f64()
    }

    /// Page URL of the entry, preferring `webpage_url` over `url`
    pub fn url(&self) -> Option<&str> {
        self.0["webpage_url"]
            .as_str()
            .or_else(|| self.0["url"].as_str())
            .filter(|url| !url.is_empty())
    }

    /// Human readable label for logs: title, else id
    pub fn label(&self) -> String {
        match (self.title(), self.id()) {
            ("", Some(id)) => id.to_string(),
            ("", None) => "Unknown".to_string(),
            (title, _) => title.to_string(),
        }
    }
}

/// Metadata queries against the external fetcher
#[derive(Debug, Clone)]
pub struct FetchTool {
    tool: ExternalTool,
    unknown_uploader: String,
}

impl FetchTool {
    pub fn new(tool: ExternalTool, unknown_uploader: impl Into<String>) -> Self {
        Self {
            tool,
            unknown_uploader: unknown_uploader.into(),
        }
    }

    pub fn tool(&self) -> &ExternalTool {
        &self.tool
    }

    /// Resolve metadata of a single video, or of the first entry of a playlist.
    ///
    /// A playlist without entries is `Ok(None)`, not an error.
    pub async fn resolve_metadata(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Option<VideoMetadata>> {
        tracing::debug!("Resolving metadata for: {}", url);

        let stdout = self.dump_json(url, token).await?;

        let first_line = match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
            Some(line) => line,
            None => return Ok(None),
        };

        let info: Value = serde_json::from_str(first_line)
            .map_err(|e| PipelineError::Metadata(format!("invalid metadata JSON: {}", e)))?;

        let info = match info.get("entries") {
            Some(Value::Array(entries)) => match entries.first() {
                Some(first) => first.clone(),
                None => return Ok(None),
            },
            _ => info,
        };

        Ok(Some(VideoMetadata::from_json(&info, url, &self.unknown_uploader)))
    }

    /// List every entry of a channel or playlist without downloading anything
    pub async fn list_entries(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Vec<ListingEntry>> {
        tracing::debug!("Listing entries for: {}", url);

        let stdout = self.dump_json(url, token).await?;

        let mut entries = Vec::new();
        for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(object)) => match object.get("entries") {
                    Some(Value::Array(nested)) => {
                        entries.extend(nested.iter().cloned().map(ListingEntry))
                    }
                    _ => entries.push(ListingEntry(Value::Object(object))),
                },
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Skipping unparseable listing line: {}", e);
                    continue;
                }
            }
        }

        tracing::info!("Listed {} entries from {}", entries.len(), url);
        Ok(entries)
    }

    async fn dump_json(&self, url: &str, token: &CancellationToken) -> Result<String> {
        let mut command = self.tool.command();
        command.args(["--dump-json", "--flat-playlist", "--skip-download", url]);

        let (stdout, output) = run_captured(command, &self.tool.program, token)
            .await
            .map_err(|e: ProcessError| e.into_pipeline(PipelineError::Metadata))?;

        if !output.success() {
            return Err(PipelineError::Metadata(format!(
                "{} failed: {}",
                self.tool.program,
                output.failure_reason()
            )));
        }

        Ok(stdout)
    }
}
