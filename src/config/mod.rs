use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::MAX_TAGS;
use crate::fetcher::{ClassificationPolicy, DurationClass};

const CONFIG_FILE_NAME: &str = "reelscribe.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Artifact store layout and classification policy
    pub storage: StorageConfig,

    /// External fetcher and transcoder invocations
    pub tools: ToolsConfig,

    /// Speech-to-text engine selection
    pub transcription: TranscriptionConfig,

    /// Generative content service used for idea generation
    pub generation: GenerationConfig,

    /// Keyword extraction settings
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the artifact store
    pub download_dir: PathBuf,

    /// Directory name used when the fetcher reports no uploader
    pub unknown_uploader: String,

    /// Classification applied when the duration is unknown
    pub unknown_duration: DurationClass,

    /// Videos strictly longer than this are long-form
    pub long_form_threshold_secs: f64,

    /// Uploader directory used for local video files
    pub local_uploader: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            unknown_uploader: "Unknown_Account".to_string(),
            unknown_duration: DurationClass::ShortForm,
            long_form_threshold_secs: 60.0,
            local_uploader: "LocalVideo".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn classification(&self) -> ClassificationPolicy {
        ClassificationPolicy {
            threshold_secs: self.long_form_threshold_secs,
            unknown: self.unknown_duration,
        }
    }
}

/// A program plus leading arguments, e.g. `python3 -m yt_dlp`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTool {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a command with the leading arguments already applied
    pub fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }

    pub fn display_name(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub fetcher: ExternalTool,

    pub transcoder: ExternalTool,

    /// Format selector passed to the fetcher with `-f`
    pub format_selector: String,

    pub audio_codec: String,

    pub audio_bitrate: String,

    pub audio_sample_rate: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetcher: ExternalTool::new("yt-dlp"),
            transcoder: ExternalTool::new("ffmpeg"),
            format_selector: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
            audio_codec: "mp3".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_sample_rate: 44100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Whisper,
    Aws,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub engine: EngineKind,

    pub whisper: WhisperConfig,

    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub program: ExternalTool,

    /// Model name passed with `--model`
    pub model: String,

    /// Language hint (auto-detect if not specified)
    pub language: Option<String>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            program: ExternalTool::new("whisper"),
            model: "base".to_string(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,

    /// S3 bucket for temporary audio storage
    pub s3_bucket: String,

    /// Optional S3 key prefix
    pub s3_key_prefix: Option<String>,

    /// Language code (auto-detect if not specified)
    pub language: Option<String>,

    /// Maximum segment length in seconds when grouping word items
    pub max_segment_length: f64,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            s3_bucket: String::new(),
            s3_key_prefix: Some("reelscribe/".to_string()),
            language: None,
            max_segment_length: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub enabled: bool,

    /// Falls back to `GOOGLE_API_KEY` when empty
    pub api_key: Option<String>,

    pub model: String,

    pub endpoint: String,

    pub temperature: f32,

    pub max_output_tokens: u32,

    pub top_p: f32,

    pub top_k: u32,

    /// Number of transcript characters included in the prompt
    pub prompt_transcript_chars: usize,

    /// Transcript characters included when writing blog drafts and shorts material
    pub draft_transcript_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.9,
            max_output_tokens: 1000,
            top_p: 1.0,
            top_k: 1,
            prompt_transcript_chars: 2000,
            draft_transcript_chars: 4000,
        }
    }
}

impl GenerationConfig {
    /// API key from the config file, or the environment when the file leaves it empty
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub stopwords: Vec<String>,

    pub max_tags: usize,

    /// Topic used by template ideas when no tag could be extracted
    pub fallback_topic: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stopwords: default_stopwords(),
            max_tags: 5,
            fallback_topic: "main topic".to_string(),
        }
    }
}

fn default_stopwords() -> Vec<String> {
    [
        "이", "그", "저", "것", "수", "등", "들", "와", "과", "을", "를", "은", "는", "도", "만",
        "하다", "에", "에서", "으로", "로", "에게", "께", "한테", "부터", "까지", "보다", "처럼",
        "만큼", "같이", "이것", "그것", "저것", "여기", "거기", "저기", "저쪽", "곳", "때", "면",
        "좀", "정말", "진짜", "아", "네", "예", "아니오", "응", "그래", "뭐", "어디", "누구",
        "언제", "왜", "어떻게", "하나", "두", "세", "있다", "없다", "않다", "되다", "이다",
        "아니다", "좋다", "크다", "많다", "같다", "말하다", "가다", "오다", "주다", "받다",
        "쓰다", "읽다", "듣다", "먹다", "자다", "일어나다", "앉다", "서다", "알다", "모르다",
    ]
    .iter()
    .map(|word| word.to_string())
    .collect()
}

impl Config {
    /// Load configuration from the default location or create it
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path).await
    }

    /// Load configuration from `path`, writing defaults there if it does not exist
    pub async fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs_err::read_to_string(path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path).await?;
            Ok(config)
        }
    }

    /// Save configuration to `path`
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // A config in the working directory wins
        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("reelscribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tools.fetcher.program.trim().is_empty() {
            anyhow::bail!("tools.fetcher.program must not be empty");
        }
        if self.tools.transcoder.program.trim().is_empty() {
            anyhow::bail!("tools.transcoder.program must not be empty");
        }
        let threshold = self.storage.long_form_threshold_secs;
        if threshold.is_nan() || threshold <= 0.0 {
            anyhow::bail!("storage.long_form_threshold_secs must be positive");
        }
        if self.analysis.max_tags == 0 || self.analysis.max_tags > MAX_TAGS {
            anyhow::bail!("analysis.max_tags must be between 1 and {}", MAX_TAGS);
        }
        if self.transcription.engine == EngineKind::Aws && self.transcription.aws.s3_bucket.is_empty() {
            anyhow::bail!("AWS S3 bucket must be configured when the aws engine is selected");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Download dir: {}", self.storage.download_dir.display());
        println!("  Unknown uploader: {}", self.storage.unknown_uploader);
        println!(
            "  Long-form threshold: {}s (unknown duration -> {})",
            self.storage.long_form_threshold_secs,
            self.storage.unknown_duration
        );
        println!("  Fetcher: {}", self.tools.fetcher.display_name());
        println!("  Transcoder: {}", self.tools.transcoder.display_name());
        match self.transcription.engine {
            EngineKind::Whisper => println!(
                "  Transcription: whisper ({}, model {})",
                self.transcription.whisper.program.display_name(),
                self.transcription.whisper.model
            ),
            EngineKind::Aws => println!(
                "  Transcription: aws ({} / s3://{})",
                self.transcription.aws.region, self.transcription.aws.s3_bucket
            ),
        }
        let generation = if !self.generation.enabled {
            "disabled"
        } else if self.generation.resolved_api_key().is_some() {
            "enabled"
        } else {
            "no API key, using template ideas"
        };
        println!("  Idea generation: {} ({})", generation, self.generation.model);
    }
}
