use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

pub mod display;

pub use display::ProgressSink;

use crate::analysis::{ShortsBrief, ShortsKind};
use crate::fetcher::DurationClass;
use crate::filter::FilterCriteria;
use crate::pipeline::RunOutcome;

#[derive(Parser)]
#[command(
    name = "reelscribe",
    about = "Reelscribe - download creator videos, transcribe them and suggest content ideas",
    version,
    long_about = "Downloads single videos, whole profiles or filtered channel listings with a yt-dlp compatible fetcher, extracts audio with ffmpeg, transcribes it and writes transcripts plus keyword and content-idea analysis into a per-uploader directory tree."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Override the download directory from the configuration
    #[arg(long, global = true, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE", env = "REELSCRIBE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download, transcribe and analyze a single video
    Video {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Transcribe and analyze a video file already on disk
    Local {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Download every new video of a profile and process each one
    Profile {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Filter a channel listing and process only the matching videos
    Channel {
        #[arg(value_name = "URL")]
        url: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show which videos of a channel match, without downloading anything
    Filter {
        #[arg(value_name = "URL")]
        url: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List previously saved analyses
    History,

    /// Show a saved analysis with its transcript
    Show {
        #[command(flatten)]
        stored: StoredArgs,

        /// Also print the full transcript
        #[arg(long)]
        transcript: bool,
    },

    /// Write a blog post draft from a saved analysis
    Draft {
        #[command(flatten)]
        stored: StoredArgs,
    },

    /// Write short-form video material from a saved analysis
    Shorts {
        #[command(flatten)]
        stored: StoredArgs,

        #[command(flatten)]
        brief: ShortsArgs,
    },

    /// Export every section of a saved analysis to a text file
    Export {
        #[command(flatten)]
        stored: StoredArgs,

        /// Directory the export is written to
        #[arg(long, value_name = "DIR", default_value = "GPT_data")]
        out: PathBuf,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct FilterArgs {
    /// Minimum view count
    #[arg(long, value_name = "N")]
    pub min_views: Option<u64>,

    /// Duration class: short (60s or less) or long
    #[arg(long, value_name = "KIND")]
    pub kind: Option<DurationClass>,

    /// Comma separated keywords that must all appear in title or description
    #[arg(long, value_name = "LIST")]
    pub keywords: Option<String>,
}

/// Selects one saved analysis
#[derive(Args, Clone, Debug)]
pub struct StoredArgs {
    /// Video id as listed by `history`
    #[arg(value_name = "ID")]
    pub id: String,

    /// Uploader directory, when the id exists under several uploaders
    #[arg(long, value_name = "NAME")]
    pub uploader: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ShortsArgs {
    /// script, hook, hashtags, timeline or ab-test
    #[arg(long, value_name = "KIND", default_value = "script")]
    pub kind: ShortsKind,

    #[arg(long, default_value = "TikTok")]
    pub platform: String,

    #[arg(long, value_name = "TYPE", default_value = "information")]
    pub content_type: String,

    /// Target length, e.g. 30s or 1m
    #[arg(long, value_name = "LENGTH", default_value = "30s")]
    pub length: String,
}

impl ShortsArgs {
    pub fn brief(&self) -> ShortsBrief {
        ShortsBrief {
            platform: self.platform.clone(),
            content_type: self.content_type.clone(),
            video_length: self.length.clone(),
        }
    }
}

/// Print what a run produced; a failed run exits non-zero, a cancelled one does not
pub fn report_outcome<T>(outcome: RunOutcome<T>, print: fn(&T)) -> ExitCode {
    match outcome {
        RunOutcome::Completed(value) => {
            print(&value);
            ExitCode::SUCCESS
        }
        RunOutcome::Cancelled { partial } => {
            if let Some(value) = partial {
                print(&value);
            }
            eprintln!("Cancelled.");
            ExitCode::SUCCESS
        }
        RunOutcome::Failed(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

impl FilterArgs {
    pub fn criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::new();
        if let Some(min_views) = self.min_views {
            criteria = criteria.with_min_views(min_views);
        }
        if let Some(kind) = self.kind {
            criteria = criteria.with_duration_class(kind);
        }
        if let Some(keywords) = &self.keywords {
            criteria = criteria.with_keywords(keywords);
        }
        criteria
    }
}
