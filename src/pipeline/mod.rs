use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod events;

pub use events::{ChannelSink, EventSink, NullSink, PipelineEvent, RunSummary};

use crate::analysis::{AnalysisResult, ContentAnalyzer, GeminiClient};
use crate::audio::AudioExtractor;
use crate::config::Config;
use crate::fetcher::{DownloadArtifact, DurationClass, Downloader, ListingEntry, VideoMetadata};
use crate::filter::FilterCriteria;
use crate::output::{AnalysisIndexEntry, ArtifactStore};
use crate::transcribe::{self, TranscriptResult, TranscriptionEngine};
use crate::{PipelineError, Result};

/// Stage the coordinator is in. `Completed`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Resolving,
    Filtering,
    Downloading,
    Extracting,
    Transcribing,
    Analyzing,
    Persisting,
    Completed,
    Cancelled,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Cancelled | PipelineState::Failed
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Resolving => "resolving",
            PipelineState::Filtering => "filtering",
            PipelineState::Downloading => "downloading",
            PipelineState::Extracting => "extracting",
            PipelineState::Transcribing => "transcribing",
            PipelineState::Analyzing => "analyzing",
            PipelineState::Persisting => "persisting",
            PipelineState::Completed => "completed",
            PipelineState::Cancelled => "cancelled",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of a run. Cancellation is a clean stop, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T> {
    Completed(T),
    Cancelled { partial: Option<T> },
    Failed(PipelineError),
}

impl<T> RunOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled { .. })
    }

    pub fn state(&self) -> PipelineState {
        match self {
            RunOutcome::Completed(_) => PipelineState::Completed,
            RunOutcome::Cancelled { .. } => PipelineState::Cancelled,
            RunOutcome::Failed(_) => PipelineState::Failed,
        }
    }

    /// The completed value, or whatever was finished before cancellation
    pub fn into_value(self) -> Option<T> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            RunOutcome::Cancelled { partial } => partial,
            RunOutcome::Failed(_) => None,
        }
    }
}

/// A cancelled step carries no partial value; any other error fails the run
impl<T> From<Result<T>> for RunOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => RunOutcome::Completed(value),
            Err(e) if e.is_cancelled() => RunOutcome::Cancelled { partial: None },
            Err(e) => RunOutcome::Failed(e),
        }
    }
}

/// Everything produced for one video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoReport {
    pub metadata: VideoMetadata,
    pub video_path: PathBuf,
    pub duration_class: DurationClass,
    pub transcript_path: PathBuf,
    pub analysis_path: PathBuf,
    pub analysis: AnalysisResult,
}

/// A batch item that was skipped after an error
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub label: String,
    pub error: PipelineError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: Vec<VideoReport>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Distinct tags across all succeeded videos, in first-seen order
    pub fn merged_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.succeeded.iter().flat_map(|r| r.analysis.tags.iter()) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }

    fn summary(&self, state: PipelineState) -> RunSummary {
        RunSummary {
            state,
            total: self.total,
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
        }
    }
}

/// One unit of batch work
enum BatchItem {
    /// Listing entry still to be resolved and downloaded
    Remote { label: String, url: String },
    /// File already on disk
    Local(DownloadArtifact),
}

impl BatchItem {
    fn label(&self) -> &str {
        match self {
            BatchItem::Remote { label, .. } => label,
            BatchItem::Local(artifact) => &artifact.metadata.title,
        }
    }
}

/// Sequences resolve, download, extract, transcribe, analyze and persist for
/// single videos and for batches, under one cancellation token.
pub struct PipelineCoordinator {
    downloader: Downloader,
    extractor: AudioExtractor,
    engine: Arc<dyn TranscriptionEngine>,
    analyzer: ContentAnalyzer,
    store: ArtifactStore,
    sink: Arc<dyn EventSink>,
    token: CancellationToken,
    state: watch::Sender<PipelineState>,
    local_uploader: String,
}

impl PipelineCoordinator {
    pub fn new(
        downloader: Downloader,
        extractor: AudioExtractor,
        engine: Arc<dyn TranscriptionEngine>,
        analyzer: ContentAnalyzer,
        store: ArtifactStore,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            downloader,
            extractor,
            engine,
            analyzer,
            store,
            sink: Arc::new(NullSink),
            token: CancellationToken::new(),
            state,
            local_uploader: "LocalVideo".to_string(),
        }
    }

    /// Wire every stage from configuration around an already built engine
    pub fn from_config(config: &Config, engine: Arc<dyn TranscriptionEngine>) -> Self {
        let analyzer = ContentAnalyzer::new(
            config.analysis.clone(),
            GeminiClient::from_config(&config.generation),
        )
        .with_prompt_chars(config.generation.prompt_transcript_chars);

        let mut coordinator = Self::new(
            Downloader::from_config(config),
            AudioExtractor::from_config(config),
            engine,
            analyzer,
            ArtifactStore::new(config.storage.download_dir.clone()),
        );
        coordinator.local_uploader = config.storage.local_uploader.clone();
        coordinator
    }

    /// Build the configured transcription engine, then the coordinator
    pub async fn build(config: &Config) -> Result<Self> {
        let engine = transcribe::engine_from_config(config).await?;
        Ok(Self::from_config(config, engine))
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share an externally owned token, e.g. one cancelled by a signal handler
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request a stop. Running tools are killed and no new stage starts.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Download, transcribe, analyze and persist one video
    pub async fn run_video(&self, url: &str) -> RunOutcome<VideoReport> {
        let result = self.video_stages(url).await;
        self.finish_single(result)
    }

    /// Process a video file already on disk, skipping resolution and download
    pub async fn run_local(&self, path: &Path) -> RunOutcome<VideoReport> {
        let artifact = self.local_artifact(path, &self.local_uploader);
        let result = self.process_download(artifact).await;
        self.finish_single(result)
    }

    /// Download every new video of a profile, then process each file in turn
    pub async fn run_profile(&self, profile_url: &str) -> RunOutcome<BatchReport> {
        if let Err(e) = self.enter(PipelineState::Downloading) {
            return self.finish_batch_early(e);
        }
        let paths = match self.downloader.download_profile(profile_url, &self.token).await {
            Ok(paths) => paths,
            Err(e) => return self.finish_batch_early(e),
        };

        let items = paths
            .iter()
            .map(|path| {
                let uploader = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.local_uploader.clone());
                BatchItem::Local(self.local_artifact(path, &uploader))
            })
            .collect();

        self.run_batch(items).await
    }

    /// List a channel, drop entries that fail `criteria`, then process the rest.
    ///
    /// Entries that do not match are never downloaded.
    pub async fn run_channel(&self, channel_url: &str, criteria: &FilterCriteria) -> RunOutcome<BatchReport> {
        let matched = match self.filter_channel(channel_url, criteria).await {
            Ok(matched) => matched,
            Err(e) => return self.finish_batch_early(e),
        };

        let items = matched
            .iter()
            .filter_map(|entry| match entry.url() {
                Some(url) => Some(BatchItem::Remote {
                    label: entry.label(),
                    url: url.to_string(),
                }),
                None => {
                    tracing::warn!("Skipping {}: listing entry has no URL", entry.label());
                    None
                }
            })
            .collect();

        self.run_batch(items).await
    }

    /// List a channel and return the entries matching `criteria`, downloading nothing
    pub async fn filter_channel(&self, channel_url: &str, criteria: &FilterCriteria) -> Result<Vec<ListingEntry>> {
        self.enter(PipelineState::Resolving)?;
        let entries = self
            .downloader
            .fetch_tool()
            .list_entries(channel_url, &self.token)
            .await?;
        self.sink.on_log(&format!("Found {} entries in {}", entries.len(), channel_url));

        self.enter(PipelineState::Filtering)?;
        let criteria = criteria.clone().with_policy(self.downloader.policy());
        let matched = criteria.apply(entries);
        self.sink.on_log(&format!("{} entries match the filter", matched.len()));

        Ok(matched)
    }

    pub fn previous_analyses(&self) -> Result<Vec<AnalysisIndexEntry>> {
        self.store.list_analyses()
    }

    /// Run `job` against this coordinator on a new tokio task
    pub fn spawn<F, Fut, T>(self: Arc<Self>, job: F) -> JoinHandle<T>
    where
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(job(self))
    }

    pub fn spawn_video(self: Arc<Self>, url: String) -> JoinHandle<RunOutcome<VideoReport>> {
        self.spawn(|pipeline| async move { pipeline.run_video(&url).await })
    }

    pub fn spawn_profile(self: Arc<Self>, url: String) -> JoinHandle<RunOutcome<BatchReport>> {
        self.spawn(|pipeline| async move { pipeline.run_profile(&url).await })
    }

    pub fn spawn_channel(
        self: Arc<Self>,
        url: String,
        criteria: FilterCriteria,
    ) -> JoinHandle<RunOutcome<BatchReport>> {
        self.spawn(|pipeline| async move { pipeline.run_channel(&url, &criteria).await })
    }

    async fn video_stages(&self, url: &str) -> Result<VideoReport> {
        self.enter(PipelineState::Resolving)?;
        let metadata = self
            .downloader
            .fetch_tool()
            .resolve_metadata(url, &self.token)
            .await?
            .ok_or_else(|| PipelineError::Metadata(format!("no entries found for {}", url)))?;
        self.sink
            .on_status(&format!("Resolved '{}' by {}", metadata.title, metadata.uploader));

        self.enter(PipelineState::Downloading)?;
        let artifact = self.downloader.download_resolved(metadata, &self.token).await?;

        self.process_download(artifact).await
    }

    /// Stages after the video is on disk. The audio file never outlives this call.
    async fn process_download(&self, artifact: DownloadArtifact) -> Result<VideoReport> {
        let DownloadArtifact {
            metadata,
            local_path,
            duration_class,
        } = artifact;

        self.enter(PipelineState::Extracting)?;
        let audio = self.extractor.extract(&local_path, &self.token).await?;

        self.enter(PipelineState::Transcribing)?;
        let transcript = self.transcribe(audio.path()).await;
        audio.discard();
        let transcript = transcript?;

        self.enter(PipelineState::Analyzing)?;
        let analysis = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(PipelineError::Cancelled),
            analysis = self.analyzer.analyze(&metadata, &transcript) => analysis,
        };

        self.enter(PipelineState::Persisting)?;
        let transcript_path = self.store.save_transcript(&metadata, &transcript)?;
        let analysis_path = self.store.save_analysis(&metadata, &analysis)?;

        Ok(VideoReport {
            metadata,
            video_path: local_path,
            duration_class,
            transcript_path,
            analysis_path,
            analysis,
        })
    }

    async fn transcribe(&self, audio: &Path) -> Result<TranscriptResult> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PipelineError::Cancelled),
            result = self.engine.transcribe(audio, &self.token) => result,
        }
    }

    async fn process_item(&self, item: BatchItem) -> Result<VideoReport> {
        match item {
            BatchItem::Remote { url, .. } => self.video_stages(&url).await,
            BatchItem::Local(artifact) => self.process_download(artifact).await,
        }
    }

    /// Items run strictly one after another; an error only skips its own item
    async fn run_batch(&self, items: Vec<BatchItem>) -> RunOutcome<BatchReport> {
        let total = items.len();
        let mut report = BatchReport::new(total);
        tracing::info!("Processing batch of {} item(s)", total);

        for (index, item) in items.into_iter().enumerate() {
            if self.token.is_cancelled() {
                return self.finish_batch_cancelled(report);
            }

            let label = item.label().to_string();
            self.sink.on_progress(index, total);
            self.sink.on_status(&format!("[{}/{}] {}", index + 1, total, label));

            match self.process_item(item).await {
                Ok(video) => {
                    self.sink.on_log(&format!("Finished {}", label));
                    report.succeeded.push(video);
                }
                Err(PipelineError::Cancelled) => return self.finish_batch_cancelled(report),
                Err(error) => {
                    tracing::warn!("Skipping '{}' after {} error: {}", label, error.kind(), error);
                    self.sink.on_log(&format!("Skipped {}: {}", label, error));
                    report.failed.push(BatchFailure { label, error });
                }
            }
        }

        self.sink.on_progress(total, total);
        self.set_state(PipelineState::Completed);
        self.sink.on_complete(&report.summary(PipelineState::Completed));
        tracing::info!(
            "Batch complete: {} succeeded, {} skipped",
            report.succeeded.len(),
            report.failed.len()
        );
        RunOutcome::Completed(report)
    }

    fn local_artifact(&self, path: &Path, uploader: &str) -> DownloadArtifact {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown_ID".to_string());
        let duration_class = self.downloader.policy().classify(None);

        DownloadArtifact {
            metadata: VideoMetadata {
                id: stem.clone(),
                title: stem,
                uploader: uploader.to_string(),
                duration_seconds: None,
                source_url: path.display().to_string(),
            },
            local_path: path.to_path_buf(),
            duration_class,
        }
    }

    /// Move to `state` unless cancellation was requested
    fn enter(&self, state: PipelineState) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.set_state(state);
        Ok(())
    }

    fn set_state(&self, state: PipelineState) {
        tracing::debug!("Pipeline state: {}", state);
        self.state.send_replace(state);
        self.sink.on_state(state);
    }

    fn finish_single(&self, result: Result<VideoReport>) -> RunOutcome<VideoReport> {
        let outcome = match result {
            Ok(report) => {
                tracing::info!("Completed {} ({})", report.metadata.title, report.metadata.id);
                RunOutcome::Completed(report)
            }
            Err(PipelineError::Cancelled) => {
                tracing::info!("Run cancelled");
                RunOutcome::Cancelled { partial: None }
            }
            Err(e) => {
                tracing::error!("Run failed: {}", e);
                self.sink.on_log(&e.to_string());
                RunOutcome::Failed(e)
            }
        };

        let state = outcome.state();
        self.set_state(state);
        self.sink.on_complete(&RunSummary {
            state,
            total: 1,
            succeeded: usize::from(outcome.is_completed()),
            failed: usize::from(state == PipelineState::Failed),
        });
        outcome
    }

    fn finish_batch_cancelled(&self, report: BatchReport) -> RunOutcome<BatchReport> {
        tracing::info!(
            "Batch cancelled after {} of {} item(s)",
            report.succeeded.len() + report.failed.len(),
            report.total
        );
        self.set_state(PipelineState::Cancelled);
        self.sink.on_complete(&report.summary(PipelineState::Cancelled));
        RunOutcome::Cancelled { partial: Some(report) }
    }

    /// Listing or profile download failed before any item ran
    fn finish_batch_early(&self, error: PipelineError) -> RunOutcome<BatchReport> {
        if error.is_cancelled() {
            self.set_state(PipelineState::Cancelled);
            self.sink.on_complete(&BatchReport::default().summary(PipelineState::Cancelled));
            return RunOutcome::Cancelled { partial: None };
        }

        tracing::error!("Batch failed: {}", error);
        self.sink.on_log(&error.to_string());
        self.set_state(PipelineState::Failed);
        self.sink.on_complete(&BatchReport::default().summary(PipelineState::Failed));
        RunOutcome::Failed(error)
    }
}
