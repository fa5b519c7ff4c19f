use anyhow::Context;
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::types::{
    LanguageCode, Media, MediaFormat, TranscriptionJob, TranscriptionJobStatus,
};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Segment, TranscriptResult, TranscriptionEngine};
use crate::config::AwsConfig;
use crate::{PipelineError, Result};

/// AWS Transcribe transcript format
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptText>,
    items: Vec<TranscriptItem>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptItem {
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(rename = "type")]
    item_type: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    content: String,
}

/// Transcription through AWS Transcribe, staging audio in S3
pub struct AwsTranscribeEngine {
    config: AwsConfig,
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
}

impl AwsTranscribeEngine {
    pub async fn new(config: AwsConfig) -> Result<Self> {
        if config.s3_bucket.is_empty() {
            return Err(PipelineError::Config(
                "AWS S3 bucket must be configured".to_string(),
            ));
        }

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Ok(Self {
            s3_client: S3Client::new(&aws_config),
            transcribe_client: TranscribeClient::new(&aws_config),
            config,
        })
    }

    async fn run(&self, audio: &Path, token: &CancellationToken) -> anyhow::Result<TranscriptResult> {
        let s3_key = self.upload_to_s3(audio).await?;

        // The staged object is removed whatever the job outcome
        let result = self.transcribe_object(&s3_key, audio, token).await;
        if let Err(e) = self.cleanup_s3(&s3_key).await {
            tracing::warn!("{:#}", e);
        }

        result
    }

    async fn transcribe_object(
        &self,
        s3_key: &str,
        audio: &Path,
        token: &CancellationToken,
    ) -> anyhow::Result<TranscriptResult> {
        let job_id = self.start_transcription_job(s3_key, audio).await?;
        let job = self.wait_for_completion(&job_id, token).await?;
        self.process_transcription_result(&job).await
    }

    /// Upload audio file to S3
    async fn upload_to_s3(&self, audio: &Path) -> anyhow::Result<String> {
        let extension = media_extension(audio);
        let key = format!(
            "{}audio_{}_{}.{}",
            self.config.s3_key_prefix.as_deref().unwrap_or(""),
            Uuid::new_v4(),
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            extension
        );

        tracing::info!("Uploading audio to S3: s3://{}/{}", self.config.s3_bucket, key);

        let content = fs_err::read(audio)?;

        self.s3_client
            .put_object()
            .bucket(&self.config.s3_bucket)
            .key(&key)
            .body(content.into())
            .content_type(mime_type(&extension))
            .send()
            .await
            .context("Failed to upload audio to S3")?;

        Ok(key)
    }

    /// Start AWS Transcribe job with auto language detection unless a language is set
    async fn start_transcription_job(&self, s3_key: &str, audio: &Path) -> anyhow::Result<String> {
        let job_name = format!("reelscribe_{}", Uuid::new_v4());
        let media_uri = format!("s3://{}/{}", self.config.s3_bucket, s3_key);

        tracing::info!("Starting transcription job: {}", job_name);

        let media_format = match media_extension(audio).as_str() {
            "m4a" | "mp4" => MediaFormat::Mp4,
            "wav" => MediaFormat::Wav,
            "flac" => MediaFormat::Flac,
            "ogg" => MediaFormat::Ogg,
            "webm" => MediaFormat::Webm,
            _ => MediaFormat::Mp3,
        };

        let media = Media::builder().media_file_uri(media_uri).build();

        let mut job_builder = self
            .transcribe_client
            .start_transcription_job()
            .transcription_job_name(&job_name)
            .media_format(media_format)
            .media(media);

        match self.config.language.as_deref() {
            Some(lang) => {
                tracing::info!("Using specified language: {}", lang);
                job_builder = job_builder.language_code(LanguageCode::from(lang));
            }
            None => {
                tracing::info!("Using automatic language detection");
                job_builder = job_builder.identify_language(true);
            }
        }

        job_builder
            .send()
            .await
            .context("Failed to start transcription job")?;

        Ok(job_name)
    }

    /// Poll the job with backoff until it finishes or the token fires
    async fn wait_for_completion(
        &self,
        job_id: &str,
        token: &CancellationToken,
    ) -> anyhow::Result<TranscriptionJob> {
        let start_time = Instant::now();
        let mut check_count: u64 = 0;

        loop {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled.into());
            }
            check_count += 1;

            let job = self.get_transcription_job(job_id).await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::InProgress) | Some(TranscriptionJobStatus::Queued) => {
                    tracing::debug!(
                        "Transcribing... ({}s elapsed, check #{})",
                        start_time.elapsed().as_secs(),
                        check_count
                    );

                    // Backoff up to 30 seconds between checks
                    let wait_time = std::cmp::min(5 + (check_count - 1) * 2, 30);
                    tokio::select! {
                        _ = token.cancelled() => return Err(PipelineError::Cancelled.into()),
                        _ = tokio::time::sleep(Duration::from_secs(wait_time)) => {}
                    }
                }
                Some(TranscriptionJobStatus::Completed) => {
                    tracing::info!("Transcription job {} completed", job_id);
                    return Ok(job);
                }
                Some(TranscriptionJobStatus::Failed) => {
                    let failure_reason = job.failure_reason().unwrap_or("Unknown error");
                    anyhow::bail!("Transcription job failed: {}", failure_reason);
                }
                _ => anyhow::bail!("Unexpected transcription job status"),
            }
        }
    }

    /// Get transcription job details
    async fn get_transcription_job(&self, job_id: &str) -> anyhow::Result<TranscriptionJob> {
        let response = self
            .transcribe_client
            .get_transcription_job()
            .transcription_job_name(job_id)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        response
            .transcription_job()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Transcription job not found"))
    }

    /// Download and parse the transcript of a completed job
    async fn process_transcription_result(&self, job: &TranscriptionJob) -> anyhow::Result<TranscriptResult> {
        let transcript_uri = job
            .transcript()
            .and_then(|t| t.transcript_file_uri())
            .ok_or_else(|| anyhow::anyhow!("No transcript URI found"))?;

        let response = reqwest::get(transcript_uri)
            .await
            .context("Failed to download transcript")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download transcript: HTTP {}", response.status());
        }

        let transcript_json = response
            .text()
            .await
            .context("Failed to read transcript content")?;

        parse_transcript(&transcript_json, self.config.max_segment_length)
    }

    /// Clean up S3 object
    async fn cleanup_s3(&self, s3_key: &str) -> anyhow::Result<()> {
        tracing::debug!("Cleaning up S3 object: {}", s3_key);

        self.s3_client
            .delete_object()
            .bucket(&self.config.s3_bucket)
            .key(s3_key)
            .send()
            .await
            .context("Failed to clean up S3 object")?;

        Ok(())
    }
}

#[async_trait]
impl TranscriptionEngine for AwsTranscribeEngine {
    async fn transcribe(&self, audio: &Path, token: &CancellationToken) -> Result<TranscriptResult> {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.run(audio, token).await.map_err(|e| match e.downcast_ref::<PipelineError>() {
            Some(PipelineError::Cancelled) => PipelineError::Cancelled,
            _ => PipelineError::Transcription(format!("{:#}", e)),
        })
    }

    fn name(&self) -> &'static str {
        "aws-transcribe"
    }
}

fn media_extension(audio: &Path) -> String {
    audio
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("mp3")
        .to_lowercase()
}

fn mime_type(extension: &str) -> &'static str {
    match extension {
        "m4a" | "mp4" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        _ => "audio/mpeg",
    }
}

/// Parse an AWS transcript document and group its word items into segments
fn parse_transcript(json: &str, max_segment_length: f64) -> anyhow::Result<TranscriptResult> {
    let transcript: AwsTranscript =
        serde_json::from_str(json).context("Failed to parse transcript JSON")?;

    let text = transcript
        .results
        .transcripts
        .first()
        .map(|t| t.transcript.clone())
        .unwrap_or_default();

    let segments = group_segments(&transcript.results.items, max_segment_length);
    Ok(TranscriptResult::from_raw(text, segments))
}

/// Split on pauses over a second, on overlong segments, and on sentence ends
/// once a segment is at least half the maximum length
fn group_segments(items: &[TranscriptItem], max_segment_length: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current_text = String::new();
    let mut current_start: Option<f64> = None;
    let mut current_end: Option<f64> = None;

    let parse_time = |value: &Option<String>| value.as_ref().and_then(|s| s.parse::<f64>().ok());

    for item in items {
        let content = item
            .alternatives
            .first()
            .map(|alt| alt.content.as_str())
            .unwrap_or_default();

        if item.item_type == "punctuation" {
            current_text.push_str(content);
            continue;
        }
        if item.item_type != "pronunciation" {
            continue;
        }

        let start_time = parse_time(&item.start_time);
        let end_time = parse_time(&item.end_time);

        let time_gap = start_time
            .zip(current_end)
            .map(|(start, end)| start - end > 1.0)
            .unwrap_or(false);
        let elapsed = current_start
            .zip(start_time)
            .map(|(seg_start, now)| now - seg_start)
            .unwrap_or(0.0);
        let ends_sentence = current_text.ends_with(['.', '!', '?']);

        let should_split = current_text.is_empty()
            || time_gap
            || elapsed > max_segment_length
            || (ends_sentence && elapsed > max_segment_length / 2.0);

        if should_split {
            if let (Some(start), Some(end)) = (current_start, current_end) {
                if !current_text.trim().is_empty() {
                    segments.push(Segment {
                        start,
                        end,
                        text: current_text.trim().to_string(),
                    });
                }
            }
            current_text = content.to_string();
            current_start = start_time;
            current_end = end_time;
        } else {
            current_text.push(' ');
            current_text.push_str(content);
            current_end = end_time.or(current_end);
        }
    }

    if let (Some(start), Some(end)) = (current_start, current_end) {
        if !current_text.trim().is_empty() {
            segments.push(Segment {
                start,
                end,
                text: current_text.trim().to_string(),
            });
        }
    }

    segments
}
