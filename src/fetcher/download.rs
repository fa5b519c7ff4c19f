use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::{ClassificationPolicy, DurationClass, FetchTool, VideoMetadata};
use crate::config::Config;
use crate::utils::process::run_streaming;
use crate::utils::profile_name_from_url;
use crate::{PipelineError, Result};

/// Extensions probed when the fetcher's output did not reveal a usable path
const FALLBACK_EXTENSIONS: [&str; 3] = ["mp4", "webm", "mkv"];

/// A video file that the fetcher reported as written and that exists on disk
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadArtifact {
    pub metadata: VideoMetadata,
    pub local_path: PathBuf,
    pub duration_class: DurationClass,
}

/// Materializes videos through the external fetcher
#[derive(Debug, Clone)]
pub struct Downloader {
    fetch: FetchTool,
    download_root: PathBuf,
    format_selector: String,
    policy: ClassificationPolicy,
}

impl Downloader {
    pub fn new(
        fetch: FetchTool,
        download_root: impl Into<PathBuf>,
        format_selector: impl Into<String>,
        policy: ClassificationPolicy,
    ) -> Self {
        Self {
            fetch,
            download_root: download_root.into(),
            format_selector: format_selector.into(),
            policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FetchTool::new(config.tools.fetcher.clone(), config.storage.unknown_uploader.clone()),
            config.storage.download_dir.clone(),
            config.tools.format_selector.clone(),
            config.storage.classification(),
        )
    }

    pub fn fetch_tool(&self) -> &FetchTool {
        &self.fetch
    }

    pub fn policy(&self) -> ClassificationPolicy {
        self.policy
    }

    /// `{root}/{uploader}/{short_form|long_form}`
    pub fn destination_dir(&self, uploader: &str, class: DurationClass) -> PathBuf {
        self.download_root.join(uploader).join(class.dir_name())
    }

    /// `{root}/{profile}/{profile}_archive.txt`
    pub fn archive_path(&self, profile: &str) -> PathBuf {
        self.download_root
            .join(profile)
            .join(format!("{}_archive.txt", profile))
    }

    /// Resolve metadata for `url` and download the video it names
    pub async fn download_video(&self, url: &str, token: &CancellationToken) -> Result<DownloadArtifact> {
        let metadata = self
            .fetch
            .resolve_metadata(url, token)
            .await?
            .ok_or_else(|| PipelineError::Metadata(format!("no entries found for {}", url)))?;

        self.download_resolved(metadata, token).await
    }

    /// Download a video whose metadata has already been resolved
    pub async fn download_resolved(
        &self,
        metadata: VideoMetadata,
        token: &CancellationToken,
    ) -> Result<DownloadArtifact> {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let duration_class = self.policy.classify(metadata.duration_seconds);
        let output_dir = self.destination_dir(&metadata.uploader, duration_class);
        fs_err::create_dir_all(&output_dir)
            .map_err(|e| PipelineError::Download(format!("cannot create output directory: {}", e)))?;

        let output_template = output_dir.join("%(id)s.%(ext)s");
        tracing::info!(
            "Downloading {} ({}) into {}",
            metadata.title,
            duration_class,
            output_dir.display()
        );

        let mut command = self.fetch.tool().command();
        command
            .arg(&metadata.source_url)
            .arg("-o")
            .arg(&output_template)
            .args(["--no-playlist", "--restrict-filenames", "-f", self.format_selector.as_str()]);

        let mut discovered = DiscoveredPaths::default();
        let output = run_streaming(command, &self.fetch.tool().program, token, |line| {
            discovered.observe(line)
        })
        .await
        .map_err(|e| e.into_pipeline(PipelineError::Download))?;

        if !output.success() {
            return Err(PipelineError::Download(format!(
                "{} failed for {}: {}",
                self.fetch.tool().program,
                metadata.id,
                output.failure_reason()
            )));
        }

        let local_path = discovered
            .existing_path()
            .or_else(|| probe_fallbacks(&output_dir, &metadata.id))
            .ok_or_else(|| {
                PipelineError::Download(format!(
                    "{} reported success but no file for {} was found in {}",
                    self.fetch.tool().program,
                    metadata.id,
                    output_dir.display()
                ))
            })?;

        tracing::info!("Downloaded {} to {}", metadata.id, local_path.display());

        Ok(DownloadArtifact {
            metadata,
            local_path,
            duration_class,
        })
    }

    /// Download every video of a profile, skipping ids already in the archive.
    ///
    /// Returns the newly written files in discovery order, without duplicates.
    pub async fn download_profile(
        &self,
        profile_url: &str,
        token: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let profile = profile_name_from_url(profile_url).ok_or_else(|| {
            PipelineError::Download(format!("cannot derive a profile name from {}", profile_url))
        })?;
        let output_dir = self.download_root.join(&profile);
        fs_err::create_dir_all(&output_dir)
            .map_err(|e| PipelineError::Download(format!("cannot create output directory: {}", e)))?;

        let archive = self.archive_path(&profile);
        tracing::info!(
            "Downloading profile {} into {} (archive {})",
            profile,
            output_dir.display(),
            archive.display()
        );

        let mut command = self.fetch.tool().command();
        command
            .arg(profile_url)
            .arg("-o")
            .arg(output_dir.join("%(id)s.%(ext)s"))
            .args([
                "--yes-playlist",
                "--restrict-filenames",
                "-f",
                self.format_selector.as_str(),
                "--no-warnings",
                "--download-archive",
            ])
            .arg(&archive);

        let mut candidates: Vec<PathBuf> = Vec::new();
        let output = run_streaming(command, &self.fetch.tool().program, token, |line| {
            if let Some(path) = discover_path(line).filter(|p| has_video_extension(p)) {
                if !candidates.contains(&path) {
                    candidates.push(path);
                }
            }
        })
        .await
        .map_err(|e| e.into_pipeline(PipelineError::Download))?;

        if !output.success() {
            return Err(PipelineError::Download(format!(
                "{} failed for profile {}: {}",
                self.fetch.tool().program,
                profile,
                output.failure_reason()
            )));
        }

        // Intermediate format files are removed after merging, so only keep what survived
        let downloaded: Vec<PathBuf> = candidates.into_iter().filter(|p| p.exists()).collect();
        tracing::info!("Profile {}: {} new video(s)", profile, downloaded.len());

        Ok(downloaded)
    }
}

/// Paths announced by the fetcher while a single video downloads
#[derive(Debug, Default)]
struct DiscoveredPaths {
    destination: Option<PathBuf>,
    merged: Option<PathBuf>,
    confirmed: Option<PathBuf>,
}

impl DiscoveredPaths {
    fn observe(&mut self, line: &str) {
        if let Some(path) = parse_merger_line(line) {
            self.merged = Some(path);
        } else if let Some(path) = parse_destination_line(line) {
            // The first destination wins; later ones are extra formats
            self.destination.get_or_insert(path);
        } else if let Some(path) = parse_downloaded_line(line).or_else(|| parse_already_downloaded_line(line)) {
            self.confirmed.get_or_insert(path);
        }
    }

    fn existing_path(&self) -> Option<PathBuf> {
        [&self.merged, &self.destination, &self.confirmed]
            .into_iter()
            .flatten()
            .find(|path| path.exists())
            .cloned()
    }
}

fn probe_fallbacks(dir: &Path, id: &str) -> Option<PathBuf> {
    FALLBACK_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", id, ext)))
        .find(|path| path.exists())
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FALLBACK_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Any path the fetcher announces on `line`
pub fn discover_path(line: &str) -> Option<PathBuf> {
    parse_merger_line(line)
        .or_else(|| parse_destination_line(line))
        .or_else(|| parse_downloaded_line(line))
        .or_else(|| parse_already_downloaded_line(line))
}

/// `[download] Destination: <path>`
pub fn parse_destination_line(line: &str) -> Option<PathBuf> {
    let (_, rest) = line.split_once("Destination:")?;
    let path = rest.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// `... downloaded "<path>"`, matched case-insensitively on the keyword
pub fn parse_downloaded_line(line: &str) -> Option<PathBuf> {
    // ASCII lowercasing keeps byte offsets aligned with `line`
    let lower = line.to_ascii_lowercase();
    let marker = "downloaded \"";
    let start = lower.find(marker)? + marker.len();
    quoted_until_end(&line[start..])
}

/// `[Merger] Merging formats into "<path>"`
pub fn parse_merger_line(line: &str) -> Option<PathBuf> {
    let (_, rest) = line.split_once("Merging formats into \"")?;
    quoted_until_end(rest)
}

/// `[download] <path> has already been downloaded`
pub fn parse_already_downloaded_line(line: &str) -> Option<PathBuf> {
    let rest = line.trim().strip_prefix("[download]")?;
    let (path, _) = rest.split_once(" has already been downloaded")?;
    let path = path.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

fn quoted_until_end(rest: &str) -> Option<PathBuf> {
    let end = rest.find('"')?;
    let path = rest[..end].trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_destination_lines() {
        assert_eq!(
            parse_destination_line("[download] Destination: downloads/chef/short_form/v1.mp4"),
            Some(PathBuf::from("downloads/chef/short_form/v1.mp4"))
        );
        assert_eq!(parse_destination_line("[download] Destination:   "), None);
        assert_eq!(parse_destination_line("[download]  42.0% of 10MiB"), None);
    }

    #[test]
    fn parses_quoted_confirmation_lines() {
        assert_eq!(
            parse_downloaded_line("[info] Downloaded \"out/v2.webm\" successfully"),
            Some(PathBuf::from("out/v2.webm"))
        );
        assert_eq!(
            parse_merger_line("[Merger] Merging formats into \"out/v3.mp4\""),
            Some(PathBuf::from("out/v3.mp4"))
        );
        assert_eq!(
            parse_already_downloaded_line("[download] out/v4.mkv has already been downloaded"),
            Some(PathBuf::from("out/v4.mkv"))
        );
        assert_eq!(parse_downloaded_line("nothing downloaded yet"), None);
    }

    #[test]
    fn first_destination_wins_but_merge_output_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("v1.f137.mp4");
        let merged = dir.path().join("v1.mp4");
        fs_err::write(&first, b"x").unwrap();

        let mut paths = DiscoveredPaths::default();
        paths.observe(&format!("[download] Destination: {}", first.display()));
        paths.observe(&format!("[download] Destination: {}", dir.path().join("v1.f140.m4a").display()));
        assert_eq!(paths.existing_path(), Some(first.clone()));

        paths.observe(&format!("[Merger] Merging formats into \"{}\"", merged.display()));
        // Merged file missing on disk: fall back to the destination that exists
        assert_eq!(paths.existing_path(), Some(first.clone()));

        fs_err::write(&merged, b"x").unwrap();
        assert_eq!(paths.existing_path(), Some(merged));
    }

    #[test]
    fn probes_known_extensions_by_id() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(probe_fallbacks(dir.path(), "abc"), None);

        fs_err::write(dir.path().join("abc.webm"), b"x").unwrap();
        assert_eq!(probe_fallbacks(dir.path(), "abc"), Some(dir.path().join("abc.webm")));
    }

    #[test]
    fn layout_paths() {
        let downloader = Downloader::new(
            FetchTool::new(crate::config::ExternalTool::new("yt-dlp"), "Unknown_Account"),
            "downloads",
            "best",
            ClassificationPolicy::default(),
        );

        assert_eq!(
            downloader.destination_dir("chef", DurationClass::LongForm),
            PathBuf::from("downloads/chef/long_form")
        );
        assert_eq!(
            downloader.archive_path("chef"),
            PathBuf::from("downloads/chef/chef_archive.txt")
        );
    }
}
