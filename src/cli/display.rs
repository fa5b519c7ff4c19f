use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use std::path::Path;

use crate::analysis::{AnalysisResult, WrittenText};
use crate::fetcher::ListingEntry;
use crate::output::{AnalysisIndexEntry, StoredResult};
use crate::pipeline::{BatchReport, EventSink, PipelineState, RunSummary, VideoReport};
use crate::utils::{format_duration, format_timestamp};

/// Terminal progress for pipeline runs
pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        Self { bar }
    }

    /// Clear the bar if the run ended without a completion event
    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl EventSink for ProgressSink {
    fn on_progress(&self, current: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
            self.bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {prefix:.bold} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        }
        self.bar.set_position(current as u64);
    }

    fn on_log(&self, message: &str) {
        self.bar.println(format!("  {}", style(message).dim()));
    }

    fn on_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    fn on_state(&self, state: PipelineState) {
        self.bar.set_prefix(state.to_string());
    }

    fn on_complete(&self, summary: &RunSummary) {
        self.bar.finish_and_clear();
        let line = format!(
            "{}: {} succeeded, {} failed of {}",
            summary.state, summary.succeeded, summary.failed, summary.total
        );
        match summary.state {
            PipelineState::Completed => eprintln!("{}", style(line).green()),
            PipelineState::Cancelled => eprintln!("{}", style(line).yellow()),
            _ => eprintln!("{}", style(line).red()),
        }
    }
}

pub fn print_video_report(report: &VideoReport) {
    let metadata = &report.metadata;
    println!("{}", style(&metadata.title).bold());
    println!("  Uploader: {}", metadata.uploader);
    if let Some(duration) = metadata.duration_seconds {
        println!("  Duration: {} ({})", format_duration(duration), report.duration_class);
    }
    println!("  Video: {}", report.video_path.display());
    println!("  Transcript: {}", report.transcript_path.display());
    println!("  Analysis: {}", report.analysis_path.display());
    print_analysis(&report.analysis);
}

fn print_analysis(analysis: &AnalysisResult) {
    if !analysis.tags.is_empty() {
        println!("\n{}", style("Tags").cyan());
        println!("  {}", analysis.tags.join(", "));
    }

    if !analysis.content_ideas.is_empty() {
        println!("\n{}", style("Content ideas").cyan());
        for idea in &analysis.content_ideas {
            println!("  - {}", idea);
        }
    }

    if !analysis.timestamped_summaries.is_empty() {
        println!("\n{}", style("Timeline").cyan());
        for segment in &analysis.timestamped_summaries {
            println!(
                "  [{} - {}] {}",
                format_timestamp(segment.start),
                format_timestamp(segment.end),
                segment.text
            );
        }
    }
}

pub fn print_stored_result(result: &StoredResult, with_transcript: bool) {
    let entry = &result.entry;
    println!("{}", style(&entry.title).bold());
    println!("  Uploader: {}", entry.uploader);
    println!("  Id: {}", entry.video_id);
    println!("  Analysis: {}", entry.analysis_file_path.display());
    if result.blog_draft.is_some() {
        println!("  Blog draft: saved");
    }
    print_analysis(&result.analysis);

    if with_transcript {
        println!("\n{}", style("Transcript").cyan());
        match result.transcript_text().trim() {
            "" => println!("  (no transcript saved)"),
            text => println!("{}", text),
        }
    }
}

pub fn print_written(text: &WrittenText, path: &Path) {
    println!("{}\n", text.text);
    let source = match &text.generator {
        Some(name) => format!("generated by {}", name),
        None => "built from template".to_string(),
    };
    eprintln!("{} ({}) -> {}", style("saved").green(), source, path.display());
}

pub fn print_batch_report(report: &BatchReport) {
    for video in &report.succeeded {
        println!(
            "{} {} -> {}",
            style("ok").green(),
            video.metadata.title,
            video.analysis_path.display()
        );
    }
    for failure in &report.failed {
        println!("{} {}: {}", style("skipped").red(), failure.label, failure.error);
    }

    let tags = report.merged_tags();
    if !tags.is_empty() {
        println!("\n{} {}", style("Tags across batch:").cyan(), tags.join(", "));
    }
}

pub fn print_entries(entries: &[ListingEntry]) {
    if entries.is_empty() {
        println!("No matching videos.");
        return;
    }
    for entry in entries {
        let duration = entry
            .duration_seconds()
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:>10} views  {:>8}  {}  {}",
            entry.view_count(),
            duration,
            entry.label(),
            style(entry.url().unwrap_or("")).dim()
        );
    }
}

pub fn print_history(entries: &[AnalysisIndexEntry]) {
    if entries.is_empty() {
        println!("No saved analyses.");
        return;
    }
    for entry in entries {
        println!(
            "{}  {}  {}  {}",
            style(&entry.uploader).bold(),
            entry.video_id,
            entry.title,
            style(entry.analysis_file_path.display()).dim()
        );
    }
}
