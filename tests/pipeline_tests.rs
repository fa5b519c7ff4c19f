//! End-to-end pipeline runs against stub tools
#![cfg(unix)]

mod helpers;

use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use helpers::{engine_returning, Harness, MockEngine};
use reelscribe::fetcher::DurationClass;
use reelscribe::filter::FilterCriteria;
use reelscribe::pipeline::{ChannelSink, PipelineEvent, PipelineState, RunOutcome};
use reelscribe::PipelineError;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn short_video_lands_in_short_form_and_audio_is_removed() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(engine_returning("pasta pasta sauce. Boil the water."));

    let outcome = coordinator.run_video("https://video.test/short").await;
    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {:?}", other),
    };

    assert_eq!(report.duration_class, DurationClass::ShortForm);
    assert_eq!(report.video_path, harness.root.join("chef/short_form/short.mp4"));
    assert_eq!(report.metadata.uploader, "chef");
    assert_eq!(report.analysis.tags[0], "pasta");
    assert_eq!(report.analysis.content_ideas.len(), 3);
    assert_eq!(report.analysis.timestamped_summaries.len(), 2);

    assert!(report.transcript_path.is_file());
    assert!(harness.root.join("chef/video_scripts/short.md").is_file());
    assert!(report.analysis_path.is_file());

    let audio = harness.audio_outputs();
    assert_eq!(audio.len(), 1);
    assert!(!audio[0].exists(), "audio artifact must be deleted after the run");
    assert_eq!(coordinator.state(), PipelineState::Completed);
}

#[tokio::test]
async fn long_video_lands_in_long_form() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(engine_returning("a long one"));

    let report = coordinator
        .run_video("https://video.test/long")
        .await
        .into_value()
        .expect("completed run");

    assert_eq!(report.duration_class, DurationClass::LongForm);
    assert_eq!(report.video_path, harness.root.join("chef/long_form/long.mp4"));
}

#[tokio::test]
async fn transcription_failure_still_removes_audio() {
    let harness = Harness::new();
    let mut engine = MockEngine::new();
    engine
        .expect_transcribe()
        .times(1)
        .returning(|_, _| Err(PipelineError::Transcription("engine crashed".to_string())));
    let coordinator = harness.coordinator(engine);

    let outcome = coordinator.run_video("https://video.test/short").await;

    assert!(matches!(outcome, RunOutcome::Failed(PipelineError::Transcription(_))));
    assert_eq!(coordinator.state(), PipelineState::Failed);
    let audio = harness.audio_outputs();
    assert_eq!(audio.len(), 1);
    assert!(!audio[0].exists());
    assert!(!harness.root.join("chef/video_analysis/short_analysis.json").exists());
}

#[tokio::test]
async fn failed_download_is_a_download_error() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(MockEngine::new());

    let outcome = coordinator.run_video("https://video.test/broken").await;

    match outcome {
        RunOutcome::Failed(PipelineError::Download(message)) => {
            assert!(message.contains("video unavailable"), "{}", message)
        }
        other => panic!("expected download failure, got {:?}", other),
    }
    assert!(harness.audio_outputs().is_empty());
}

#[tokio::test]
async fn empty_listing_is_a_metadata_error_not_a_crash() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(MockEngine::new());

    let outcome = coordinator.run_video("https://video.test/empty").await;
    assert!(matches!(outcome, RunOutcome::Failed(PipelineError::Metadata(_))));
    assert!(harness.downloads().is_empty());
}

#[tokio::test]
async fn channel_filter_downloads_only_matches() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(engine_returning("sauce sauce dinner"));
    let criteria = FilterCriteria::new().with_min_views(10_000);

    let outcome = coordinator
        .run_channel("https://video.test/channel", &criteria)
        .await;
    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected completed batch, got {:?}", other),
    };

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(
        harness.downloads(),
        vec!["https://video.test/v2", "https://video.test/v4"]
    );
    assert_eq!(report.merged_tags(), vec!["sauce", "dinner"]);
}

#[tokio::test]
async fn filter_only_never_downloads() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(MockEngine::new());
    let criteria = FilterCriteria::new()
        .with_duration_class(DurationClass::ShortForm)
        .with_keywords("pasta");

    let matched = assert_ok!(
        coordinator
            .filter_channel("https://video.test/channel", &criteria)
            .await
    );

    let ids: Vec<_> = matched.iter().filter_map(|e| e.id()).collect();
    assert_eq!(ids, vec!["v1"]);
    assert!(harness.downloads().is_empty());
}

#[tokio::test]
async fn batch_skips_failed_items_and_continues() {
    let harness = Harness::new();
    let mut engine = MockEngine::new();
    let mut calls = 0;
    engine.expect_transcribe().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 1 {
            Err(PipelineError::Transcription("first one fails".to_string()))
        } else {
            Ok(reelscribe::TranscriptResult::text_only("dinner dinner"))
        }
    });
    let coordinator = harness.coordinator(engine);

    let (sink, mut events) = ChannelSink::new();
    let coordinator = coordinator.with_sink(Arc::new(sink));

    let outcome = coordinator
        .run_channel("https://video.test/channel", &FilterCriteria::new().with_min_views(10_000))
        .await;
    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("a failing item must not fail the batch, got {:?}", other),
    };

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].label, "Sauce basics");
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].metadata.id, "v4");

    let mut saw_skip_log = false;
    let mut last_progress = None;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::Log(message) if message.starts_with("Skipped") => saw_skip_log = true,
            PipelineEvent::Progress { current, total } => last_progress = Some((current, total)),
            _ => {}
        }
    }
    assert!(saw_skip_log);
    assert_eq!(last_progress, Some((2, 2)));
}

#[tokio::test]
async fn cancellation_stops_the_download_and_spawns_nothing_else() {
    let harness = Harness::new();
    let coordinator = Arc::new(harness.coordinator(MockEngine::new()));
    let token = coordinator.cancellation_token();

    let handle = coordinator.clone().spawn_video("https://video.test/slow".to_string());

    // Wait until the hanging download has started
    let started = async {
        while harness.downloads().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), started)
        .await
        .expect("download should start");

    token.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("cancellation should end the run promptly")
        .expect("task should not panic");

    assert!(outcome.is_cancelled());
    assert_eq!(coordinator.state(), PipelineState::Cancelled);
    assert!(harness.audio_outputs().is_empty(), "no transcoder may start after cancel");
}

#[tokio::test]
async fn cancelled_token_prevents_any_spawn() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(MockEngine::new());
    coordinator.cancel();

    let outcome = coordinator.run_video("https://video.test/short").await;
    assert!(matches!(outcome, RunOutcome::Cancelled { partial: None }));

    let batch = coordinator
        .run_channel("https://video.test/channel", &FilterCriteria::new())
        .await;
    assert!(batch.is_cancelled());
    assert!(!harness.fetch_log.exists(), "fetcher must not be started");
}

#[tokio::test]
async fn cancelling_during_transcription_removes_audio() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    let stop = token.clone();
    let mut engine = MockEngine::new();
    engine.expect_transcribe().times(1).returning(move |audio, _| {
        assert!(audio.is_file());
        stop.cancel();
        Err(PipelineError::Cancelled)
    });
    let coordinator = harness.coordinator(engine).with_token(token);

    let outcome = coordinator.run_video("https://video.test/short").await;

    assert!(outcome.is_cancelled(), "got {:?}", outcome);
    assert_eq!(coordinator.state(), PipelineState::Cancelled);
    let audio = harness.audio_outputs();
    assert_eq!(audio.len(), 1);
    assert!(!audio[0].exists(), "audio must be removed when a run is cancelled");
    assert!(!harness.root.join("chef/video_analysis/short_analysis.json").exists());
}

#[tokio::test]
async fn profile_download_uses_archive_and_reports_each_file_once() {
    let harness = Harness::new();
    let downloader = harness.downloader();

    let paths = assert_ok!(
        downloader
            .download_profile("https://video.test/@chef", &CancellationToken::new())
            .await
    );

    let profile_dir = harness.root.join("chef");
    assert_eq!(paths, vec![profile_dir.join("p1.mp4"), profile_dir.join("p2.mp4")]);

    let archive = harness.root.join("chef/chef_archive.txt");
    let invocation = harness.fetch_invocations().pop().expect("fetcher was started");
    let expected = format!("--download-archive {}", archive.display());
    assert!(invocation.contains(&expected), "{}", invocation);
    assert!(invocation.contains("--yes-playlist"));
}

#[tokio::test]
async fn profile_run_processes_every_new_file() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(engine_returning("profile clip words"));

    let batch = coordinator
        .run_profile("https://video.test/@chef")
        .await
        .into_value()
        .expect("completed batch");

    assert_eq!(batch.total, 2);
    assert_eq!(batch.succeeded.len(), 2);
    assert!(batch.failed.is_empty());
    for id in ["p1", "p2"] {
        let analysis = harness.root.join(format!("chef/video_analysis/{}_analysis.json", id));
        assert!(analysis.is_file(), "missing {}", analysis.display());
    }
    assert_eq!(harness.downloads().len(), 1, "one fetcher run for the whole profile");

    let audio = harness.audio_outputs();
    assert_eq!(audio.len(), 2);
    assert!(audio.iter().all(|path| !path.exists()));
}

#[tokio::test]
async fn cancelled_filter_is_reported_as_cancelled() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(MockEngine::new());
    coordinator.cancel();

    let result = coordinator
        .filter_channel("https://video.test/channel", &FilterCriteria::new())
        .await;
    let outcome = RunOutcome::from(result);

    assert!(matches!(outcome, RunOutcome::Cancelled { partial: None }));
    assert!(!harness.fetch_log.exists());
}

#[tokio::test]
async fn local_file_skips_download() {
    let harness = Harness::new();
    let video = harness.dir.path().join("clip.mp4");
    std::fs::write(&video, b"video").unwrap();
    let coordinator = harness.coordinator(engine_returning("hello local world"));

    let report = coordinator.run_local(&video).await.into_value().expect("completed");

    assert_eq!(report.metadata.id, "clip");
    assert_eq!(report.metadata.uploader, "LocalVideo");
    assert!(harness.root.join("LocalVideo/video_analysis/clip_analysis.json").is_file());
    assert!(!harness.dir.path().join("clip.mp3").exists());
    assert!(harness.downloads().is_empty());
}

#[tokio::test]
async fn previous_analyses_are_listed_after_a_run() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(engine_returning("history test"));
    coordinator.run_video("https://video.test/short").await;

    let entries = assert_ok!(coordinator.previous_analyses());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].video_id, "short");
    assert_eq!(entries[0].title, "Video short");
    assert_eq!(entries[0].uploader, "chef");
}
