//! Shared fixtures for pipeline integration tests
//!
//! The fetcher and transcoder are replaced by `sh -c` scripts that log their
//! arguments, so tests can count how often each tool was started.

#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use reelscribe::analysis::ContentAnalyzer;
use reelscribe::audio::AudioExtractor;
use reelscribe::config::{AnalysisConfig, ExternalTool};
use reelscribe::fetcher::{ClassificationPolicy, Downloader, FetchTool};
use reelscribe::output::ArtifactStore;
use reelscribe::pipeline::PipelineCoordinator;
use reelscribe::{TranscriptResult, TranscriptionEngine};

mock! {
    pub Engine {}

    #[async_trait]
    impl TranscriptionEngine for Engine {
        async fn transcribe(
            &self,
            audio: &Path,
            token: &CancellationToken,
        ) -> reelscribe::Result<TranscriptResult>;

        fn name(&self) -> &'static str;
    }
}

/// Channel listing printed for `https://video.test/channel`: five entries,
/// two of them (`v2`, `v4`) above 10k views
const CHANNEL_LISTING: &str = r#"{"id":"v1","title":"Morning pasta","view_count":5000,"duration":30,"webpage_url":"https://video.test/v1"}
{"id":"v2","title":"Sauce basics","view_count":25000,"duration":40,"webpage_url":"https://video.test/v2"}
{"id":"v3","title":"Knife skills","description":"no views field","duration":50,"webpage_url":"https://video.test/v3"}
{"id":"v4","title":"Dinner party","view_count":120000,"duration":300,"webpage_url":"https://video.test/v4"}
{"id":"v5","title":"Quick snack","view_count":9999,"duration":20,"webpage_url":"https://video.test/v5"}"#;

/// Fetcher stand-in.
///
/// `--dump-json ... <url>` prints metadata whose id is the last URL segment
/// (`long` is 120s, everything else 45s). A download writes `<id>.mp4` next to
/// the `-o` template; `broken` fails and `slow` hangs. A profile download
/// (`--yes-playlist`) writes `p1.mp4` and `p2.mp4` and announces them the way
/// the real fetcher does: repeated destinations, per-format parts and a merge.
fn fetcher_script(log: &Path) -> String {
    format!(
        r#"echo "$*" >> '{log}'
if [ "$1" = "--dump-json" ]; then
  url="$4"; id="${{url##*/}}"
  if [ "$id" = "channel" ]; then
    cat <<'EOF'
{listing}
EOF
    exit 0
  fi
  if [ "$id" = "empty" ]; then exit 0; fi
  dur=45; if [ "$id" = "long" ]; then dur=120; fi
  printf '{{"id":"%s","title":"Video %s","uploader":"@chef","duration":%s,"webpage_url":"%s"}}\n' "$id" "$id" "$dur" "$url"
  exit 0
fi
url="$1"; id="${{url##*/}}"; dir=$(dirname "$3")
case " $* " in *" --yes-playlist "*)
  mkdir -p "$dir"
  echo video > "$dir/p1.mp4"
  echo video > "$dir/p2.mp4"
  echo "[download] Destination: $dir/p1.mp4"
  echo "[download] Destination: $dir/p1.mp4"
  echo "[download] Destination: $dir/p2.f137.mp4"
  echo "[download] Destination: $dir/p2.f140.m4a"
  echo "[Merger] Merging formats into \"$dir/p2.mp4\""
  echo "[download] $dir/p1.mp4 has already been downloaded"
  exit 0;;
esac
if [ "$id" = "broken" ]; then echo "ERROR: video unavailable" >&2; exit 1; fi
if [ "$id" = "slow" ]; then exec sleep 30; fi
mkdir -p "$dir"
echo video > "$dir/$id.mp4"
echo "[download] Destination: $dir/$id.mp4"
"#,
        log = log.display(),
        listing = CHANNEL_LISTING
    )
}

/// Transcoder stand-in: writes the last argument and logs it
fn transcoder_script(log: &Path) -> String {
    format!(
        r#"for last; do :; done
echo "$last" >> '{log}'
echo audio > "$last""#,
        log = log.display()
    )
}

pub struct Harness {
    pub dir: TempDir,
    pub root: PathBuf,
    pub fetch_log: PathBuf,
    pub transcode_log: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path().join("downloads");
        Self {
            fetch_log: dir.path().join("fetcher.log"),
            transcode_log: dir.path().join("transcoder.log"),
            root,
            dir,
        }
    }

    pub fn downloader(&self) -> Downloader {
        let fetcher = fetcher_script(&self.fetch_log);
        let fetch = FetchTool::new(
            ExternalTool::with_args("sh", ["-c", fetcher.as_str(), "fetcher"]),
            "Unknown_Account",
        );
        Downloader::new(fetch, &self.root, "best", ClassificationPolicy::default())
    }

    pub fn coordinator(&self, engine: MockEngine) -> PipelineCoordinator {
        let transcoder = transcoder_script(&self.transcode_log);
        let downloader = self.downloader();
        let extractor = AudioExtractor::new(
            ExternalTool::with_args("sh", ["-c", transcoder.as_str(), "transcoder"]),
            "mp3",
            "128k",
            44100,
        );

        PipelineCoordinator::new(
            downloader,
            extractor,
            Arc::new(engine),
            ContentAnalyzer::new(AnalysisConfig::default(), None),
            ArtifactStore::new(&self.root),
        )
    }

    /// Download invocations: fetcher runs whose first argument is a URL
    pub fn downloads(&self) -> Vec<String> {
        read_lines(&self.fetch_log)
            .into_iter()
            .filter(|line| line.starts_with("https://"))
            .map(|line| line.split_whitespace().next().unwrap_or_default().to_string())
            .collect()
    }

    /// Every fetcher invocation, one line of arguments each
    pub fn fetch_invocations(&self) -> Vec<String> {
        read_lines(&self.fetch_log)
    }

    /// Audio paths the transcoder was asked to write
    pub fn audio_outputs(&self) -> Vec<PathBuf> {
        read_lines(&self.transcode_log)
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Engine that checks the audio file exists and returns `text`
pub fn engine_returning(text: &'static str) -> MockEngine {
    let mut engine = MockEngine::new();
    engine
        .expect_transcribe()
        .returning(move |audio, _| {
            assert!(audio.is_file(), "audio should exist while transcribing");
            Ok(TranscriptResult::text_only(text))
        });
    engine.expect_name().return_const("mock");
    engine
}
