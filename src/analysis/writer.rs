//! Follow-up writing from a finished analysis: blog drafts and short-form video material.
//!
//! Every piece is asked from the configured generator first. Without one, or when it
//! fails or answers with nothing, a deterministic template built from the stored
//! transcript and analysis is returned instead.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::generative::IdeaGenerator;
use super::{split_sentences, AnalysisResult};
use crate::config::GenerationConfig;
use crate::output::markdown::extractive_summary;
use crate::utils::{format_timestamp, truncate_chars};
use crate::{PipelineError, Result};

const TEMPLATE_POINTS: usize = 5;

/// Kind of short-form material to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortsKind {
    Script,
    Hook,
    Hashtags,
    Timeline,
    AbTest,
}

impl ShortsKind {
    pub const ALL: [ShortsKind; 5] = [
        ShortsKind::Script,
        ShortsKind::Hook,
        ShortsKind::Hashtags,
        ShortsKind::Timeline,
        ShortsKind::AbTest,
    ];

    pub fn file_suffix(&self) -> &'static str {
        match self {
            ShortsKind::Script => "script",
            ShortsKind::Hook => "hook",
            ShortsKind::Hashtags => "hashtags",
            ShortsKind::Timeline => "timeline",
            ShortsKind::AbTest => "ab_test",
        }
    }
}

impl fmt::Display for ShortsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShortsKind::Script => "script",
            ShortsKind::Hook => "hook",
            ShortsKind::Hashtags => "hashtags",
            ShortsKind::Timeline => "timeline",
            ShortsKind::AbTest => "ab-test",
        };
        f.write_str(name)
    }
}

impl FromStr for ShortsKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "script" => Ok(ShortsKind::Script),
            "hook" => Ok(ShortsKind::Hook),
            "hashtags" | "tags" => Ok(ShortsKind::Hashtags),
            "timeline" => Ok(ShortsKind::Timeline),
            "ab-test" | "ab_test" | "abtest" => Ok(ShortsKind::AbTest),
            other => Err(format!(
                "unknown shorts kind '{}', expected script, hook, hashtags, timeline or ab-test",
                other
            )),
        }
    }
}

/// Target of a short-form piece
#[derive(Debug, Clone, PartialEq)]
pub struct ShortsBrief {
    pub platform: String,
    pub content_type: String,
    /// Free-form target length such as `30s` or `1m`
    pub video_length: String,
}

impl Default for ShortsBrief {
    fn default() -> Self {
        Self {
            platform: "TikTok".to_string(),
            content_type: "information".to_string(),
            video_length: "30s".to_string(),
        }
    }
}

/// What a piece of writing is based on
#[derive(Debug, Clone, Copy)]
pub struct WritingSource<'a> {
    pub title: &'a str,
    pub transcript: &'a str,
    pub analysis: &'a AnalysisResult,
}

impl WritingSource<'_> {
    fn topic(&self) -> &str {
        self.analysis.tags.first().map(String::as_str).unwrap_or(self.title)
    }

    /// Timeline entries, or leading transcript sentences when there are none
    fn points(&self) -> Vec<(Option<f64>, String)> {
        if !self.analysis.timestamped_summaries.is_empty() {
            return self
                .analysis
                .timestamped_summaries
                .iter()
                .take(TEMPLATE_POINTS)
                .map(|s| (Some(s.start), s.text.clone()))
                .collect();
        }
        split_sentences(self.transcript.trim())
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(TEMPLATE_POINTS)
            .map(|s| (None, s.to_string()))
            .collect()
    }

    fn opening_line(&self) -> String {
        self.points()
            .into_iter()
            .next()
            .map(|(_, text)| text)
            .unwrap_or_else(|| self.title.to_string())
    }
}

/// Written text and the generator that produced it, `None` for templates
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenText {
    pub text: String,
    pub generator: Option<String>,
}

impl WrittenText {
    pub fn is_generated(&self) -> bool {
        self.generator.is_some()
    }
}

pub struct ContentWriter {
    generator: Option<Arc<dyn IdeaGenerator>>,
    source_chars: usize,
}

impl ContentWriter {
    pub fn new(generator: Option<Arc<dyn IdeaGenerator>>, source_chars: usize) -> Self {
        Self {
            generator,
            source_chars,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(
            super::GeminiClient::from_config(config),
            config.draft_transcript_chars,
        )
    }

    pub async fn blog_draft(&self, source: WritingSource<'_>, token: &CancellationToken) -> Result<WrittenText> {
        let prompt = blog_draft_prompt(source, self.source_chars);
        self.write("blog draft", &prompt, || template_blog_draft(source), token)
            .await
    }

    pub async fn shorts(
        &self,
        kind: ShortsKind,
        brief: &ShortsBrief,
        source: WritingSource<'_>,
        token: &CancellationToken,
    ) -> Result<WrittenText> {
        let prompt = shorts_prompt(kind, brief, source, self.source_chars);
        let what = format!("shorts {}", kind);
        self.write(&what, &prompt, || template_shorts(kind, brief, source), token)
            .await
    }

    async fn write<F>(&self, what: &str, prompt: &str, template: F, token: &CancellationToken) -> Result<WrittenText>
    where
        F: FnOnce() -> String,
    {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        if let Some(generator) = &self.generator {
            let response = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(PipelineError::Cancelled),
                response = generator.generate(prompt) => response,
            };
            match response {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::info!("{} wrote the {}", generator.name(), what);
                    return Ok(WrittenText {
                        text: text.trim().to_string(),
                        generator: Some(generator.name()),
                    });
                }
                Ok(_) => tracing::warn!("{} returned an empty {}, using template", generator.name(), what),
                Err(e) => tracing::warn!("Writing the {} failed, using template: {:#}", what, e),
            }
        }

        Ok(WrittenText {
            text: template(),
            generator: None,
        })
    }
}

pub fn blog_draft_prompt(source: WritingSource<'_>, max_chars: usize) -> String {
    let mut prompt = format!(
        "Write a blog post draft based on the video '{}'. Include:\n\
         1. A title that captures the video\n\
         2. An introduction that draws the reader in\n\
         3. Three to five subheadings covering the key points, using the timestamps below\n\
         4. A conclusion with a call to action such as subscribing or commenting\n\
         5. At least five tags for the post\n\n",
        source.title
    );
    if !source.analysis.tags.is_empty() {
        prompt.push_str(&format!("Extracted tags: {}\n\n", source.analysis.tags.join(", ")));
    }
    if !source.analysis.timestamped_summaries.is_empty() {
        prompt.push_str("Timestamps:\n");
        for segment in &source.analysis.timestamped_summaries {
            prompt.push_str(&format!("[{}] {}\n", format_timestamp(segment.start), segment.text));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Transcript:\n{}\n",
        truncate_chars(source.transcript, max_chars)
    ));
    prompt
}

pub fn shorts_prompt(kind: ShortsKind, brief: &ShortsBrief, source: WritingSource<'_>, max_chars: usize) -> String {
    let (task, output) = match kind {
        ShortsKind::Script => (
            format!("a {} {} short script", brief.video_length, brief.platform),
            "1. The full spoken script\n2. Time allocation per key point\n3. Visual suggestions (captions, emoji, effects)",
        ),
        ShortsKind::Hook => (
            format!("a hook for a {} short that grabs viewers in the first three seconds", brief.platform),
            "1. Three hook lines\n2. Strengths of each\n3. Visual suggestions\n4. What should follow the hook",
        ),
        ShortsKind::Hashtags => (
            format!("optimized hashtags for a {} short", brief.platform),
            "1. Core hashtags (5-7)\n2. Trending hashtags (3-5)\n3. Platform-specific hashtags\n4. Search keywords\n5. Brand hashtag ideas",
        ),
        ShortsKind::Timeline => (
            format!("an editing timeline for a {} {} short", brief.video_length, brief.platform),
            "1. Second-by-second edit guide\n2. Cut points\n3. Caption timing\n4. Sound and music suggestions\n5. Visual effects",
        ),
        ShortsKind::AbTest => (
            format!("A/B test scenarios for a {} short", brief.platform),
            "1. Three or four versions\n2. How they differ\n3. Metrics to compare\n4. Test duration and method\n5. How to act on the results",
        ),
    };

    format!(
        "Based on the transcript of the video '{}', write {}.\n\
         Content type: {}\n\n\
         Output format:\n{}\n\n\
         Transcript:\n{}\n",
        source.title,
        task,
        brief.content_type,
        output,
        truncate_chars(source.transcript, max_chars)
    )
}

/// Blog draft built only from the stored transcript and analysis
pub fn template_blog_draft(source: WritingSource<'_>) -> String {
    let mut draft = format!("# {}\n\n## Introduction\n\n", source.title);
    let summary = extractive_summary(source.transcript);
    if summary.is_empty() {
        draft.push_str(&format!("A closer look at {}.\n\n", source.topic()));
    } else {
        draft.push_str(&format!("{}\n\n", summary));
    }

    draft.push_str("## Key points\n\n");
    for (start, text) in source.points() {
        match start {
            Some(start) => draft.push_str(&format!("### [{}] {}\n\n", format_timestamp(start), text)),
            None => draft.push_str(&format!("### {}\n\n", text)),
        }
    }

    draft.push_str(&format!(
        "## Conclusion\n\nIf '{}' was useful, subscribe and leave your questions in the comments.\n",
        source.title
    ));

    if !source.analysis.tags.is_empty() {
        let tags: Vec<String> = source.analysis.tags.iter().map(|t| format!("#{}", t)).collect();
        draft.push_str(&format!("\n## Tags\n\n{}\n", tags.join(" ")));
    }
    draft
}

pub fn template_shorts(kind: ShortsKind, brief: &ShortsBrief, source: WritingSource<'_>) -> String {
    let topic = source.topic();
    let opening = source.opening_line();
    let hooks = [
        format!("Stop scrolling if you care about {}.", topic),
        format!("Nobody tells you this about {}.", topic),
        opening.clone(),
    ];

    match kind {
        ShortsKind::Script => {
            let mut script = format!(
                "{} {} script ({})\n\nHook: {}\n\n",
                brief.video_length, brief.platform, brief.content_type, hooks[0]
            );
            for (_, text) in source.points().into_iter().take(3) {
                script.push_str(&format!("- {}\n", text));
            }
            script.push_str(&format!("\nCall to action: follow for more on {}.\n", topic));
            script
        }
        ShortsKind::Hook => hooks
            .iter()
            .enumerate()
            .map(|(i, hook)| format!("{}. {}", i + 1, hook))
            .collect::<Vec<_>>()
            .join("\n"),
        ShortsKind::Hashtags => {
            let mut tags: Vec<String> = source
                .analysis
                .tags
                .iter()
                .map(|t| format!("#{}", t.replace(' ', "")))
                .collect();
            let platform_tag = platform_hashtag(&brief.platform);
            if !tags.contains(&platform_tag) {
                tags.push(platform_tag);
            }
            tags.join(" ")
        }
        ShortsKind::Timeline => {
            let total = parse_length_secs(&brief.video_length).unwrap_or(30);
            let points: Vec<String> = source.points().into_iter().take(3).map(|(_, text)| text).collect();
            let mut beats = vec![format!("Hook: {}", hooks[0])];
            beats.extend(points);
            beats.push(format!("Call to action: follow for more on {}", topic));

            let step = total as f64 / beats.len() as f64;
            beats
                .iter()
                .enumerate()
                .map(|(i, beat)| {
                    format!(
                        "{}-{} {}",
                        format_timestamp(i as f64 * step),
                        format_timestamp((i + 1) as f64 * step),
                        beat
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        ShortsKind::AbTest => {
            let endings = [
                "ask viewers a question",
                "ask viewers to follow",
                "loop back to the first frame",
            ];
            let mut plan: Vec<String> = hooks
                .iter()
                .zip(endings)
                .zip(['A', 'B', 'C'])
                .map(|((hook, ending), name)| format!("Version {}: open with \"{}\" and {}.", name, hook, ending))
                .collect();
            plan.push(format!(
                "Measure three-second hold rate, completion rate and shares on {}; run each version for 48 hours.",
                brief.platform
            ));
            plan.join("\n")
        }
    }
}

fn platform_hashtag(platform: &str) -> String {
    let lower = platform.to_lowercase();
    if lower.contains("tiktok") {
        "#fyp".to_string()
    } else if lower.contains("youtube") || lower.contains("shorts") {
        "#shorts".to_string()
    } else if lower.contains("instagram") || lower.contains("reels") {
        "#reels".to_string()
    } else {
        format!("#{}", lower.replace(' ', ""))
    }
}

/// `30`, `30s`, `45 sec`, `1m`, `2 min` to seconds
fn parse_length_secs(length: &str) -> Option<u32> {
    let lower = length.trim().to_lowercase();
    let digits: String = lower.chars().take_while(|c| c.is_ascii_digit()).collect();
    let value: u32 = digits.parse().ok()?;
    let unit = lower[digits.len()..].trim();
    match unit {
        "" | "s" | "sec" | "secs" | "seconds" => Some(value),
        "m" | "min" | "mins" | "minutes" => Some(value * 60),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::generative::MockIdeaGenerator;
    use super::*;
    use crate::transcribe::Segment;

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            tags: vec!["pasta".to_string(), "sauce".to_string()],
            content_ideas: Vec::new(),
            timestamped_summaries: vec![
                Segment {
                    start: 0.0,
                    end: 4.0,
                    text: "Boil the water.".to_string(),
                },
                Segment {
                    start: 65.0,
                    end: 70.0,
                    text: "Salt it well.".to_string(),
                },
            ],
        }
    }

    fn source(analysis: &AnalysisResult) -> WritingSource<'_> {
        WritingSource {
            title: "Pasta night",
            transcript: "Boil the water. Salt it well. Cook the pasta.",
            analysis,
        }
    }

    #[test]
    fn shorts_kind_parses_cli_names() {
        for kind in ShortsKind::ALL {
            assert_eq!(kind.to_string().parse::<ShortsKind>(), Ok(kind));
        }
        assert_eq!("AB_TEST".parse::<ShortsKind>(), Ok(ShortsKind::AbTest));
        assert!("reel".parse::<ShortsKind>().is_err());
    }

    #[test]
    fn length_parsing() {
        assert_eq!(parse_length_secs("30s"), Some(30));
        assert_eq!(parse_length_secs("45"), Some(45));
        assert_eq!(parse_length_secs("1m"), Some(60));
        assert_eq!(parse_length_secs("2 min"), Some(120));
        assert_eq!(parse_length_secs("short"), None);
    }

    #[test]
    fn template_draft_uses_timeline_and_tags() {
        let analysis = analysis();
        let draft = template_blog_draft(source(&analysis));

        assert!(draft.starts_with("# Pasta night\n\n## Introduction\n\nBoil the water. Salt it well. Cook the pasta."));
        assert!(draft.contains("### [00:00] Boil the water."));
        assert!(draft.contains("### [01:05] Salt it well."));
        assert!(draft.contains("## Conclusion"));
        assert!(draft.ends_with("#pasta #sauce\n"));
    }

    #[test]
    fn template_draft_without_timeline_uses_sentences() {
        let analysis = AnalysisResult::default();
        let draft = template_blog_draft(source(&analysis));
        assert!(draft.contains("### Cook the pasta."));
        assert!(!draft.contains("## Tags"));
    }

    #[test]
    fn template_hashtags_add_platform_tag() {
        let analysis = analysis();
        let brief = ShortsBrief {
            platform: "YouTube Shorts".to_string(),
            ..ShortsBrief::default()
        };
        let text = template_shorts(ShortsKind::Hashtags, &brief, source(&analysis));
        assert_eq!(text, "#pasta #sauce #shorts");
    }

    #[test]
    fn template_timeline_spans_the_target_length() {
        let analysis = analysis();
        let brief = ShortsBrief {
            video_length: "40s".to_string(),
            ..ShortsBrief::default()
        };
        let text = template_shorts(ShortsKind::Timeline, &brief, source(&analysis));
        let lines: Vec<&str> = text.lines().collect();

        // hook, two points, call to action
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("00:00-00:10 Hook:"));
        assert!(lines[3].starts_with("00:30-00:40 Call to action"));
    }

    #[test]
    fn template_hooks_and_ab_test() {
        let analysis = analysis();
        let brief = ShortsBrief::default();
        let hooks = template_shorts(ShortsKind::Hook, &brief, source(&analysis));
        assert_eq!(hooks.lines().count(), 3);
        assert!(hooks.lines().last().unwrap().ends_with("Boil the water."));

        let plan = template_shorts(ShortsKind::AbTest, &brief, source(&analysis));
        assert!(plan.contains("Version A:"));
        assert!(plan.contains("Version C:"));
        assert!(plan.contains("TikTok"));
    }

    #[test]
    fn prompts_carry_brief_and_truncated_transcript() {
        let analysis = analysis();
        let long = "가".repeat(5000);
        let src = WritingSource {
            transcript: &long,
            ..source(&analysis)
        };

        let prompt = shorts_prompt(ShortsKind::Script, &ShortsBrief::default(), src, 4000);
        assert!(prompt.contains("a 30s TikTok short script"));
        assert!(prompt.contains("Content type: information"));
        assert_eq!(prompt.matches('가').count(), 4000);

        let prompt = blog_draft_prompt(src, 4000);
        assert!(prompt.contains("[01:05] Salt it well."));
        assert!(prompt.contains("Extracted tags: pasta, sauce"));
    }

    #[tokio::test]
    async fn generated_text_is_used_when_available() {
        let mut generator = MockIdeaGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt: &str| prompt.contains("blog post draft"))
            .times(1)
            .returning(|_| Ok("  # Generated draft\n".to_string()));
        generator.expect_name().return_const("mock".to_string());

        let writer = ContentWriter::new(Some(Arc::new(generator)), 4000);
        let analysis = analysis();
        let written = writer
            .blog_draft(source(&analysis), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written.text, "# Generated draft");
        assert_eq!(written.generator.as_deref(), Some("mock"));
    }

    #[tokio::test]
    async fn failures_and_empty_answers_fall_back_to_templates() {
        let mut generator = MockIdeaGenerator::new();
        let mut calls = 0;
        generator.expect_generate().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("quota exceeded"))
            } else {
                Ok("   \n".to_string())
            }
        });
        generator.expect_name().return_const("mock".to_string());

        let writer = ContentWriter::new(Some(Arc::new(generator)), 4000);
        let analysis = analysis();
        let token = CancellationToken::new();
        let brief = ShortsBrief::default();

        let hook = writer
            .shorts(ShortsKind::Hook, &brief, source(&analysis), &token)
            .await
            .unwrap();
        assert!(!hook.is_generated());
        assert_eq!(hook.text, template_shorts(ShortsKind::Hook, &brief, source(&analysis)));

        let tags = writer
            .shorts(ShortsKind::Hashtags, &brief, source(&analysis), &token)
            .await
            .unwrap();
        assert_eq!(tags.text, "#pasta #sauce #fyp");
    }

    #[tokio::test]
    async fn no_generator_means_template() {
        let writer = ContentWriter::new(None, 4000);
        let analysis = analysis();
        let written = writer
            .blog_draft(source(&analysis), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!written.is_generated());
        assert_eq!(written.text, template_blog_draft(source(&analysis)));
    }

    #[tokio::test]
    async fn cancelled_token_stops_writing() {
        let mut generator = MockIdeaGenerator::new();
        generator.expect_generate().never();
        let writer = ContentWriter::new(Some(Arc::new(generator)), 4000);
        let token = CancellationToken::new();
        token.cancel();

        let analysis = analysis();
        let err = writer.blog_draft(source(&analysis), &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
