use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub mod generative;
pub mod writer;

pub use generative::{GeminiClient, IdeaGenerator};
pub use writer::{ContentWriter, ShortsBrief, ShortsKind, WrittenText};

use crate::config::AnalysisConfig;
use crate::fetcher::VideoMetadata;
use crate::transcribe::{Segment, TranscriptResult};

/// Upper bound on `AnalysisResult::tags`
pub const MAX_TAGS: usize = 5;

/// Derived per-video analysis, persisted as `{id}_analysis.json`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Most frequent tokens, descending by count, at most `MAX_TAGS`
    #[serde(rename = "suggested_tags")]
    pub tags: Vec<String>,

    pub content_ideas: Vec<String>,

    pub timestamped_summaries: Vec<Segment>,
}

/// Derives tags, ideas and timestamped summaries from a transcript
pub struct ContentAnalyzer {
    stopwords: HashSet<String>,
    max_tags: usize,
    fallback_topic: String,
    prompt_chars: usize,
    generator: Option<Arc<dyn IdeaGenerator>>,
}

impl ContentAnalyzer {
    pub fn new(config: AnalysisConfig, generator: Option<Arc<dyn IdeaGenerator>>) -> Self {
        Self {
            stopwords: config.stopwords.into_iter().collect(),
            max_tags: config.max_tags.min(MAX_TAGS),
            fallback_topic: config.fallback_topic,
            prompt_chars: 2000,
            generator,
        }
    }

    /// Number of transcript characters sent to the generator
    pub fn with_prompt_chars(mut self, chars: usize) -> Self {
        self.prompt_chars = chars;
        self
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn analyze(&self, metadata: &VideoMetadata, transcript: &TranscriptResult) -> AnalysisResult {
        let tags = self.extract_tags(&transcript.text);
        let content_ideas = self.content_ideas(&metadata.title, &transcript.text, &tags).await;

        let timestamped_summaries = if transcript.has_segments() {
            transcript.segments.clone()
        } else {
            tracing::debug!("No engine segments for {}, synthesizing from sentences", metadata.id);
            synthesize_segments(&transcript.text)
        };

        AnalysisResult {
            tags,
            content_ideas,
            timestamped_summaries,
        }
    }

    /// Top tokens by frequency; ties keep first-occurrence order
    pub fn extract_tags(&self, text: &str) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, token) in tokenize(text).into_iter().enumerate() {
            if token.chars().count() <= 1 || self.stopwords.contains(&token) {
                continue;
            }
            counts.entry(token).or_insert((0, position)).0 += 1;
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(token, (count, first))| (token, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        ranked
            .into_iter()
            .take(self.max_tags)
            .map(|(token, _, _)| token)
            .collect()
    }

    async fn content_ideas(&self, title: &str, transcript: &str, tags: &[String]) -> Vec<String> {
        if let Some(generator) = &self.generator {
            let prompt = generative::build_prompt(title, transcript, self.prompt_chars);
            match generator.generate(&prompt).await {
                Ok(response) => {
                    let ideas = generative::parse_ideas(&response);
                    if !ideas.is_empty() {
                        tracing::info!("{} generated {} idea(s)", generator.name(), ideas.len());
                        return ideas;
                    }
                    tracing::warn!("{} returned no ideas, using templates", generator.name());
                }
                Err(e) => tracing::warn!("Idea generation failed, using templates: {:#}", e),
            }
        }

        let topic = tags.first().map(String::as_str).unwrap_or(&self.fallback_topic);
        template_ideas(title, topic)
    }
}

/// The three deterministic ideas used when no generator answers
pub fn template_ideas(title: &str, topic: &str) -> Vec<String> {
    vec![
        format!("#Blog: An in-depth look at {} from '{}'", topic, title),
        format!("#NewVideo: Ideas for putting {} from '{}' to use", topic, title),
        format!("#Q&A: Answering viewer questions about '{}'", title),
    ]
}

/// ASCII word tokens of the lowercased text, followed by Hangul word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = runs(&lowered, |c| c.is_ascii_alphanumeric() || c == '_');
    tokens.extend(runs(text, is_hangul_syllable));
    tokens
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

fn runs(text: &str, accept: impl Fn(char) -> bool) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if accept(c) {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Split after `.`, `!` or `?` followed by spaces
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().map(|&(_, next)| next == ' ').unwrap_or(false) {
            let end = i + c.len_utf8();
            sentences.push(&text[start..end]);
            while let Some(&(_, ' ')) = chars.peek() {
                chars.next();
            }
            start = chars.peek().map(|&(j, _)| j).unwrap_or(text.len());
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Pseudo-segments with synthetic timing proportional to sentence length
pub fn synthesize_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut timestamp = 0.0;

    for sentence in split_sentences(text.trim()) {
        if sentence.trim().is_empty() {
            continue;
        }
        let span = sentence.chars().count() as f64 * 0.1;
        segments.push(Segment {
            start: timestamp,
            end: timestamp + span,
            text: sentence.trim().to_string(),
        });
        timestamp += span + 1.0;
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::generative::MockIdeaGenerator;
    use super::*;

    fn analyzer(generator: Option<Arc<dyn IdeaGenerator>>) -> ContentAnalyzer {
        ContentAnalyzer::new(AnalysisConfig::default(), generator)
    }

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            id: "v1".to_string(),
            title: "Pasta night".to_string(),
            uploader: "chef".to_string(),
            duration_seconds: Some(30.0),
            source_url: "https://example.com/v1".to_string(),
        }
    }

    #[test]
    fn tags_are_ordered_by_frequency() {
        assert_eq!(
            analyzer(None).extract_tags("dog dog cat cat cat bird"),
            vec!["cat", "dog", "bird"]
        );
    }

    #[test]
    fn ties_keep_first_occurrence() {
        assert_eq!(analyzer(None).extract_tags("aa aa bb bb"), vec!["aa", "bb"]);
        assert_eq!(analyzer(None).extract_tags("bb aa bb aa"), vec!["bb", "aa"]);
    }

    #[test]
    fn stopwords_and_single_chars_are_dropped() {
        let tags = analyzer(None).extract_tags("I a 그것 요리 요리 Pasta pasta 정말");
        assert_eq!(tags, vec!["pasta", "요리"]);
    }

    #[test]
    fn at_most_max_tags() {
        let tags = analyzer(None).extract_tags("one two three four five six seven");
        assert_eq!(tags.len(), 5);
        assert_eq!(tags[0], "one");
    }

    #[test]
    fn configured_max_tags_never_exceeds_five() {
        let config = AnalysisConfig {
            max_tags: 8,
            ..AnalysisConfig::default()
        };
        let tags = ContentAnalyzer::new(config, None).extract_tags("one two three four five six seven");
        assert_eq!(tags.len(), MAX_TAGS);
    }

    #[test]
    fn tokenizer_separates_scripts() {
        assert_eq!(tokenize("Hello, 세상 World_1!"), vec!["hello", "world_1", "세상"]);
    }

    #[test]
    fn sentences_get_synthetic_timing() {
        let segments = synthesize_segments("Hello there.  Second one! Last");
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello there.", "Second one!", "Last"]);

        assert_eq!(segments[0].start, 0.0);
        assert!((segments[0].end - 1.2).abs() < 1e-9);
        assert!((segments[1].start - 2.2).abs() < 1e-9);
        assert!(segments.windows(2).all(|w| w[1].start > w[0].end));
    }

    #[test]
    fn decimals_do_not_split_sentences() {
        assert_eq!(synthesize_segments("It costs 3.50 now. Ok").len(), 2);
    }

    #[tokio::test]
    async fn templates_without_generator() {
        let transcript = TranscriptResult::text_only("pasta pasta sauce. Boil water.");
        let result = analyzer(None).analyze(&metadata(), &transcript).await;

        assert_eq!(result.tags[0], "pasta");
        assert_eq!(result.content_ideas.len(), 3);
        assert!(result.content_ideas[0].contains("pasta"));
        assert!(result.content_ideas[0].contains("Pasta night"));
        assert_eq!(result.timestamped_summaries.len(), 2);
    }

    #[tokio::test]
    async fn templates_use_fallback_topic_without_tags() {
        let transcript = TranscriptResult::text_only("");
        let result = analyzer(None).analyze(&metadata(), &transcript).await;
        assert!(result.tags.is_empty());
        assert!(result.content_ideas[0].contains("main topic"));
        assert!(result.timestamped_summaries.is_empty());
    }

    #[tokio::test]
    async fn generator_lines_become_ideas() {
        let mut generator = MockIdeaGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt: &str| prompt.contains("Pasta night"))
            .times(1)
            .returning(|_| Ok("#Blog: sauces\n\n#NewVideo: knife skills\n".to_string()));
        generator.expect_name().return_const("mock".to_string());

        let transcript = TranscriptResult::from_raw(
            "pasta",
            vec![Segment {
                start: 0.0,
                end: 1.0,
                text: "pasta".to_string(),
            }],
        );
        let result = analyzer(Some(Arc::new(generator))).analyze(&metadata(), &transcript).await;

        assert_eq!(result.content_ideas, vec!["#Blog: sauces", "#NewVideo: knife skills"]);
        assert_eq!(result.timestamped_summaries, transcript.segments);
    }

    #[tokio::test]
    async fn generator_failure_falls_back() {
        let mut generator = MockIdeaGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(anyhow::anyhow!("quota exceeded")));
        generator.expect_name().return_const("mock".to_string());

        let transcript = TranscriptResult::text_only("pasta pasta");
        let result = analyzer(Some(Arc::new(generator))).analyze(&metadata(), &transcript).await;
        assert_eq!(result.content_ideas, template_ideas("Pasta night", "pasta"));
    }
}
