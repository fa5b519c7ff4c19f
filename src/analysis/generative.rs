use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::utils::truncate_chars;

/// A text generation service asked for content ideas
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdeaGenerator: Send + Sync {
    /// Send `prompt` and return the raw response text
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> String;
}

/// Prompt asking for blog post and follow-up video ideas
pub fn build_prompt(title: &str, transcript: &str, max_transcript_chars: usize) -> String {
    format!(
        "You are a content strategist. Based on the video below, propose ideas for blog \
         posts and new videos. Write one idea per line, prefixed with #Blog: or #NewVideo:.\n\n\
         Video title: {}\n\nTranscript:\n{}\n",
        title,
        truncate_chars(transcript, max_transcript_chars)
    )
}

/// Each non-empty trimmed line of a response is one idea
pub fn parse_ideas(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationParams,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Text of the first candidate; alternates are ignored
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<serde_json::Value>,
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(config: GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!("Idea generation: {} at {}", config.model, config.endpoint);

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    /// Client from configuration, or None when generation is disabled or no key is set
    pub fn from_config(config: &GenerationConfig) -> Option<Arc<dyn IdeaGenerator>> {
        if !config.enabled {
            return None;
        }
        let Some(api_key) = config.resolved_api_key() else {
            tracing::warn!("No generation API key configured, using template ideas");
            return None;
        };

        match Self::new(config.clone(), api_key) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Idea generation unavailable: {:#}", e);
                None
            }
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl IdeaGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationParams {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.config.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error_msg = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.to_string())
                .unwrap_or(body);
            anyhow::bail!("Generation API error ({}): {}", status, error_msg);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse generation response")?;

        Ok(body.into_text())
    }

    fn name(&self) -> String {
        self.config.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_truncates_transcript() {
        let transcript = "가".repeat(3000);
        let prompt = build_prompt("Title", &transcript, 2000);
        assert!(prompt.contains("Video title: Title"));
        assert_eq!(prompt.matches('가').count(), 2000);
    }

    #[test]
    fn ideas_are_non_empty_lines() {
        let ideas = parse_ideas("#Blog: one\n\n   \n  #NewVideo: two  \n");
        assert_eq!(ideas, vec!["#Blog: one", "#NewVideo: two"]);
    }

    #[test]
    fn disabled_config_has_no_client() {
        let disabled = GenerationConfig {
            enabled: false,
            api_key: Some("key".to_string()),
            ..GenerationConfig::default()
        };
        assert!(GeminiClient::from_config(&disabled).is_none());

        let keyed = GenerationConfig {
            api_key: Some("key".to_string()),
            ..GenerationConfig::default()
        };
        let client = GeminiClient::from_config(&keyed).unwrap();
        assert_eq!(client.name(), keyed.model);
    }

    #[test]
    fn response_text_comes_from_first_candidate_only() {
        let json = r##"{"candidates":[
            {"content":{"parts":[{"text":"#Blog: a\n"},{"text":"#NewVideo: b"}]}},
            {"content":{"parts":[{"text":"#Blog: alternate"}]}}
        ]}"##;
        let body: GenerateResponse = serde_json::from_str(json).unwrap();
        let text = body.into_text();
        assert_eq!(parse_ideas(&text), vec!["#Blog: a", "#NewVideo: b"]);
    }

    #[test]
    fn response_without_candidates_is_empty() {
        let body: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(body.into_text(), "");
        let body: GenerateResponse = serde_json::from_str(r#"{"candidates":[{}]}"#).unwrap();
        assert_eq!(body.into_text(), "");
    }
}
