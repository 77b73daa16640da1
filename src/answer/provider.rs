//! Remote answer providers and the routing helpers shared by both branches.
//!
//! Provider aliases normalize onto two branches: OpenAI-compatible chat
//! completions and Gemini `generateContent`. Base URLs accept either a
//! fully-composed proxy URL containing the profile segment, or a base plus a
//! separate profile id to be joined.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AnswerGenerator;
use crate::config::AnswerConfig;

/// The two provider branches every alias resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAiCompatible,
    Gemini,
}

/// Normalize a provider alias. `google` routes to Gemini; `chatgpt`,
/// `claude`, `anthropic`, and `openai-compatible` all route to the
/// OpenAI-compatible branch.
pub fn normalize_alias(alias: &str) -> Option<ProviderKind> {
    match alias.trim().to_lowercase().as_str() {
        "gemini" | "google" => Some(ProviderKind::Gemini),
        "openai" | "openai-compatible" | "chatgpt" | "claude" | "anthropic" => {
            Some(ProviderKind::OpenAiCompatible)
        }
        _ => None,
    }
}

/// Join a base URL with a profile id unless the base already carries the
/// profile segment.
pub fn compose_base_url(base_url: &str, profile_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if profile_id.is_empty() || base.contains(profile_id) {
        base.to_string()
    } else {
        format!("{base}/{profile_id}")
    }
}

/// Normalize a Gemini base URL to end in the versioned endpoint path.
pub fn normalize_gemini_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.ends_with("/v1beta") || url.ends_with("/v1") {
        url.to_string()
    } else {
        format!("{url}/v1beta")
    }
}

/// Build the generator configured for the answer orchestrator, or `None`
/// when extractive-only mode is in effect.
pub fn build_generator(config: &AnswerConfig) -> Result<Option<Arc<dyn AnswerGenerator>>> {
    if !config.enabled || config.extractive_only {
        return Ok(None);
    }

    let kind = normalize_alias(&config.provider)
        .with_context(|| format!("unknown answer provider alias: {}", config.provider))?;

    let generator: Arc<dyn AnswerGenerator> = match kind {
        ProviderKind::OpenAiCompatible => Arc::new(OpenAiCompatGenerator::new(
            &compose_base_url(&config.base_url, &config.profile_id),
            &config.api_key,
            &config.model,
        )),
        ProviderKind::Gemini => Arc::new(GeminiGenerator::new(
            &normalize_gemini_url(&compose_base_url(&config.base_url, &config.profile_id)),
            &config.api_key,
            &config.model,
        )),
    };
    Ok(Some(generator))
}

// ── OpenAI-compatible branch ──────────────────────────────────────────────────

pub struct OpenAiCompatGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiCompatGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiCompatGenerator {
    async fn generate(&self, system_prompt: &str, user_query: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: system_prompt,
                    },
                    ChatMessage {
                        role: "user",
                        content: user_query,
                    },
                ],
            })
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("answer provider returned {status}: {body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse chat completion response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat completion contained no choices"))
    }
}

// ── Gemini branch ─────────────────────────────────────────────────────────────

pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    system_instruction: ContentBlock<'a>,
    contents: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
struct ContentBlock<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

impl GeminiGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, system_prompt: &str, user_query: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateContentRequest {
                system_instruction: ContentBlock {
                    parts: vec![TextPart {
                        text: system_prompt,
                    }],
                },
                contents: vec![ContentBlock {
                    parts: vec![TextPart { text: user_query }],
                }],
            })
            .send()
            .await
            .context("generateContent request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("answer provider returned {status}: {body}");
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("failed to parse generateContent response")?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow::anyhow!("generateContent contained no candidates"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_normalize_to_two_branches() {
        assert_eq!(normalize_alias("google"), Some(ProviderKind::Gemini));
        assert_eq!(normalize_alias("gemini"), Some(ProviderKind::Gemini));
        for alias in ["chatgpt", "claude", "anthropic", "openai-compatible", "openai"] {
            assert_eq!(
                normalize_alias(alias),
                Some(ProviderKind::OpenAiCompatible),
                "{alias}"
            );
        }
        assert_eq!(normalize_alias("cohere"), None);
    }

    #[test]
    fn base_url_composition() {
        assert_eq!(
            compose_base_url("https://gw.local/v1", "p-123"),
            "https://gw.local/v1/p-123"
        );
        // Already-composed proxy URLs pass through.
        assert_eq!(
            compose_base_url("https://gw.local/v1/p-123/", "p-123"),
            "https://gw.local/v1/p-123"
        );
        assert_eq!(compose_base_url("https://gw.local/v1", ""), "https://gw.local/v1");
    }

    #[test]
    fn gemini_url_normalization() {
        assert_eq!(
            normalize_gemini_url("https://generativelanguage.googleapis.com"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(
            normalize_gemini_url("https://generativelanguage.googleapis.com/v1beta/"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }

    #[test]
    fn chat_request_shape() {
        let req = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "policy",
                },
                ChatMessage {
                    role: "user",
                    content: "question",
                },
            ],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "question");
    }

    #[test]
    fn gemini_request_shape() {
        let req = GenerateContentRequest {
            system_instruction: ContentBlock {
                parts: vec![TextPart { text: "policy" }],
            },
            contents: vec![ContentBlock {
                parts: vec![TextPart { text: "question" }],
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "policy");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "question");
    }

    #[test]
    fn provider_responses_parse() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#,
        )
        .unwrap();
        assert_eq!(chat.choices[0].message.content, "hi");

        let gemini: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"hi"}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(gemini.candidates[0].content.parts[0].text, "hi");
    }

    #[test]
    fn build_generator_respects_extractive_mode() {
        let config = AnswerConfig::default();
        assert!(build_generator(&config).unwrap().is_none());

        let mut config = AnswerConfig::default();
        config.enabled = true;
        config.extractive_only = false;
        config.provider = "unknown-llm".into();
        assert!(build_generator(&config).is_err());

        config.provider = "google".into();
        config.base_url = "https://gw.local".into();
        config.profile_id = "p-1".into();
        config.api_key = "AIzaKey".into();
        config.model = "gemini-2.0-flash".into();
        assert!(build_generator(&config).unwrap().is_some());
    }
}
