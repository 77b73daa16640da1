//! Answer orchestration — strict-grounding wrapper around an external
//! generator, with a deterministic extractive fallback.
//!
//! A remote response is accepted only if it is grounded in the sanitized
//! context (equal to, or a substring of, some context line depending on the
//! [`GroundingMode`]). Rejected or failed generations fall back to
//! extractive selection; when extraction also fails, the fixed
//! [`NO_ANSWER`] string is returned unchanged.

pub mod provider;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GroundingMode;
use crate::memory::search;

/// Fixed fallback string. The remote system prompt instructs the model to
/// return exactly this when the context does not contain the answer.
pub const NO_ANSWER: &str = "NO_ANSWER_FOUND";

/// A remote text generator (OpenAI-compatible or Gemini-style).
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_query: &str) -> Result<String>;
}

/// Inputs to one generation call.
pub struct AnswerRequest<'a> {
    pub system_context: &'a str,
    pub user_query: &'a str,
    pub redaction_count: usize,
    pub risk_level: &'a str,
}

pub struct AnswerOrchestrator {
    generator: Option<Arc<dyn AnswerGenerator>>,
    grounding: GroundingMode,
}

impl AnswerOrchestrator {
    /// Extractive-only orchestrator: no remote calls, deterministic output.
    pub fn extractive() -> Self {
        Self {
            generator: None,
            grounding: GroundingMode::Excerpt,
        }
    }

    /// Orchestrator that routes through a remote generator, enforcing the
    /// given grounding mode on every response.
    pub fn with_generator(generator: Arc<dyn AnswerGenerator>, grounding: GroundingMode) -> Self {
        Self {
            generator: Some(generator),
            grounding,
        }
    }

    /// Produce an answer for the sanitized context. Never fails into the
    /// caller: provider errors and grounding rejections degrade to
    /// extractive selection, then to [`NO_ANSWER`].
    pub async fn generate(&self, request: &AnswerRequest<'_>) -> String {
        if let Some(generator) = &self.generator {
            let system_prompt = build_system_prompt(request);
            match generator.generate(&system_prompt, request.user_query).await {
                Ok(answer) => {
                    let answer = answer.trim().to_string();
                    if answer != NO_ANSWER
                        && is_grounded(&answer, request.system_context, self.grounding)
                    {
                        return answer;
                    }
                    tracing::debug!("generator response rejected, falling back to extraction");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "generation failed, falling back to extraction");
                }
            }
        }

        extractive_answer(request.system_context, request.user_query)
            .unwrap_or_else(|| NO_ANSWER.to_string())
    }
}

/// System prompt enforcing verbatim-from-context answering.
fn build_system_prompt(request: &AnswerRequest<'_>) -> String {
    format!(
        "You answer questions about the user's personal memory.\n\
         Answer ONLY with text copied verbatim from the context below.\n\
         If the context does not contain the answer, reply exactly {NO_ANSWER}.\n\
         The context was sanitized ({} redactions, risk {}).\n\n\
         Context:\n{}",
        request.redaction_count, request.risk_level, request.system_context
    )
}

/// Best matching context line by tokenized lexical overlap with the query,
/// honoring the personal-intent heuristics. `None` when no line scores
/// above zero.
pub fn extractive_answer(context: &str, query: &str) -> Option<String> {
    let tokens = search::query_tokens(query);
    let intents = search::personal_intents(query);

    let mut best: Option<(usize, &str)> = None;
    for line in context.lines() {
        let line = strip_line_number(line).trim();
        if line.is_empty() {
            continue;
        }

        let mut score = search::keyword_hits(&tokens, line);
        if !intents.is_empty() && search::matches_any_intent(line, &intents) {
            score += 2;
        }

        if score > 0 && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, line));
        }
    }

    best.map(|(_, line)| line.to_string())
}

/// Grounding check: after whitespace normalization, the answer must equal
/// (exact mode) or be contained in (excerpt mode) some context line.
fn is_grounded(answer: &str, context: &str, mode: GroundingMode) -> bool {
    let normalized_answer = normalize_ws(answer);
    if normalized_answer.is_empty() {
        return false;
    }

    context.lines().any(|line| {
        let line = normalize_ws(strip_line_number(line));
        match mode {
            GroundingMode::Exact => line == normalized_answer,
            GroundingMode::Excerpt => line.contains(&normalized_answer),
        }
    })
}

/// Strip a leading `[n] ` marker from a numbered context line.
fn strip_line_number(line: &str) -> &str {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some(end) = rest.find("] ") {
            if rest[..end].chars().all(|c| c.is_ascii_digit()) && !rest[..end].is_empty() {
                return &rest[end + 2..];
            }
        }
    }
    trimmed
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl AnswerGenerator for FixedGenerator {
        async fn generate(&self, _system_prompt: &str, _user_query: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn generate(&self, _system_prompt: &str, _user_query: &str) -> Result<String> {
            anyhow::bail!("provider unavailable")
        }
    }

    fn request<'a>(context: &'a str, query: &'a str) -> AnswerRequest<'a> {
        AnswerRequest {
            system_context: context,
            user_query: query,
            redaction_count: 0,
            risk_level: "LOW",
        }
    }

    #[test]
    fn extraction_picks_best_overlap_line() {
        let context = "[1] User likes to drink Black Coffee.\n[2] User works remotely.";
        let answer = extractive_answer(context, "What coffee do I like?").unwrap();
        assert_eq!(answer, "User likes to drink Black Coffee.");
    }

    #[test]
    fn extraction_returns_none_without_overlap() {
        let context = "[1] User works remotely.";
        assert!(extractive_answer(context, "favorite dessert?").is_none());
    }

    #[test]
    fn extraction_honors_personal_intent() {
        let context = "[1] JOHN DOE\n[2] Lives somewhere sunny.";
        let answer = extractive_answer(context, "what is my name").unwrap();
        assert_eq!(answer, "JOHN DOE");
    }

    #[test]
    fn grounding_excerpt_accepts_substrings() {
        let context = "[1] User likes to drink Black Coffee.";
        assert!(is_grounded("Black Coffee", context, GroundingMode::Excerpt));
        assert!(!is_grounded("Black Coffee", context, GroundingMode::Exact));
        assert!(is_grounded(
            "User likes to drink Black Coffee.",
            context,
            GroundingMode::Exact
        ));
        assert!(!is_grounded("Green Tea", context, GroundingMode::Excerpt));
    }

    #[test]
    fn line_numbers_are_stripped() {
        assert_eq!(strip_line_number("[1] hello"), "hello");
        assert_eq!(strip_line_number("[12] hi"), "hi");
        assert_eq!(strip_line_number("no marker"), "no marker");
        assert_eq!(strip_line_number("[x] not a number"), "[x] not a number");
    }

    #[tokio::test]
    async fn ungrounded_response_is_replaced_by_extraction() {
        let orchestrator = AnswerOrchestrator::with_generator(
            Arc::new(FixedGenerator("You enjoy artisanal espresso blends")),
            GroundingMode::Excerpt,
        );
        let context = "[1] User likes to drink Black Coffee.";
        let answer = orchestrator
            .generate(&request(context, "What coffee do I like?"))
            .await;
        assert_eq!(answer, "User likes to drink Black Coffee.");
    }

    #[tokio::test]
    async fn fallback_response_is_replaced_by_extraction() {
        let orchestrator = AnswerOrchestrator::with_generator(
            Arc::new(FixedGenerator(NO_ANSWER)),
            GroundingMode::Excerpt,
        );
        let context = "[1] User likes to drink Black Coffee.";
        let answer = orchestrator
            .generate(&request(context, "What coffee do I like?"))
            .await;
        assert_eq!(answer, "User likes to drink Black Coffee.");
    }

    #[tokio::test]
    async fn grounded_response_is_returned_verbatim() {
        let orchestrator = AnswerOrchestrator::with_generator(
            Arc::new(FixedGenerator("Black Coffee")),
            GroundingMode::Excerpt,
        );
        let context = "[1] User likes to drink Black Coffee.";
        let answer = orchestrator
            .generate(&request(context, "What coffee do I like?"))
            .await;
        assert_eq!(answer, "Black Coffee");
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_extraction() {
        let orchestrator = AnswerOrchestrator::with_generator(
            Arc::new(FailingGenerator),
            GroundingMode::Excerpt,
        );
        let context = "[1] User likes to drink Black Coffee.";
        let answer = orchestrator
            .generate(&request(context, "What coffee do I like?"))
            .await;
        assert_eq!(answer, "User likes to drink Black Coffee.");
    }

    #[tokio::test]
    async fn everything_failing_returns_the_fixed_fallback() {
        let orchestrator = AnswerOrchestrator::extractive();
        let answer = orchestrator
            .generate(&request("[1] Unrelated line.", "favorite dessert?"))
            .await;
        assert_eq!(answer, NO_ANSWER);
    }
}
