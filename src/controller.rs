//! Retrieval controller — the per-query state machine.
//!
//! Strictly sequential per query: retrieve → shrink-to-safe → publish →
//! gate → (generate) → return. Every boundary publishes a structured event.
//! Nothing here throws into the tool layer: failures surface as `ERROR:`
//! sentinels and privacy blocks as the literal `NO_CONTEXT` strings.

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::answer::{AnswerOrchestrator, AnswerRequest, NO_ANSWER};
use crate::config::GatewayConfig;
use crate::consent::ConsentGate;
use crate::embedding::{normalize_text, Embedder};
use crate::events::{EventBus, EventType};
use crate::memory::search::{self, SearchHit, SearchOptions};
use crate::memory::store;
use crate::privacy::{self, Confidence, RedactionResult, RiskLevel};

/// Returned when retrieval yielded zero rows.
pub const NO_CONTEXT_FOUND: &str = "NO_CONTEXT_FOUND";

/// Returned when blocked by low confidence or denied high risk.
pub const NO_CONTEXT: &str = "NO_CONTEXT";

pub struct RetrievalController {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<Embedder>,
    events: Arc<EventBus>,
    consent: Arc<ConsentGate>,
    orchestrator: AnswerOrchestrator,
    config: Arc<GatewayConfig>,
}

impl RetrievalController {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedder: Arc<Embedder>,
        events: Arc<EventBus>,
        consent: Arc<ConsentGate>,
        orchestrator: AnswerOrchestrator,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            db,
            embedder,
            events,
            consent,
            orchestrator,
            config,
        }
    }

    /// Handle one `query_personal_memory` call end to end.
    pub async fn handle_query(&self, topic: &str) -> String {
        self.events.publish(
            EventType::QueryReceived,
            serde_json::json!({ "topic": topic }),
        );

        // Retrieve.
        let hits = match self.retrieve(topic).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!(topic, error = %e, "retrieval failed");
                return format!("ERROR: {e}");
            }
        };
        if hits.is_empty() {
            return NO_CONTEXT_FOUND.to_string();
        }

        // Shrink-to-safe: prefer the longest prefix of results whose
        // redaction comes back confident and low-risk.
        let max_chars = self.config.retrieval.max_result_chars.clamp(120, 2000);
        let texts: Vec<String> = hits
            .iter()
            .map(|hit| truncate_chars(&hit.text, max_chars))
            .collect();
        let (context, redaction) = shrink_to_safe(&texts);

        // Publish the privacy outcome.
        let mut payload = serde_json::json!({
            "topic": topic,
            "redaction_count": redaction.redaction_count,
            "risk": redaction.risk_level.as_str(),
            "confidence": redaction.confidence.as_str(),
            "cleaned_text": redaction.cleaned_text,
        });
        if self.config.privacy.debug_include_raw {
            payload["original_context"] = serde_json::Value::String(context.clone());
        }
        self.events.publish(EventType::PrivacyProcessed, payload);

        // Gate.
        if redaction.confidence == Confidence::Low {
            self.events.publish(
                EventType::RiskBlocked,
                serde_json::json!({ "topic": topic, "reason": "low-confidence" }),
            );
            return NO_CONTEXT.to_string();
        }
        if redaction.risk_level == RiskLevel::High && !self.consume_consent(topic, &redaction) {
            return NO_CONTEXT.to_string();
        }

        // Generate (optional).
        if self.config.answer.enabled {
            self.events.publish(
                EventType::ArchestraRequest,
                serde_json::json!({
                    "topic": topic,
                    "provider": self.config.answer.provider,
                }),
            );

            let request = AnswerRequest {
                system_context: &redaction.cleaned_text,
                user_query: topic,
                redaction_count: redaction.redaction_count,
                risk_level: redaction.risk_level.as_str(),
            };
            let answer = self.orchestrator.generate(&request).await;

            if answer != NO_ANSWER {
                self.events.publish(
                    EventType::ArchestraResponse,
                    serde_json::json!({ "topic": topic, "success": true }),
                );
                return answer;
            }

            tracing::warn!(topic, "answer generation produced no grounded answer");
            self.events.publish(
                EventType::ArchestraResponse,
                serde_json::json!({
                    "topic": topic,
                    "success": false,
                    "error": "no grounded answer",
                }),
            );
            // Fall through to the default payload.
        }

        format!(
            "SANITIZED_CONTEXT:\n{}\n\nRedactions: {}\nRisk: {}",
            redaction.cleaned_text, redaction.redaction_count, redaction.risk_level
        )
    }

    /// Handle one `save_memory` call.
    pub async fn save_fact(&self, fact: Option<&str>, category: Option<&str>) -> String {
        let Some(fact) = fact.map(str::trim).filter(|f| !f.is_empty()) else {
            return "ERROR: 'fact' is required.".to_string();
        };
        let fact = normalize_text(fact);

        let embedding = match self.embedder.embed(&fact).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::error!(error = %e, "embedding failed for save_memory");
                return format!("ERROR: {e}");
            }
        };
        if embedding.is_empty() {
            tracing::warn!("empty embedding for save_memory, nothing written");
            return "ERROR: 'fact' is required.".to_string();
        }

        let db = Arc::clone(&self.db);
        let fact_owned = fact.clone();
        let category_owned = category.map(str::to_string);
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            store::save_user_fact(
                &mut conn,
                &fact_owned,
                category_owned.as_deref(),
                &embedding,
            )
        })
        .await;

        match result {
            Ok(Ok(id)) => {
                self.events.publish(
                    EventType::MemorySaved,
                    serde_json::json!({
                        "id": id,
                        "category": category,
                        "fact_len": fact.len(),
                    }),
                );
                format!("MEMORY_SAVED: {fact}")
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "save_memory write failed");
                format!("ERROR: {e}")
            }
            Err(e) => {
                tracing::error!(error = %e, "save_memory task failed");
                format!("ERROR: {e}")
            }
        }
    }

    /// Grant a one-shot consent token for a topic (dashboard surface).
    pub fn grant_consent(&self, topic: &str) {
        self.consent.grant(topic);
        self.events.publish(
            EventType::ConsentDecision,
            serde_json::json!({ "topic": topic, "approved": true }),
        );
    }

    /// Deny a pending consent request for a topic.
    pub fn deny_consent(&self, topic: &str) {
        self.consent.deny(topic);
        self.events.publish(
            EventType::ConsentDecision,
            serde_json::json!({ "topic": topic, "approved": false }),
        );
    }

    async fn retrieve(&self, topic: &str) -> anyhow::Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed(topic).await?;
        if query_embedding.is_empty() {
            return Ok(Vec::new());
        }

        let options = SearchOptions {
            scope: self.config.retrieval.scope,
            strict_match: self.config.retrieval.strict_match,
            k: self.config.retrieval.top_k.clamp(1, 10),
        };

        let db = Arc::clone(&self.db);
        let topic_owned = topic.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            search::search(&conn, &query_embedding, &topic_owned, &options)
        })
        .await?
    }

    /// High-risk gate. Returns `true` when a live consent token was consumed.
    fn consume_consent(&self, topic: &str, redaction: &RedactionResult) -> bool {
        if self.config.consent.enabled && self.consent.consume(topic) {
            tracing::info!(topic, "consent token consumed, releasing high-risk context");
            return true;
        }

        if self.config.consent.enabled {
            self.events.publish(
                EventType::ConsentRequired,
                serde_json::json!({
                    "topic": topic,
                    "cleaned_text": redaction.cleaned_text,
                    "redaction_count": redaction.redaction_count,
                }),
            );
        }
        self.events.publish(
            EventType::RiskBlocked,
            serde_json::json!({ "topic": topic, "reason": "high-risk" }),
        );
        false
    }
}

/// Build the numbered context string `[1] …\n[2] …` for a prefix of results.
fn build_context(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[{}] {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Redact the full context; if unsafe, progressively try prefixes of length
/// 1..N and accept the first safe one. Falls through with the full snapshot
/// when no prefix is safe.
fn shrink_to_safe(texts: &[String]) -> (String, RedactionResult) {
    let full_context = build_context(texts);
    let full = privacy::redact(&full_context);
    if is_safe(&full) {
        return (full_context, full);
    }

    for n in 1..texts.len() {
        let prefix_context = build_context(&texts[..n]);
        let redaction = privacy::redact(&prefix_context);
        if is_safe(&redaction) {
            return (prefix_context, redaction);
        }
    }

    (full_context, full)
}

fn is_safe(redaction: &RedactionResult) -> bool {
    redaction.confidence == Confidence::High && redaction.risk_level == RiskLevel::Low
}

/// Truncate to a character budget on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_lines_are_numbered() {
        let texts = vec!["first".to_string(), "second".to_string()];
        assert_eq!(build_context(&texts), "[1] first\n[2] second");
    }

    #[test]
    fn shrink_prefers_safe_prefix() {
        let texts = vec![
            "User likes coffee".to_string(),
            "SSN 123-45-6789".to_string(),
        ];
        let (context, redaction) = shrink_to_safe(&texts);
        assert_eq!(context, "[1] User likes coffee");
        assert_eq!(redaction.risk_level, RiskLevel::Low);
        assert_eq!(redaction.redaction_count, 0);
    }

    #[test]
    fn shrink_falls_through_with_full_snapshot() {
        let texts = vec!["card 4532-1234-5678-9010".to_string()];
        let (context, redaction) = shrink_to_safe(&texts);
        assert_eq!(context, "[1] card 4532-1234-5678-9010");
        assert_eq!(redaction.risk_level, RiskLevel::High);
        assert!(redaction.cleaned_text.contains("[REDACTED_CREDIT_CARD]"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
