//! Read path — vector KNN per store, lexical reranking, and the guardrail.
//!
//! [`search`] runs a similarity query over the in-scope tables, then reranks
//! with two lexical signals (phrase match and keyword hits) and applies the
//! lexical guardrail: when a query produced tokens, vector-only matches on
//! unrelated content are filtered out unless the query expresses a personal
//! intent whose shape the row satisfies.

use anyhow::Result;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::QueryScope;
use crate::db::schema::table_exists;
use crate::memory::embedding_to_bytes;
use crate::memory::types::Source;

// ── Public types ──────────────────────────────────────────────────────────────

/// A single search hit with its (boosted) vector distance. Lower is closer.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub source: Source,
    pub category: Option<String>,
    pub distance: f64,
}

/// Search configuration knobs.
pub struct SearchOptions {
    pub scope: QueryScope,
    pub strict_match: bool,
    pub k: usize,
}

/// Query classification for shape-based row filtering when lexical overlap
/// is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalIntent {
    Name,
    Phone,
    Email,
}

// ── Shape patterns for personal-intent filtering ──────────────────────────────

/// Multi-word title-case or all-caps name.
static RE_NAME_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+|[A-Z]{2,}(?:\s+[A-Z]{2,})+)\b")
        .expect("static pattern")
});

/// Phone-like digit run with optional punctuation.
static RE_PHONE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d()\s.\-]{7,}\d").expect("static pattern"));

static RE_EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("static pattern")
});

// ── Public API ────────────────────────────────────────────────────────────────

/// Hybrid search: per-table vector KNN → lexical rerank → guardrail → top k.
///
/// An empty query embedding returns no results. A failing table read is
/// logged and contributes nothing; the other table's hits still flow through.
pub fn search(
    conn: &Connection,
    query_embedding: &[f32],
    query_text: &str,
    opts: &SearchOptions,
) -> Result<Vec<SearchHit>> {
    if query_embedding.is_empty() || opts.k == 0 {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for source in in_scope(opts.scope) {
        match knn(conn, *source, query_embedding, opts.k) {
            Ok(rows) => candidates.extend(rows),
            Err(e) => {
                tracing::warn!(table = source.table(), error = %e, "table read failed, skipping");
            }
        }
    }

    let tokens = query_tokens(query_text);
    let normalized_query = normalize(query_text);
    for candidate in &mut candidates {
        let haystack = format!(
            "{} {} {}",
            candidate.hit.text,
            candidate.hit.category.as_deref().unwrap_or(""),
            candidate.hit.source.as_str()
        );
        candidate.phrase =
            !normalized_query.is_empty() && normalize(&haystack).contains(&normalized_query);
        candidate.hits = keyword_hits(&tokens, &haystack);

        // Rank boosts scale distance downward.
        if candidate.phrase {
            candidate.hit.distance *= 0.5;
        } else if candidate.hits > 0 {
            candidate.hit.distance *= (1.0 - 0.1 * candidate.hits as f64).max(0.6);
        }
    }

    // Lexical guardrail.
    if !tokens.is_empty() {
        let any_lexical = candidates.iter().any(|c| c.phrase || c.hits > 0);
        if any_lexical {
            candidates.retain(|c| c.phrase || c.hits > 0);
        } else {
            let intents = personal_intents(query_text);
            if !intents.is_empty() {
                candidates.retain(|c| matches_any_intent(&c.hit.text, &intents));
            } else if opts.strict_match {
                return Ok(Vec::new());
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.hit
            .distance
            .partial_cmp(&b.hit.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen: HashSet<String> = HashSet::new();
    let mut results: Vec<SearchHit> = Vec::new();
    for candidate in candidates {
        if seen.insert(candidate.hit.text.clone()) {
            results.push(candidate.hit);
        }
        if results.len() >= opts.k {
            break;
        }
    }

    Ok(results)
}

/// Detect personal intents from the words of the query.
pub fn personal_intents(query: &str) -> Vec<PersonalIntent> {
    let words: HashSet<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let mut intents = Vec::new();
    if words.contains("name") {
        intents.push(PersonalIntent::Name);
    }
    if ["phone", "mobile", "contact"].iter().any(|w| words.contains(*w)) {
        intents.push(PersonalIntent::Phone);
    }
    if words.contains("email") {
        intents.push(PersonalIntent::Email);
    }
    intents
}

/// Whether a row's text satisfies the shape of any detected intent.
pub fn matches_any_intent(text: &str, intents: &[PersonalIntent]) -> bool {
    intents.iter().any(|intent| match intent {
        PersonalIntent::Name => RE_NAME_SHAPE.is_match(text),
        PersonalIntent::Phone => RE_PHONE_SHAPE.is_match(text),
        PersonalIntent::Email => RE_EMAIL_SHAPE.is_match(text),
    })
}

/// Tokenize a query: lowercase, split on non-alphanumerics, drop stopwords
/// and single characters.
pub fn query_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Count distinct query tokens that match any token in the haystack via
/// prefix-or-equality, with light morphological expansion of the query token.
pub fn keyword_hits(tokens: &[String], haystack: &str) -> usize {
    if tokens.is_empty() {
        return 0;
    }
    let row_tokens: Vec<String> = haystack
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    tokens
        .iter()
        .filter(|token| {
            token_variants(token)
                .iter()
                .any(|v| row_tokens.iter().any(|rt| rt.starts_with(v)))
        })
        .count()
}

// ── Internal helpers ──────────────────────────────────────────────────────────

struct Candidate {
    hit: SearchHit,
    phrase: bool,
    hits: usize,
}

fn in_scope(scope: QueryScope) -> &'static [Source] {
    match scope {
        QueryScope::Hybrid => &[Source::Document, Source::UserFact],
        QueryScope::FactsOnly => &[Source::UserFact],
        QueryScope::DocumentsOnly => &[Source::Document],
    }
}

/// Vector KNN over one table pair. Returns hydrated candidates with their
/// raw L2 distance.
///
/// The KNN query must run against the vec0 table alone (it requires its own
/// LIMIT); rows are hydrated in a second step.
fn knn(
    conn: &Connection,
    source: Source,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<Candidate>> {
    if !table_exists(conn, source.table())? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT id, distance FROM {} WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        source.vec_table()
    ))?;
    let nearest: Vec<(String, f64)> = stmt
        .query_map(params![embedding_to_bytes(embedding), limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut row_stmt = conn.prepare(&format!(
        "SELECT text, category FROM {} WHERE id = ?1",
        source.table()
    ))?;

    let mut candidates = Vec::with_capacity(nearest.len());
    for (id, distance) in nearest {
        let row: Option<(String, Option<String>)> = row_stmt
            .query_row(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        if let Some((text, category)) = row {
            candidates.push(Candidate {
                hit: SearchHit {
                    text,
                    source,
                    category,
                    distance,
                },
                phrase: false,
                hits: 0,
            });
        }
    }

    Ok(candidates)
}

/// Lowercase and collapse interior whitespace.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Morphological variants of a query token: the token itself plus stripped
/// plural/tense/derivation suffixes.
fn token_variants(token: &str) -> Vec<String> {
    let mut variants = vec![token.to_string()];
    let mut push = |v: String| {
        if v.len() >= 2 && !variants.contains(&v) {
            variants.push(v);
        }
    };

    if let Some(stem) = token.strip_suffix("ies") {
        push(format!("{stem}y"));
    }
    for suffix in ["ences", "ence", "ing", "ed", "es", "s"] {
        if let Some(stem) = token.strip_suffix(suffix) {
            push(stem.to_string());
        }
    }
    variants
}

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "do", "for", "from", "had",
        "has", "have", "how", "if", "in", "is", "it", "its", "me", "my", "no", "not", "of",
        "on", "or", "our", "so", "that", "the", "then", "this", "to", "was", "we", "were",
        "what", "when", "where", "which", "who", "will", "with", "you", "your",
    ]
    .into_iter()
    .collect()
});
