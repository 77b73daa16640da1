//! Store + search + redaction working together through the library surface.

mod helpers;

use helpers::{gateway, seed_document, seed_fact};
use memgate::memory::search::{search, SearchOptions};
use memgate::memory::store;
use memgate::memory::types::Source;
use memgate::privacy::redact;

#[tokio::test]
async fn recall_and_redact_mixed_documents() {
    let gw = gateway();
    seed_document(&gw, "My number is 9876543210.", "contacts.txt").await;
    seed_document(&gw, "I earn $100k.", "salary.txt").await;

    let query_embedding = gw.embedder.embed("number").await.unwrap();
    let conn = gw.db.lock().unwrap();
    let hits = search(
        &conn,
        &query_embedding,
        "number",
        &SearchOptions {
            scope: memgate::config::QueryScope::Hybrid,
            strict_match: true,
            k: 5,
        },
    )
    .unwrap();

    assert!(!hits.is_empty());
    let joined = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let result = redact(&joined);
    assert!(result.cleaned_text.contains("[REDACTED_PHONE]"));
    assert!(result.redaction_count >= 1);
}

#[tokio::test]
async fn facts_and_documents_are_separate_stores() {
    let gw = gateway();
    seed_document(&gw, "Document about project kickoff", "kickoff.md").await;
    seed_fact(&gw, "Prefers project updates by mail", Some("work")).await;

    let mut conn = gw.db.lock().unwrap();
    assert_eq!(store::recent(&conn, 10).unwrap().len(), 2);

    // Clearing facts leaves documents untouched, and vice versa.
    assert_eq!(store::clear_user_facts(&mut conn).unwrap(), 1);
    let remaining = store::recent(&conn, 10).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].source, Source::Document);

    assert_eq!(store::clear_documents(&mut conn).unwrap(), 1);
    assert!(store::recent(&conn, 10).unwrap().is_empty());
}

#[tokio::test]
async fn delete_by_source_file_removes_only_that_files_chunks() {
    let gw = gateway();
    seed_document(&gw, "Alpha chunk one", "/notes/alpha.md").await;
    seed_document(&gw, "Alpha chunk two", "/notes/alpha.md").await;
    seed_document(&gw, "Beta chunk", "/notes/beta.md").await;

    let mut conn = gw.db.lock().unwrap();
    let deleted = store::delete_documents_by_source(&mut conn, "alpha.md").unwrap();
    assert_eq!(deleted, 2);

    let remaining = store::recent(&conn, 10).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].category.as_deref(), Some("beta.md"));
}

#[tokio::test]
async fn same_query_embeds_identically_across_calls() {
    let gw = gateway();
    let a = gw.embedder.embed("stable embedding input").await.unwrap();
    let b = gw.embedder.embed("stable embedding input").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), helpers::DIM);
}
