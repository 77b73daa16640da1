//! File ingestion — chunking plain-text files into the document store.
//!
//! Deliberately minimal: plain-text formats only, no watching. The manifest
//! skips files whose size and mtime are unchanged, and an in-flight set
//! coalesces duplicate ingests of the same path so a second request while a
//! file is being processed is ignored.

pub mod manifest;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::embedding::Embedder;
use crate::events::{EventBus, EventType};
use crate::memory::store;
use manifest::{IngestManifest, ManifestEntry};

/// File extensions the ingest path accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Default ceiling on characters per stored chunk.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1200;

/// Result of one ingest request.
#[derive(Debug)]
pub struct IngestOutcome {
    pub file: String,
    pub chunks: usize,
    pub skipped: bool,
}

pub struct Ingestor {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<Embedder>,
    events: Arc<EventBus>,
    manifest: IngestManifest,
    in_flight: Mutex<HashSet<String>>,
    max_chunk_chars: usize,
}

impl Ingestor {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedder: Arc<Embedder>,
        events: Arc<EventBus>,
        manifest: IngestManifest,
    ) -> Self {
        Self {
            db,
            embedder,
            events,
            manifest,
            in_flight: Mutex::new(HashSet::new()),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }

    /// Ingest one file: validate extension, skip if unchanged or already in
    /// flight, else chunk, embed, and store. Publishes `ingest_success` /
    /// `ingest_error`.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome> {
        let file = path.to_string_lossy().into_owned();

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            let error = format!("unsupported file extension: .{extension}");
            self.events.publish(
                EventType::IngestError,
                serde_json::json!({ "file": file, "error": error }),
            );
            bail!(error);
        }

        // Coalesce duplicate requests for a file already being processed.
        {
            let Ok(mut in_flight) = self.in_flight.lock() else {
                bail!("in-flight set unavailable");
            };
            if !in_flight.insert(file.clone()) {
                tracing::debug!(file = %file, "ingest already in flight, ignoring");
                return Ok(IngestOutcome {
                    file,
                    chunks: 0,
                    skipped: true,
                });
            }
        }

        let result = self.ingest_inner(path, &file).await;

        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&file);
        }

        if let Err(e) = &result {
            self.events.publish(
                EventType::IngestError,
                serde_json::json!({ "file": file, "error": e.to_string() }),
            );
        }
        result
    }

    async fn ingest_inner(&self, path: &Path, file: &str) -> Result<IngestOutcome> {
        let entry = ManifestEntry::for_file(path)
            .with_context(|| format!("failed to stat {file}"))?;
        if self.manifest.is_current(file, entry) {
            tracing::debug!(file = %file, "unchanged since last ingest, skipping");
            return Ok(IngestOutcome {
                file: file.to_string(),
                chunks: 0,
                skipped: true,
            });
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {file}"))?;

        let chunks = chunk_text(&contents, self.max_chunk_chars);
        let mut embedded: Vec<(String, Vec<f32>)> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self.embedder.embed(&chunk).await?;
            if embedding.is_empty() {
                tracing::warn!(file = %file, "empty embedding for chunk, skipping write");
                continue;
            }
            embedded.push((chunk, embedding));
        }

        let db = Arc::clone(&self.db);
        let file_owned = file.to_string();
        let stored = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            let mut stored = 0usize;
            for (chunk, embedding) in &embedded {
                store::save_document(&mut conn, chunk, &file_owned, embedding)?;
                stored += 1;
            }
            Ok(stored)
        })
        .await
        .context("ingest write task failed")??;

        self.manifest.record(file.to_string(), entry);
        self.events.publish(
            EventType::IngestSuccess,
            serde_json::json!({ "file": file, "chunks": stored }),
        );
        tracing::info!(file = %file, chunks = stored, "file ingested");

        Ok(IngestOutcome {
            file: file.to_string(),
            chunks: stored,
            skipped: false,
        })
    }
}

/// Split text into chunks on paragraph boundaries, capping each chunk at
/// `max_chars`. Oversized paragraphs are split at character boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        for piece in split_oversized(paragraph, max_chars) {
            if current.is_empty() {
                current = piece;
            } else if current.len() + piece.len() + 2 <= max_chars {
                current.push_str("\n\n");
                current.push_str(&piece);
            } else {
                chunks.push(std::mem::replace(&mut current, piece));
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_oversized(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.len() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in paragraph.chars() {
        current.push(c);
        if current.len() >= max_chars {
            pieces.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn chunking_splits_on_paragraphs() {
        let text = "First paragraph.\n\nSecond paragraph.\n\n\n\nThird.";
        let chunks = chunk_text(text, 25);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "First paragraph.");
    }

    #[test]
    fn chunking_packs_small_paragraphs_together() {
        let text = "one\n\ntwo\n\nthree";
        let chunks = chunk_text(text, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "one\n\ntwo\n\nthree");
    }

    #[test]
    fn oversized_paragraphs_are_split() {
        let text = "a".repeat(100);
        let chunks = chunk_text(&text, 30);
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| c.len() <= 30));
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text("\n\n\n\n", 100).is_empty());
    }

    fn test_ingestor() -> Ingestor {
        let conn = db::open_memory_database().unwrap();
        Ingestor::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(Embedder::local(16)),
            Arc::new(EventBus::default()),
            IngestManifest::ephemeral(),
        )
    }

    #[tokio::test]
    async fn ingest_writes_document_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "First note.\n\nSecond note.").unwrap();

        let ingestor = test_ingestor();
        let outcome = ingestor.ingest_file(&path).await.unwrap();
        assert!(!outcome.skipped);
        assert_eq!(outcome.chunks, 1); // both paragraphs fit one chunk

        let conn = ingestor.db.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let category: String = conn
            .query_row("SELECT category FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(category, "notes.txt");
    }

    #[tokio::test]
    async fn unchanged_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "Some content here.").unwrap();

        let ingestor = test_ingestor();
        let first = ingestor.ingest_file(&path).await.unwrap();
        assert!(!first.skipped);

        let second = ingestor.ingest_file(&path).await.unwrap();
        assert!(second.skipped);
        assert_eq!(second.chunks, 0);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_with_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, "not really a png").unwrap();

        let ingestor = test_ingestor();
        let result = ingestor.ingest_file(&path).await;
        assert!(result.is_err());

        let events = ingestor.events.replay();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::IngestError);
        assert!(events[0].payload["error"]
            .as_str()
            .unwrap()
            .contains("unsupported"));
    }

    #[tokio::test]
    async fn success_event_carries_chunk_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, format!("{}\n\n{}", "x".repeat(900), "y".repeat(900))).unwrap();

        let ingestor = test_ingestor();
        let outcome = ingestor.ingest_file(&path).await.unwrap();
        assert_eq!(outcome.chunks, 2);

        let events = ingestor.events.replay();
        assert_eq!(events[0].event_type, EventType::IngestSuccess);
        assert_eq!(events[0].payload["chunks"], 2);
    }
}
