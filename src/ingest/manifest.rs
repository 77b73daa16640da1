//! Ingestion manifest — skip re-ingest of unchanged files.
//!
//! Maps absolute file path to `{mtimeMs, size}`. All file mutations funnel
//! through a single writer task fed by a channel, so concurrent ingests can
//! never truncate the manifest mid-write.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Size and mtime fingerprint of an ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "mtimeMs")]
    pub mtime_ms: u64,
    pub size: u64,
}

impl ManifestEntry {
    /// Fingerprint a file on disk.
    pub fn for_file(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime_ms = meta
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Self {
            mtime_ms,
            size: meta.len(),
        })
    }
}

pub struct IngestManifest {
    entries: Mutex<HashMap<String, ManifestEntry>>,
    writer: Option<tokio::sync::mpsc::UnboundedSender<String>>,
}

impl IngestManifest {
    /// Load the manifest and spawn its writer task. Must be called from
    /// within a tokio runtime. A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = load_entries(&path);
        Self {
            entries: Mutex::new(entries),
            writer: Some(spawn_writer(path)),
        }
    }

    /// In-memory manifest with no persistence (tests).
    pub fn ephemeral() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            writer: None,
        }
    }

    /// Whether the file at `path` is unchanged since its last ingest.
    pub fn is_current(&self, path: &str, entry: ManifestEntry) -> bool {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(path).copied())
            .map(|stored| stored == entry)
            .unwrap_or(false)
    }

    /// Record a completed ingest and queue a persist.
    pub fn record(&self, path: String, entry: ManifestEntry) {
        let snapshot = {
            let Ok(mut entries) = self.entries.lock() else {
                return;
            };
            entries.insert(path, entry);
            serde_json::to_string_pretty(&*entries).ok()
        };

        if let (Some(writer), Some(json)) = (&self.writer, snapshot) {
            let _ = writer.send(json);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_entries(path: &Path) -> HashMap<String, ManifestEntry> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "manifest unreadable, starting empty");
            HashMap::new()
        }),
        Err(_) => HashMap::new(),
    }
}

/// The single task that owns the manifest file. Serializing writes through
/// one consumer prevents concurrent truncation.
fn spawn_writer(path: PathBuf) -> tokio::sync::mpsc::UnboundedSender<String> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            let tmp = path.with_extension("tmp");
            let result = tokio::fs::write(&tmp, &json).await;
            let result = match result {
                Ok(()) => tokio::fs::rename(&tmp, &path).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "failed to persist manifest");
            }
        }
    });
    tx
}
