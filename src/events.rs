//! Telemetry — in-process event bus with bounded replay, plus the stats
//! collector that derives counters from the stream.
//!
//! [`EventBus::publish`] assigns an id and timestamp, appends to a bounded
//! ring (oldest events evicted on overflow), and fans out to every
//! subscriber. A panicking subscriber is isolated so one broken handler
//! cannot break telemetry. Stats snapshots are persisted through a single
//! writer task fed by a channel, so concurrent events never interleave file
//! writes.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::privacy;

/// Default replay ring capacity.
pub const DEFAULT_CAPACITY: usize = 200;

/// The telemetry event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    QueryReceived,
    PrivacyProcessed,
    RiskBlocked,
    ConsentRequired,
    ConsentDecision,
    IngestSuccess,
    IngestError,
    ArchestraRequest,
    ArchestraResponse,
    MemorySaved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryReceived => "query_received",
            Self::PrivacyProcessed => "privacy_processed",
            Self::RiskBlocked => "risk_blocked",
            Self::ConsentRequired => "consent_required",
            Self::ConsentDecision => "consent_decision",
            Self::IngestSuccess => "ingest_success",
            Self::IngestError => "ingest_error",
            Self::ArchestraRequest => "archestra_request",
            Self::ArchestraResponse => "archestra_response",
            Self::MemorySaved => "memory_saved",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry event. Totally ordered by `(timestamp, id)` — ids are
/// time-sortable UUIDv7.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]; pass to
/// [`EventBus::unsubscribe`] to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub struct EventBus {
    capacity: usize,
    ring: Mutex<VecDeque<Event>>,
    handlers: RwLock<Vec<(u64, Handler)>>,
    next_handler_id: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: Mutex::new(VecDeque::new()),
            handlers: RwLock::new(Vec::new()),
            next_handler_id: AtomicU64::new(0),
        }
    }

    /// Publish an event: assign id and timestamp, append with front eviction
    /// on overflow, then invoke every subscriber. Subscriber panics are
    /// swallowed.
    pub fn publish(&self, event_type: EventType, payload: serde_json::Value) -> Event {
        let event = Event {
            id: uuid::Uuid::now_v7().to_string(),
            event_type,
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
        };

        if let Ok(mut ring) = self.ring.lock() {
            if ring.len() >= self.capacity {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        if let Ok(handlers) = self.handlers.read() {
            for (id, handler) in handlers.iter() {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(&event)
                }));
                if outcome.is_err() {
                    tracing::warn!(subscriber = id, event = %event.event_type, "subscriber panicked");
                }
            }
        }

        event
    }

    /// Register a subscriber for every subsequent event.
    pub fn subscribe(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push((id, Box::new(handler)));
        }
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.retain(|(handler_id, _)| *handler_id != id.0);
        }
    }

    /// The most recent events, oldest first.
    pub fn replay(&self) -> Vec<Event> {
        self.ring
            .lock()
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ── Stats ─────────────────────────────────────────────────────────────────────

/// Counters derived from the event stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub blocked_high_risk: u64,
    pub total_redactions: u64,
    pub ingested_files: u64,
    pub ingested_chunks: u64,
    pub ingest_errors: u64,
    /// Placeholder → occurrences across all `privacy_processed` events.
    pub redactions_by_category: HashMap<String, u64>,
}

/// A single bus subscriber updating counters and, when configured, feeding
/// serialized snapshots to the writer task.
pub struct StatsCollector {
    stats: Arc<Mutex<StatsSnapshot>>,
    persist: Option<tokio::sync::mpsc::UnboundedSender<String>>,
}

impl StatsCollector {
    /// In-memory collector, no persistence.
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(StatsSnapshot::default())),
            persist: None,
        }
    }

    /// Collector that persists a snapshot after every update. Must be called
    /// from within a tokio runtime (the writer task is spawned here).
    pub fn with_snapshot_file(path: PathBuf) -> Self {
        Self {
            stats: Arc::new(Mutex::new(StatsSnapshot::default())),
            persist: Some(spawn_snapshot_writer(path)),
        }
    }

    /// Subscribe this collector to a bus.
    pub fn attach(&self, bus: &EventBus) -> SubscriptionId {
        let stats = Arc::clone(&self.stats);
        let persist = self.persist.clone();

        bus.subscribe(move |event| {
            let Ok(mut s) = stats.lock() else { return };
            match event.event_type {
                EventType::QueryReceived => s.total_queries += 1,
                EventType::RiskBlocked => s.blocked_high_risk += 1,
                EventType::PrivacyProcessed => {
                    let count = event.payload["redaction_count"].as_u64().unwrap_or(0);
                    s.total_redactions += count;
                    if let Some(cleaned) = event.payload["cleaned_text"].as_str() {
                        for (placeholder, n) in privacy::placeholder_counts(cleaned) {
                            *s.redactions_by_category.entry(placeholder).or_insert(0) +=
                                n as u64;
                        }
                    }
                }
                EventType::IngestSuccess => {
                    s.ingested_files += 1;
                    s.ingested_chunks += event.payload["chunks"].as_u64().unwrap_or(0);
                }
                EventType::IngestError => s.ingest_errors += 1,
                _ => {}
            }

            if let Some(tx) = &persist {
                if let Ok(json) = serde_json::to_string_pretty(&*s) {
                    let _ = tx.send(json);
                }
            }
        })
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the single writer task. Only this task touches the snapshot file,
/// so concurrent events can never interleave writes.
fn spawn_snapshot_writer(path: PathBuf) -> tokio::sync::mpsc::UnboundedSender<String> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if let Err(e) = tokio::fs::write(&path, json).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to persist stats snapshot");
            }
        }
    });
    tx
}
