#![allow(dead_code)]

use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use memgate::answer::AnswerOrchestrator;
use memgate::config::GatewayConfig;
use memgate::consent::ConsentGate;
use memgate::controller::RetrievalController;
use memgate::db;
use memgate::embedding::Embedder;
use memgate::events::EventBus;
use memgate::memory::store;

/// Embedding dimension used across integration tests.
pub const DIM: usize = 16;

/// A fully wired in-memory gateway with handles onto its shared state.
pub struct TestGateway {
    pub controller: RetrievalController,
    pub db: Arc<Mutex<Connection>>,
    pub embedder: Arc<Embedder>,
    pub events: Arc<EventBus>,
    pub consent: Arc<ConsentGate>,
}

/// Default config for tests: local embeddings at [`DIM`], everything else
/// stock.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.embedding.provider = "local".into();
    config.embedding.dimension = DIM;
    config
}

/// Build a gateway from a config and an orchestrator.
pub fn gateway_with(config: GatewayConfig, orchestrator: AnswerOrchestrator) -> TestGateway {
    let conn = db::open_memory_database().unwrap();
    let db = Arc::new(Mutex::new(conn));
    let embedder = Arc::new(Embedder::local(config.embedding.dimension));
    let events = Arc::new(EventBus::new(config.events.capacity));
    let consent = Arc::new(ConsentGate::new(Duration::from_millis(config.consent.ttl_ms)));

    let controller = RetrievalController::new(
        Arc::clone(&db),
        Arc::clone(&embedder),
        Arc::clone(&events),
        Arc::clone(&consent),
        orchestrator,
        Arc::new(config),
    );

    TestGateway {
        controller,
        db,
        embedder,
        events,
        consent,
    }
}

/// Build a gateway with the default test config and extractive answering.
pub fn gateway() -> TestGateway {
    gateway_with(test_config(), AnswerOrchestrator::extractive())
}

/// Embed with the gateway's own provider and store a document chunk.
pub async fn seed_document(gw: &TestGateway, text: &str, source_file: &str) {
    let embedding = gw.embedder.embed(text).await.unwrap();
    let mut conn = gw.db.lock().unwrap();
    store::save_document(&mut conn, text, source_file, &embedding).unwrap();
}

/// Embed with the gateway's own provider and store a user fact.
pub async fn seed_fact(gw: &TestGateway, fact: &str, category: Option<&str>) {
    let embedding = gw.embedder.embed(fact).await.unwrap();
    let mut conn = gw.db.lock().unwrap();
    store::save_user_fact(&mut conn, fact, category, &embedding).unwrap();
}

/// Store a document chunk with an explicit embedding (for distance-sensitive
/// tests).
pub fn seed_document_with_embedding(
    gw: &TestGateway,
    text: &str,
    source_file: &str,
    embedding: &[f32],
) {
    let mut conn = gw.db.lock().unwrap();
    store::save_document(&mut conn, text, source_file, embedding).unwrap();
}

/// Events of one type, in publish order.
pub fn events_of(gw: &TestGateway, type_name: &str) -> Vec<memgate::events::Event> {
    gw.events
        .replay()
        .into_iter()
        .filter(|e| e.event_type.as_str() == type_name)
        .collect()
}
