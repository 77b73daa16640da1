//! Terminal commands for debugging and maintenance.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};

use memgate::config::GatewayConfig;
use memgate::db;
use memgate::embedding::Embedder;
use memgate::events::EventBus;
use memgate::ingest::manifest::IngestManifest;
use memgate::ingest::Ingestor;
use memgate::memory::store;
use memgate::server;

/// Run a topic through the full retrieval pipeline and print the result the
/// MCP client would see.
pub async fn query(config: GatewayConfig, topic: &str) -> Result<()> {
    let controller = server::setup_controller(config)?;
    let output = controller.handle_query(topic).await;
    println!("{output}");
    Ok(())
}

/// Ingest a single file into the document store.
pub async fn ingest(config: GatewayConfig, file: &Path) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path())?;
    let embedder = Embedder::from_config(
        &config.embedding,
        Some(config.resolved_cache_path()),
    )?;
    let ingestor = Ingestor::new(
        Arc::new(Mutex::new(conn)),
        Arc::new(embedder),
        Arc::new(EventBus::new(config.events.capacity)),
        IngestManifest::open(config.resolved_manifest_path()),
    );

    let outcome = ingestor.ingest_file(file).await?;
    if outcome.skipped {
        println!("Skipped {} (unchanged)", outcome.file);
    } else {
        println!("Ingested {} ({} chunks)", outcome.file, outcome.chunks);
    }
    Ok(())
}

/// Print the most recent records across both stores.
pub async fn recent(config: GatewayConfig, limit: usize) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path())?;
    let records = store::recent(&conn, limit)?;

    if records.is_empty() {
        println!("No memories stored yet.");
        return Ok(());
    }

    for record in records {
        let preview: String = record.text.chars().take(80).collect();
        println!(
            "  [{}] {} {} — {}",
            record.source,
            record.created_at,
            record.category.as_deref().unwrap_or("-"),
            preview
        );
    }
    Ok(())
}

/// Print the persisted stats snapshot.
pub async fn stats(config: GatewayConfig) -> Result<()> {
    let path = config.resolved_stats_path();
    if !path.exists() {
        println!("No stats snapshot yet at {}", path.display());
        return Ok(());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    println!("{contents}");
    Ok(())
}
