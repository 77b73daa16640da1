//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire up the
//! database, embedding service, event bus, consent gate, and answer
//! orchestrator into a running server.

use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::answer::{provider, AnswerOrchestrator};
use crate::config::GatewayConfig;
use crate::consent::ConsentGate;
use crate::controller::RetrievalController;
use crate::db;
use crate::embedding::Embedder;
use crate::events::{EventBus, StatsCollector};
use crate::tools::GatewayTools;

/// Shared setup: open DB, build the embedder, event bus, stats collector,
/// consent gate, and the retrieval controller.
pub fn setup_controller(config: GatewayConfig) -> Result<Arc<RetrievalController>> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    let db = Arc::new(Mutex::new(conn));

    let embedder = Arc::new(Embedder::from_config(
        &config.embedding,
        Some(config.resolved_cache_path()),
    )?);

    let events = Arc::new(EventBus::new(config.events.capacity));
    let stats = StatsCollector::with_snapshot_file(config.resolved_stats_path());
    stats.attach(&events);

    let consent = Arc::new(ConsentGate::new(Duration::from_millis(config.consent.ttl_ms)));

    let orchestrator = match provider::build_generator(&config.answer)? {
        Some(generator) => AnswerOrchestrator::with_generator(generator, config.answer.grounding),
        None => AnswerOrchestrator::extractive(),
    };

    let controller = RetrievalController::new(
        db,
        embedder,
        events,
        consent,
        orchestrator,
        Arc::new(config),
    );
    Ok(Arc::new(controller))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: GatewayConfig) -> Result<()> {
    tracing::info!("starting memgate MCP server on stdio");

    let controller = setup_controller(config)?;
    let tools = GatewayTools::new(controller);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP.
pub async fn serve_http(config: GatewayConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting memgate MCP server on HTTP");

    let controller = setup_controller(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(GatewayTools::new(controller.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
