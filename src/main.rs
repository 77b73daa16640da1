mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use memgate::config::GatewayConfig;
use memgate::server;

#[derive(Parser)]
#[command(name = "memgate", version, about = "Privacy-safe personal memory gateway over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport by default)
    Serve {
        /// Serve over Streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Run a query through the retrieval pipeline and print the result
    Query { topic: String },
    /// Ingest a plain-text file into the document store
    Ingest { file: PathBuf },
    /// List the most recent memories
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the persisted stats snapshot
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = GatewayConfig::load()?;

    // Initialize tracing with the configured log level.
    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Surface every config diagnostic before deciding to exit.
    let report = config.validate();
    for warning in &report.warnings {
        tracing::warn!("config: {warning}");
    }
    if report.is_fatal() {
        for error in &report.errors {
            tracing::error!("config: {error}");
        }
        anyhow::bail!("invalid configuration ({} error(s))", report.errors.len());
    }

    match cli.command {
        Command::Serve { http } => {
            if http {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Query { topic } => cli::query(config, &topic).await?,
        Command::Ingest { file } => cli::ingest(config, &file).await?,
        Command::Recent { limit } => cli::recent(config, limit).await?,
        Command::Stats => cli::stats(config).await?,
    }

    Ok(())
}
