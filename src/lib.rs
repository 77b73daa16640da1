//! Local-first personal memory gateway with a privacy-safe retrieval core,
//! served to AI assistants over [MCP](https://modelcontextprotocol.io/).
//!
//! memgate stores text and file-derived knowledge in a vector index and
//! answers natural-language topics from untrusted callers through a fixed
//! pipeline: hybrid semantic+lexical retrieval over two memory stores,
//! multi-pattern PII redaction with risk and confidence scoring, a one-shot
//! consent gate for high-risk output, optional strictly grounded answer
//! generation, and an ordered telemetry stream.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   vec0 tables — `documents` for ingested chunks, `user_facts` for
//!   explicitly saved facts
//! - **Embeddings**: pluggable — Gemini, OpenAI-compatible, or a local
//!   deterministic hash provider — behind an on-disk cache
//! - **Privacy**: ordered regex redaction with a leaked-shape fail-safe
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`] — TOML + environment configuration with a non-throwing validator
//! - [`db`] — SQLite initialization and lazy per-store schema
//! - [`embedding`] — embedding providers, alignment, and cache
//! - [`memory`] — the two-table store: write path and hybrid search
//! - [`privacy`] — the redaction pipeline
//! - [`consent`] — one-shot TTL consent tokens
//! - [`answer`] — grounded answer orchestration with extractive fallback
//! - [`controller`] — the per-query state machine
//! - [`events`] — telemetry bus, bounded replay, and stats
//! - [`ingest`] — plain-text file ingestion and the manifest
//! - [`tools`] — the MCP tool surface
//! - [`server`] — transport wiring

pub mod answer;
pub mod config;
pub mod consent;
pub mod controller;
pub mod db;
pub mod embedding;
pub mod events;
pub mod ingest;
pub mod memory;
pub mod privacy;
pub mod server;
pub mod tools;
