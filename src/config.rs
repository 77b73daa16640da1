//! Configuration loading and validation.
//!
//! Config is loaded from `~/.memgate/config.toml` (if present), then
//! `MEMGATE_*` environment variables are applied on top. [`GatewayConfig::validate`]
//! never throws: it collects warnings and errors into a [`ConfigReport`] so
//! the bootstrap can print every diagnostic before deciding to exit.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix carried by gateway personal tokens. These authenticate against the
/// gateway itself and are rejected wherever a direct provider key is needed.
pub const GATEWAY_TOKEN_PREFIX: &str = "apt_";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub privacy: PrivacyConfig,
    pub consent: ConsentConfig,
    pub answer: AnswerConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub embedding_cache_path: String,
    pub manifest_path: String,
    pub stats_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"gemini"`, `"openai-compatible"`, or `"local"`. Empty means infer
    /// from which credentials are present.
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub gemini_api_key: String,
    pub openai_api_key: String,
    pub gemini_base_url: String,
    pub openai_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub scope: QueryScope,
    pub strict_match: bool,
    pub top_k: usize,
    pub max_result_chars: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Include the raw pre-redaction context in telemetry payloads.
    pub debug_include_raw: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsentConfig {
    pub enabled: bool,
    pub ttl_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnswerConfig {
    /// Whether the controller runs answer generation at all.
    pub enabled: bool,
    /// Skip the remote provider and answer by extraction only.
    pub extractive_only: bool,
    pub grounding: GroundingMode,
    /// Provider alias — normalized via [`crate::answer::provider::normalize_alias`].
    pub provider: String,
    pub base_url: String,
    pub profile_id: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventsConfig {
    pub capacity: usize,
}

/// Which logical tables a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    #[default]
    Hybrid,
    FactsOnly,
    DocumentsOnly,
}

impl std::str::FromStr for QueryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(Self::Hybrid),
            "facts_only" => Ok(Self::FactsOnly),
            "documents_only" => Ok(Self::DocumentsOnly),
            _ => Err(format!("unknown query scope: {s}")),
        }
    }
}

/// How strictly a generated answer must appear in the sanitized context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingMode {
    /// The answer must equal some context line.
    Exact,
    /// The answer must be a substring of some context line.
    #[default]
    Excerpt,
}

impl std::str::FromStr for GroundingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "excerpt" => Ok(Self::Excerpt),
            _ => Err(format!("unknown grounding mode: {s}")),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8090,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_memgate_dir();
        let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
        Self {
            db_path: path("memory.db"),
            embedding_cache_path: path("embedding_cache.json"),
            manifest_path: path("ingest_manifest.json"),
            stats_path: path("stats.json"),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: "text-embedding-004".into(),
            dimension: 768,
            gemini_api_key: String::new(),
            openai_api_key: String::new(),
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
            openai_base_url: "https://api.openai.com/v1".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scope: QueryScope::Hybrid,
            strict_match: true,
            top_k: 5,
            max_result_chars: 500,
        }
    }
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 5 * 60 * 1000,
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            extractive_only: true,
            grounding: GroundingMode::Excerpt,
            provider: String::new(),
            base_url: String::new(),
            profile_id: String::new(),
            model: String::new(),
            api_key: String::new(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 200 }
    }
}

/// Returns `~/.memgate/`
pub fn default_memgate_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".memgate")
}

/// Returns the default config file path: `~/.memgate/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memgate_dir().join("config.toml")
}

/// Diagnostics from a validation pass. Errors are fatal at bootstrap;
/// warnings are printed and execution continues.
#[derive(Debug, Default)]
pub struct ConfigReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigReport {
    pub fn is_fatal(&self) -> bool {
        !self.errors.is_empty()
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
}

impl GatewayConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            GatewayConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `MEMGATE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }
        fn bool_var(name: &str) -> Option<bool> {
            var(name).map(|v| matches!(v.as_str(), "1" | "true" | "on" | "yes"))
        }

        if let Some(v) = var("MEMGATE_DB") {
            self.storage.db_path = v;
        }
        if let Some(v) = var("MEMGATE_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Some(v) = var("MEMGATE_HTTP_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }

        if let Some(v) = var("MEMGATE_EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Some(v) = var("MEMGATE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = var("MEMGATE_EMBEDDING_DIM").and_then(|v| v.parse().ok()) {
            self.embedding.dimension = v;
        }
        if let Some(v) = var("MEMGATE_GEMINI_API_KEY") {
            self.embedding.gemini_api_key = v;
        }
        if let Some(v) = var("MEMGATE_OPENAI_API_KEY") {
            self.embedding.openai_api_key = v;
        }

        if let Some(v) = var("MEMGATE_QUERY_SCOPE").and_then(|v| v.parse().ok()) {
            self.retrieval.scope = v;
        }
        if let Some(v) = bool_var("MEMGATE_STRICT_MATCH") {
            self.retrieval.strict_match = v;
        }
        if let Some(v) = var("MEMGATE_TOP_K").and_then(|v| v.parse().ok()) {
            self.retrieval.top_k = v;
        }
        if let Some(v) = var("MEMGATE_MAX_RESULT_CHARS").and_then(|v| v.parse().ok()) {
            self.retrieval.max_result_chars = v;
        }

        if let Some(v) = bool_var("MEMGATE_PRIVACY_DEBUG") {
            self.privacy.debug_include_raw = v;
        }

        if let Some(v) = bool_var("MEMGATE_CONSENT_ENABLED") {
            self.consent.enabled = v;
        }
        if let Some(v) = var("MEMGATE_CONSENT_TTL_MS").and_then(|v| v.parse().ok()) {
            self.consent.ttl_ms = v;
        }

        if let Some(v) = bool_var("MEMGATE_ANSWER_ENABLED") {
            self.answer.enabled = v;
        }
        if let Some(v) = bool_var("MEMGATE_ANSWER_EXTRACTIVE") {
            self.answer.extractive_only = v;
        }
        if let Some(v) = var("MEMGATE_GROUNDING_MODE").and_then(|v| v.parse().ok()) {
            self.answer.grounding = v;
        }
        if let Some(v) = var("MEMGATE_ANSWER_PROVIDER") {
            self.answer.provider = v;
        }
        if let Some(v) = var("MEMGATE_ANSWER_BASE_URL") {
            self.answer.base_url = v;
        }
        if let Some(v) = var("MEMGATE_ANSWER_PROFILE_ID") {
            self.answer.profile_id = v;
        }
        if let Some(v) = var("MEMGATE_ANSWER_MODEL") {
            self.answer.model = v;
        }
        if let Some(v) = var("MEMGATE_ANSWER_API_KEY") {
            self.answer.api_key = v;
        }

        if let Some(v) = var("MEMGATE_EVENT_CAPACITY").and_then(|v| v.parse().ok()) {
            self.events.capacity = v;
        }
    }

    /// Validate the loaded config. Collects every diagnostic instead of
    /// failing on the first, so bootstrap can report them all at once.
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        // Numeric ranges. Out-of-range retrieval knobs are clamped at query
        // time; flag them here so the operator knows.
        if self.embedding.dimension == 0 {
            report.error("embedding.dimension must be greater than zero");
        }
        if self.events.capacity == 0 {
            report.error("events.capacity must be greater than zero");
        }
        if self.server.port == 0 {
            report.error("server.port must be greater than zero");
        }
        if !(1..=10).contains(&self.retrieval.top_k) {
            report.warn(format!(
                "retrieval.top_k {} is outside [1, 10] and will be clamped",
                self.retrieval.top_k
            ));
        }
        if !(120..=2000).contains(&self.retrieval.max_result_chars) {
            report.warn(format!(
                "retrieval.max_result_chars {} is outside [120, 2000] and will be clamped",
                self.retrieval.max_result_chars
            ));
        }
        if self.consent.enabled && self.consent.ttl_ms == 0 {
            report.warn("consent.ttl_ms is 0 — granted tokens expire immediately");
        }

        self.validate_embedding(&mut report);
        self.validate_answer(&mut report);

        report
    }

    fn validate_embedding(&self, report: &mut ConfigReport) {
        match self.embedding.provider.as_str() {
            "gemini" => {
                if self.embedding.gemini_api_key.is_empty() {
                    report.error("embedding.provider is 'gemini' but no gemini_api_key is set");
                } else if self.embedding.gemini_api_key.starts_with(GATEWAY_TOKEN_PREFIX) {
                    report.error(
                        "embedding.gemini_api_key looks like a gateway personal token, \
                         not a Gemini API key",
                    );
                }
            }
            "openai-compatible" => {
                if self.embedding.openai_api_key.is_empty() {
                    report.error(
                        "embedding.provider is 'openai-compatible' but no openai_api_key is set",
                    );
                } else if self.embedding.openai_api_key.starts_with(GATEWAY_TOKEN_PREFIX) {
                    report.error(
                        "embedding.openai_api_key looks like a gateway personal token, \
                         not a provider API key",
                    );
                }
            }
            "local" => {}
            "" => {
                if self.embedding.gemini_api_key.is_empty()
                    && self.embedding.openai_api_key.is_empty()
                {
                    report.warn(
                        "no embedding credentials found — falling back to local \
                         deterministic embeddings",
                    );
                }
            }
            other => {
                report.error(format!(
                    "unknown embedding.provider '{other}' \
                     (expected gemini, openai-compatible, or local)"
                ));
            }
        }
    }

    fn validate_answer(&self, report: &mut ConfigReport) {
        if !self.answer.enabled || self.answer.extractive_only {
            return;
        }

        let Some(kind) = crate::answer::provider::normalize_alias(&self.answer.provider) else {
            report.error(format!(
                "unknown answer.provider alias '{}'",
                self.answer.provider
            ));
            return;
        };

        if self.answer.api_key.is_empty() {
            report.error("answer generation is enabled but answer.api_key is not set");
        }
        if self.answer.model.is_empty() {
            report.warn("answer.model is not set — the provider default will be used");
        }

        if kind == crate::answer::provider::ProviderKind::Gemini {
            if self.answer.api_key.starts_with(GATEWAY_TOKEN_PREFIX) {
                report.error(
                    "answer.api_key looks like a gateway personal token, not a Gemini API key",
                );
            }
            // A fully-composed proxy base URL carries the profile segment
            // itself; otherwise a standalone profile_id must be supplied.
            if self.answer.profile_id.is_empty() && self.answer.base_url.is_empty() {
                report.error(
                    "gemini answer provider needs a profile_id, either standalone or \
                     embedded in answer.base_url",
                );
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_cache_path(&self) -> PathBuf {
        expand_tilde(&self.storage.embedding_cache_path)
    }

    pub fn resolved_manifest_path(&self) -> PathBuf {
        expand_tilde(&self.storage.manifest_path)
    }

    pub fn resolved_stats_path(&self) -> PathBuf {
        expand_tilde(&self.storage.stats_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
