//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use memsearch_core::SearchStrategy;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Vector store (Qdrant) configuration
    #[serde(default)]
    pub qdrant: QdrantSettings,

    /// Search strategy defaults and score thresholds
    #[serde(default)]
    pub search: SearchSettings,

    /// Reranker router configuration
    #[serde(default)]
    pub reranker: RerankerSettings,

    /// Embedder configuration
    #[serde(default)]
    pub embedder: EmbedderSettings,

    /// NATS stream consumer configuration
    #[serde(default)]
    pub nats: NatsSettings,

    /// Turn indexing and batch queue configuration
    #[serde(default)]
    pub indexing: IndexingSettings,

    /// Language-model backend configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Multi-query expansion configuration
    #[serde(default)]
    pub multi_query: MultiQuerySettings,

    /// Session-aware retrieval configuration
    #[serde(default)]
    pub session: SessionRetrievalSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means same-origin only
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Static bearer tokens mapped to tenant ids: "token=tenant" entries
    #[serde(default)]
    pub auth_tokens: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8087
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            auth_tokens: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of the pretty format
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantSettings {
    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_memory_collection")]
    pub memory_collection: String,
    #[serde(default = "default_turn_collection")]
    pub turn_collection: String,
}

fn default_qdrant_endpoint() -> String {
    "http://localhost:6334".to_string()
}

fn default_memory_collection() -> String {
    "memories".to_string()
}

fn default_turn_collection() -> String {
    "turns".to_string()
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            endpoint: default_qdrant_endpoint(),
            api_key: None,
            memory_collection: default_memory_collection(),
            turn_collection: default_turn_collection(),
        }
    }
}

/// Search strategy defaults and per-strategy score thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_strategy")]
    pub default_strategy: SearchStrategy,
    #[serde(default = "default_min_score_dense")]
    pub min_score_dense: f32,
    #[serde(default = "default_min_score_sparse")]
    pub min_score_sparse: f32,
    /// Kept for completeness; never dispatched with RRF (rank-based scores)
    #[serde(default)]
    pub min_score_hybrid: f32,
}

fn default_strategy() -> SearchStrategy {
    SearchStrategy::Hybrid
}

fn default_min_score_dense() -> f32 {
    0.35
}

fn default_min_score_sparse() -> f32 {
    0.1
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            min_score_dense: default_min_score_dense(),
            min_score_sparse: default_min_score_sparse(),
            min_score_hybrid: 0.0,
        }
    }
}

/// Reranker backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankerBackend {
    /// In-process scoring
    #[default]
    Local,
    /// Remote model API
    Remote,
}

/// Reranker router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSettings {
    #[serde(default = "default_reranker_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub backend: RerankerBackend,
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests_per_hour: u32,
    #[serde(default = "default_rate_limit_budget")]
    pub rate_limit_budget_cents: f64,
}

fn default_reranker_timeout_ms() -> u64 {
    400
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_budget() -> f64 {
    500.0
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_reranker_timeout_ms(),
            backend: RerankerBackend::default(),
            rate_limit_requests_per_hour: default_rate_limit_requests(),
            rate_limit_budget_cents: default_rate_limit_budget(),
        }
    }
}

/// Embedder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    #[serde(default = "default_device")]
    pub device: String,
    /// Eagerly construct all enabled embedders at startup
    #[serde(default)]
    pub preload: bool,
    #[serde(default = "default_true")]
    pub enable_sparse: bool,
    #[serde(default)]
    pub enable_colbert: bool,
    #[serde(default = "default_dense_dim")]
    pub dense_dim: usize,
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_true() -> bool {
    true
}

fn default_dense_dim() -> usize {
    384
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            device: default_device(),
            preload: false,
            enable_sparse: true,
            enable_colbert: false,
            dense_dim: default_dense_dim(),
        }
    }
}

/// NATS stream consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsSettings {
    #[serde(default = "default_nats_url")]
    pub url: String,
    /// Start the turn-finalized consumer at boot
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_status_subject")]
    pub status_subject: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_subject() -> String {
    "memory.turns.finalized".to_string()
}

fn default_status_subject() -> String {
    "observatory.consumers.status".to_string()
}

fn default_group_id() -> String {
    "search-turns-indexer".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            enabled: false,
            subject: default_subject(),
            status_subject: default_status_subject(),
            group_id: default_group_id(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

/// Turn indexing and batch queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

fn default_batch_size() -> usize {
    32
}

fn default_flush_interval_ms() -> u64 {
    5_000
}

fn default_max_queue_size() -> usize {
    1_000
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

/// Language-model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub temperature: f32,
}

fn default_llm_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_max_tokens() -> usize {
    1024
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

/// Multi-query expansion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiQuerySettings {
    #[serde(default = "default_num_variations")]
    pub num_variations: usize,
    #[serde(default = "default_true")]
    pub include_original: bool,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

fn default_num_variations() -> usize {
    3
}

fn default_rrf_k() -> u32 {
    60
}

impl Default for MultiQuerySettings {
    fn default() -> Self {
        Self {
            num_variations: default_num_variations(),
            include_original: true,
            rrf_k: default_rrf_k(),
        }
    }
}

/// Session-aware retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRetrievalSettings {
    #[serde(default = "default_top_sessions")]
    pub top_sessions: usize,
    #[serde(default = "default_turns_per_session")]
    pub turns_per_session: usize,
    #[serde(default = "default_final_top_k")]
    pub final_top_k: usize,
    #[serde(default = "default_session_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_true")]
    pub parallel_turn_retrieval: bool,
}

fn default_top_sessions() -> usize {
    5
}

fn default_turns_per_session() -> usize {
    3
}

fn default_final_top_k() -> usize {
    10
}

fn default_session_score_threshold() -> f32 {
    0.3
}

impl Default for SessionRetrievalSettings {
    fn default() -> Self {
        Self {
            top_sessions: default_top_sessions(),
            turns_per_session: default_turns_per_session(),
            final_top_k: default_final_top_k(),
            score_threshold: default_session_score_threshold(),
            parallel_turn_retrieval: true,
        }
    }
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_search()?;
        self.validate_reranker()?;
        self.validate_indexing()?;
        self.validate_multi_query()?;
        self.validate_session()?;
        Ok(())
    }

    fn validate_search(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("search.min_score_dense", self.search.min_score_dense),
            ("search.min_score_sparse", self.search.min_score_sparse),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {value}"),
                });
            }
        }
        Ok(())
    }

    fn validate_reranker(&self) -> Result<(), ConfigError> {
        if self.reranker.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reranker.timeout_ms".to_string(),
                message: "Must be at least 1ms".to_string(),
            });
        }
        if self.reranker.rate_limit_budget_cents < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "reranker.rate_limit_budget_cents".to_string(),
                message: format!(
                    "Must be non-negative, got {}",
                    self.reranker.rate_limit_budget_cents
                ),
            });
        }
        Ok(())
    }

    fn validate_indexing(&self) -> Result<(), ConfigError> {
        if self.indexing.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "indexing.batch_size".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if self.indexing.max_queue_size < self.indexing.batch_size {
            return Err(ConfigError::InvalidValue {
                field: "indexing.max_queue_size".to_string(),
                message: format!(
                    "Cannot be smaller than batch_size ({})",
                    self.indexing.batch_size
                ),
            });
        }
        Ok(())
    }

    fn validate_multi_query(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.multi_query.num_variations) {
            return Err(ConfigError::InvalidValue {
                field: "multi_query.num_variations".to_string(),
                message: format!(
                    "Must be between 1 and 10, got {}",
                    self.multi_query.num_variations
                ),
            });
        }
        if self.multi_query.rrf_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "multi_query.rrf_k".to_string(),
                message: "Must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        if self.session.top_sessions == 0 || self.session.final_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session".to_string(),
                message: "top_sessions and final_top_k must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.session.score_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "session.score_threshold".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.session.score_threshold
                ),
            });
        }
        Ok(())
    }
}

/// Load settings from config files and environment variables.
///
/// Sources, later overriding earlier:
/// 1. `config/default` (optional)
/// 2. `config/{env}` when an environment name is given (optional)
/// 3. `MEMSEARCH__` environment variables, `__`-separated paths
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("MEMSEARCH")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8087);
        assert_eq!(settings.search.default_strategy, SearchStrategy::Hybrid);
        assert_eq!(settings.multi_query.num_variations, 3);
        assert_eq!(settings.multi_query.rrf_k, 60);
        assert_eq!(settings.session.top_sessions, 5);
        assert!((settings.session.score_threshold - 0.3).abs() < f32::EPSILON);
        settings.validate().unwrap();
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut settings = Settings::default();
        settings.search.min_score_dense = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_queue_smaller_than_batch_rejected() {
        let mut settings = Settings::default();
        settings.indexing.batch_size = 64;
        settings.indexing.max_queue_size = 32;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_num_variations_bounds() {
        let mut settings = Settings::default();
        settings.multi_query.num_variations = 0;
        assert!(settings.validate().is_err());
        settings.multi_query.num_variations = 11;
        assert!(settings.validate().is_err());
        settings.multi_query.num_variations = 10;
        assert!(settings.validate().is_ok());
    }
}
