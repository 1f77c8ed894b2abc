use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Request timeout (seconds)
    pub request_timeout: u64,
}

/// Hosted code-search index configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchConfig {
    /// Search service endpoint
    pub endpoint: String,
    /// API key for the search service
    pub api_key: String,
    /// Index holding the ICD-10 documents
    pub index: String,
    /// Semantic ranking configuration name
    pub semantic_config: String,
    /// Results per fresh search
    pub top: usize,
    /// Request timeout (seconds)
    pub request_timeout: u64,
    /// Max attempts for transient failures
    pub max_retries: u32,
    /// Initial retry backoff (milliseconds), doubled per attempt
    pub retry_backoff_ms: u64,
}

/// Hosted chat-completion configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat-completions endpoint
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Model or deployment name
    pub model: String,
    /// Max tokens per completion
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout (seconds)
    pub request_timeout: u64,
    /// Max attempts for transient failures
    pub max_retries: u32,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend type: "http" or "hash"
    pub backend: String,
    /// Embedding server base URL (http backend)
    pub url: String,
    /// Model name
    pub model_name: String,
    /// Vector dimension
    pub dimension: usize,
    /// Request timeout (seconds)
    pub request_timeout: u64,
}

/// Memory tiering configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory for persisted memory files
    pub data_dir: PathBuf,
    /// Token budget for assembled prompt context
    pub max_context_tokens: usize,
    /// Extract facts every N turns
    pub fact_extraction_interval: u64,
    /// Rolling working-memory window size
    pub max_messages: usize,
    /// Optional tokenizer definition file; char/4 approximation when absent
    pub tokenizer_file: Option<PathBuf>,
}

/// Session registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle seconds before a session is evicted by the sweeper
    pub idle_timeout: u64,
    /// Sweeper interval (seconds)
    pub sweep_interval: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Code search configuration
    pub search: SearchConfig,
    /// Chat completion configuration
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embedding: EmbeddingConfig,
    /// Memory tiering configuration
    pub memory: MemoryConfig,
    /// Session registry configuration
    pub session: SessionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Application name
    pub app_name: String,
    /// Environment
    pub environment: String,
}

impl AppConfig {
    /// Development defaults
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                request_timeout: 30,
            },
            search: SearchConfig {
                endpoint: "http://localhost:9200".into(),
                api_key: "dev-search-key".into(),
                index: "pcornet-icd-index".into(),
                semantic_config: "defaultSemanticConfig".into(),
                top: 10,
                request_timeout: 15,
                max_retries: 3,
                retry_backoff_ms: 200,
            },
            llm: LlmConfig {
                endpoint: "http://localhost:8001/v1/chat/completions".into(),
                api_key: "dev-llm-key".into(),
                model: "gpt-4o-mini".into(),
                max_tokens: 1000,
                temperature: 0.0,
                request_timeout: 60,
                max_retries: 3,
            },
            embedding: EmbeddingConfig {
                backend: "hash".into(),
                url: "http://localhost:11434".into(),
                model_name: "all-MiniLM-L6-v2".into(),
                dimension: 384,
                request_timeout: 60,
            },
            memory: MemoryConfig {
                data_dir: PathBuf::from("./data/memory"),
                max_context_tokens: 2000,
                fact_extraction_interval: 5,
                max_messages: 20,
                tokenizer_file: None,
            },
            session: SessionConfig {
                idle_timeout: 3600,
                sweep_interval: 300,
            },
            logging: LoggingConfig {
                level: "debug".into(),
            },
            app_name: "medcodex".into(),
            environment: "development".into(),
        }
    }

    /// Production defaults
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config
    }
}
