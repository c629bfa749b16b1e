use crate::cache::DEFAULT_TTL_SECS;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Hybrid search parameters
    pub search: SearchConfig,

    /// Lexical scoring parameters
    pub bm25: Bm25Config,

    /// Remote completion endpoint shared by decomposition and chat
    pub completion: CompletionConfig,

    /// LLM fallback tier of query decomposition
    pub decomposition: DecompositionConfig,

    /// Embedding provider used by the in-process vector store
    pub embedding: EmbeddingConfig,

    /// Answer generation
    pub chat: ChatConfig,

    /// Chunk file fed to the lexical index at startup
    pub corpus_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub rrf_k: usize, // RRF constant
    pub fanout_multiplier: usize,
    pub fanout_cap: usize,
    pub decompose_queries: bool,
    pub expand_synonyms: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Config {
    pub k1: f32,
    pub b: f32,
    /// Floor for negative idf values, as a fraction of the average idf
    pub epsilon: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub cache_ttl_secs: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: Option<EmbeddingApi>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingApi {
    OpenAI,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub backend: ChatBackend,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub context_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatBackend {
    Template,
    Remote,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            rrf_k: 60,
            fanout_multiplier: 3,
            fanout_cap: 50,
            decompose_queries: true,
            expand_synonyms: false,
        }
    }
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".to_string(),
            max_tokens: 150,
            temperature: 0.3,
            timeout_secs: 5,
            cache_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: ChatBackend::Template,
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            context_chars: 600,
        }
    }
}

impl SearchConfig {
    /// Candidates fetched per source and sub-query, leaving room for fusion
    pub fn fanout(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.fanout_multiplier).min(self.fanout_cap)
    }
}

impl DecompositionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        // Search configuration
        if let Some(v) = env_parse("DEFAULT_TOP_K")? {
            config.search.default_top_k = v;
        }
        if let Some(v) = env_parse("RRF_K")? {
            config.search.rrf_k = v;
        }
        if let Some(v) = env_parse("SEARCH_FANOUT_MULTIPLIER")? {
            config.search.fanout_multiplier = v;
        }
        if let Some(v) = env_parse("SEARCH_FANOUT_CAP")? {
            config.search.fanout_cap = v;
        }
        if let Some(v) = env_parse("DECOMPOSE_QUERIES")? {
            config.search.decompose_queries = v;
        }
        if let Some(v) = env_parse("EXPAND_SYNONYMS")? {
            config.search.expand_synonyms = v;
        }

        if let Some(v) = env_parse("BM25_K1")? {
            config.bm25.k1 = v;
        }
        if let Some(v) = env_parse("BM25_B")? {
            config.bm25.b = v;
        }
        if let Some(v) = env_parse("BM25_EPSILON")? {
            config.bm25.epsilon = v;
        }

        // Completion endpoint
        if let Ok(api_key) = std::env::var("GROQ_API_KEY") {
            if !api_key.trim().is_empty() {
                config.completion.api_key = Some(api_key);
            }
        }
        if let Ok(base_url) = std::env::var("COMPLETION_BASE_URL") {
            config.completion.base_url = base_url;
        }
        if let Some(v) = env_parse("COMPLETION_TIMEOUT_SECS")? {
            config.completion.timeout_secs = v;
        }

        if let Ok(model) = std::env::var("DECOMPOSITION_MODEL") {
            config.decomposition.model = model;
        }
        if let Some(v) = env_parse("DECOMPOSITION_TIMEOUT_SECS")? {
            config.decomposition.timeout_secs = v;
        }
        if let Some(v) = env_parse("CACHE_TTL_SECS")? {
            config.decomposition.cache_ttl_secs = v;
        }

        // Embedding provider
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = match provider.to_lowercase().as_str() {
                "openai" => Some(EmbeddingApi::OpenAI),
                "ollama" => Some(EmbeddingApi::Ollama),
                "" | "none" => None,
                other => {
                    return Err(Error::Config(format!("Unknown EMBEDDING_PROVIDER: {other}")));
                }
            };
        }
        if let Ok(api_key) =
            std::env::var("EMBEDDING_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            config.embedding.api_key = Some(api_key);
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = Some(model);
        }
        if let Ok(base_url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = Some(base_url);
        }

        // Chat
        if let Ok(backend) = std::env::var("CHAT_BACKEND") {
            config.chat.backend = parse_chat_backend(&backend)?;
        }
        if let Ok(model) = std::env::var("CHAT_MODEL") {
            config.chat.model = model;
        }

        if let Ok(path) = std::env::var("CORPUS_PATH") {
            config.corpus_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse_chat_backend(value: &str) -> Result<ChatBackend> {
    match value.trim().to_lowercase().as_str() {
        "template" => Ok(ChatBackend::Template),
        "remote" | "groq" => Ok(ChatBackend::Remote),
        other => Err(Error::Config(format!("Unknown CHAT_BACKEND: {other}"))),
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {key}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}
