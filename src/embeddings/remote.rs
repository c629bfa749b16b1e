//! HTTP embedding client for OpenAI-compatible and Ollama endpoints

use super::EmbeddingProvider;
use crate::config::{EmbeddingApi, EmbeddingConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

// roughly 4 characters per token; sentence-transformer style models cap at 512 tokens
const DEFAULT_MAX_CHARS: usize = 2048;

pub struct RemoteEmbedding {
    client: Client,
    api: EmbeddingApi,
    api_key: Option<String>,
    model: String,
    base_url: String,
    dimension: usize,
    max_chars: usize,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

impl RemoteEmbedding {
    pub fn new(
        api: EmbeddingApi,
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        let (default_model, default_url) = match api {
            EmbeddingApi::OpenAI => ("text-embedding-3-small", "https://api.openai.com/v1"),
            EmbeddingApi::Ollama => ("all-minilm", "http://127.0.0.1:11434"),
        };

        Self {
            client: Client::new(),
            api,
            api_key,
            model: model.unwrap_or_else(|| default_model.to_string()),
            base_url: base_url
                .unwrap_or_else(|| default_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            dimension: 0,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    /// Returns `Ok(None)` when no provider is configured.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>> {
        let Some(api) = config.provider else {
            return Ok(None);
        };
        if api == EmbeddingApi::OpenAI && config.api_key.is_none() {
            return Err(Error::Config(
                "EMBEDDING_PROVIDER=openai requires EMBEDDING_API_KEY or OPENAI_API_KEY".to_string(),
            ));
        }
        Ok(Some(Self::new(
            api,
            config.api_key.clone(),
            config.model.clone(),
            config.base_url.clone(),
        )))
    }

    /// Embed one sample to learn the vector dimension.
    pub async fn initialize(&mut self) -> Result<usize> {
        let sample = self.embed("dimension check").await?;
        if sample.is_empty() {
            return Err(Error::Embedding("Endpoint returned an empty vector".to_string()));
        }
        self.dimension = sample.len();
        Ok(self.dimension)
    }

    fn preprocess(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return " ".to_string();
        }
        text.chars().take(self.max_chars).collect()
    }

    async fn post_openai(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&OpenAiRequest {
            model: &self.model,
            input,
            encoding_format: "float",
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("Embedding API error ({status}): {body}")));
        }

        let parsed: OpenAiResponse = response.json().await?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn post_ollama(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Ollama error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("Ollama API error {status}: {body}")));
        }

        let parsed: OllamaResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let input: Vec<String> = texts.iter().map(|t| self.preprocess(t)).collect();

        let vectors = match self.api {
            EmbeddingApi::OpenAI => self.post_openai(&input).await?,
            EmbeddingApi::Ollama => self.post_ollama(&input).await?,
        };

        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        match self.api {
            EmbeddingApi::OpenAI => "OpenAI",
            EmbeddingApi::Ollama => "Ollama",
        }
    }
}
