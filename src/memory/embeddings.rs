//! Text embedding backends.
//!
//! The http backend targets an Ollama-style `/api/embed` endpoint. The
//! hash backend is a deterministic local fallback (feature hashing over
//! lowercased tokens) good enough for tests and offline development,
//! selected via the `backend` config key.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::search::with_retry;

/// Text-to-vector abstraction
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Vector dimension
    fn dimension(&self) -> usize;
}

/// Cosine similarity between two vectors; 0.0 when either is degenerate
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Client for a hosted embedding server
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    url: String,
    model_name: String,
    dimension: usize,
}

impl HttpEmbeddingService {
    /// Build a client from the embedding section of the app config
    pub fn new(config: &AppConfig) -> Result<Self> {
        let embedding = &config.embedding;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(embedding.request_timeout))
            .build()
            .map_err(|e| AppError::Config(format!("embedding http client: {e}")))?;

        Ok(Self {
            client,
            url: embedding.url.trim_end_matches('/').to_string(),
            model_name: embedding.model_name.clone(),
            dimension: embedding.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.url);
        let body = json!({
            "model": self.model_name,
            "input": text,
        });

        let response = with_retry(3, 200, || async {
            let resp = self.client.post(&url).json(&body).send().await?;
            let status = resp.status();
            if status.is_server_error() {
                return Err(AppError::Connection(format!("embedding server returned {status}")));
            }
            if !status.is_success() {
                return Err(AppError::Embedding(format!("embedding server returned {status}")));
            }
            let parsed: Value = resp.json().await?;
            Ok(parsed)
        })
        .await?;

        let vector = response["embeddings"][0]
            .as_array()
            .ok_or_else(|| AppError::Embedding("response missing embeddings array".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or_default() as f32)
            .collect();
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic local embedding via token feature hashing
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    /// Create with the given vector dimension
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let digest = hasher.finish();
            let index = (digest % self.dimension as u64) as usize;
            let sign = if digest & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create the embedding backend named by config
pub fn create_embedding_service(config: &AppConfig) -> Result<Arc<dyn EmbeddingService>> {
    match config.embedding.backend.as_str() {
        "http" => {
            info!(url = %config.embedding.url, model = %config.embedding.model_name, "using http embedding backend");
            Ok(Arc::new(HttpEmbeddingService::new(config)?))
        }
        "hash" => {
            info!(dimension = config.embedding.dimension, "using hash embedding backend");
            Ok(Arc::new(HashEmbedding::new(config.embedding.dimension)))
        }
        other => Err(AppError::Config(format!("unknown embedding backend: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedding_deterministic() {
        let service = HashEmbedding::new(64);
        let a = service.embed("diabetes mellitus type 2").await.unwrap();
        let b = service.embed("diabetes mellitus type 2").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hash_embedding_similarity_ranks_overlap() {
        let service = HashEmbedding::new(256);
        let base = service.embed("icd codes for hypertension").await.unwrap();
        let close = service.embed("hypertension icd codes please").await.unwrap();
        let far = service.embed("renal dialysis schedule").await.unwrap();

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);

        let v = [0.6f32, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_create_rejects_unknown_backend() {
        let mut config = AppConfig::development();
        config.embedding.backend = "quantum".into();
        assert!(create_embedding_service(&config).is_err());
    }
}
