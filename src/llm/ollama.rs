use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::RagError;

/// Native Ollama API client (`/api/chat`, `/api/embed`).
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: String, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut options = serde_json::Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            options.insert("num_predict".to_string(), json!(n));
        }

        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": false,
        });
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::GenerationFailed(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::GenerationFailed(format!(
                "ollama chat returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::GenerationFailed(e.to_string()))?;

        payload["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                RagError::GenerationFailed("ollama chat response missing message content".into())
            })
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.base_url);

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingFailed(format!(
                "ollama embed returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        let raw = payload["embeddings"].as_array().ok_or_else(|| {
            RagError::EmbeddingFailed("ollama embed response missing embeddings".into())
        })?;

        let mut embeddings = Vec::with_capacity(raw.len());
        for item in raw {
            let vals = item.as_array().ok_or_else(|| {
                RagError::EmbeddingFailed("ollama embed returned a non-array vector".into())
            })?;
            let vec: Vec<f32> = vals
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            embeddings.push(vec);
        }

        if embeddings.len() != inputs.len() {
            return Err(RagError::EmbeddingFailed(format!(
                "ollama embed returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}
