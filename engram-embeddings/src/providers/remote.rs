//! Remote embedding provider speaking the `/embeddings` wire protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use engram_core::errors::EmbedError;
use engram_core::traits::EmbeddingProvider;

/// HTTP client timeout; the service wraps calls in its own 30s budget,
/// this is a backstop for connection-level hangs.
const HTTP_TIMEOUT_SECS: u64 = 60;

pub struct RemoteApiProvider {
    api_url: String,
    api_key: String,
    model_name: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl RemoteApiProvider {
    pub fn new(
        api_url: String,
        api_key: String,
        model_name: String,
        dimensions: usize,
    ) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbedError::ModelLoad {
                reason: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model_name,
            dimensions,
            client,
        })
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/embeddings", self.api_url);
        let body = EmbeddingRequest {
            input,
            model: &self.model_name,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Transport {
                status: status.as_u16(),
                body: truncate(&body, 256),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(transport_err)?;
        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Transport {
                status: status.as_u16(),
                body: "response contained no embeddings".to_string(),
            })?;

        debug!(
            model = %self.model_name,
            dims = first.embedding.len(),
            "remote embedding received"
        );
        Ok(first.embedding)
    }
}

/// Connection-level failures carry status 0; HTTP failures carry the
/// real status code.
fn transport_err(e: reqwest::Error) -> EmbedError {
    EmbedError::Transport {
        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
        body: e.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteApiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.request(text).await
    }

    async fn warm_up(&self) -> Result<(), EmbedError> {
        // Exercise the connection and auth once so the first real embed
        // does not absorb setup latency or surface config errors late.
        self.request("warm up").await.map(|_| ())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = EmbeddingRequest {
            input: "hello",
            model: "text-embedder-1",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["input"], "hello");
        assert_eq!(json["model"], "text-embedder-1");
    }

    #[test]
    fn response_body_shape() {
        let raw = r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[0.3]}],"usage":{"total_tokens":3}}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let p = RemoteApiProvider::new(
            "https://api.example.com/v1/".to_string(),
            "sk-test".to_string(),
            "m".to_string(),
            8,
        )
        .unwrap();
        assert_eq!(p.api_url, "https://api.example.com/v1");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "ααααα";
        let t = truncate(s, 3);
        assert!(t.starts_with('α'));
    }
}
