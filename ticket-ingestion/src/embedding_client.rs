use std::sync::Arc;
use std::time::Duration;

use common::error::AppError;
use dashmap::DashMap;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MIN_INTER_REQUEST_PAUSE: Duration = Duration::from_millis(20);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const TRUNCATION_MARKER: &str = "\u{2026} [truncated]";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Entry count and a conservative memory estimate for the process-global
/// embedding cache, per [`EmbeddingClient::cache_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub approx_bytes: usize,
}

/// Maps text to fixed-dimensional vectors via batched calls to an embedding
/// provider: truncation to a safe character budget, a content-keyed cache,
/// retry/backoff on transient failures, and a minimum inter-request pause.
///
/// Built directly on `reqwest` so the retry policy can read the raw HTTP
/// status and `Retry-After` header on 429 responses.
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    safe_max_chars: usize,
    cache: DashMap<String, Vec<f32>>,
    last_request: Mutex<Option<tokio::time::Instant>>,
}

impl EmbeddingClient {
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            safe_max_chars: 7000,
            cache: DashMap::new(),
            last_request: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_safe_max_chars(mut self, safe_max_chars: usize) -> Self {
        self.safe_max_chars = safe_max_chars;
        self
    }

    /// Embeds a single string, serving from cache on an exact match of the
    /// truncated text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let truncated = truncate(text, self.safe_max_chars);
        if let Some(cached) = self.cache.get(&truncated) {
            return Ok(cached.clone());
        }

        let vector = self.request_embedding(&truncated).await?;
        self.cache.insert(truncated, vector.clone());
        Ok(vector)
    }

    /// Embeds a batch of strings sequentially, pausing `inter_batch_delay`
    /// after every `batch_size` items and preserving input order. Fail-fast:
    /// the first failure aborts the whole batch.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
        inter_batch_delay: Duration,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let batch_size = batch_size.max(1);
        let total = texts.len();
        let mut out = Vec::with_capacity(total);

        for batch in texts.chunks(batch_size) {
            for text in batch {
                out.push(self.embed(text).await?);
            }
            on_progress(out.len(), total);
            if out.len() < total {
                sleep(inter_batch_delay).await;
            }
        }

        Ok(out)
    }

    /// Drops every cached entry. Cache coherence (identical text yields
    /// identical vectors) holds before and after a clear.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let entries = self.cache.len();
        let approx_bytes = self
            .cache
            .iter()
            .map(|entry| entry.key().len() + entry.value().len() * std::mem::size_of::<f32>())
            .sum();
        CacheStats { entries, approx_bytes }
    }

    async fn respect_rate_limit(&self) {
        let mut guard = self.last_request.lock().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < MIN_INTER_REQUEST_PAUSE {
                sleep(MIN_INTER_REQUEST_PAUSE - elapsed).await;
            }
        }
        *guard = Some(tokio::time::Instant::now());
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.respect_rate_limit().await;

            let body = EmbeddingRequest { model: &self.model, input: [text], encoding_format: "float" };
            let sent = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingResponse = response.json().await.map_err(AppError::Reqwest)?;
                        let embedding = parsed
                            .data
                            .into_iter()
                            .next()
                            .ok_or_else(|| AppError::RemoteApi { status: status.as_u16(), body: "no embedding data in response".to_string() })?
                            .embedding;
                        return Ok(embedding);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = parse_retry_after(&response).unwrap_or_else(|| backoff_duration(attempt));
                        if attempt >= MAX_ATTEMPTS {
                            return Err(remote_api_error(response).await);
                        }
                        warn!(attempt, sleep_secs = retry_after.as_secs(), "embedding provider rate limited; backing off");
                        sleep(retry_after).await;
                        continue;
                    }

                    if status == StatusCode::NOT_FOUND {
                        // Model not found: fatal, no retry.
                        return Err(remote_api_error(response).await);
                    }

                    if status.is_server_error() {
                        if attempt >= MAX_ATTEMPTS {
                            return Err(remote_api_error(response).await);
                        }
                        let delay = backoff_duration(attempt);
                        warn!(attempt, status = %status, sleep_secs = delay.as_secs(), "transient embedding error; retrying");
                        sleep(delay).await;
                        continue;
                    }

                    // Any other 4xx is fatal.
                    return Err(remote_api_error(response).await);
                }
                Err(err) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(AppError::Reqwest(err));
                    }
                    let delay = backoff_duration(attempt);
                    warn!(attempt, error = %err, sleep_secs = delay.as_secs(), "embedding network error; retrying");
                    sleep(delay).await;
                }
            }
        }
    }
}

fn backoff_duration(attempt: u32) -> Duration {
    BASE_BACKOFF.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn remote_api_error(response: Response) -> AppError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
    AppError::RemoteApi { status, body }
}

/// Truncates `text` to `max_chars`, appending a truncation marker when it
/// had to cut. The chunker already keeps chunks under the embedding budget,
/// but arbitrary free text (e.g. a pasted log dump in a ticket description)
/// can still exceed it.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let marker_chars = TRUNCATION_MARKER.chars().count();
    let budget = max_chars.saturating_sub(marker_chars);
    let mut truncated: String = text.chars().take(budget).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[must_use]
pub fn wrap(client: EmbeddingClient) -> Arc<EmbeddingClient> {
    Arc::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedding_body(values: &[f32]) -> serde_json::Value {
        json!({"data": [{"embedding": values}]})
    }

    #[tokio::test]
    async fn caches_identical_text_without_a_second_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1, 0.2])))
            .expect(1)
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "key", "test-model");
        let first = client.embed("hello world").await.expect("first call");
        let second = client.embed("hello world").await.expect("second call hits cache");
        assert_eq!(first, second);

        let stats = client.cache_stats();
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn clearing_cache_does_not_change_identical_text_coherence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.5, 0.6])))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "key", "test-model");
        let first = client.embed("stable text").await.expect("first call");
        client.clear_cache();
        assert_eq!(client.cache_stats().entries, 0);
        let second = client.embed("stable text").await.expect("second call after clear");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn retries_once_on_429_with_retry_after_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0])))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "key", "test-model");
        let embedding = client.embed("rate limited text").await.expect("eventually succeeds");
        assert_eq!(embedding, vec![1.0]);
    }

    #[tokio::test]
    async fn model_not_found_is_fatal_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "key", "missing-model");
        let result = client.embed("text").await;
        assert!(matches!(result, Err(AppError::RemoteApi { status: 404, .. })));
    }

    #[tokio::test]
    async fn embed_batch_preserves_order_and_pauses_between_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[9.0])))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "key", "test-model");
        let texts: Vec<String> = (0..5).map(|i| format!("text-{i}")).collect();
        let mut progress_calls = Vec::new();
        let embeddings = client
            .embed_batch(&texts, 2, Duration::from_millis(1), |done, total| progress_calls.push((done, total)))
            .await
            .expect("batch succeeds");

        assert_eq!(embeddings.len(), 5);
        assert_eq!(progress_calls, vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn long_text_is_truncated_with_marker_before_transmission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.3])))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "key", "test-model").with_safe_max_chars(50);
        let long_text = "a".repeat(500);
        client.embed(&long_text).await.expect("truncated request succeeds");

        let stats = client.cache_stats();
        assert_eq!(stats.entries, 1);
        let cached_key = client.cache.iter().next().unwrap().key().clone();
        assert!(cached_key.chars().count() <= 50);
        assert!(cached_key.ends_with("[truncated]"));
    }
}
