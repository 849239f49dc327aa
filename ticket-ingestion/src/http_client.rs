use std::time::Duration;

use base64::Engine;
use common::error::AppError;
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const INTER_PAGE_PAUSE: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated HTTP client for the ticketing platform's REST surface.
///
/// Retries with exponential backoff, branching on status code: 429 honors
/// the server's `Retry-After` header, 5xx/network errors back off
/// exponentially, 404 is surfaced to the caller for existence checks, and any
/// other 4xx is fatal.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
}

impl HttpClient {
    /// `domain` is normally a bare host (`acme.zendesk.com`); a value that
    /// already carries a scheme (as in tests, against a local mock server) is
    /// used as-is instead of being forced onto `https://`.
    #[must_use]
    pub fn new(domain: &str, user: &str, token: &str) -> Self {
        let credential = format!("{user}/token:{token}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(credential);
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            format!("{domain}/api/v2")
        } else {
            format!("https://{domain}/api/v2")
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_header: format!("Basic {encoded}"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let url = self.url(path);
        self.get_absolute(&url, query).await
    }

    /// Follows an already-built `next_page` URL the ticketing API returns.
    /// Callers pause [`INTER_PAGE_PAUSE`] between pages to stay polite to
    /// the remote API's rate limits.
    pub async fn get_absolute<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let url = url.to_string();
        let query = query.to_vec();
        let response = self
            .execute(
                || {
                    self.client
                        .get(&url)
                        .query(&query)
                        .header("Authorization", &self.auth_header)
                        .timeout(REQUEST_TIMEOUT)
                },
                false,
            )
            .await?
            .expect("non-404-tolerant GET always yields a response");

        response.json::<T>().await.map_err(AppError::Reqwest)
    }

    /// GET that treats a 404 as "does not exist" rather than an error, used
    /// by the audit recorder's schema existence check.
    pub async fn exists(&self, path: &str) -> Result<bool, AppError> {
        let url = self.url(path);
        let response = self
            .execute(
                || {
                    self.client
                        .get(&url)
                        .header("Authorization", &self.auth_header)
                        .timeout(REQUEST_TIMEOUT)
                },
                true,
            )
            .await?;
        Ok(response.is_some())
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let url = self.url(path);
        let response = self
            .execute(
                || {
                    self.client
                        .post(&url)
                        .header("Authorization", &self.auth_header)
                        .json(body)
                        .timeout(REQUEST_TIMEOUT)
                },
                false,
            )
            .await?
            .expect("non-404-tolerant POST always yields a response");
        response.json::<T>().await.map_err(AppError::Reqwest)
    }

    /// POST that treats 422 ("already exists") as success, returning `None`
    /// in that case. Used for idempotent custom-object field creation.
    pub async fn post_tolerating_conflict<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<bool, AppError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(AppError::Reqwest)?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            debug!(path, "field already exists; treating as success");
            return Ok(false);
        }
        if response.status().is_success() {
            return Ok(true);
        }
        Err(remote_api_error(response).await)
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let url = self.url(path);
        let response = self
            .execute(
                || {
                    self.client
                        .patch(&url)
                        .header("Authorization", &self.auth_header)
                        .json(body)
                        .timeout(REQUEST_TIMEOUT)
                },
                false,
            )
            .await?
            .expect("non-404-tolerant PATCH always yields a response");
        response.json::<T>().await.map_err(AppError::Reqwest)
    }

    /// Core retry loop. `allow_404_absent` makes a 404 response return
    /// `Ok(None)` instead of an error; every other outcome is classified by
    /// status code (see the per-status branching above).
    async fn execute(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        allow_404_absent: bool,
    ) -> Result<Option<Response>, AppError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let sent = build().send().await;

            match sent {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(Some(response));
                    }

                    if allow_404_absent && status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = parse_retry_after(&response)
                            .unwrap_or_else(|| backoff_duration(attempt));
                        if attempt >= MAX_ATTEMPTS {
                            return Err(remote_api_error(response).await);
                        }
                        warn!(attempt, sleep_secs = retry_after.as_secs(), "rate limited; backing off");
                        sleep(retry_after).await;
                        continue;
                    }

                    if status.is_server_error() {
                        if attempt >= MAX_ATTEMPTS {
                            return Err(remote_api_error(response).await);
                        }
                        let delay = backoff_duration(attempt);
                        warn!(attempt, status = %status, sleep_secs = delay.as_secs(), "transient remote error; retrying");
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
                    warn!(attempt, error = %err, sleep_secs = delay.as_secs(), "network error; retrying");
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
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    AppError::RemoteApi { status, body }
}

/// Inter-page pause the [`crate::fetcher`] applies between cursor follows.
#[must_use]
pub fn inter_page_pause() -> Duration {
    INTER_PAGE_PAUSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_succeeds_with_basic_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/ticket_fields.json"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri(), "user@x.com", "secret");
        let body: serde_json::Value = client.get("/ticket_fields.json", &[]).await.expect("request");
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/1/comments.json"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/1/comments.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"comments": []})))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri(), "user", "token");
        let body: serde_json::Value =
            client.get("/tickets/1/comments.json", &[]).await.expect("eventually succeeds");
        assert!(body["comments"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_retryable_4xx_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/ticket_fields.json"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri(), "user", "token");
        let result: Result<serde_json::Value, AppError> =
            client.get("/ticket_fields.json", &[]).await;
        match result {
            Err(AppError::RemoteApi { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected fatal RemoteApi error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exists_treats_404_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/custom_objects/ingestion_audit_record"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri(), "user", "token");
        let present = client
            .exists("/custom_objects/ingestion_audit_record")
            .await
            .expect("404 is not an error for exists()");
        assert!(!present);
    }

}
