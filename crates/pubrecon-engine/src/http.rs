use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{EngineError, Result};

/// Longest `Retry-After` we are willing to honour.
const MAX_RETRY_AFTER_SECS: u64 = 120;

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// reqwest client with a minimum interval between requests and retries on 429
/// and transport errors.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
    label: String,
}

impl RateLimitedClient {
    pub fn new(
        label: &str,
        min_interval: Duration,
        max_retries: u32,
        user_agent: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
            label: label.to_string(),
        })
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let resp = self.client.get(url).headers(headers.clone()).send().await;
            match resp {
                Ok(r) if r.status() == 429 => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .unwrap_or(2u64.pow(attempt + 1))
                        .min(MAX_RETRY_AFTER_SECS);
                    if attempt >= self.max_retries {
                        return Err(EngineError::RateLimit(self.label.clone(), wait));
                    }
                    tracing::warn!(client = %self.label, wait, "rate limited, backing off");
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => {
                    return Err(EngineError::HttpStatus {
                        url: url.to_string(),
                        status: r.status().as_u16(),
                    });
                }
                Ok(r) => return r.text().await.map_err(EngineError::Http),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(EngineError::Http(e));
                    }
                    let backoff = 2u64.pow(attempt);
                    tracing::debug!(client = %self.label, error = %e, backoff, "transport error, retrying");
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T> {
        let text = self.get_with_headers(url, headers).await?;
        serde_json::from_str(&text).map_err(|e| EngineError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client(retries: u32) -> RateLimitedClient {
        RateLimitedClient::new(
            "test",
            Duration::from_millis(0),
            retries,
            "pubrecon-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_retries_429_until_budget_spent() {
        let mut server = Server::new_async().await;
        let limited = server
            .mock("GET", "/data")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(2)
            .create_async()
            .await;

        let err = client(1)
            .get(&format!("{}/data", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RateLimit(_, _)));
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted_is_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "0")
            .create_async()
            .await;

        let err = client(0)
            .get(&format!("{}/busy", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RateLimit(_, 0)));
    }

    #[tokio::test]
    async fn test_404_is_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let err = client(2)
            .get(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_json() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/json")
            .with_header("content-type", "application/json")
            .with_body(r#"{"value": 7}"#)
            .create_async()
            .await;

        let v: serde_json::Value = client(0)
            .get_json(&format!("{}/json", server.url()))
            .await
            .unwrap();
        assert_eq!(v["value"], 7);
    }
}
