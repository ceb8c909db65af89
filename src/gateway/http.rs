use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

use crate::gateway::error::{GatewayError, GatewayResult};

/// HTTP client for provider traffic.
///
/// Every request carries a timeout. Transport failures, 429s and 5xx
/// responses are retried with capped exponential backoff plus jitter; all
/// other responses are returned to the caller on the first attempt. The
/// same policy applies to disbursement and validation provider calls.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

const BACKOFF_CAP_SECS: u64 = 30;
const JITTER_MS: u64 = 250;

impl GatewayHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> GatewayResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| GatewayError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    fn backoff(attempt: u32) -> Duration {
        let base = (1_u64 << attempt.min(5)).min(BACKOFF_CAP_SECS);
        let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
        Duration::from_secs(base) + Duration::from_millis(jitter)
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> GatewayResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            for (k, v) in additional_headers {
                request = request.header(*k, *v);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    GatewayError::NetworkError {
                        message: format!("provider request failed: {}", e),
                    }
                }
            });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            GatewayError::ProviderError {
                                provider: "http".to_string(),
                                message: format!("invalid provider JSON response: {}", e),
                                provider_code: None,
                                retryable: false,
                            }
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Self::backoff(attempt)).await;
                            continue;
                        }
                        return Err(GatewayError::RateLimitError {
                            message: "provider rate limit exceeded".to_string(),
                            retry_after_seconds: None,
                        });
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }

                    return Err(GatewayError::ProviderError {
                        provider: "http".to_string(),
                        message: format!("HTTP {}: {}", status, text),
                        provider_code: Some(status.as_u16().to_string()),
                        retryable: status.is_server_error(),
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::NetworkError {
            message: "provider request failed".to_string(),
        }))
    }
}
