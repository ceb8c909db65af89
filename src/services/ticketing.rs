//! Ticketing platform collaborator
//!
//! Two responsibilities: fetching refund detail at creation time and
//! pushing settlement notifications back once a payout completes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::TicketingConfig;
use crate::error::{AppError, AppErrorKind, AppResult, ExternalError};

/// Refund detail as reported by the ticketing platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    pub refund_id: String,
    pub order_id: Option<String>,
    pub customer_name: Option<String>,
    pub raw: JsonValue,
}

/// Result of one notification attempt. A 2xx response counts as an
/// acknowledgement; anything else leaves the refund awaiting redelivery.
#[derive(Debug, Clone)]
pub struct NotifyResponse {
    pub status: Option<u16>,
    pub body: Option<String>,
    pub acknowledged: bool,
}

#[async_trait]
pub trait TicketingClient: Send + Sync {
    async fn fetch_refund_detail(&self, refund_id: &str) -> AppResult<TicketDetail>;

    /// Deliver a settlement notification. Transport failures resolve to an
    /// unacknowledged response rather than an error so the caller can
    /// record the attempt.
    async fn notify(&self, url: &str, payload: &JsonValue) -> NotifyResponse;
}

/// reqwest-backed ticketing client
pub struct HttpTicketingClient {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpTicketingClient {
    pub fn new(config: &TicketingConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireTicketDetail {
    refund_id: String,
    order_id: Option<String>,
    customer_name: Option<String>,
    #[serde(flatten)]
    raw: JsonValue,
}

#[async_trait]
impl TicketingClient for HttpTicketingClient {
    async fn fetch_refund_detail(&self, refund_id: &str) -> AppResult<TicketDetail> {
        let url = format!("{}/refunds/{}", self.base_url, refund_id);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::new(AppErrorKind::External(ExternalError::Timeout {
                    service: "ticketing".to_string(),
                    timeout_secs: self.timeout_secs,
                }))
            } else {
                AppError::new(AppErrorKind::External(ExternalError::Ticketing {
                    message: e.to_string(),
                }))
            }
        })?;

        if !response.status().is_success() {
            return Err(AppError::new(AppErrorKind::External(
                ExternalError::Ticketing {
                    message: format!("detail fetch returned {}", response.status()),
                },
            )));
        }

        let wire: WireTicketDetail = response.json().await.map_err(|e| {
            AppError::new(AppErrorKind::External(ExternalError::Ticketing {
                message: format!("malformed detail response: {}", e),
            }))
        })?;

        Ok(TicketDetail {
            refund_id: wire.refund_id,
            order_id: wire.order_id,
            customer_name: wire.customer_name,
            raw: wire.raw,
        })
    }

    async fn notify(&self, url: &str, payload: &JsonValue) -> NotifyResponse {
        let result = self.client.post(url).json(payload).send().await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let acknowledged = response.status().is_success();
                let body = response.text().await.ok();

                if acknowledged {
                    info!(url, status, "ticketing notification acknowledged");
                } else {
                    warn!(url, status, "ticketing notification not acknowledged");
                }

                NotifyResponse {
                    status: Some(status),
                    body,
                    acknowledged,
                }
            }
            Err(e) => {
                warn!(url, error = %e, "ticketing notification failed to send");
                NotifyResponse {
                    status: None,
                    body: Some(e.to_string()),
                    acknowledged: false,
                }
            }
        }
    }
}
