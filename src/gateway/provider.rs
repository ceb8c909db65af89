use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::ProviderEndpoint;
use crate::credentials::CredentialStore;
use crate::gateway::adapter::GatewayAdapter;
use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::http::GatewayHttpClient;
use crate::gateway::types::{
    AccountCheckRequest, BalanceInfo, BankEntry, DisbursementAck, DisbursementRequest,
    InquiryReply, ProviderEnvelope,
};

/// REST paths exposed by a gateway provider
#[derive(Debug, Clone)]
pub struct ProviderRoutes {
    pub banks: &'static str,
    pub disbursements: &'static str,
    pub balance: &'static str,
    pub inquiries: &'static str,
}

impl Default for ProviderRoutes {
    fn default() -> Self {
        Self {
            banks: "/v1/banks",
            disbursements: "/v1/disbursements",
            balance: "/v1/balance",
            inquiries: "/v1/account-inquiries",
        }
    }
}

/// reqwest-backed gateway adapter. The credential is resolved per call so
/// rotated secrets take effect without a restart.
pub struct HttpGatewayAdapter {
    name: String,
    base_url: String,
    environment: String,
    routes: ProviderRoutes,
    credentials: Arc<dyn CredentialStore>,
    http: GatewayHttpClient,
}

impl HttpGatewayAdapter {
    pub fn new(
        endpoint: &ProviderEndpoint,
        environment: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
    ) -> GatewayResult<Self> {
        let http = GatewayHttpClient::new(
            Duration::from_secs(endpoint.timeout_secs),
            endpoint.max_retries,
        )?;

        Ok(Self {
            name: endpoint.name.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            environment: environment.into(),
            routes: ProviderRoutes::default(),
            credentials,
            http,
        })
    }

    pub fn with_routes(mut self, routes: ProviderRoutes) -> Self {
        self.routes = routes;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn credential(&self) -> GatewayResult<String> {
        self.credentials
            .get_credential(&self.name, &self.environment)
            .await
            .map_err(|e| GatewayError::CredentialError {
                message: e.to_string(),
            })
    }

    fn require_data<T>(&self, envelope: ProviderEnvelope<T>) -> GatewayResult<T> {
        if !envelope.status {
            return Err(GatewayError::ProviderError {
                provider: self.name.clone(),
                message: envelope.message,
                provider_code: None,
                retryable: false,
            });
        }
        envelope.data.ok_or_else(|| GatewayError::ProviderError {
            provider: self.name.clone(),
            message: "provider reported success without data".to_string(),
            provider_code: None,
            retryable: false,
        })
    }

    fn map_inquiry(&self, wire: WireInquiry) -> GatewayResult<InquiryReply> {
        match wire.status.to_uppercase().as_str() {
            "RESOLVED" => Ok(InquiryReply::Terminal {
                found: wire.found.unwrap_or(false),
                virtual_account: wire.virtual_account.unwrap_or(false),
                account_name: wire.account_name,
                raw: wire.raw,
            }),
            "PENDING" => {
                let poll_reference =
                    wire.poll_reference
                        .ok_or_else(|| GatewayError::ProviderError {
                            provider: self.name.clone(),
                            message: "pending inquiry without poll reference".to_string(),
                            provider_code: None,
                            retryable: false,
                        })?;
                Ok(InquiryReply::Pending {
                    poll_reference,
                    raw: wire.raw,
                })
            }
            other => Err(GatewayError::ProviderError {
                provider: self.name.clone(),
                message: format!("unexpected inquiry status: {}", other),
                provider_code: Some(other.to_string()),
                retryable: false,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireBank {
    code: String,
    name: String,
    #[serde(flatten)]
    raw: JsonValue,
}

#[derive(Debug, Deserialize)]
struct WireDisbursementAck {
    reference: Option<String>,
    status: String,
    #[serde(flatten)]
    raw: JsonValue,
}

#[derive(Debug, Deserialize)]
struct WireBalance {
    available: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct WireInquiry {
    status: String,
    found: Option<bool>,
    virtual_account: Option<bool>,
    account_name: Option<String>,
    poll_reference: Option<String>,
    #[serde(flatten)]
    raw: JsonValue,
}

#[async_trait]
impl GatewayAdapter for HttpGatewayAdapter {
    async fn bank_list(&self) -> GatewayResult<Vec<BankEntry>> {
        let credential = self.credential().await?;
        let envelope: ProviderEnvelope<Vec<WireBank>> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(self.routes.banks),
                Some(&credential),
                None,
                &[],
            )
            .await?;

        let banks = self.require_data(envelope)?;
        Ok(banks
            .into_iter()
            .map(|b| BankEntry {
                code: b.code,
                name: b.name,
                raw: b.raw,
            })
            .collect())
    }

    async fn disbursement(
        &self,
        idempotency_key: &str,
        request: &DisbursementRequest,
    ) -> GatewayResult<DisbursementAck> {
        if request.amount <= 0 {
            return Err(GatewayError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }

        let credential = self.credential().await?;
        let payload = serde_json::json!({
            "external_id": request.external_id,
            "bank_code": request.bank_code,
            "account_number": request.account_number,
            "account_holder_name": request.account_holder,
            "amount": request.amount,
            "remark": request.remark,
        });

        let envelope: ProviderEnvelope<WireDisbursementAck> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(self.routes.disbursements),
                Some(&credential),
                Some(&payload),
                &[
                    ("Content-Type", "application/json"),
                    ("X-Idempotency-Key", idempotency_key),
                ],
            )
            .await?;

        let ack = self.require_data(envelope)?;
        info!(
            provider = %self.name,
            external_id = %request.external_id,
            reference = ?ack.reference,
            "disbursement accepted by provider"
        );

        Ok(DisbursementAck {
            provider_reference: ack.reference,
            accepted: ack.status.to_uppercase() != "REJECTED",
            raw: ack.raw,
        })
    }

    async fn get_balance(&self) -> GatewayResult<BalanceInfo> {
        let credential = self.credential().await?;
        let envelope: ProviderEnvelope<WireBalance> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(self.routes.balance),
                Some(&credential),
                None,
                &[],
            )
            .await?;

        let balance = self.require_data(envelope)?;
        Ok(BalanceInfo {
            available: balance.available,
            currency: balance.currency,
        })
    }

    async fn validate_account(&self, request: &AccountCheckRequest) -> GatewayResult<InquiryReply> {
        let credential = self.credential().await?;
        let payload = serde_json::json!({
            "bank_code": request.inquiry_code,
            "account_number": request.account_number,
        });

        let envelope: ProviderEnvelope<WireInquiry> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(self.routes.inquiries),
                Some(&credential),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        let wire = self.require_data(envelope)?;
        self.map_inquiry(wire)
    }

    async fn poll_result(&self, poll_reference: &str) -> GatewayResult<InquiryReply> {
        let credential = self.credential().await?;
        let envelope: ProviderEnvelope<WireInquiry> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("{}/{}", self.routes.inquiries, poll_reference)),
                Some(&credential),
                None,
                &[],
            )
            .await?;

        let wire = self.require_data(envelope)?;
        self.map_inquiry(wire)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
