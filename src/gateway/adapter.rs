use async_trait::async_trait;

use crate::gateway::error::GatewayResult;
use crate::gateway::types::{
    AccountCheckRequest, BalanceInfo, BankEntry, DisbursementAck, DisbursementRequest,
    InquiryReply,
};

/// Uniform capability surface over a gateway provider.
///
/// One implementation wraps the disbursement provider, another the
/// identity-verification provider; both expose the full surface and the
/// services call only the operations their provider supports. Credentials
/// are resolved inside the adapter so callers never handle secrets.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    async fn bank_list(&self) -> GatewayResult<Vec<BankEntry>>;

    /// Issue a payout. The idempotency key guarantees at-most-once execution
    /// even if the request is retransmitted.
    async fn disbursement(
        &self,
        idempotency_key: &str,
        request: &DisbursementRequest,
    ) -> GatewayResult<DisbursementAck>;

    async fn get_balance(&self) -> GatewayResult<BalanceInfo>;

    async fn validate_account(&self, request: &AccountCheckRequest) -> GatewayResult<InquiryReply>;

    async fn poll_result(&self, poll_reference: &str) -> GatewayResult<InquiryReply>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct MockAdapter;

    #[async_trait]
    impl GatewayAdapter for MockAdapter {
        async fn bank_list(&self) -> GatewayResult<Vec<BankEntry>> {
            Ok(vec![BankEntry {
                code: "BCA".to_string(),
                name: "Bank Central Asia".to_string(),
                raw: json!({}),
            }])
        }

        async fn disbursement(
            &self,
            idempotency_key: &str,
            request: &DisbursementRequest,
        ) -> GatewayResult<DisbursementAck> {
            Ok(DisbursementAck {
                provider_reference: Some(format!("prov-{}", idempotency_key)),
                accepted: true,
                raw: json!({ "external_id": request.external_id }),
            })
        }

        async fn get_balance(&self) -> GatewayResult<BalanceInfo> {
            Ok(BalanceInfo {
                available: 1_000_000,
                currency: "IDR".to_string(),
            })
        }

        async fn validate_account(
            &self,
            _request: &AccountCheckRequest,
        ) -> GatewayResult<InquiryReply> {
            Ok(InquiryReply::Pending {
                poll_reference: "poll-1".to_string(),
                raw: json!({}),
            })
        }

        async fn poll_result(&self, _poll_reference: &str) -> GatewayResult<InquiryReply> {
            Ok(InquiryReply::Terminal {
                found: true,
                virtual_account: false,
                account_name: Some("BUDI SANTOSO".to_string()),
                raw: json!({}),
            })
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_adapter() {
        let adapter: Box<dyn GatewayAdapter> = Box::new(MockAdapter);

        let banks = adapter.bank_list().await.expect("bank list should succeed");
        assert_eq!(banks.len(), 1);

        let ack = adapter
            .disbursement(
                "R100-001",
                &DisbursementRequest {
                    external_id: "R100".to_string(),
                    bank_code: "BCA".to_string(),
                    account_number: "1234567890".to_string(),
                    account_holder: "BUDI SANTOSO".to_string(),
                    amount: 150_000,
                    remark: None,
                },
            )
            .await
            .expect("disbursement should succeed");
        assert!(ack.accepted);
        assert_eq!(ack.provider_reference.as_deref(), Some("prov-R100-001"));
    }
}
