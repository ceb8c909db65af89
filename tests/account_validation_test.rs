//! Account validation engine tests: the TTL cache, the pending guard,
//! bounded polling, the audit trail, and the signed verdict envelope.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{
    InMemoryBankMappingRepository, InMemoryValidationRepository, ScriptedGatewayAdapter,
    ScriptedInquiry,
};
use refundflow_backend::database::account_validation_repository::{
    AccountValidationRepository, ValidationOutcome, ValidationStatus,
};
use refundflow_backend::database::bank_mapping_repository::BankMappingRepository;
use refundflow_backend::error::ErrorCode;
use refundflow_backend::gateway::GatewayAdapter;
use refundflow_backend::services::AccountValidator;
use refundflow_backend::settings::{InMemorySettingsStore, Settings};
use refundflow_backend::signer::{HmacSigner, Signer};
use refundflow_backend::sync::KeyedMutex;

const SIGNING_SECRET: &str = "validation-signing-secret";
const ACCOUNT: &str = "1234567890";

struct Harness {
    validations: Arc<InMemoryValidationRepository>,
    gateway: Arc<ScriptedGatewayAdapter>,
    validator: AccountValidator,
}

impl Harness {
    async fn new(settings_store: InMemorySettingsStore) -> Self {
        let banks = Arc::new(InMemoryBankMappingRepository::new());
        banks.seed("BCA", "BCA_D", "014").await;
        let validations = Arc::new(InMemoryValidationRepository::new());
        let gateway = Arc::new(ScriptedGatewayAdapter::new("nexainquiry"));
        // Zero interval keeps the poll loop instant in tests
        let settings = Settings::new(Arc::new(settings_store.with("poll_interval_secs", "0")));

        let validator = AccountValidator::new(
            banks.clone() as Arc<dyn BankMappingRepository>,
            validations.clone() as Arc<dyn AccountValidationRepository>,
            gateway.clone() as Arc<dyn GatewayAdapter>,
            settings,
            Arc::new(HmacSigner::new(SIGNING_SECRET)),
            Arc::new(KeyedMutex::new()),
        );

        Self {
            validations,
            gateway,
            validator,
        }
    }

    async fn default() -> Self {
        Self::new(InMemorySettingsStore::new()).await
    }
}

#[tokio::test]
async fn immediate_terminal_reply_yields_a_signed_verdict() {
    let h = Harness::default().await;

    let verdict = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");

    assert!(verdict.valid);
    assert!(!verdict.cached);
    assert_eq!(verdict.account_name.as_deref(), Some("BUDI SANTOSO"));

    let expected = HmacSigner::new(SIGNING_SECRET)
        .sign(format!("{}:success", ACCOUNT).as_bytes())
        .expect("sign");
    assert_eq!(verdict.signature, expected);

    let records = h.validations.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ValidationStatus::Completed);
    assert_eq!(records[0].outcome, Some(ValidationOutcome::Success));

    let audit = h.validations.list_audit(ACCOUNT).await.expect("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].stage, "initial");
    assert_eq!(audit[0].attempt, 1);
}

#[tokio::test]
async fn fresh_result_is_served_from_cache() {
    let h = Harness::default().await;

    let first = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");
    let second = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.signature, second.signature);
    assert_eq!(h.gateway.inquiry_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pending_validation_blocks_a_second_check() {
    let h = Harness::default().await;
    h.validations
        .insert_pending(ACCOUNT)
        .await
        .expect("insert pending");

    let err = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect_err("check must fail");

    assert_eq!(err.error_code(), ErrorCode::AlreadyChecking);
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.gateway.inquiry_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pending_reply_is_polled_to_completion() {
    let h = Harness::default().await;
    h.gateway
        .script_inquiry(ScriptedInquiry::Pending("poll-ref-1".to_string()))
        .await;
    h.gateway
        .script_poll(ScriptedInquiry::Pending("poll-ref-1".to_string()))
        .await;
    h.gateway
        .script_poll(ScriptedInquiry::Terminal {
            found: true,
            virtual_account: false,
            account_name: Some("BUDI SANTOSO".to_string()),
        })
        .await;

    let verdict = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");

    assert!(verdict.valid);
    assert_eq!(h.gateway.poll_calls.load(Ordering::SeqCst), 2);

    let records = h.validations.records().await;
    assert_eq!(records[0].poll_reference.as_deref(), Some("poll-ref-1"));
    assert_eq!(records[0].status, ValidationStatus::Completed);

    // Audit keeps the full round-trip order: initial inquiry, then polls
    let audit = h.validations.list_audit(ACCOUNT).await.expect("audit");
    let stages: Vec<(&str, i32)> = audit
        .iter()
        .map(|entry| (entry.stage.as_str(), entry.attempt))
        .collect();
    assert_eq!(stages, vec![("initial", 1), ("poll", 1), ("poll", 2)]);
}

#[tokio::test]
async fn exhausted_poll_budget_records_a_failure() {
    let store = InMemorySettingsStore::new().with("poll_max_attempts", "2");
    let h = Harness::new(store).await;
    h.gateway
        .script_inquiry(ScriptedInquiry::Pending("poll-ref-1".to_string()))
        .await;
    // No scripted polls: every poll answers pending again

    let verdict = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should finish");

    assert!(!verdict.valid);
    assert_eq!(h.gateway.poll_calls.load(Ordering::SeqCst), 2);

    let records = h.validations.records().await;
    assert_eq!(records[0].status, ValidationStatus::Completed);
    assert_eq!(records[0].outcome, Some(ValidationOutcome::Failed));
}

#[tokio::test]
async fn transport_error_abandons_the_record() {
    let h = Harness::default().await;
    h.gateway
        .script_inquiry(ScriptedInquiry::TransportError)
        .await;

    let err = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect_err("check must fail");
    assert_eq!(err.error_code(), ErrorCode::GatewayError);

    let records = h.validations.records().await;
    assert_eq!(records.len(), 1);
    assert!(records[0].consumed);

    // The failed round trip is in the audit trail too
    let audit = h.validations.list_audit(ACCOUNT).await.expect("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].stage, "initial");
    assert!(audit[0].response.get("error").is_some());

    // The abandoned record no longer blocks a fresh check
    let verdict = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("second check should succeed");
    assert!(verdict.valid);
}

#[tokio::test]
async fn poll_transport_error_is_audited_and_abandons_the_record() {
    let h = Harness::default().await;
    h.gateway
        .script_inquiry(ScriptedInquiry::Pending("poll-ref-1".to_string()))
        .await;
    h.gateway.script_poll(ScriptedInquiry::TransportError).await;

    let err = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect_err("check must fail");
    assert_eq!(err.error_code(), ErrorCode::GatewayError);

    let records = h.validations.records().await;
    assert!(records[0].consumed);

    let audit = h.validations.list_audit(ACCOUNT).await.expect("audit");
    let stages: Vec<(&str, i32)> = audit
        .iter()
        .map(|entry| (entry.stage.as_str(), entry.attempt))
        .collect();
    assert_eq!(stages, vec![("initial", 1), ("poll", 1)]);
    assert!(audit[1].response.get("error").is_some());
}

#[tokio::test]
async fn virtual_accounts_are_invalid() {
    let h = Harness::default().await;
    h.gateway
        .script_inquiry(ScriptedInquiry::Terminal {
            found: true,
            virtual_account: true,
            account_name: Some("VA CUSTOMER".to_string()),
        })
        .await;

    let verdict = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");
    assert!(!verdict.valid);

    let expected = HmacSigner::new(SIGNING_SECRET)
        .sign(format!("{}:failed", ACCOUNT).as_bytes())
        .expect("sign");
    assert_eq!(verdict.signature, expected);
}

#[tokio::test]
async fn found_account_is_valid_even_without_a_reported_name() {
    let h = Harness::default().await;
    h.gateway
        .script_inquiry(ScriptedInquiry::Terminal {
            found: true,
            virtual_account: false,
            account_name: None,
        })
        .await;

    let verdict = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");

    assert!(verdict.valid);
    assert!(verdict.account_name.is_none());

    let records = h.validations.records().await;
    assert_eq!(records[0].outcome, Some(ValidationOutcome::Success));
}

#[tokio::test]
async fn failed_verdicts_are_cached_too() {
    let h = Harness::default().await;
    h.gateway
        .script_inquiry(ScriptedInquiry::Terminal {
            found: false,
            virtual_account: false,
            account_name: None,
        })
        .await;

    let first = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");
    let second = h
        .validator
        .check_account("BCA", ACCOUNT)
        .await
        .expect("check should succeed");

    assert!(!first.valid);
    assert!(!second.valid);
    assert!(second.cached);
    assert_eq!(h.gateway.inquiry_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bank_without_inquiry_mapping_is_rejected() {
    let h = Harness::default().await;

    let err = h
        .validator
        .check_account("XYZ", ACCOUNT)
        .await
        .expect_err("check must fail");

    assert_eq!(err.error_code(), ErrorCode::BankNotFound);
    assert!(h.validations.records().await.is_empty());
}
