//! In-memory collaborators for exercising the services without a database
//! or live providers.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use refundflow_backend::database::account_validation_repository::{
    AccountValidationRecord, AccountValidationRepository, ValidationAuditEntry,
    ValidationOutcome, ValidationStatus,
};
use refundflow_backend::database::bank_mapping_repository::{
    BankMapping, BankMappingRepository, BankMappingUpsert,
};
use refundflow_backend::database::error::{DatabaseError, DatabaseErrorKind};
use refundflow_backend::database::refund_repository::{Refund, RefundRepository};
use refundflow_backend::error::AppResult;
use refundflow_backend::gateway::types::{
    AccountCheckRequest, BalanceInfo, BankEntry, DisbursementAck, DisbursementRequest,
    InquiryReply,
};
use refundflow_backend::gateway::{GatewayAdapter, GatewayError, GatewayResult};
use refundflow_backend::services::ticketing::{NotifyResponse, TicketDetail, TicketingClient};

// ---------------------------------------------------------------------------
// Refund repository

#[derive(Default)]
pub struct InMemoryRefundRepository {
    refunds: Mutex<HashMap<String, Refund>>,
}

impl InMemoryRefundRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, refund_id: &str) -> Option<Refund> {
        self.refunds.lock().await.get(refund_id).cloned()
    }

    pub async fn put(&self, refund: Refund) {
        self.refunds
            .lock()
            .await
            .insert(refund.refund_id.clone(), refund);
    }
}

#[async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn insert(&self, refund: &Refund) -> Result<Refund, DatabaseError> {
        let mut map = self.refunds.lock().await;
        if map.contains_key(&refund.refund_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "refunds_refund_id_key".to_string(),
            }));
        }
        map.insert(refund.refund_id.clone(), refund.clone());
        Ok(refund.clone())
    }

    async fn find_by_refund_id(&self, refund_id: &str) -> Result<Option<Refund>, DatabaseError> {
        let map = self.refunds.lock().await;
        Ok(map.get(refund_id).filter(|r| !r.is_deleted).cloned())
    }

    async fn find_awaiting_callback(
        &self,
        refund_id: &str,
    ) -> Result<Option<Refund>, DatabaseError> {
        let map = self.refunds.lock().await;
        Ok(map
            .get(refund_id)
            .filter(|r| !r.is_deleted && r.status.awaits_callback())
            .cloned())
    }

    async fn update(&self, refund: &Refund) -> Result<Refund, DatabaseError> {
        let mut map = self.refunds.lock().await;
        let stored = map.get_mut(&refund.refund_id).ok_or_else(|| {
            DatabaseError::not_found("Refund", refund.refund_id.clone())
        })?;
        if stored.version != refund.version {
            return Err(DatabaseError::version_conflict(
                "Refund",
                refund.refund_id.clone(),
            ));
        }
        let mut updated = refund.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_due_for_retry(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Refund>, DatabaseError> {
        let map = self.refunds.lock().await;
        let mut due: Vec<Refund> = map
            .values()
            .filter(|r| {
                !r.is_deleted
                    && r.status.allows_retry()
                    && r.retry_at.map(|at| at >= from && at <= to).unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.retry_at);
        Ok(due)
    }

    async fn find_due_for_disbursement(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Refund>, DatabaseError> {
        let map = self.refunds.lock().await;
        let mut due: Vec<Refund> = map
            .values()
            .filter(|r| {
                !r.is_deleted
                    && r.request_history.is_empty()
                    && r.disburse_after.map(|at| at <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.disburse_after);
        Ok(due)
    }
}

// ---------------------------------------------------------------------------
// Bank mapping repository

#[derive(Default)]
pub struct InMemoryBankMappingRepository {
    mappings: Mutex<HashMap<String, BankMapping>>,
}

impl InMemoryBankMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully-mapped, enabled bank
    pub async fn seed(&self, bank_code: &str, disburse_code: &str, inquiry_code: &str) {
        let now = Utc::now();
        self.mappings.lock().await.insert(
            bank_code.to_string(),
            BankMapping {
                id: Uuid::new_v4(),
                bank_code: bank_code.to_string(),
                bank_name: format!("Bank {}", bank_code),
                disburse_code: Some(disburse_code.to_string()),
                inquiry_code: Some(inquiry_code.to_string()),
                enabled: true,
                disburse_meta: None,
                inquiry_meta: None,
                created_at: now,
                updated_at: now,
            },
        );
    }
}

#[async_trait]
impl BankMappingRepository for InMemoryBankMappingRepository {
    async fn find_by_bank_code(
        &self,
        bank_code: &str,
    ) -> Result<Option<BankMapping>, DatabaseError> {
        Ok(self.mappings.lock().await.get(bank_code).cloned())
    }

    async fn list(&self) -> Result<Vec<BankMapping>, DatabaseError> {
        let mut all: Vec<BankMapping> = self.mappings.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.bank_code.cmp(&b.bank_code));
        Ok(all)
    }

    async fn upsert(&self, mapping: &BankMappingUpsert) -> Result<BankMapping, DatabaseError> {
        let mut map = self.mappings.lock().await;
        let now = Utc::now();
        let stored = map
            .entry(mapping.bank_code.clone())
            .and_modify(|existing| {
                existing.bank_name = mapping.bank_name.clone();
                existing.disburse_code = mapping.disburse_code.clone();
                existing.inquiry_code = mapping.inquiry_code.clone();
                existing.disburse_meta = mapping.disburse_meta.clone();
                existing.inquiry_meta = mapping.inquiry_meta.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| BankMapping {
                id: Uuid::new_v4(),
                bank_code: mapping.bank_code.clone(),
                bank_name: mapping.bank_name.clone(),
                disburse_code: mapping.disburse_code.clone(),
                inquiry_code: mapping.inquiry_code.clone(),
                enabled: true,
                disburse_meta: mapping.disburse_meta.clone(),
                inquiry_meta: mapping.inquiry_meta.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(stored.clone())
    }
}

// ---------------------------------------------------------------------------
// Account validation repository

#[derive(Default)]
pub struct InMemoryValidationRepository {
    records: Mutex<Vec<AccountValidationRecord>>,
    audit: Mutex<Vec<ValidationAuditEntry>>,
}

impl InMemoryValidationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_record(&self, record: AccountValidationRecord) {
        self.records.lock().await.push(record);
    }

    pub async fn records(&self) -> Vec<AccountValidationRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AccountValidationRepository for InMemoryValidationRepository {
    async fn find_latest(
        &self,
        account_number: &str,
    ) -> Result<Option<AccountValidationRecord>, DatabaseError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .rev()
            .find(|r| r.account_number == account_number && !r.consumed)
            .cloned())
    }

    async fn insert_pending(
        &self,
        account_number: &str,
    ) -> Result<AccountValidationRecord, DatabaseError> {
        let record = AccountValidationRecord {
            id: Uuid::new_v4(),
            account_number: account_number.to_string(),
            status: ValidationStatus::Pending,
            outcome: None,
            account_name: None,
            poll_reference: None,
            raw: None,
            consumed: false,
            checked_at: None,
            created_at: Utc::now(),
        };
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn set_poll_reference(
        &self,
        id: Uuid,
        poll_reference: &str,
    ) -> Result<(), DatabaseError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DatabaseError::not_found("AccountValidation", id.to_string()))?;
        record.poll_reference = Some(poll_reference.to_string());
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        outcome: ValidationOutcome,
        account_name: Option<&str>,
        raw: &JsonValue,
    ) -> Result<(), DatabaseError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id && r.status == ValidationStatus::Pending)
            .ok_or_else(|| DatabaseError::not_found("AccountValidation", id.to_string()))?;
        record.status = ValidationStatus::Completed;
        record.outcome = Some(outcome);
        record.account_name = account_name.map(str::to_string);
        record.raw = Some(raw.clone());
        record.checked_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_consumed(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DatabaseError::not_found("AccountValidation", id.to_string()))?;
        record.consumed = true;
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<AccountValidationRecord>, DatabaseError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| {
                r.status == ValidationStatus::Pending
                    && !r.consumed
                    && r.poll_reference.is_some()
            })
            .cloned()
            .collect())
    }

    async fn append_audit(
        &self,
        account_number: &str,
        stage: &str,
        attempt: i32,
        response: &JsonValue,
    ) -> Result<(), DatabaseError> {
        self.audit.lock().await.push(ValidationAuditEntry {
            id: Uuid::new_v4(),
            account_number: account_number.to_string(),
            stage: stage.to_string(),
            attempt,
            response: response.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_audit(
        &self,
        account_number: &str,
    ) -> Result<Vec<ValidationAuditEntry>, DatabaseError> {
        let audit = self.audit.lock().await;
        Ok(audit
            .iter()
            .filter(|entry| entry.account_number == account_number)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Gateway adapter

/// Scripted disbursement behaviors, consumed front to back
#[derive(Debug, Clone)]
pub enum ScriptedDisburse {
    Accept,
    Reject(String),
    TransportError,
}

/// Scripted inquiry replies, consumed front to back
#[derive(Debug, Clone)]
pub enum ScriptedInquiry {
    Terminal {
        found: bool,
        virtual_account: bool,
        account_name: Option<String>,
    },
    Pending(String),
    TransportError,
}

pub struct ScriptedGatewayAdapter {
    name: String,
    banks: Vec<BankEntry>,
    disburse_script: Mutex<VecDeque<ScriptedDisburse>>,
    inquiry_script: Mutex<VecDeque<ScriptedInquiry>>,
    poll_script: Mutex<VecDeque<ScriptedInquiry>>,
    pub disburse_calls: AtomicUsize,
    pub inquiry_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    /// (idempotency_key, external_id, amount) per disbursement call
    pub sent: Mutex<Vec<(String, String, i64)>>,
}

impl ScriptedGatewayAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            banks: Vec::new(),
            disburse_script: Mutex::new(VecDeque::new()),
            inquiry_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(VecDeque::new()),
            disburse_calls: AtomicUsize::new(0),
            inquiry_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_banks(mut self, banks: Vec<BankEntry>) -> Self {
        self.banks = banks;
        self
    }

    pub async fn script_disburse(&self, step: ScriptedDisburse) {
        self.disburse_script.lock().await.push_back(step);
    }

    pub async fn script_inquiry(&self, step: ScriptedInquiry) {
        self.inquiry_script.lock().await.push_back(step);
    }

    pub async fn script_poll(&self, step: ScriptedInquiry) {
        self.poll_script.lock().await.push_back(step);
    }

    fn inquiry_reply(&self, step: ScriptedInquiry) -> GatewayResult<InquiryReply> {
        match step {
            ScriptedInquiry::Terminal {
                found,
                virtual_account,
                account_name,
            } => Ok(InquiryReply::Terminal {
                found,
                virtual_account,
                account_name,
                raw: json!({"scripted": true}),
            }),
            ScriptedInquiry::Pending(reference) => Ok(InquiryReply::Pending {
                poll_reference: reference,
                raw: json!({"scripted": true}),
            }),
            ScriptedInquiry::TransportError => Err(GatewayError::NetworkError {
                message: "connection reset".to_string(),
            }),
        }
    }
}

#[async_trait]
impl GatewayAdapter for ScriptedGatewayAdapter {
    async fn bank_list(&self) -> GatewayResult<Vec<BankEntry>> {
        Ok(self.banks.clone())
    }

    async fn disbursement(
        &self,
        idempotency_key: &str,
        request: &DisbursementRequest,
    ) -> GatewayResult<DisbursementAck> {
        self.disburse_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push((
            idempotency_key.to_string(),
            request.external_id.clone(),
            request.amount,
        ));

        let step = self
            .disburse_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedDisburse::Accept);

        match step {
            ScriptedDisburse::Accept => Ok(DisbursementAck {
                provider_reference: Some(format!("prov-{}", idempotency_key)),
                accepted: true,
                raw: json!({}),
            }),
            ScriptedDisburse::Reject(message) => Err(GatewayError::ProviderError {
                provider: self.name.clone(),
                message,
                provider_code: None,
                retryable: false,
            }),
            ScriptedDisburse::TransportError => Err(GatewayError::NetworkError {
                message: "connection reset".to_string(),
            }),
        }
    }

    async fn get_balance(&self) -> GatewayResult<BalanceInfo> {
        Ok(BalanceInfo {
            available: 10_000_000,
            currency: "IDR".to_string(),
        })
    }

    async fn validate_account(
        &self,
        _request: &AccountCheckRequest,
    ) -> GatewayResult<InquiryReply> {
        self.inquiry_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .inquiry_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedInquiry::Terminal {
                found: true,
                virtual_account: false,
                account_name: Some("BUDI SANTOSO".to_string()),
            });
        self.inquiry_reply(step)
    }

    async fn poll_result(&self, _poll_reference: &str) -> GatewayResult<InquiryReply> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .poll_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedInquiry::Pending("poll-again".to_string()));
        self.inquiry_reply(step)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Ticketing client

pub struct RecordingTicketingClient {
    pub acknowledge: bool,
    pub notify_calls: Mutex<Vec<(String, JsonValue)>>,
    pub detail_calls: AtomicUsize,
}

impl RecordingTicketingClient {
    pub fn new(acknowledge: bool) -> Self {
        Self {
            acknowledge,
            notify_calls: Mutex::new(Vec::new()),
            detail_calls: AtomicUsize::new(0),
        }
    }

    pub async fn notified(&self) -> usize {
        self.notify_calls.lock().await.len()
    }
}

#[async_trait]
impl TicketingClient for RecordingTicketingClient {
    async fn fetch_refund_detail(&self, refund_id: &str) -> AppResult<TicketDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TicketDetail {
            refund_id: refund_id.to_string(),
            order_id: Some("ORDER-1".to_string()),
            customer_name: Some("Budi Santoso".to_string()),
            raw: json!({}),
        })
    }

    async fn notify(&self, url: &str, payload: &JsonValue) -> NotifyResponse {
        self.notify_calls
            .lock()
            .await
            .push((url.to_string(), payload.clone()));
        NotifyResponse {
            status: Some(if self.acknowledge { 200 } else { 500 }),
            body: None,
            acknowledged: self.acknowledge,
        }
    }
}

// ---------------------------------------------------------------------------

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
